use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HaggleError;

/// A Kaggle dataset reference, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetRef {
    owner: String,
    name: String,
}

impl DatasetRef {
    pub fn new(owner: &str, name: &str) -> Result<Self, HaggleError> {
        format!("{owner}/{name}").parse()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for DatasetRef {
    type Err = HaggleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| HaggleError::InvalidReference(value.to_string()))?;
        // Kaggle slugs; a leading alphanumeric also keeps `.` and `..` out of store paths.
        let slug = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$")
            .map_err(|err| HaggleError::InvalidReference(format!("{value}: {err}")))?;
        if !slug.is_match(owner) || !slug.is_match(name) {
            return Err(HaggleError::InvalidReference(value.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl TryFrom<String> for DatasetRef {
    type Error = HaggleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetRef> for String {
    fn from(value: DatasetRef) -> Self {
        value.to_string()
    }
}

/// One catalog record, kept as the JSON object Kaggle returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetInfo(Map<String, Value>);

impl DatasetInfo {
    pub const REF_FIELD: &'static str = "ref";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The `ref` field, if present and a string.
    pub fn reference(&self) -> Option<&str> {
        self.0.get(Self::REF_FIELD).and_then(Value::as_str)
    }

    pub fn dataset_ref(&self) -> Result<DatasetRef, HaggleError> {
        let reference = self
            .reference()
            .ok_or_else(|| HaggleError::Metadata("record has no \"ref\" field".to_string()))?;
        reference.parse()
    }

    pub fn set_reference(&mut self, reference: &DatasetRef) {
        self.0.insert(
            Self::REF_FIELD.to_string(),
            Value::String(reference.to_string()),
        );
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.0.get("url").and_then(Value::as_str)
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.0.get("totalBytes").and_then(Value::as_u64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for DatasetInfo {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatasetGroup {
    Public,
    My,
    User,
    Upvoted,
}

impl fmt::Display for DatasetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetGroup::Public => write!(f, "public"),
            DatasetGroup::My => write!(f, "my"),
            DatasetGroup::User => write!(f, "user"),
            DatasetGroup::Upvoted => write!(f, "upvoted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortBy {
    Hottest,
    Votes,
    Updated,
    Active,
    Published,
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::Hottest => write!(f, "hottest"),
            SortBy::Votes => write!(f, "votes"),
            SortBy::Updated => write!(f, "updated"),
            SortBy::Active => write!(f, "active"),
            SortBy::Published => write!(f, "published"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileType {
    All,
    Csv,
    Sqlite,
    Json,
    #[value(name = "bigquery")]
    BigQuery,
    Parquet,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::All => write!(f, "all"),
            FileType::Csv => write!(f, "csv"),
            FileType::Sqlite => write!(f, "sqlite"),
            FileType::Json => write!(f, "json"),
            FileType::BigQuery => write!(f, "bigQuery"),
            FileType::Parquet => write!(f, "parquet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum License {
    All,
    Cc,
    Gpl,
    Odb,
    Other,
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            License::All => write!(f, "all"),
            License::Cc => write!(f, "cc"),
            License::Gpl => write!(f, "gpl"),
            License::Odb => write!(f, "odb"),
            License::Other => write!(f, "other"),
        }
    }
}

/// Criteria for a catalog listing. Unset fields are left out of the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetFilter {
    pub group: Option<DatasetGroup>,
    pub sort_by: Option<SortBy>,
    pub file_type: Option<FileType>,
    pub license: Option<License>,
    pub tag_ids: Vec<String>,
    pub search: Option<String>,
    pub user: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub extra: Vec<(String, String)>,
}

impl DatasetFilter {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Query parameters as the listing endpoint names them.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                query.push((key.to_string(), value));
            }
        };
        push("group", self.group.map(|value| value.to_string()));
        push("sortBy", self.sort_by.map(|value| value.to_string()));
        push("filetype", self.file_type.map(|value| value.to_string()));
        push("license", self.license.map(|value| value.to_string()));
        push(
            "tagids",
            (!self.tag_ids.is_empty()).then(|| self.tag_ids.join(",")),
        );
        push("search", self.search.clone());
        push("user", self.user.clone());
        push("minSize", self.min_size.map(|value| value.to_string()));
        push("maxSize", self.max_size.map(|value| value.to_string()));
        query.extend(self.extra.iter().cloned());
        query
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_reference_valid() {
        let reference: DatasetRef = " rtatman/english-word-frequency ".parse().unwrap();
        assert_eq!(reference.owner(), "rtatman");
        assert_eq!(reference.name(), "english-word-frequency");
        assert_eq!(reference.to_string(), "rtatman/english-word-frequency");
    }

    #[test]
    fn parse_reference_invalid() {
        for value in [
            "no-slash",
            "a/b/c",
            "/name",
            "owner/",
            "",
            "../etc",
            "./x",
            "../..",
            "owner/..",
            "owner/has space",
            "owner/.hidden",
        ] {
            let err = value.parse::<DatasetRef>().unwrap_err();
            assert_matches!(err, HaggleError::InvalidReference(_));
        }
    }

    #[test]
    fn info_reference_field() {
        let info: DatasetInfo =
            serde_json::from_value(json!({"ref": "user/data", "title": "Data"})).unwrap();
        assert_eq!(info.reference(), Some("user/data"));
        assert_eq!(info.title(), Some("Data"));
        assert_eq!(info.dataset_ref().unwrap().name(), "data");

        let nameless: DatasetInfo = serde_json::from_value(json!({"ref": null})).unwrap();
        assert_eq!(nameless.reference(), None);
        assert_matches!(nameless.dataset_ref(), Err(HaggleError::Metadata(_)));
    }

    #[test]
    fn filter_query_names() {
        let filter = DatasetFilter {
            sort_by: Some(SortBy::Votes),
            file_type: Some(FileType::BigQuery),
            tag_ids: vec!["health".to_string(), "covid".to_string()],
            ..DatasetFilter::search("covid")
        }
        .with_param("page_size", "20");

        let query = filter.to_query();
        assert!(query.contains(&("sortBy".to_string(), "votes".to_string())));
        assert!(query.contains(&("filetype".to_string(), "bigQuery".to_string())));
        assert!(query.contains(&("tagids".to_string(), "health,covid".to_string())));
        assert!(query.contains(&("search".to_string(), "covid".to_string())));
        assert!(query.contains(&("page_size".to_string(), "20".to_string())));
        assert!(!query.iter().any(|(key, _)| key == "user"));
    }
}
