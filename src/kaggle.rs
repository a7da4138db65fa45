use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Credentials;
use crate::domain::{DatasetFilter, DatasetInfo, DatasetRef};
use crate::error::HaggleError;

pub const DEFAULT_BASE_URL: &str = "https://www.kaggle.com/api/v1";

/// The three remote primitives the catalog is built on.
pub trait KaggleClient: Send + Sync {
    /// One page of the dataset listing. An empty page ends the result set.
    fn list(&self, page: u32, filter: &DatasetFilter) -> Result<Vec<DatasetInfo>, HaggleError>;

    /// Downloads the dataset archive into `destination_dir` and returns the
    /// path of the written file.
    fn download(
        &self,
        reference: &DatasetRef,
        destination_dir: &Path,
    ) -> Result<PathBuf, HaggleError>;

    fn metadata(&self, reference: &DatasetRef) -> Result<DatasetInfo, HaggleError>;
}

impl<C: KaggleClient + ?Sized> KaggleClient for Arc<C> {
    fn list(&self, page: u32, filter: &DatasetFilter) -> Result<Vec<DatasetInfo>, HaggleError> {
        (**self).list(page, filter)
    }

    fn download(
        &self,
        reference: &DatasetRef,
        destination_dir: &Path,
    ) -> Result<PathBuf, HaggleError> {
        (**self).download(reference, destination_dir)
    }

    fn metadata(&self, reference: &DatasetRef) -> Result<DatasetInfo, HaggleError> {
        (**self).metadata(reference)
    }
}

#[derive(Clone)]
pub struct KaggleHttpClient {
    client: Client,
    credentials: Credentials,
    base_url: String,
}

impl KaggleHttpClient {
    pub fn new(credentials: Credentials) -> Result<Self, HaggleError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("haggle/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HaggleError::KaggleHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| HaggleError::KaggleHttp(err.to_string()))?;
        Ok(Self {
            client,
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.credentials.username, Some(&self.credentials.key))
    }

    fn handle_status(response: Response) -> Result<Response, HaggleError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Kaggle request failed".to_string());
        Err(HaggleError::KaggleStatus { status, message })
    }
}

impl KaggleClient for KaggleHttpClient {
    fn list(&self, page: u32, filter: &DatasetFilter) -> Result<Vec<DatasetInfo>, HaggleError> {
        debug!(page, "kaggle.list");
        let response = self
            .get("/datasets/list")
            .query(&[("page", page.to_string())])
            .query(&filter.to_query())
            .send()
            .map_err(|err| HaggleError::KaggleHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json::<Vec<DatasetInfo>>()
            .map_err(|err| HaggleError::KaggleHttp(err.to_string()))
    }

    fn download(
        &self,
        reference: &DatasetRef,
        destination_dir: &Path,
    ) -> Result<PathBuf, HaggleError> {
        debug!(%reference, "kaggle.download");
        let download_err = |message: String| HaggleError::Download {
            reference: reference.to_string(),
            message,
        };
        let response = self
            .get(&format!(
                "/datasets/download/{}/{}",
                reference.owner(),
                reference.name()
            ))
            .send()
            .map_err(|err| download_err(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(HaggleError::DatasetNotFound(reference.to_string()));
        }
        let mut response = Self::handle_status(response).map_err(|err| download_err(err.to_string()))?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(attachment_file_name)
            .transpose()?
            .flatten()
            .unwrap_or_else(|| format!("{}.zip", reference.name()));
        let destination = destination_dir.join(file_name);
        let mut file = File::create(&destination).map_err(|err| download_err(err.to_string()))?;
        std::io::copy(&mut response, &mut file).map_err(|err| download_err(err.to_string()))?;
        Ok(destination)
    }

    fn metadata(&self, reference: &DatasetRef) -> Result<DatasetInfo, HaggleError> {
        debug!(%reference, "kaggle.metadata");
        let response = self
            .get(&format!(
                "/datasets/metadata/{}/{}",
                reference.owner(),
                reference.name()
            ))
            .send()
            .map_err(|err| HaggleError::KaggleHttp(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(HaggleError::DatasetNotFound(reference.to_string()));
        }
        let response = Self::handle_status(response)?;
        let raw_json: Map<String, Value> = response
            .json()
            .map_err(|err| HaggleError::KaggleHttp(err.to_string()))?;
        metadata_record(reference, raw_json)
    }
}

/// Unwraps the `{"info": {...}, "errorMessage": ...}` envelope and makes sure
/// the record carries its own `ref`.
pub fn metadata_record(
    reference: &DatasetRef,
    mut raw_json: Map<String, Value>,
) -> Result<DatasetInfo, HaggleError> {
    if let Some(message) = raw_json
        .get("errorMessage")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
    {
        return Err(HaggleError::KaggleStatus {
            status: 200,
            message: message.to_string(),
        });
    }
    let fields = match raw_json.remove("info") {
        Some(Value::Object(info)) => info,
        Some(_) | None => raw_json,
    };
    let mut info = DatasetInfo::new(fields);
    if info.reference().is_none() {
        info.set_reference(reference);
    }
    Ok(info)
}

/// File name from a `Content-Disposition: attachment; filename=...` header,
/// stripped of any directory part.
pub fn attachment_file_name(header: &str) -> Result<Option<String>, HaggleError> {
    let re = Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#)
        .map_err(|err| HaggleError::KaggleHttp(err.to_string()))?;
    Ok(re
        .captures(header)
        .and_then(|captures| captures.get(1))
        .and_then(|name| {
            Path::new(name.as_str().trim())
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty()))
}
