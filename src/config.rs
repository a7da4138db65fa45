use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::Deserialize;

use crate::error::HaggleError;

pub const ROOTDIR_ENV: &str = "HAGGLE_ROOTDIR";
pub const DEFAULT_ROOTDIR_NAME: &str = "haggle";
pub const DEFAULT_START_PAGE: u32 = 1;
pub const DEFAULT_MAX_PAGES: u32 = 10;

pub const USERNAME_ENV: &str = "KAGGLE_USERNAME";
pub const KEY_ENV: &str = "KAGGLE_KEY";
pub const CONFIG_DIR_ENV: &str = "KAGGLE_CONFIG_DIR";
pub const CREDENTIALS_FILE: &str = "kaggle.json";

/// Root directory for the local caches: explicit value, then `HAGGLE_ROOTDIR`,
/// then `~/haggle`.
pub fn resolve_rootdir(explicit: Option<Utf8PathBuf>) -> Result<Utf8PathBuf, HaggleError> {
    let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    resolve_rootdir_with(explicit, env::var(ROOTDIR_ENV).ok(), home.as_deref())
}

pub fn resolve_rootdir_with(
    explicit: Option<Utf8PathBuf>,
    env_value: Option<String>,
    home: Option<&Path>,
) -> Result<Utf8PathBuf, HaggleError> {
    if let Some(root) = explicit {
        return Ok(root);
    }
    if let Some(value) = env_value.filter(|value| !value.trim().is_empty()) {
        return Ok(Utf8PathBuf::from(value.trim()));
    }
    home.and_then(|home| Utf8PathBuf::from_path_buf(home.join(DEFAULT_ROOTDIR_NAME)).ok())
        .ok_or_else(|| HaggleError::Filesystem("unable to resolve home directory".to_string()))
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("key", &"***")
            .finish()
    }
}

pub struct CredentialsLoader;

impl CredentialsLoader {
    pub fn resolve(path: Option<&str>) -> Result<Credentials, HaggleError> {
        if let Some(path) = path {
            return Self::read_file(Path::new(path));
        }
        let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        Self::resolve_with(&|name| env::var(name).ok(), home.as_deref())
    }

    /// Environment pair first, then `$KAGGLE_CONFIG_DIR/kaggle.json`, then
    /// `~/.kaggle/kaggle.json`.
    pub fn resolve_with(
        lookup: &dyn Fn(&str) -> Option<String>,
        home: Option<&Path>,
    ) -> Result<Credentials, HaggleError> {
        let username = lookup(USERNAME_ENV).filter(|value| !value.trim().is_empty());
        let key = lookup(KEY_ENV).filter(|value| !value.trim().is_empty());
        if let (Some(username), Some(key)) = (username, key) {
            return Ok(Credentials {
                username: username.trim().to_string(),
                key: key.trim().to_string(),
            });
        }

        let candidates: Vec<PathBuf> = lookup(CONFIG_DIR_ENV)
            .map(|dir| PathBuf::from(dir).join(CREDENTIALS_FILE))
            .into_iter()
            .chain(home.map(|home| home.join(".kaggle").join(CREDENTIALS_FILE)))
            .collect();

        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Self::read_file(path),
            None => Err(HaggleError::MissingCredentials),
        }
    }

    pub fn parse(content: &str) -> Result<Credentials, HaggleError> {
        serde_json::from_str(content).map_err(|err| HaggleError::ConfigParse(err.to_string()))
    }

    fn read_file(path: &Path) -> Result<Credentials, HaggleError> {
        let content =
            fs::read_to_string(path).map_err(|_| HaggleError::ConfigRead(path.to_path_buf()))?;
        Self::parse(&content)
    }
}
