//! Key-value access to Kaggle datasets with a local read-through cache.
//!
//! ```no_run
//! use haggle::catalog::KaggleDatasets;
//! use haggle::config::CredentialsLoader;
//! use haggle::domain::DatasetRef;
//! use haggle::kaggle::KaggleHttpClient;
//!
//! # fn main() -> Result<(), haggle::error::HaggleError> {
//! let client = KaggleHttpClient::new(CredentialsLoader::resolve(None)?)?;
//! let datasets = KaggleDatasets::new(None, client)?;
//! let reference: DatasetRef = "rtatman/english-word-frequency".parse()?;
//! let archive = datasets.get(&reference)?;
//! for name in archive.names() {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod index;
pub mod kaggle;
pub mod layout;
pub mod lister;
pub mod output;
pub mod remote;
pub mod store;
