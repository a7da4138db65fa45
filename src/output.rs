use std::io::{self, Write};

use serde::Serialize;

use crate::catalog::CachedArchive;
use crate::domain::{DatasetInfo, DatasetRef};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub count: usize,
    pub pages: usize,
    pub max_pages_reached: bool,
    pub datasets: Vec<DatasetInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetResult {
    pub reference: DatasetRef,
    pub cached: bool,
    pub size: usize,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub reference: DatasetRef,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub root: String,
    pub archives: Vec<CachedArchive>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_get(result: &GetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &DatasetInfo) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_remove(result: &RemoveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
