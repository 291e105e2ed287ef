use std::fs;
use std::sync::OnceLock;
use std::time::Duration;

use camino::Utf8PathBuf;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub source_row: u64,
    pub url: String,
    pub original_cell: Option<String>,
}

pub trait LinkExtractor {
    fn extract(&self) -> Result<Vec<ExtractedLink>, HarvestError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetSource {
    Url(String),
    File(Utf8PathBuf),
}

impl SheetSource {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SheetSource::Url(google_export_url(trimmed).unwrap_or_else(|| trimmed.to_string()))
        } else {
            SheetSource::File(Utf8PathBuf::from(trimmed))
        }
    }
}

pub struct SheetExport {
    source: SheetSource,
    column: String,
}

impl SheetExport {
    pub fn new(source: SheetSource, column: impl Into<String>) -> Self {
        Self {
            source,
            column: column.into(),
        }
    }

    fn read_source(&self) -> Result<String, HarvestError> {
        match &self.source {
            SheetSource::File(path) => fs::read_to_string(path.as_std_path())
                .map_err(|err| HarvestError::Filesystem(format!("read {path}: {err}"))),
            SheetSource::Url(url) => fetch_sheet(url),
        }
    }
}

impl LinkExtractor for SheetExport {
    fn extract(&self) -> Result<Vec<ExtractedLink>, HarvestError> {
        let content = self.read_source()?;
        links_from_table(&content, &self.column)
    }
}

pub fn links_from_table(content: &str, column: &str) -> Result<Vec<ExtractedLink>, HarvestError> {
    let mut lines = content.lines();
    let Some(header_line) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<&str> = header_line.split('\t').map(str::trim).collect();
    let index = find_column_index(&headers, column).ok_or_else(|| HarvestError::ColumnNotFound {
        column: column.to_string(),
        available: headers.join(", "),
    })?;

    let mut links = Vec::new();
    for (offset, line) in lines.enumerate() {
        let row = offset as u64 + 2;
        let Some(cell) = line.split('\t').nth(index) else {
            continue;
        };
        let cell = unquote(cell);
        for url in split_cell_links(&cell) {
            links.push(ExtractedLink {
                source_row: row,
                url,
                original_cell: Some(cell.clone()),
            });
        }
    }
    Ok(links)
}

pub fn find_column_index(headers: &[&str], column: &str) -> Option<usize> {
    if let Some(index) = headers.iter().position(|header| *header == column) {
        return Some(index);
    }
    let needle = column.to_lowercase();
    headers
        .iter()
        .position(|header| header.to_lowercase().contains(&needle))
}

pub fn split_cell_links(cell: &str) -> Vec<String> {
    static URL: OnceLock<Regex> = OnceLock::new();
    let pattern = URL.get_or_init(|| {
        Regex::new(r#"https?://[^\s|;,"'<>]+"#).expect("static url pattern")
    });
    let mut links: Vec<String> = Vec::new();
    for found in pattern.find_iter(cell) {
        let url = found.as_str().trim_end_matches(['.', ')']).to_string();
        if !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

fn unquote(cell: &str) -> String {
    let trimmed = cell.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(|inner| inner.replace("\"\"", "\""))
        .unwrap_or_else(|| trimmed.to_string())
}

fn google_export_url(url: &str) -> Option<String> {
    let rest = url.split("docs.google.com/spreadsheets/d/").nth(1)?;
    let id = rest.split(['/', '?', '#']).next()?;
    if id.is_empty() {
        return None;
    }
    let gid = url
        .split(['#', '?', '&'])
        .find_map(|part| part.strip_prefix("gid="))
        .map(|gid| format!("&gid={gid}"))
        .unwrap_or_default();
    Some(format!(
        "https://docs.google.com/spreadsheets/d/{id}/export?format=tsv{gid}"
    ))
}

fn fetch_sheet(url: &str) -> Result<String, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("thv/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| HarvestError::SheetHttp(err.to_string()))?,
    );
    let client = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|err| HarvestError::SheetHttp(err.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|err| HarvestError::SheetHttp(err.to_string()))?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "spreadsheet request failed".to_string());
        return Err(HarvestError::SheetStatus { status, message });
    }
    response
        .text()
        .map_err(|err| HarvestError::SheetHttp(err.to_string()))
}
