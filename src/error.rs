use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid link id: {0}")]
    InvalidLinkId(String),

    #[error("link not found in registry: {0}")]
    LinkNotFound(String),

    #[error("failed to read registry at {path}: {message}")]
    #[diagnostic(help("run `thv extract` first to create the registry"))]
    RegistryRead { path: PathBuf, message: String },

    #[error("registry at {path} is corrupt: {message}")]
    #[diagnostic(help("fix or restore the registry file; the run will not guess partial state"))]
    RegistryParse { path: PathBuf, message: String },

    #[error("failed to write registry at {path}: {message}")]
    RegistryWrite { path: PathBuf, message: String },

    #[error("link {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("link column not found: {column} (available: {available})")]
    ColumnNotFound { column: String, available: String },

    #[error("spreadsheet request failed: {0}")]
    SheetHttp(String),

    #[error("spreadsheet returned status {status}: {message}")]
    SheetStatus { status: u16, message: String },

    #[error("browser not found")]
    #[diagnostic(help("install Chrome/Chromium or set `chrome_executable` in thv.json"))]
    BrowserNotFound,

    #[error("browser session failed: {0}")]
    Browser(String),

    #[error("stale element handle: {0}")]
    StaleElement(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("interrupted by operator")]
    Cancelled,
}
