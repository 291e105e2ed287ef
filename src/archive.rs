use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::ZipArchive;

use crate::error::HarvestError;

pub const EXTRACTED_DIR: &str = "extracted";

const UNSUPPORTED_EXTENSIONS: [&str; 2] = ["rar", "7z"];

pub trait ArchiveExtractor {
    fn extract_archives(&self, dir: &Path) -> Result<Vec<PathBuf>, HarvestError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract_archives(&self, dir: &Path) -> Result<Vec<PathBuf>, HarvestError> {
        let entries = fs::read_dir(dir)
            .map_err(|err| HarvestError::Filesystem(format!("list {}: {err}", dir.display())))?;
        let mut archives = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| HarvestError::Filesystem(err.to_string()))?
                .path();
            if path.is_file() {
                archives.push(path);
            }
        }
        archives.sort();

        let target = dir.join(EXTRACTED_DIR);
        let mut written = Vec::new();
        for archive in archives {
            let extension = archive
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if extension == "zip" {
                match extract_zip(&archive, &target) {
                    Ok(paths) => {
                        info!(archive = %archive.display(), entries = paths.len(), "archive extracted");
                        written.extend(paths);
                    }
                    Err(err) => {
                        warn!(archive = %archive.display(), error = %err, "skipping unreadable archive");
                    }
                }
            } else if UNSUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
                warn!(archive = %archive.display(), "archive format not supported; left in place");
            }
        }
        Ok(written)
    }
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, HarvestError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| HarvestError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| HarvestError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| HarvestError::Archive(err.to_string()))?;
        if entry.enclosed_name().is_none() {
            return Err(HarvestError::Archive(format!(
                "zip entry path traversal detected: {}",
                entry.name()
            )));
        }
    }

    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| HarvestError::Archive(err.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| HarvestError::Archive(err.to_string()))?;
        written.push(entry_path);
    }
    Ok(written)
}
