use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tempfile::Builder;

use crate::domain::{LinkId, LinkStatus, ProviderKind};
use crate::error::HarvestError;
use crate::extract::ExtractedLink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLink {
    pub id: LinkId,
    #[serde(rename = "row")]
    pub source_row: u64,
    pub url: String,
    #[serde(rename = "type")]
    pub provider_kind: ProviderKind,
    pub status: LinkStatus,
    #[serde(default, deserialize_with = "processed_flag")]
    pub processed: bool,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransferLink {
    pub fn new(id: LinkId, source_row: u64, url: String, provider_kind: ProviderKind) -> Self {
        Self {
            id,
            source_row,
            url,
            provider_kind,
            status: LinkStatus::Pending,
            processed: false,
            last_error: None,
            processed_at: None,
            extra: Map::new(),
        }
    }

    pub fn effective_status(&self) -> LinkStatus {
        if !self.processed && self.status.is_terminal() {
            LinkStatus::Pending
        } else {
            self.status
        }
    }

    pub fn is_unresolved(&self) -> bool {
        !self.processed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    #[serde(default)]
    pub total_links: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub metadata: RegistryMetadata,
    #[serde(default)]
    pub links: Vec<TransferLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistryDocument {
    fn refresh_metadata(&mut self) {
        self.metadata.total_links = self.links.len();
        self.metadata.last_updated = Some(timestamp());
        for kind in ProviderKind::ALL {
            let count = self
                .links
                .iter()
                .filter(|link| link.provider_kind == kind)
                .count();
            self.metadata
                .extra
                .insert(count_key(kind), Value::from(count as u64));
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub added: Vec<LinkId>,
    pub duplicates: usize,
    pub unsupported: usize,
}

#[derive(Debug, Clone)]
pub enum ResetSelector {
    Ids(Vec<LinkId>),
    Unsuccessful,
}

#[derive(Debug, Clone)]
pub struct Registry {
    path: Utf8PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.as_std_path().exists()
    }

    pub fn load(&self) -> Result<Vec<TransferLink>, HarvestError> {
        Ok(self.load_document()?.links)
    }

    pub fn find(&self, id: &LinkId) -> Result<Option<TransferLink>, HarvestError> {
        Ok(self.load()?.into_iter().find(|link| &link.id == id))
    }

    pub fn load_document(&self) -> Result<RegistryDocument, HarvestError> {
        let content =
            fs::read_to_string(self.path.as_std_path()).map_err(|err| HarvestError::RegistryRead {
                path: self.path.clone().into_std_path_buf(),
                message: err.to_string(),
            })?;
        parse_document(&content).map_err(|message| HarvestError::RegistryParse {
            path: self.path.clone().into_std_path_buf(),
            message,
        })
    }

    pub fn save(&self, links: &[TransferLink]) -> Result<(), HarvestError> {
        let mut document = if self.exists() {
            self.load_document()?
        } else {
            RegistryDocument::default()
        };
        document.links = links.to_vec();
        self.write_document(&mut document)
    }

    pub fn update_status(
        &self,
        id: &LinkId,
        status: LinkStatus,
        error: Option<&str>,
    ) -> Result<TransferLink, HarvestError> {
        let mut document = self.load_document()?;
        let link = document
            .links
            .iter_mut()
            .find(|link| &link.id == id)
            .ok_or_else(|| HarvestError::LinkNotFound(id.to_string()))?;

        let current = link.effective_status();
        if !current.can_transition_to(status) {
            return Err(HarvestError::InvalidTransition {
                id: id.to_string(),
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        link.status = status;
        link.processed = status.is_terminal();
        link.last_error = match status {
            LinkStatus::Failed | LinkStatus::Error => error.map(str::to_string),
            _ => None,
        };
        link.processed_at = Some(timestamp());
        let updated = link.clone();

        self.write_document(&mut document)?;
        Ok(updated)
    }

    pub fn merge(&self, extracted: &[ExtractedLink]) -> Result<MergeReport, HarvestError> {
        let mut document = if self.exists() {
            self.load_document()?
        } else {
            RegistryDocument::default()
        };

        let mut seen: HashSet<(u64, String)> = document
            .links
            .iter()
            .map(|link| (link.source_row, link.url.clone()))
            .collect();
        let mut next = document
            .links
            .iter()
            .filter_map(|link| link.id.sequence())
            .max()
            .unwrap_or(0)
            + 1;

        let mut report = MergeReport::default();
        for item in extracted {
            let Some(kind) = ProviderKind::classify(&item.url) else {
                report.unsupported += 1;
                continue;
            };
            if !seen.insert((item.source_row, item.url.clone())) {
                report.duplicates += 1;
                continue;
            }
            let id = LinkId::from_sequence(next);
            next += 1;
            let mut link = TransferLink::new(id.clone(), item.source_row, item.url.clone(), kind);
            if let Some(cell) = &item.original_cell {
                link.extra
                    .insert("original_cell".to_string(), Value::from(preview(cell, 100)));
            }
            document.links.push(link);
            report.added.push(id);
        }

        self.write_document(&mut document)?;
        Ok(report)
    }

    pub fn reset(&self, selector: &ResetSelector) -> Result<Vec<LinkId>, HarvestError> {
        let mut document = self.load_document()?;
        if let ResetSelector::Ids(ids) = selector {
            for id in ids {
                if !document.links.iter().any(|link| &link.id == id) {
                    return Err(HarvestError::LinkNotFound(id.to_string()));
                }
            }
        }

        let mut reset = Vec::new();
        for link in &mut document.links {
            let selected = match selector {
                ResetSelector::Ids(ids) => ids.contains(&link.id),
                ResetSelector::Unsuccessful => {
                    matches!(link.status, LinkStatus::Failed | LinkStatus::Error)
                }
            };
            if selected {
                link.status = LinkStatus::Pending;
                link.processed = false;
                link.last_error = None;
                link.processed_at = Some(timestamp());
                reset.push(link.id.clone());
            }
        }

        self.write_document(&mut document)?;
        Ok(reset)
    }

    fn write_document(&self, document: &mut RegistryDocument) -> Result<(), HarvestError> {
        document.refresh_metadata();
        let write_err = |message: String| HarvestError::RegistryWrite {
            path: self.path.clone().into_std_path_buf(),
            message,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(parent.as_std_path()).map_err(|err| write_err(err.to_string()))?;

        let content =
            serde_json::to_vec_pretty(document).map_err(|err| write_err(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".thv-registry")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| write_err(err.to_string()))?;
        temp.write_all(b"\n")
            .map_err(|err| write_err(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| write_err(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        Ok(())
    }
}

fn parse_document(content: &str) -> Result<RegistryDocument, String> {
    let value: Value = serde_json::from_str(content).map_err(|err| err.to_string())?;
    match value {
        Value::Array(_) => {
            let links: Vec<TransferLink> =
                serde_json::from_value(value).map_err(|err| err.to_string())?;
            Ok(RegistryDocument {
                links,
                ..RegistryDocument::default()
            })
        }
        Value::Object(_) => serde_json::from_value(value).map_err(|err| err.to_string()),
        _ => Err("expected a JSON object or array".to_string()),
    }
}

pub fn group_by_row(links: &[TransferLink]) -> BTreeMap<u64, Vec<&TransferLink>> {
    let mut rows: BTreeMap<u64, Vec<&TransferLink>> = BTreeMap::new();
    for link in links {
        rows.entry(link.source_row).or_default().push(link);
    }
    rows
}

pub fn count_key(kind: ProviderKind) -> String {
    format!("{}_count", kind.as_str().replace('-', "_"))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn preview(value: &str, limit: usize) -> String {
    if value.chars().count() > limit {
        let cut: String = value.chars().take(limit).collect();
        format!("{cut}...")
    } else {
        value.to_string()
    }
}

fn processed_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Int(value) => Ok(value != 0),
    }
}
