use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{LinkId, LinkStatus, ProviderKind};
use crate::registry::{TransferLink, group_by_row};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub error: usize,
    pub pending: usize,
    pub processing: usize,
    pub processed: usize,
    pub unprocessed: usize,
    pub by_provider: BTreeMap<ProviderKind, usize>,
    pub rows: Vec<RowGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowGroup {
    pub row: u64,
    pub links: Vec<RowLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowLink {
    pub id: LinkId,
    pub provider: ProviderKind,
    pub status: LinkStatus,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Summary {
    pub fn from_links(links: &[TransferLink]) -> Self {
        let mut summary = Summary {
            total: links.len(),
            ..Summary::default()
        };

        for link in links {
            match link.effective_status() {
                LinkStatus::Pending => summary.pending += 1,
                LinkStatus::Processing => summary.processing += 1,
                LinkStatus::Completed => summary.completed += 1,
                LinkStatus::Failed => summary.failed += 1,
                LinkStatus::Error => summary.error += 1,
            }
            if link.processed {
                summary.processed += 1;
            } else {
                summary.unprocessed += 1;
            }
            *summary.by_provider.entry(link.provider_kind).or_default() += 1;
        }

        summary.rows = group_by_row(links)
            .into_iter()
            .map(|(row, links)| RowGroup {
                row,
                links: links
                    .into_iter()
                    .map(|link| RowLink {
                        id: link.id.clone(),
                        provider: link.provider_kind,
                        status: link.effective_status(),
                        url: link.url.clone(),
                        error: link.last_error.clone(),
                    })
                    .collect(),
            })
            .collect();
        summary
    }

    pub fn all_completed(&self) -> bool {
        self.completed == self.total
    }
}
