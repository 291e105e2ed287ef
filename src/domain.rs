use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "video-host")]
    #[value(name = "video-host")]
    VideoHost,
    #[serde(rename = "transfernow")]
    #[value(name = "transfernow")]
    TransferNow,
    #[serde(rename = "wetransfer")]
    #[value(name = "wetransfer")]
    WeTransfer,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::VideoHost,
        ProviderKind::TransferNow,
        ProviderKind::WeTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::VideoHost => "video-host",
            ProviderKind::TransferNow => "transfernow",
            ProviderKind::WeTransfer => "wetransfer",
        }
    }

    pub fn classify(url: &str) -> Option<ProviderKind> {
        let lower = url.trim().to_ascii_lowercase();
        let host = host_of(&lower)?;
        if host == "transfernow.net" || host.ends_with(".transfernow.net") {
            Some(ProviderKind::TransferNow)
        } else if host == "wetransfer.com"
            || host.ends_with(".wetransfer.com")
            || host == "we.tl"
        {
            Some(ProviderKind::WeTransfer)
        } else if host.ends_with(".sharepoint.com") {
            Some(ProviderKind::VideoHost)
        } else {
            None
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video-host" | "sharepoint" => Ok(ProviderKind::VideoHost),
            "transfernow" => Ok(ProviderKind::TransferNow),
            "wetransfer" => Ok(ProviderKind::WeTransfer),
            _ => Err(HarvestError::UnsupportedProvider(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Error,
}

impl LinkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LinkStatus::Completed | LinkStatus::Failed | LinkStatus::Error
        )
    }

    // Processing -> Processing lets a record left behind by a crashed run be
    // picked up again.
    pub fn can_transition_to(&self, next: LinkStatus) -> bool {
        match (self, next) {
            (LinkStatus::Pending, LinkStatus::Processing) => true,
            (LinkStatus::Processing, LinkStatus::Processing) => true,
            (LinkStatus::Processing, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Processing => "processing",
            LinkStatus::Completed => "completed",
            LinkStatus::Failed => "failed",
            LinkStatus::Error => "error",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn from_sequence(n: u64) -> Self {
        Self(format!("link_{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sequence(&self) -> Option<u64> {
        self.0.strip_prefix("link_")?.parse().ok()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LinkId {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(HarvestError::InvalidLinkId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then_some(host)
}
