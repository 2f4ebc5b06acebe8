use super::{Artifact, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest written next to a checkpoint's snapshot files (checkpoint.json)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// `YYYYMMDDTHHMMSSmmmZ-sNN`, lexically ordered by creation
    pub id: String,
    pub stage: Stage,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Artifacts captured in this snapshot
    pub files: Vec<SnapshotFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub artifact: Artifact,
    /// `sha256:<hex>` of the captured content
    pub checksum: String,
    pub size: u64,
}

impl Checkpoint {
    pub fn contains(&self, artifact: Artifact) -> bool {
        self.files.iter().any(|f| f.artifact == artifact)
    }
}
