use serde::{Deserialize, Serialize};

/// SHA-256 hex fingerprint of a report's canonical row content.
///
/// Computed by `vfb_reports::fingerprint(report)`. Recorded in the batch
/// summary so two runs can be compared without re-reading the TSV files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, enough to eyeball in a terminal table.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
