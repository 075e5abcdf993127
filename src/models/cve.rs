use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveEntry {
    pub id: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub published: Option<String>,
    pub modified: Option<String>,
    pub cvss_version: Option<String>,
    pub cvss: Option<String>,
    #[serde(default)]
    pub exploits: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// CVE correlation for the fingerprinted `technology version` queries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveResult {
    pub found: BTreeMap<String, Vec<CveEntry>>,
    pub not_found: Vec<String>,
}

impl CveResult {
    pub fn is_empty(&self) -> bool {
        self.found.is_empty() && self.not_found.is_empty()
    }

    pub fn total_cves(&self) -> usize {
        self.found.values().map(Vec::len).sum()
    }
}
