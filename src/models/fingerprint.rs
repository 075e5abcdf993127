use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NO_TECHNOLOGIES_MESSAGE: &str = "No technologies found";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    pub version: Option<String>,
}

impl Technology {
    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: Some(version.into()) }
    }

    pub fn unversioned(name: impl Into<String>) -> Self {
        Self { name: name.into(), version: None }
    }
}

/// What passive fingerprinting learned about the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintResult {
    pub technologies: Vec<Technology>,
    #[serde(default)]
    pub cookies: Vec<String>,
    /// Network/location metadata (IP, Country, HTTPServer, Email).
    #[serde(default)]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl FingerprintResult {
    pub fn versioned(&self) -> impl Iterator<Item = &Technology> {
        self.technologies.iter().filter(|t| t.version.is_some())
    }

    pub fn has_versioned(&self) -> bool {
        self.versioned().next().is_some()
    }
}

/// Sentinel for a fingerprint run that legitimately found nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NothingFound {
    pub error: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FingerprintOutcome {
    Found(FingerprintResult),
    NotFound(NothingFound),
}

impl FingerprintOutcome {
    pub fn not_found() -> Self {
        Self::NotFound(NothingFound { error: true, message: NO_TECHNOLOGIES_MESSAGE.to_string() })
    }

    pub fn result(&self) -> Option<&FingerprintResult> {
        match self {
            Self::Found(r) => Some(r),
            Self::NotFound(_) => None,
        }
    }
}
