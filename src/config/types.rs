use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ToolKind;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RestackConfig {
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub containers: ContainersConfig,
    pub wapiti: WapitiDefaults,
    pub zap: ZapDefaults,
    pub scan: ScanBudgetConfig,
    pub scheduler: SchedulerConfig,
}

/// Base directories for per-tool artifacts and merged full-scan artifacts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub whatweb: PathBuf,
    pub search_vulns: PathBuf,
    pub zap: PathBuf,
    pub wapiti: PathBuf,
    pub full_scan: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let root = PathBuf::from("reports");
        Self {
            whatweb: root.join("whatweb"),
            search_vulns: root.join("search_vulns"),
            zap: root.join("zap"),
            wapiti: root.join("wapiti"),
            full_scan: root.join("full_scan"),
        }
    }
}

impl PathsConfig {
    pub fn base_dir(&self, tool: ToolKind) -> &Path {
        match tool {
            ToolKind::WhatWeb => &self.whatweb,
            ToolKind::SearchVulns => &self.search_vulns,
            ToolKind::Zap => &self.zap,
            ToolKind::Wapiti => &self.wapiti,
        }
    }

    /// Rebase every directory under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            whatweb: root.join("whatweb"),
            search_vulns: root.join("search_vulns"),
            zap: root.join("zap"),
            wapiti: root.join("wapiti"),
            full_scan: root.join("full_scan"),
        }
    }

    /// Resolve relative directories against `base`; absolute ones are kept.
    /// Docker treats a relative bind source as a named volume.
    pub fn absolute_from(&self, base: &Path) -> Self {
        Self {
            whatweb: base.join(&self.whatweb),
            search_vulns: base.join(&self.search_vulns),
            zap: base.join(&self.zap),
            wapiti: base.join(&self.wapiti),
            full_scan: base.join(&self.full_scan),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("restack.db") }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainersConfig {
    pub whatweb_image: String,
    pub search_vulns_image: String,
    pub zap_image: String,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            whatweb_image: "iamyourdev/whatweb:latest".into(),
            search_vulns_image: "search_vulns:latest".into(),
            zap_image: "zaproxy/zap-stable:latest".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WapitiDefaults {
    pub binary: String,
    pub modules: String,
    pub aggression: String,
    pub max_scan_time_secs: u64,
    pub tasks: u32,
}

impl Default for WapitiDefaults {
    fn default() -> Self {
        Self {
            binary: "wapiti".into(),
            modules: "common".into(),
            aggression: "normal".into(),
            max_scan_time_secs: 180,
            tasks: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ZapDefaults {
    pub preferred_port: u16,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub readiness_attempts: u32,
    pub readiness_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub spider_timeout_secs: u64,
    pub ajax_timeout_secs: u64,
    pub deep_crawl_timeout_secs: u64,
    pub ajax_max_depth: u32,
    pub passive_timeout_secs: u64,
    pub active_timeout_secs: u64,
    pub deep_crawl: bool,
    pub page_load_secs: u64,
}

impl Default for ZapDefaults {
    fn default() -> Self {
        Self {
            preferred_port: 8080,
            port_range_start: 20000,
            port_range_end: 60000,
            readiness_attempts: 10,
            readiness_interval_secs: 20,
            poll_interval_secs: 5,
            spider_timeout_secs: 600,
            ajax_timeout_secs: 600,
            deep_crawl_timeout_secs: 300,
            ajax_max_depth: 5,
            passive_timeout_secs: 600,
            active_timeout_secs: 3600,
            deep_crawl: true,
            page_load_secs: 30,
        }
    }
}

impl ZapDefaults {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanBudgetConfig {
    pub budget_secs: u64,
}

impl Default for ScanBudgetConfig {
    fn default() -> Self {
        Self { budget_secs: 7200 }
    }
}

impl ScanBudgetConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub refresh_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { refresh_secs: 300 }
    }
}
