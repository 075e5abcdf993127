use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "paths": {
                "type": "object",
                "properties": {
                    "whatweb": { "type": "string" },
                    "search_vulns": { "type": "string" },
                    "zap": { "type": "string" },
                    "wapiti": { "type": "string" },
                    "full_scan": { "type": "string" }
                }
            },
            "database": {
                "type": "object",
                "properties": { "path": { "type": "string" } }
            },
            "containers": {
                "type": "object",
                "properties": {
                    "whatweb_image": { "type": "string" },
                    "search_vulns_image": { "type": "string" },
                    "zap_image": { "type": "string" }
                }
            },
            "wapiti": {
                "type": "object",
                "properties": {
                    "binary": { "type": "string" },
                    "modules": { "type": "string" },
                    "aggression": { "type": "string", "enum": ["paranoid", "sneaky", "polite", "normal", "aggressive", "insane"] },
                    "max_scan_time_secs": { "type": "integer", "minimum": 1 },
                    "tasks": { "type": "integer", "minimum": 1 }
                }
            },
            "zap": {
                "type": "object",
                "properties": {
                    "preferred_port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "port_range_start": { "type": "integer", "minimum": 1024, "maximum": 65535 },
                    "port_range_end": { "type": "integer", "minimum": 1024, "maximum": 65535 },
                    "readiness_attempts": { "type": "integer", "minimum": 1 },
                    "readiness_interval_secs": { "type": "integer", "minimum": 0 },
                    "poll_interval_secs": { "type": "integer", "minimum": 0 },
                    "spider_timeout_secs": { "type": "integer", "minimum": 1 },
                    "ajax_timeout_secs": { "type": "integer", "minimum": 1 },
                    "deep_crawl_timeout_secs": { "type": "integer", "minimum": 1 },
                    "ajax_max_depth": { "type": "integer", "minimum": 1 },
                    "passive_timeout_secs": { "type": "integer", "minimum": 1 },
                    "active_timeout_secs": { "type": "integer", "minimum": 1 },
                    "deep_crawl": { "type": "boolean" },
                    "page_load_secs": { "type": "integer", "minimum": 1 }
                }
            },
            "scan": {
                "type": "object",
                "properties": { "budget_secs": { "type": "integer", "minimum": 1 } }
            },
            "scheduler": {
                "type": "object",
                "properties": { "refresh_secs": { "type": "integer", "minimum": 1 } }
            }
        }
    })
});
