use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::errors::RestackError;

const API_KEY_HEADER: &str = "X-ZAP-API-Key";

/// The subset of the ZAP JSON API the crawl-then-scan flow needs.
#[async_trait]
pub trait ZapApi: Send + Sync {
    /// Lightweight readiness check.
    async fn version(&self) -> Result<String, RestackError>;
    async fn access_url(&self, url: &str) -> Result<(), RestackError>;

    async fn spider_scan(&self, url: &str) -> Result<String, RestackError>;
    async fn spider_status(&self, scan_id: &str) -> Result<u8, RestackError>;

    async fn ajax_spider_scan(&self, url: &str, max_depth: u32) -> Result<(), RestackError>;
    /// `"running"` while the AJAX spider is busy.
    async fn ajax_spider_status(&self) -> Result<String, RestackError>;

    async fn client_spider_scan(&self, url: &str, page_load_secs: u64) -> Result<String, RestackError>;
    async fn client_spider_status(&self, scan_id: &str) -> Result<u8, RestackError>;

    async fn records_to_scan(&self) -> Result<u64, RestackError>;

    async fn active_scan(&self, url: &str) -> Result<String, RestackError>;
    async fn active_scan_status(&self, scan_id: &str) -> Result<u8, RestackError>;

    async fn alerts(&self, base_url: &str) -> Result<Vec<Value>, RestackError>;
    async fn messages_by_id(&self, ids: &[String]) -> Result<Vec<Value>, RestackError>;
}

/// Builds API clients for a given base URL and key.
pub trait ZapConnector: Send + Sync {
    fn connect(&self, base_url: &str, api_key: &str) -> Result<Arc<dyn ZapApi>, RestackError>;
}

pub struct HttpZapConnector;

impl ZapConnector for HttpZapConnector {
    fn connect(&self, base_url: &str, api_key: &str) -> Result<Arc<dyn ZapApi>, RestackError> {
        Ok(Arc::new(ZapClient::new(base_url, api_key)?))
    }
}

/// reqwest-backed ZAP JSON API client.
pub struct ZapClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ZapClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, RestackError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RestackError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, RestackError> {
        let url = format!("{}/JSON/{}/", self.base_url, path);
        debug!(endpoint = %path, "ZAP API call");
        let resp = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body.get("message").and_then(Value::as_str).unwrap_or("no message");
            return Err(RestackError::ToolExecution(format!("ZAP {} returned {}: {}", path, status, message)));
        }
        Ok(body)
    }
}

fn field<'a>(body: &'a Value, key: &str) -> Result<&'a Value, RestackError> {
    body.get(key)
        .ok_or_else(|| RestackError::ToolExecution(format!("ZAP response missing '{}'", key)))
}

fn string_field(body: &Value, key: &str) -> Result<String, RestackError> {
    Ok(match field(body, key)? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Progress values arrive as strings ("42").
fn percent(body: &Value, key: &str) -> Result<u8, RestackError> {
    let raw = string_field(body, key)?;
    raw.trim()
        .parse::<u8>()
        .map_err(|_| RestackError::ToolExecution(format!("ZAP returned non-numeric {}: {}", key, raw)))
}

#[async_trait]
impl ZapApi for ZapClient {
    async fn version(&self) -> Result<String, RestackError> {
        string_field(&self.get("core/view/version", &[]).await?, "version")
    }

    async fn access_url(&self, url: &str) -> Result<(), RestackError> {
        self.get("core/action/accessUrl", &[("url", url), ("followRedirects", "true")]).await?;
        Ok(())
    }

    async fn spider_scan(&self, url: &str) -> Result<String, RestackError> {
        self.get("spider/action/setOptionParseRobotsTxt", &[("Boolean", "true")]).await?;
        self.get("spider/action/setOptionParseSitemapXml", &[("Boolean", "true")]).await?;
        string_field(&self.get("spider/action/scan", &[("url", url), ("recurse", "true")]).await?, "scan")
    }

    async fn spider_status(&self, scan_id: &str) -> Result<u8, RestackError> {
        percent(&self.get("spider/view/status", &[("scanId", scan_id)]).await?, "status")
    }

    async fn ajax_spider_scan(&self, url: &str, max_depth: u32) -> Result<(), RestackError> {
        let depth = max_depth.to_string();
        self.get("ajaxSpider/action/setOptionMaxCrawlDepth", &[("Integer", depth.as_str())]).await?;
        self.get("ajaxSpider/action/scan", &[("url", url)]).await?;
        Ok(())
    }

    async fn ajax_spider_status(&self) -> Result<String, RestackError> {
        string_field(&self.get("ajaxSpider/view/status", &[]).await?, "status")
    }

    async fn client_spider_scan(&self, url: &str, page_load_secs: u64) -> Result<String, RestackError> {
        let load = page_load_secs.to_string();
        string_field(
            &self.get("clientSpider/action/scan", &[("url", url), ("pageLoadTime", load.as_str())]).await?,
            "scan",
        )
    }

    async fn client_spider_status(&self, scan_id: &str) -> Result<u8, RestackError> {
        percent(&self.get("clientSpider/view/status", &[("scanId", scan_id)]).await?, "status")
    }

    async fn records_to_scan(&self) -> Result<u64, RestackError> {
        let raw = string_field(&self.get("pscan/view/recordsToScan", &[]).await?, "recordsToScan")?;
        raw.trim()
            .parse()
            .map_err(|_| RestackError::ToolExecution(format!("ZAP returned non-numeric recordsToScan: {}", raw)))
    }

    async fn active_scan(&self, url: &str) -> Result<String, RestackError> {
        string_field(&self.get("ascan/action/scan", &[("url", url), ("recurse", "true")]).await?, "scan")
    }

    async fn active_scan_status(&self, scan_id: &str) -> Result<u8, RestackError> {
        percent(&self.get("ascan/view/status", &[("scanId", scan_id)]).await?, "status")
    }

    async fn alerts(&self, base_url: &str) -> Result<Vec<Value>, RestackError> {
        match field(&self.get("core/view/alerts", &[("baseurl", base_url)]).await?, "alerts")? {
            Value::Array(items) => Ok(items.clone()),
            _ => Err(RestackError::ToolExecution("ZAP alerts is not a list".into())),
        }
    }

    async fn messages_by_id(&self, ids: &[String]) -> Result<Vec<Value>, RestackError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        match field(&self.get("core/view/messagesById", &[("ids", joined.as_str())]).await?, "messagesById")? {
            Value::Array(items) => Ok(items.clone()),
            _ => Err(RestackError::ToolExecution("ZAP messagesById is not a list".into())),
        }
    }
}
