#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use restack::adapters::{ZapApi, ZapConnector};
use restack::config::{PathsConfig, RestackConfig};
use restack::container::{ContainerHandle, ContainerRuntime, ContainerSpec};
use restack::db::Database;
use restack::errors::RestackError;
use restack::pipeline::ScanOrchestrator;

/// In-memory container engine. Writes the canned artifact for an image into
/// the first mounted volume when the command names a `.json` output file.
#[derive(Default)]
pub struct FakeRuntime {
    pub outputs: Mutex<HashMap<String, String>>,
    pub exit_codes: Mutex<HashMap<String, i64>>,
    pub fail_start: Mutex<Vec<String>>,
    pub panic_on_start: Mutex<Vec<String>>,
    pub started: Mutex<Vec<ContainerSpec>>,
    pub execs: Mutex<Vec<(String, Vec<String>)>>,
    pub stopped: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_output(&self, image: &str, body: Value) {
        self.outputs.lock().unwrap().insert(image.into(), body.to_string());
    }

    pub fn with_exit_code(&self, image: &str, code: i64) {
        self.exit_codes.lock().unwrap().insert(image.into(), code);
    }

    pub fn started_images(&self) -> Vec<String> {
        self.started.lock().unwrap().iter().map(|s| s.image.clone()).collect()
    }

    pub fn start_count(&self, name: &str) -> usize {
        self.started.lock().unwrap().iter().filter(|s| s.name == name).count()
    }

    pub fn exec_commands(&self, name: &str) -> Vec<String> {
        self.execs.lock().unwrap().iter().filter(|(n, _)| n == name).map(|(_, cmd)| cmd.join(" ")).collect()
    }

    fn is_live(&self, name: &str) -> bool {
        let started = self.start_count(name);
        started > 0 && self.remove_count(name) < started
    }

    fn spec_named(&self, name: &str) -> Option<ContainerSpec> {
        self.started.lock().unwrap().iter().rev().find(|s| s.name == name).cloned()
    }

    fn write_output(&self, image: &str, cmd: &[String], volumes: &[restack::container::VolumeMount]) {
        let Some(file) = cmd.iter().find_map(|arg| {
            let arg = arg.rsplit('=').next()?;
            arg.ends_with(".json").then(|| arg.rsplit('/').next().unwrap_or(arg).to_string())
        }) else {
            return;
        };
        let (Some(volume), Some(body)) = (volumes.first(), self.outputs.lock().unwrap().get(image).cloned()) else {
            return;
        };
        let path = volume.host.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
    }

    pub fn stop_count(&self, name: &str) -> usize {
        self.stopped.lock().unwrap().iter().filter(|n| n.as_str() == name).count()
    }

    pub fn remove_count(&self, name: &str) -> usize {
        self.removed.lock().unwrap().iter().filter(|n| n.as_str() == name).count()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RestackError> {
        if self.fail_start.lock().unwrap().contains(&spec.image) {
            return Err(RestackError::Container(format!("image {} not found", spec.image)));
        }
        if self.panic_on_start.lock().unwrap().contains(&spec.image) {
            panic!("container engine crashed starting {}", spec.image);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        if self.is_live(&spec.name) {
            return Ok(ContainerHandle { id: format!("fake-{}", n), name: spec.name.clone(), reused: true });
        }
        self.started.lock().unwrap().push(spec.clone());
        self.write_output(&spec.image, &spec.cmd, &spec.volumes);
        Ok(ContainerHandle { id: format!("fake-{}", n), name: spec.name.clone(), reused: false })
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RestackError> {
        let image = self
            .started
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == handle.name)
            .map(|s| s.image.clone())
            .unwrap_or_default();
        Ok(self.exit_codes.lock().unwrap().get(&image).copied().unwrap_or(0))
    }

    async fn exec(&self, handle: &ContainerHandle, cmd: &[String], _working_dir: Option<&str>) -> Result<i64, RestackError> {
        let spec = self
            .spec_named(&handle.name)
            .ok_or_else(|| RestackError::Container(format!("no such container: {}", handle.name)))?;
        self.execs.lock().unwrap().push((handle.name.clone(), cmd.to_vec()));
        self.write_output(&spec.image, cmd, &spec.volumes);
        Ok(self.exit_codes.lock().unwrap().get(&spec.image).copied().unwrap_or(0))
    }

    async fn is_running(&self, _handle: &ContainerHandle) -> Result<bool, RestackError> {
        Ok(true)
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RestackError> {
        self.stopped.lock().unwrap().push(handle.name.clone());
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RestackError> {
        self.removed.lock().unwrap().push(handle.name.clone());
        Ok(())
    }
}

/// Scripted ZAP API. Phases complete on their first poll unless listed in
/// `stuck`, in which case their status never reaches done.
pub struct FakeZap {
    pub ready: bool,
    pub alerts: Vec<Value>,
    pub messages: Vec<Value>,
    pub stuck: Vec<&'static str>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeZap {
    pub fn new(ready: bool) -> Arc<Self> {
        Arc::new(Self::build(ready, Vec::new(), Vec::new(), Vec::new()))
    }

    pub fn with_alerts(alerts: Vec<Value>, messages: Vec<Value>) -> Arc<Self> {
        Arc::new(Self::build(true, alerts, messages, Vec::new()))
    }

    /// Phases named here (`spider`, `ajax`, `passive`, `active`) never finish.
    pub fn stuck_in(phases: &[&'static str], alerts: Vec<Value>) -> Arc<Self> {
        Arc::new(Self::build(true, alerts, Vec::new(), phases.to_vec()))
    }

    fn build(ready: bool, alerts: Vec<Value>, messages: Vec<Value>, stuck: Vec<&'static str>) -> Self {
        Self { ready, alerts, messages, stuck, calls: Mutex::new(Vec::new()) }
    }

    fn is_stuck(&self, phase: &str) -> bool {
        self.stuck.contains(&phase)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }
}

#[async_trait]
impl ZapApi for FakeZap {
    async fn version(&self) -> Result<String, RestackError> {
        self.record("version");
        if self.ready {
            Ok("2.15.0".into())
        } else {
            Err(RestackError::Network("connection refused".into()))
        }
    }

    async fn access_url(&self, _url: &str) -> Result<(), RestackError> {
        self.record("access_url");
        Ok(())
    }

    async fn spider_scan(&self, _url: &str) -> Result<String, RestackError> {
        self.record("spider_scan");
        Ok("1".into())
    }

    async fn spider_status(&self, _scan_id: &str) -> Result<u8, RestackError> {
        self.record("spider_status");
        Ok(if self.is_stuck("spider") { 40 } else { 100 })
    }

    async fn ajax_spider_scan(&self, _url: &str, _max_depth: u32) -> Result<(), RestackError> {
        self.record("ajax_spider_scan");
        Ok(())
    }

    async fn ajax_spider_status(&self) -> Result<String, RestackError> {
        Ok(if self.is_stuck("ajax") { "running" } else { "stopped" }.into())
    }

    async fn client_spider_scan(&self, _url: &str, _page_load_secs: u64) -> Result<String, RestackError> {
        self.record("client_spider_scan");
        Err(RestackError::ToolExecution("client spider add-on not installed".into()))
    }

    async fn client_spider_status(&self, _scan_id: &str) -> Result<u8, RestackError> {
        Ok(100)
    }

    async fn records_to_scan(&self) -> Result<u64, RestackError> {
        self.record("records_to_scan");
        Ok(if self.is_stuck("passive") { 12 } else { 0 })
    }

    async fn active_scan(&self, _url: &str) -> Result<String, RestackError> {
        self.record("active_scan");
        Ok("2".into())
    }

    async fn active_scan_status(&self, _scan_id: &str) -> Result<u8, RestackError> {
        self.record("active_scan_status");
        Ok(if self.is_stuck("active") { 55 } else { 100 })
    }

    async fn alerts(&self, _base_url: &str) -> Result<Vec<Value>, RestackError> {
        self.record("alerts");
        Ok(self.alerts.clone())
    }

    async fn messages_by_id(&self, _ids: &[String]) -> Result<Vec<Value>, RestackError> {
        self.record("messages_by_id");
        Ok(self.messages.clone())
    }
}

pub struct FakeZapConnector(pub Arc<FakeZap>);

impl ZapConnector for FakeZapConnector {
    fn connect(&self, _base_url: &str, _api_key: &str) -> Result<Arc<dyn ZapApi>, RestackError> {
        Ok(self.0.clone())
    }
}

/// Fast-polling config with every artifact under `root`.
pub fn test_config(root: &Path) -> RestackConfig {
    let mut config = RestackConfig::default();
    config.paths = PathsConfig::rooted_at(root);
    config.database.path = root.join("restack.db");
    config.zap.readiness_attempts = 3;
    config.zap.readiness_interval_secs = 0;
    config.zap.poll_interval_secs = 0;
    config.zap.port_range_start = 41000;
    config.zap.port_range_end = 41999;
    config.scan.budget_secs = 30;
    config
}

pub fn orchestrator(
    config: &RestackConfig,
    runtime: Arc<FakeRuntime>,
    zap: Arc<FakeZap>,
    db: &Database,
) -> ScanOrchestrator {
    ScanOrchestrator::new(config, runtime, Arc::new(FakeZapConnector(zap)), Arc::new(db.clone()))
}

/// A stand-in `wapiti` that copies `fixture` to the path given with `-o`.
#[cfg(unix)]
pub fn fake_wapiti(dir: &Path, fixture: &Value) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let fixture_path = dir.join("wapiti-fixture.json");
    std::fs::write(&fixture_path, fixture.to_string()).unwrap();
    let script = dir.join("fake-wapiti");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-o\" ]; then out=\"$2\"; shift; fi\n  shift\ndone\ncat \"{}\" > \"$out\"\n",
            fixture_path.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

pub fn whatweb_output(version: Option<&str>) -> Value {
    let mut plugins = json!({
        "Title": {"string": ["Example"]},
        "HTTPServer": {"string": ["nginx"]},
        "Country": {"string": ["RESERVED"], "module": ["ZZ"]},
    });
    let mut jquery = json!({});
    if let Some(v) = version {
        jquery = json!({"version": [v]});
    }
    plugins["JQuery"] = jquery;
    json!([{ "target": "http://example.test", "http_status": 200, "plugins": plugins }])
}

pub fn wapiti_output() -> Value {
    json!({
        "vulnerabilities": {
            "SQL Injection": [
                {"method": "GET", "path": "/item.php", "info": "SQL Injection via id", "level": 4, "parameter": "id"}
            ],
            "Cross Site Scripting": [
                {"method": "GET", "path": "/search", "info": "Reflected XSS", "level": 2, "parameter": "q"}
            ]
        },
        "anomalies": {},
        "additionals": {},
        "classifications": {
            "SQL Injection": {"desc": "SQL injection", "sol": "Use prepared statements", "ref": {}, "wstg": ["WSTG-INPV-05"]},
            "Cross Site Scripting": {"desc": "XSS", "sol": "Encode output", "ref": {}, "wstg": ["WSTG-INPV-01"]}
        }
    })
}

pub fn zap_alert() -> Value {
    json!({
        "pluginId": "10038",
        "alertRef": "10038-1",
        "alert": "Content Security Policy (CSP) Header Not Set",
        "name": "Content Security Policy (CSP) Header Not Set",
        "risk": "Medium",
        "confidence": "High",
        "url": "http://example.test/",
        "method": "GET",
        "param": "",
        "evidence": "",
        "description": "CSP is missing",
        "solution": "Set the header",
        "reference": "https://developer.mozilla.org/",
        "cweid": "693",
        "wascid": "15",
        "messageId": "7",
        "tags": {"OWASP_2021_A05": "https://owasp.org/Top10/A05_2021-Security_Misconfiguration/"}
    })
}
