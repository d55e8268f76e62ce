//! Remote masterdata and scenario documents.
//!
//! Failures never propagate: a document that cannot be fetched or parsed is
//! logged and reported as absent, and callers degrade accordingly.

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{
    AppConfig, DEFAULT_SOURCE_ASSETS, DEFAULT_SOURCE_MASTERDATA, DEFAULT_TARGET_ASSETS,
    DEFAULT_TARGET_MASTERDATA,
};

const USER_AGENT: &str = concat!("sekai-translate/", env!("CARGO_PKG_VERSION"));

/// Source = the original-language game server, Target = the server that
/// publishes the same records in the translated language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Server {
    Source,
    Target,
}

impl Server {
    pub fn tag(self) -> &'static str {
        match self {
            Server::Source => "JP",
            Server::Target => "CN",
        }
    }
}

pub trait RemoteSource {
    fn fetch_masterdata(&self, file: &str, server: Server) -> Option<Value>;
    /// `path` has no extension, e.g. `event_story/<bundle>/scenario/<id>`.
    fn fetch_scenario(&self, server: Server, path: &str) -> Option<Value>;
}

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub source_masterdata: String,
    pub target_masterdata: String,
    pub source_assets: String,
    pub target_assets: String,
    pub timeout: Duration,
    pub scenario_retries: usize,
    pub retry_delay: Duration,
}

impl RemoteConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        let s = &cfg.servers;
        let url = |v: &Option<String>, default: &str| {
            v.as_deref()
                .map(|u| u.trim().trim_end_matches('/'))
                .filter(|u| !u.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            source_masterdata: url(&s.source_masterdata, DEFAULT_SOURCE_MASTERDATA),
            target_masterdata: url(&s.target_masterdata, DEFAULT_TARGET_MASTERDATA),
            source_assets: url(&s.source_assets, DEFAULT_SOURCE_ASSETS),
            target_assets: url(&s.target_assets, DEFAULT_TARGET_ASSETS),
            timeout: Duration::from_secs(s.timeout_secs.unwrap_or(30).max(1)),
            scenario_retries: s.scenario_retries.unwrap_or(3).max(1),
            retry_delay: Duration::from_millis(s.retry_delay_ms.unwrap_or(1000)),
        }
    }

    pub fn masterdata_url(&self, server: Server, file: &str) -> String {
        let base = match server {
            Server::Source => &self.source_masterdata,
            Server::Target => &self.target_masterdata,
        };
        format!("{base}/{file}")
    }

    pub fn scenario_url(&self, server: Server, path: &str) -> String {
        let base = match server {
            Server::Source => &self.source_assets,
            Server::Target => &self.target_assets,
        };
        format!("{base}/{path}.json")
    }
}

enum FetchError {
    /// Transport or HTTP status failure; worth another attempt.
    Transient(anyhow::Error),
    Decode(anyhow::Error),
}

pub struct HttpRemote {
    cfg: RemoteConfig,
    client: reqwest::blocking::Client,
}

impl HttpRemote {
    pub fn new(cfg: RemoteConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(cfg.timeout)
            .gzip(true)
            .build()
            .context("build http client")?;
        Ok(Self { cfg, client })
    }

    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {url}"))
            .map_err(FetchError::Transient)?;
        let body = resp
            .bytes()
            .with_context(|| format!("read body {url}"))
            .map_err(FetchError::Transient)?;
        serde_json::from_slice(&body)
            .with_context(|| format!("parse json {url}"))
            .map_err(FetchError::Decode)
    }
}

impl RemoteSource for HttpRemote {
    fn fetch_masterdata(&self, file: &str, server: Server) -> Option<Value> {
        let url = self.cfg.masterdata_url(server, file);
        debug!("fetch [{}] {file}", server.tag());
        match self.get_json(&url) {
            Ok(v) => Some(v),
            Err(FetchError::Transient(err) | FetchError::Decode(err)) => {
                warn!("failed to fetch {file} from {}: {err:#}", server.tag());
                None
            }
        }
    }

    fn fetch_scenario(&self, server: Server, path: &str) -> Option<Value> {
        let url = self.cfg.scenario_url(server, path);
        let attempts = self.cfg.scenario_retries;
        for attempt in 1..=attempts {
            match self.get_json(&url) {
                Ok(v) => return Some(v),
                Err(FetchError::Decode(err)) => {
                    debug!("{err:#}");
                    return None;
                }
                Err(FetchError::Transient(err)) if attempt == attempts => {
                    warn!("failed to fetch {url} after {attempts} attempts: {err:#}");
                    return None;
                }
                Err(FetchError::Transient(err)) => {
                    debug!("attempt {attempt}/{attempts} failed: {err:#}");
                    std::thread::sleep(self.cfg.retry_delay);
                }
            }
        }
        None
    }
}

/// In-memory documents keyed by server and file name or scenario path.
#[cfg(test)]
#[derive(Default)]
pub struct FakeRemote {
    pub masterdata: std::collections::HashMap<(Server, String), Value>,
    pub scenarios: std::collections::HashMap<(Server, String), Value>,
    pub scenario_requests: std::cell::RefCell<Vec<(Server, String)>>,
}

#[cfg(test)]
impl FakeRemote {
    pub fn with_masterdata(mut self, server: Server, file: &str, doc: Value) -> Self {
        self.masterdata.insert((server, file.to_string()), doc);
        self
    }

    pub fn with_scenario(mut self, server: Server, path: &str, doc: Value) -> Self {
        self.scenarios.insert((server, path.to_string()), doc);
        self
    }
}

#[cfg(test)]
impl RemoteSource for FakeRemote {
    fn fetch_masterdata(&self, file: &str, server: Server) -> Option<Value> {
        self.masterdata.get(&(server, file.to_string())).cloned()
    }

    fn fetch_scenario(&self, server: Server, path: &str) -> Option<Value> {
        self.scenario_requests
            .borrow_mut()
            .push((server, path.to_string()));
        self.scenarios.get(&(server, path.to_string())).cloned()
    }
}
