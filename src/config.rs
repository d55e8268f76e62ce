use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "sekai-translate.toml";
pub const CONFIG_ENV: &str = "SEKAI_TRANSLATE_CONFIG";

pub const DEFAULT_SOURCE_MASTERDATA: &str = "https://sekaimaster.exmeaning.com/master";
pub const DEFAULT_TARGET_MASTERDATA: &str = "https://sekaimaster-cn.exmeaning.com/master";
pub const DEFAULT_SOURCE_ASSETS: &str = "https://assets.unipjsk.com/ondemand";
pub const DEFAULT_TARGET_ASSETS: &str =
    "https://sekai-assets-bdf29c81.seiunx.net/cn-assets/ondemand";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub servers: ServersSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub backends: HashMap<String, BackendSection>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// Directory receiving `<category>.json`, `<category>.full.json` and `eventStory/`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub rate_limit_delay_ms: Option<u64>,
    /// Default fallback backend name (see `[backends.*]`).
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub log_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServersSection {
    #[serde(default)]
    pub source_masterdata: Option<String>,
    #[serde(default)]
    pub target_masterdata: Option<String>,
    #[serde(default)]
    pub source_assets: Option<String>,
    #[serde(default)]
    pub target_assets: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub scenario_retries: Option<usize>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub game_context: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    OpenaiChat,
    Gemini,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BackendSection {
    #[serde(default)]
    pub kind: Option<BackendKind>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub env_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct ResolvedBackend {
    pub name: String,
    pub kind: BackendKind,
    pub url: String,
    pub model: String,
    pub env_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl ResolvedBackend {
    /// Reads the backend credential from its environment variable.
    pub fn api_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.env_key)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "{} environment variable not set (required by backend {})",
                    self.env_key,
                    self.name
                )
            })
    }
}

fn builtin_backend(name: &str) -> Option<ResolvedBackend> {
    match name {
        "qwen" => Some(ResolvedBackend {
            name: name.to_string(),
            kind: BackendKind::OpenaiChat,
            url: "https://api.siliconflow.cn/v1/chat/completions".to_string(),
            model: "Qwen/Qwen3-8B".to_string(),
            env_key: "SILICONFLOW_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: 60,
        }),
        "gemini" => Some(ResolvedBackend {
            name: name.to_string(),
            kind: BackendKind::Gemini,
            url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
                .to_string(),
            model: "gemini-3-flash-preview".to_string(),
            env_key: "GEMINI_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: 60,
        }),
        _ => None,
    }
}

/// Resolves a backend by name: file entries override the built-in defaults
/// key by key, and may define new backends as long as they are complete.
pub fn resolve_backend(cfg: &AppConfig, name: &str) -> anyhow::Result<ResolvedBackend> {
    let builtin = builtin_backend(name);
    let Some(section) = cfg.backends.get(name) else {
        return builtin.ok_or_else(|| anyhow!("backend not configured: {name}"));
    };

    let missing = |key: &str| anyhow!("backend {name}: missing `{key}` (no built-in default)");
    let kind = match (section.kind, builtin.as_ref()) {
        (Some(k), _) => k,
        (None, Some(b)) => b.kind,
        (None, None) => return Err(missing("kind")),
    };
    let pick = |value: &Option<String>, fallback: Option<&String>, key: &str| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| fallback.cloned())
            .ok_or_else(|| missing(key))
    };

    Ok(ResolvedBackend {
        name: name.to_string(),
        kind,
        url: pick(&section.url, builtin.as_ref().map(|b| &b.url), "url")?,
        model: pick(&section.model, builtin.as_ref().map(|b| &b.model), "model")?,
        env_key: pick(&section.env_key, builtin.as_ref().map(|b| &b.env_key), "env_key")?,
        temperature: section
            .temperature
            .or(builtin.as_ref().map(|b| b.temperature))
            .unwrap_or(0.3),
        max_tokens: section
            .max_tokens
            .or(builtin.as_ref().map(|b| b.max_tokens))
            .unwrap_or(4096),
        timeout_secs: section
            .timeout_secs
            .or(builtin.as_ref().map(|b| b.timeout_secs))
            .unwrap_or(60),
    })
}

pub fn find_file_upwards(start: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = Some(start);
    for _ in 0..=max_levels {
        let d = dir?;
        let cand = d.join(filename);
        if cand.is_file() {
            return Some(cand);
        }
        dir = d.parent();
    }
    None
}

pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 8) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
