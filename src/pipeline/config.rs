use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::config::{
    find_default_config, load_config, resolve_backend, AppConfig, ResolvedBackend,
    CONFIG_ENV, CONFIG_FILENAME,
};
use crate::pipeline::fallback::DEFAULT_BATCH_SIZE;
use crate::pipeline::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};
use crate::remote::RemoteConfig;

pub const DEFAULT_OUTPUT_DIR: &str = "web/public/data/translations";
pub const DEFAULT_BACKEND: &str = "qwen";

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct PipelineArgs {
    pub config: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub backend: Option<String>,
    pub dry_run: bool,
    pub cn_only: bool,
    pub force: bool,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,

    /// Simulation: fallback uses placeholders and nothing is written.
    pub dry_run: bool,
    /// Authoritative pairs only; untranslated texts are reported, not filled.
    pub cn_only: bool,
    pub force: bool,

    pub backend: ResolvedBackend,
    /// Present exactly when a real backend will be called.
    pub api_key: Option<String>,

    pub batch_size: usize,
    pub rate_limit_delay: Duration,
    pub trace_dir: Option<PathBuf>,
    pub log_max_chars: usize,

    pub prompts: PromptSet,
    pub remote: RemoteConfig,
}

impl PipelineConfig {
    pub fn from_args(args: PipelineArgs) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cfg_file = args
            .config
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            } else if args.config.is_some() {
                anyhow::bail!("config file not found: {}", p.display());
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| cwd.join(CONFIG_FILENAME));
        Self::resolve(args, cfg_path, &file_cfg)
    }

    /// Builds the run configuration from an already-parsed file. Fails when a
    /// real backend is needed and its credential is not set.
    pub fn resolve(
        args: PipelineArgs,
        cfg_path: PathBuf,
        file_cfg: &AppConfig,
    ) -> anyhow::Result<Self> {
        let cfg_dir = cfg_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let p = &file_cfg.pipeline;

        let output_dir = match args.output_dir {
            Some(dir) => dir,
            None => match p.output_dir.clone() {
                Some(dir) if dir.is_relative() => cfg_dir.join(dir),
                Some(dir) => dir,
                None => PathBuf::from(DEFAULT_OUTPUT_DIR),
            },
        };

        let backend_name = args
            .backend
            .or_else(|| p.backend.clone())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        let backend = resolve_backend(file_cfg, &backend_name)?;
        let api_key = if args.dry_run || args.cn_only {
            None
        } else {
            Some(backend.api_key()?)
        };

        let trace_dir = p
            .trace_dir
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .map(|d| if d.is_relative() { output_dir.join(d) } else { d });

        let prompts = PromptSet::load(&cfg_path, file_cfg).context("load prompts")?;

        Ok(Self {
            output_dir,
            dry_run: args.dry_run,
            cn_only: args.cn_only,
            force: args.force,
            backend,
            api_key,
            batch_size: p.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
            rate_limit_delay: Duration::from_millis(p.rate_limit_delay_ms.unwrap_or(1000)),
            trace_dir,
            log_max_chars: p.log_max_chars.unwrap_or(50).max(1),
            prompts,
            remote: RemoteConfig::from_app_config(file_cfg),
        })
    }
}

/// Writes a commented default config and the prompt templates into `dir`.
/// Existing files are kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;
    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[pipeline]
output_dir = "web/public/data/translations"
backend = "qwen"
batch_size = 20
rate_limit_delay_ms = 1000
log_max_chars = 50
# Dump every backend prompt/reply (relative to output_dir).
# trace_dir = "_trace"

[servers]
source_masterdata = "https://sekaimaster.exmeaning.com/master"
target_masterdata = "https://sekaimaster-cn.exmeaning.com/master"
source_assets = "https://assets.unipjsk.com/ondemand"
target_assets = "https://sekai-assets-bdf29c81.seiunx.net/cn-assets/ondemand"
timeout_secs = 30
scenario_retries = 3
retry_delay_ms = 1000

[prompts]
game_context = "prompts/game_context.txt"

# Built-in backends; entries here override them key by key.
[backends.qwen]
kind = "openai_chat"
url = "https://api.siliconflow.cn/v1/chat/completions"
model = "Qwen/Qwen3-8B"
env_key = "SILICONFLOW_API_KEY"
temperature = 0.3
max_tokens = 4096

# [backends.gemini]
# kind = "gemini"
# env_key = "GEMINI_API_KEY"
# model = "gemini-3-flash-preview"
"#;
