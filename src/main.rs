use std::path::PathBuf;

use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::Parser;

use sekai_translate::models::{ChatBackend, HttpChatBackend};
use sekai_translate::pipeline::{
    init_default_config, PipelineArgs, PipelineConfig, Selection, TranslatorPipeline,
};
use sekai_translate::progress::{init_tracing, ConsoleProgress};
use sekai_translate::remote::HttpRemote;

#[derive(Parser, Debug)]
#[command(name = "sekai-translate")]
#[command(about = "Builds JP->CN translation tables for game masterdata and event stories", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Rebuild event stories that already hold official data; with
    /// --init-config, overwrite existing files
    #[arg(long)]
    force: bool,

    /// Translate only one category
    #[arg(long, value_parser = PossibleValuesParser::new(Selection::names()))]
    category: Option<String>,

    /// Simulate: placeholder fallback translations, nothing written
    #[arg(long)]
    dry_run: bool,

    /// Only use official CN server translations, no LLM fallback
    #[arg(long)]
    cn_only: bool,

    /// LLM backend name (built-in: qwen, gemini; more via config)
    #[arg(long, value_name = "BACKEND")]
    llm: Option<String>,

    /// Translation output directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Config file path (default: search for sekai-translate.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let selection = Selection::parse(args.category.as_deref())?;
    let cfg = PipelineConfig::from_args(PipelineArgs {
        config: args.config,
        output_dir: args.output_dir,
        backend: args.llm,
        dry_run: args.dry_run,
        cn_only: args.cn_only,
        force: args.force,
    })
    .context("build config")?;

    progress.info(format!("LLM: {}", cfg.backend.name));
    if cfg.dry_run {
        progress.info("Dry run: nothing will be written");
    }

    let backend: Option<Box<dyn ChatBackend>> = match cfg.api_key.clone() {
        Some(key) => Some(Box::new(
            HttpChatBackend::new(cfg.backend.clone(), key).context("build llm client")?,
        )),
        None => None,
    };
    let remote = HttpRemote::new(cfg.remote.clone())?;

    let mut pipeline = TranslatorPipeline::new(cfg, Box::new(remote), backend, progress);
    let report = pipeline.run(selection);
    println!("{report}");
    Ok(())
}
