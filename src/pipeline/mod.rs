mod config;
mod fallback;
mod prompts;
mod trace;
mod translator;

pub use config::{init_default_config, PipelineArgs, PipelineConfig, DEFAULT_OUTPUT_DIR};
pub use fallback::{FallbackTranslator, DEFAULT_BATCH_SIZE, SIMULATED_PREFIX};
pub use prompts::PromptSet;
pub use trace::TraceWriter;
pub use translator::{
    CategoryReport, Failure, RunReport, Selection, TranslatorPipeline, EVENT_STORY,
};
