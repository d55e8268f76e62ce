use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

use super::prompts::PromptSet;
use super::trace::{Exchange, TraceWriter};
use crate::models::ChatBackend;
use crate::table::FallbackFill;
use crate::textutil::{reply_lines, truncate_chars};

pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const SIMULATED_PREFIX: &str = "[LLM翻译] ";

/// Batches untranslated texts through a chat backend. Without a backend
/// (simulation) every text maps to a deterministic placeholder instead.
pub struct FallbackTranslator {
    backend: Option<Box<dyn ChatBackend>>,
    prompts: PromptSet,
    batch_size: usize,
    delay: Duration,
    trace: TraceWriter,
    log_max_chars: usize,
    scope: String,
    batches_sent: usize,
}

impl FallbackTranslator {
    pub fn new(
        backend: Option<Box<dyn ChatBackend>>,
        prompts: PromptSet,
        batch_size: usize,
        delay: Duration,
    ) -> Self {
        Self {
            backend,
            prompts,
            batch_size: batch_size.max(1),
            delay,
            trace: TraceWriter::disabled(),
            log_max_chars: 50,
            scope: String::new(),
            batches_sent: 0,
        }
    }

    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_log_max_chars(mut self, n: usize) -> Self {
        self.log_max_chars = n.max(1);
        self
    }

    pub fn is_simulated(&self) -> bool {
        self.backend.is_none()
    }

    /// Label used in trace file names, usually the category being merged.
    pub fn set_scope(&mut self, scope: &str) {
        self.scope = scope.to_string();
    }

    pub fn batches_sent(&self) -> usize {
        self.batches_sent
    }

    /// Translates one batch. The reply is read as one line per input, in
    /// order; inputs past the end of a short reply get nothing this run.
    fn translate_batch(&mut self, label: &str, texts: &[String]) -> BTreeMap<String, String> {
        if texts.is_empty() {
            return BTreeMap::new();
        }
        let Some(backend) = self.backend.as_ref() else {
            return texts
                .iter()
                .map(|t| (t.clone(), format!("{SIMULATED_PREFIX}{t}")))
                .collect();
        };

        self.batches_sent += 1;
        let batch_no = self.batches_sent;
        let prompt = self.prompts.batch_prompt(texts);
        if let Err(err) = self.trace.record(label, batch_no, Exchange::Prompt, &prompt) {
            warn!("trace: {err:#}");
        }

        let reply = match backend.complete(&prompt) {
            Ok(r) => r,
            Err(err) => {
                warn!("{} request failed: {err:#}", backend.name());
                return BTreeMap::new();
            }
        };
        if let Err(err) = self.trace.record(label, batch_no, Exchange::Reply, &reply) {
            warn!("trace: {err:#}");
        }

        let lines = reply_lines(&reply);
        let mut out = BTreeMap::new();
        for (i, original) in texts.iter().enumerate() {
            match lines.get(i) {
                Some(translated) => {
                    out.insert(original.clone(), translated.clone());
                }
                None => warn!(
                    "missing translation for: {}",
                    truncate_chars(original, self.log_max_chars)
                ),
            }
        }
        out
    }
}

impl FallbackFill for FallbackTranslator {
    fn fill(&mut self, field: &str, texts: &[String]) -> BTreeMap<String, String> {
        let total = texts.len().div_ceil(self.batch_size);
        let label = if self.scope.is_empty() {
            field.to_string()
        } else {
            format!("{}.{field}", self.scope)
        };
        info!("{field}: {} texts need generated translation", texts.len());

        let mut out = BTreeMap::new();
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            info!("{field}: batch {}/{total} ({} texts)", i + 1, batch.len());
            out.extend(self.translate_batch(&label, batch));
            if !self.is_simulated() && i + 1 < total && !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
        }
        out
    }
}
