use std::path::PathBuf;

use anyhow::Context;

/// Which half of a backend exchange a trace file holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exchange {
    Prompt,
    Reply,
}

impl Exchange {
    fn suffix(self) -> &'static str {
        match self {
            Exchange::Prompt => "prompt",
            Exchange::Reply => "reply",
        }
    }
}

/// Dumps fallback prompts and replies as `{label}.bNNN.{prompt|reply}.txt`.
/// Without a directory every call is a no-op.
#[derive(Debug, Default)]
pub struct TraceWriter {
    dir: Option<PathBuf>,
}

impl TraceWriter {
    pub fn new(dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create trace dir: {}", dir.display()))?;
        Ok(Self { dir: Some(dir) })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        label: &str,
        batch_no: usize,
        exchange: Exchange,
        text: &str,
    ) -> anyhow::Result<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        let name = format!("{label}.b{batch_no:03}.{}.txt", exchange.suffix());
        let path = dir.join(safe_file_name(&name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))
    }
}

/// Category and field names are plain identifiers; anything path-like is
/// flattened so a label can never escape the trace directory.
fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}
