use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STORY_DIR: &str = "eventStory";
pub const FILE_VERSION: &str = "1.0";

/// Provenance of a whole event story file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorySource {
    #[serde(rename = "official_cn")]
    Official,
    #[serde(rename = "llm")]
    Generated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryMeta {
    pub source: StorySource,
    pub version: String,
    pub last_updated: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeTranslation {
    #[serde(rename = "scenarioId")]
    pub scenario_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "talkData", default)]
    pub talk_data: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStoryFile {
    pub meta: StoryMeta,
    /// Keyed by episode number in textual form.
    pub episodes: BTreeMap<String, EpisodeTranslation>,
}

impl EventStoryFile {
    /// A file built from the target server's own scripts, stamped now.
    pub fn official(episodes: BTreeMap<String, EpisodeTranslation>) -> Self {
        Self {
            meta: StoryMeta {
                source: StorySource::Official,
                version: FILE_VERSION.to_string(),
                last_updated: chrono::Utc::now().timestamp(),
            },
            episodes,
        }
    }

    pub fn path(output_dir: &Path, event_id: &str) -> PathBuf {
        output_dir
            .join(STORY_DIR)
            .join(format!("event_{event_id}.json"))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let mut text = serde_json::to_string_pretty(self).context("serialize event story")?;
        text.push('\n');
        std::fs::write(path, text).with_context(|| format!("write: {}", path.display()))?;
        Ok(())
    }
}

/// Outcome of checking an existing event story file before fetching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Process(ProcessReason),
    /// Already holds official data.
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessReason {
    NoFile,
    Forced,
    ReplacesGenerated,
    Unreadable,
    UnrecognizedSource,
}

/// Decides whether an event must be rebuilt. Files written before `meta`
/// existed count as official; anything that fails to parse, or carries a
/// source other than official, is rebuilt.
pub fn gate(path: &Path, force: bool) -> Gate {
    let Ok(text) = std::fs::read_to_string(path) else {
        return if path.exists() {
            Gate::Process(ProcessReason::Unreadable)
        } else {
            Gate::Process(ProcessReason::NoFile)
        };
    };
    let Ok(doc) = serde_json::from_str::<Value>(&text) else {
        return Gate::Process(ProcessReason::Unreadable);
    };
    let Some(obj) = doc.as_object() else {
        return Gate::Process(ProcessReason::Unreadable);
    };
    let source = match obj.get("meta") {
        None => None,
        Some(Value::Object(meta)) => meta.get("source"),
        Some(_) => return Gate::Process(ProcessReason::Unreadable),
    };
    match source.map(|s| StorySource::deserialize(s)) {
        Some(Ok(StorySource::Generated)) => Gate::Process(ProcessReason::ReplacesGenerated),
        Some(Err(_)) => Gate::Process(ProcessReason::UnrecognizedSource),
        Some(Ok(StorySource::Official)) | None if force => Gate::Process(ProcessReason::Forced),
        Some(Ok(StorySource::Official)) | None => Gate::Skip,
    }
}
