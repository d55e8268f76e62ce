use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// One dialogue event of a scenario script.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TalkLine {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "WindowDisplayName", default)]
    pub speaker: String,
}

impl TalkLine {
    pub fn new(speaker: &str, body: &str) -> Self {
        Self {
            body: body.to_string(),
            speaker: speaker.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ScenarioDoc {
    #[serde(rename = "TalkData", default)]
    talk_data: Vec<Option<TalkLine>>,
}

/// Dialogue events of a scenario document, in script order. A document
/// without `TalkData` yields an empty script.
pub fn talk_lines(scenario: &Value) -> Vec<TalkLine> {
    ScenarioDoc::deserialize(scenario)
        .map(|d| d.talk_data.into_iter().map(Option::unwrap_or_default).collect())
        .unwrap_or_default()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignMode {
    /// Both scripts available; events paired by position.
    Aligned,
    /// Only the target script; its text is recorded as self-mapping.
    TargetOnly,
}

/// Builds the line map for one episode. With a source script, events are
/// paired by index up to the shorter script and only differing non-empty
/// pairs are kept; without one, the target's own text maps to itself.
///
/// Positional pairing assumes the two scripts differ at most by trailing
/// events; an event inserted mid-script shifts every later pair.
pub fn align_episode(
    source: Option<&[TalkLine]>,
    target: &[TalkLine],
) -> (AlignMode, BTreeMap<String, String>) {
    let mut map = BTreeMap::new();
    match source {
        Some(source) => {
            for (s, t) in source.iter().zip(target) {
                if !s.body.is_empty() && !t.body.is_empty() && s.body != t.body {
                    map.insert(s.body.clone(), t.body.clone());
                }
                if !s.speaker.is_empty() && !t.speaker.is_empty() && s.speaker != t.speaker {
                    map.insert(s.speaker.clone(), t.speaker.clone());
                }
            }
            (AlignMode::Aligned, map)
        }
        None => {
            for t in target {
                for text in [&t.body, &t.speaker] {
                    if !text.trim().is_empty() {
                        map.insert(text.clone(), text.clone());
                    }
                }
            }
            (AlignMode::TargetOnly, map)
        }
    }
}
