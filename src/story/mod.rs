//! Event story lines: per-episode line maps built by aligning the source and
//! target servers' scenario scripts, persisted one file per event.

mod aligner;
mod file;

pub use aligner::{align_episode, talk_lines, AlignMode, TalkLine};
pub use file::{
    gate, EpisodeTranslation, EventStoryFile, Gate, ProcessReason, StoryMeta, StorySource,
    STORY_DIR,
};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::masterdata::{index_by, records_of};
use crate::progress::ConsoleProgress;
use crate::remote::{RemoteSource, Server};
use crate::textutil::{str_field, value_text};

pub const EVENT_STORIES_FILE: &str = "eventStories.json";
pub const EVENTS_FILE: &str = "events.json";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoryStats {
    /// Events written (or, in simulation, that would have been).
    pub events_processed: usize,
    /// Events the target server does not carry.
    pub events_skipped: usize,
    /// Events whose existing file already holds official lines.
    pub events_unchanged: usize,
    pub episodes_processed: usize,
    pub events_failed: usize,
}

impl fmt::Display for StoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events processed, {} episodes, {} skipped, {} unchanged",
            self.events_processed, self.episodes_processed, self.events_skipped, self.events_unchanged
        )?;
        if self.events_failed > 0 {
            write!(f, ", {} failed", self.events_failed)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StoryOptions<'a> {
    pub output_dir: &'a Path,
    pub force: bool,
    pub dry_run: bool,
}

pub fn scenario_path(bundle: &str, scenario_id: &str) -> String {
    format!("event_story/{bundle}/scenario/{scenario_id}")
}

/// Walks the source server's event story list and rebuilds every event the
/// target server also carries, subject to [`gate`]. Missing story lists end
/// the pass early; a failed write only loses that one event.
pub fn extract_event_stories(
    remote: &dyn RemoteSource,
    opts: StoryOptions<'_>,
    progress: &ConsoleProgress,
) -> StoryStats {
    let mut stats = StoryStats::default();
    let source_stories = remote.fetch_masterdata(EVENT_STORIES_FILE, Server::Source);
    let target_stories = remote.fetch_masterdata(EVENT_STORIES_FILE, Server::Target);
    let (Some(source_stories), Some(target_stories)) = (source_stories, target_stories) else {
        error!("could not fetch {EVENT_STORIES_FILE} from both servers; skipping event stories");
        return stats;
    };

    let catalogue: HashSet<String> = remote
        .fetch_masterdata(EVENTS_FILE, Server::Target)
        .map(|doc| {
            records_of(&doc, None)
                .iter()
                .filter_map(|e| value_text(e.get("id")?))
                .collect()
        })
        .unwrap_or_default();
    if catalogue.is_empty() {
        warn!("target event catalogue is empty; every event will be skipped");
    }
    let target_by_event = index_by(records_of(&target_stories, None), "eventId");

    let stories = records_of(&source_stories, None);
    for (i, story) in stories.iter().enumerate() {
        let Some(event_id) = story.get("eventId").and_then(value_text) else {
            stats.events_skipped += 1;
            continue;
        };
        let target_story = match target_by_event.get(&event_id) {
            Some(t) if catalogue.contains(&event_id) => *t,
            _ => {
                stats.events_skipped += 1;
                continue;
            }
        };

        let bundle = str_field(story, "assetbundleName");
        progress.progress(&format!("event {event_id} {bundle}"), i + 1, stories.len());

        let path = EventStoryFile::path(opts.output_dir, &event_id);
        match gate(&path, opts.force) {
            Gate::Skip => {
                debug!("event {event_id}: already official");
                stats.events_unchanged += 1;
                continue;
            }
            Gate::Process(ProcessReason::ReplacesGenerated) => {
                info!("event {event_id}: replacing generated lines with official data");
            }
            Gate::Process(reason) => debug!("event {event_id}: {reason:?}"),
        }

        let episodes = build_episodes(remote, story, target_story);
        if episodes.is_empty() {
            debug!("event {event_id}: no episode lines");
            continue;
        }
        let episode_count = episodes.len();
        let file = EventStoryFile::official(episodes);
        if opts.dry_run {
            info!("[dry run] would write {}", path.display());
        } else if let Err(err) = file.save(&path) {
            error!("event {event_id}: {err:#}");
            stats.events_failed += 1;
            continue;
        } else {
            info!("saved {}", path.display());
        }
        stats.events_processed += 1;
        stats.episodes_processed += episode_count;
    }
    stats
}

fn build_episodes(
    remote: &dyn RemoteSource,
    story: &Value,
    target_story: &Value,
) -> BTreeMap<String, EpisodeTranslation> {
    let bundle = str_field(story, "assetbundleName");
    let target_episodes = index_by(records_of(target_story, Some("eventStoryEpisodes")), "episodeNo");

    let mut out = BTreeMap::new();
    for episode in records_of(story, Some("eventStoryEpisodes")) {
        let Some(episode_no) = episode.get("episodeNo").and_then(value_text) else {
            continue;
        };
        let scenario_id = str_field(episode, "scenarioId");
        if scenario_id.is_empty() {
            continue;
        }
        let path = scenario_path(bundle, scenario_id);

        let Some(target_doc) = remote.fetch_scenario(Server::Target, &path) else {
            debug!("episode {episode_no}: target scenario not found");
            continue;
        };
        let source_lines = remote
            .fetch_scenario(Server::Source, &path)
            .map(|doc| talk_lines(&doc));
        let (mode, talk_data) = align_episode(source_lines.as_deref(), &talk_lines(&target_doc));
        if talk_data.is_empty() {
            continue;
        }

        let title = target_episodes
            .get(&episode_no)
            .map(|e| str_field(e, "title"))
            .unwrap_or("");
        info!("episode {episode_no}: {} lines ({mode:?})", talk_data.len());
        out.insert(
            episode_no,
            EpisodeTranslation {
                scenario_id: scenario_id.to_string(),
                title: title.to_string(),
                talk_data,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::FakeRemote;
    use serde_json::json;

    fn story(event_id: u64, bundle: &str, episodes: Value) -> Value {
        json!({"eventId": event_id, "assetbundleName": bundle, "eventStoryEpisodes": episodes})
    }

    fn fixture() -> FakeRemote {
        FakeRemote::default()
            .with_masterdata(
                Server::Source,
                EVENT_STORIES_FILE,
                json!([
                    story(1, "event_stella", json!([
                        {"episodeNo": 1, "scenarioId": "event_01_01", "title": "始まり"},
                        {"episodeNo": 2, "scenarioId": "event_01_02", "title": "続き"},
                        {"episodeNo": 3, "scenarioId": "event_01_03", "title": "終わり"},
                    ])),
                    story(2, "event_jp_only", json!([{"episodeNo": 1, "scenarioId": "x"}])),
                ]),
            )
            .with_masterdata(
                Server::Target,
                EVENT_STORIES_FILE,
                json!([story(1, "event_stella", json!([
                    {"episodeNo": 1, "scenarioId": "event_01_01", "title": "开始"},
                ]))]),
            )
            .with_masterdata(Server::Target, EVENTS_FILE, json!([{"id": 1}]))
            .with_scenario(
                Server::Target,
                "event_story/event_stella/scenario/event_01_01",
                json!({"TalkData": [
                    {"WindowDisplayName": "一歌", "Body": "早上好"},
                    {"WindowDisplayName": "咲希", "Body": "嗯"},
                ]}),
            )
            .with_scenario(
                Server::Source,
                "event_story/event_stella/scenario/event_01_01",
                json!({"TalkData": [
                    {"WindowDisplayName": "一歌", "Body": "おはよう"},
                    {"WindowDisplayName": "咲希", "Body": "うん"},
                    {"WindowDisplayName": "咲希", "Body": "余り"},
                ]}),
            )
            .with_scenario(
                Server::Target,
                "event_story/event_stella/scenario/event_01_02",
                json!({"TalkData": [{"WindowDisplayName": "穗波", "Body": "你好"}]}),
            )
    }

    fn run(remote: &FakeRemote, dir: &Path, force: bool, dry_run: bool) -> StoryStats {
        let opts = StoryOptions {
            output_dir: dir,
            force,
            dry_run,
        };
        extract_event_stories(remote, opts, &ConsoleProgress::new(false))
    }

    fn read(dir: &Path, event_id: &str) -> Value {
        let text = std::fs::read_to_string(EventStoryFile::path(dir, event_id)).expect("read");
        serde_json::from_str(&text).expect("json")
    }

    #[test]
    fn aligns_episodes_and_skips_events_missing_on_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = fixture();
        let stats = run(&remote, dir.path(), false, false);

        assert_eq!(stats.events_processed, 1);
        assert_eq!(stats.events_skipped, 1);
        assert_eq!(stats.episodes_processed, 2);

        let doc = read(dir.path(), "1");
        assert_eq!(doc["meta"]["source"], "official_cn");
        let ep1 = &doc["episodes"]["1"];
        assert_eq!(ep1["title"], "开始");
        assert_eq!(ep1["scenarioId"], "event_01_01");
        assert_eq!(
            ep1["talkData"],
            json!({"おはよう": "早上好", "うん": "嗯"})
        );
        // No source script: identity entries, and no target title.
        let ep2 = &doc["episodes"]["2"];
        assert_eq!(ep2["title"], "");
        assert_eq!(ep2["talkData"], json!({"穗波": "穗波", "你好": "你好"}));
        // Episode 3 has no target script at all.
        assert!(doc["episodes"].get("3").is_none());
        assert!(!EventStoryFile::path(dir.path(), "2").exists());
    }

    #[test]
    fn target_script_is_fetched_before_source_and_absence_skips_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = fixture();
        run(&remote, dir.path(), false, true);
        let requests = remote.scenario_requests.borrow();
        let ep3 = "event_story/event_stella/scenario/event_01_03".to_string();
        assert_eq!(requests[0].0, Server::Target);
        assert_eq!(requests[1].0, Server::Source);
        assert!(requests.contains(&(Server::Target, ep3.clone())));
        assert!(!requests.contains(&(Server::Source, ep3)));
    }

    #[test]
    fn official_files_are_left_alone_until_forced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = fixture();
        run(&remote, dir.path(), false, false);
        let fetched = remote.scenario_requests.borrow().len();

        let stats = run(&remote, dir.path(), false, false);
        assert_eq!(stats.events_unchanged, 1);
        assert_eq!(stats.events_processed, 0);
        assert_eq!(remote.scenario_requests.borrow().len(), fetched);

        let stats = run(&remote, dir.path(), true, false);
        assert_eq!(stats.events_processed, 1);
    }

    #[test]
    fn generated_file_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = EventStoryFile::path(dir.path(), "1");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, r#"{"meta":{"source":"llm"},"episodes":{}}"#).expect("write");

        let stats = run(&fixture(), dir.path(), false, false);
        assert_eq!(stats.events_processed, 1);
        assert_eq!(read(dir.path(), "1")["meta"]["source"], "official_cn");
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stats = run(&fixture(), dir.path(), false, true);
        assert_eq!(stats.events_processed, 1);
        assert!(!EventStoryFile::path(dir.path(), "1").exists());
    }

    #[test]
    fn episodes_with_no_differing_lines_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let same = json!({"TalkData": [{"WindowDisplayName": "MEIKO", "Body": "……"}]});
        let stories = json!([
            story(5, "event_mix", json!([
                {"episodeNo": 1, "scenarioId": "event_05_01"},
                {"episodeNo": 2, "scenarioId": "event_05_02"},
            ])),
            story(6, "event_same", json!([{"episodeNo": 1, "scenarioId": "event_06_01"}])),
        ]);
        let remote = FakeRemote::default()
            .with_masterdata(Server::Source, EVENT_STORIES_FILE, stories.clone())
            .with_masterdata(Server::Target, EVENT_STORIES_FILE, stories)
            .with_masterdata(Server::Target, EVENTS_FILE, json!([{"id": 5}, {"id": 6}]))
            .with_scenario(Server::Source, "event_story/event_mix/scenario/event_05_01", same.clone())
            .with_scenario(Server::Target, "event_story/event_mix/scenario/event_05_01", same.clone())
            .with_scenario(
                Server::Source,
                "event_story/event_mix/scenario/event_05_02",
                json!({"TalkData": [{"WindowDisplayName": "MEIKO", "Body": "ただいま"}]}),
            )
            .with_scenario(
                Server::Target,
                "event_story/event_mix/scenario/event_05_02",
                json!({"TalkData": [{"WindowDisplayName": "MEIKO", "Body": "我回来了"}]}),
            )
            .with_scenario(Server::Source, "event_story/event_same/scenario/event_06_01", same.clone())
            .with_scenario(Server::Target, "event_story/event_same/scenario/event_06_01", same);

        let stats = run(&remote, dir.path(), false, false);
        assert_eq!(
            stats,
            StoryStats {
                events_processed: 1,
                episodes_processed: 1,
                ..StoryStats::default()
            }
        );

        let doc = read(dir.path(), "5");
        assert!(doc["episodes"].get("1").is_none());
        assert_eq!(doc["episodes"]["2"]["talkData"], json!({"ただいま": "我回来了"}));
        assert!(!EventStoryFile::path(dir.path(), "6").exists());
    }

    #[test]
    fn missing_story_list_ends_the_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = FakeRemote::default().with_masterdata(
            Server::Source,
            EVENT_STORIES_FILE,
            json!([story(1, "b", json!([]))]),
        );
        assert_eq!(run(&remote, dir.path(), false, false), StoryStats::default());
    }
}
