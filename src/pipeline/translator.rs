use std::fmt;

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::masterdata::{extract_table, Category, Extraction};
use crate::models::ChatBackend;
use crate::progress::ConsoleProgress;
use crate::remote::{RemoteSource, Server};
use crate::story::{extract_event_stories, StoryOptions, StoryStats};
use crate::table::{FallbackFill, MergeStats, TablePaths, TranslationTable};

use super::fallback::FallbackTranslator;
use super::trace::TraceWriter;
use super::PipelineConfig;

pub const EVENT_STORY: &str = "eventStory";

/// What one run covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Every category in priority order, then event stories.
    All,
    Category(Category),
    EventStory,
}

impl Selection {
    pub fn parse(name: Option<&str>) -> anyhow::Result<Self> {
        match name {
            None => Ok(Selection::All),
            Some(EVENT_STORY) => Ok(Selection::EventStory),
            Some(n) => Category::parse(n)
                .map(Selection::Category)
                .ok_or_else(|| anyhow!("unknown category: {n}")),
        }
    }

    /// Every accepted `--category` value.
    pub fn names() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Category::ALL.iter().map(|c| c.name()).collect();
        names.push(EVENT_STORY);
        names
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryReport {
    pub category: Category,
    pub stats: MergeStats,
    /// Entries in the table after the merge.
    pub entries: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub name: String,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub categories: Vec<CategoryReport>,
    pub story: Option<StoryStats>,
    pub failures: Vec<Failure>,
}

impl RunReport {
    pub fn totals(&self) -> MergeStats {
        let mut total = MergeStats::default();
        for c in &self.categories {
            total += c.stats;
        }
        total
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.categories {
            let s = c.stats;
            writeln!(
                f,
                "{:<12} +{} cn, ~{} cn updated, +{} llm, {} pending ({} entries)",
                c.category.name(),
                s.authoritative_new,
                s.authoritative_updated,
                s.generated_new,
                s.deferred,
                c.entries
            )?;
        }
        if let Some(story) = &self.story {
            writeln!(f, "{EVENT_STORY:<12} {story}")?;
        }
        for failure in &self.failures {
            writeln!(f, "{:<12} FAILED: {}", failure.name, failure.message)?;
        }
        let t = self.totals();
        write!(
            f,
            "total: {} changed ({} cn new, {} cn updated, {} llm), {} pending",
            t.changed(),
            t.authoritative_new,
            t.authoritative_updated,
            t.generated_new,
            t.deferred
        )
    }
}

/// Drives extraction, merge, fallback fill and persistence for each
/// category, then the event story pass.
pub struct TranslatorPipeline {
    cfg: PipelineConfig,
    remote: Box<dyn RemoteSource>,
    fallback: FallbackTranslator,
    progress: ConsoleProgress,
}

impl TranslatorPipeline {
    /// `backend` is `None` in simulation and when only authoritative data is
    /// merged; the fallback then produces placeholders or is never asked.
    pub fn new(
        cfg: PipelineConfig,
        remote: Box<dyn RemoteSource>,
        backend: Option<Box<dyn ChatBackend>>,
        progress: ConsoleProgress,
    ) -> Self {
        let trace = match cfg.trace_dir.clone() {
            Some(dir) if !cfg.dry_run => TraceWriter::new(dir).unwrap_or_else(|err| {
                warn!("trace disabled: {err:#}");
                TraceWriter::disabled()
            }),
            _ => TraceWriter::disabled(),
        };
        let fallback = FallbackTranslator::new(
            backend,
            cfg.prompts.clone(),
            cfg.batch_size,
            cfg.rate_limit_delay,
        )
        .with_trace(trace)
        .with_log_max_chars(cfg.log_max_chars);
        Self {
            cfg,
            remote,
            fallback,
            progress,
        }
    }

    /// Runs the selection. Category failures are recorded and the run moves
    /// on to the next category.
    pub fn run(&mut self, selection: Selection) -> RunReport {
        let mut report = RunReport::default();
        let categories: &[Category] = match &selection {
            Selection::All => &Category::ALL,
            Selection::Category(c) => std::slice::from_ref(c),
            Selection::EventStory => &[],
        };
        for &category in categories {
            match self.translate_category(category) {
                Ok(r) => report.categories.push(r),
                Err(err) => {
                    error!("{category}: {err:#}");
                    report.failures.push(Failure {
                        name: category.name().to_string(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }
        if matches!(selection, Selection::All | Selection::EventStory) {
            report.story = Some(self.translate_event_stories());
        }
        report
    }

    pub fn translate_category(&mut self, category: Category) -> anyhow::Result<CategoryReport> {
        let spec = category.spec();
        self.progress.banner(&format!("Translating {category}"));

        let mut extraction = Extraction::default();
        let mut fetched = 0;
        for table in spec.tables {
            let Some(source) = self.remote.fetch_masterdata(table.file, Server::Source) else {
                warn!("{category}: {} unavailable, skipping", table.file);
                continue;
            };
            fetched += 1;
            let target = if table.parallel {
                let t = self.remote.fetch_masterdata(table.file, Server::Target);
                if t.is_none() {
                    warn!("{category}: no target data for {}; every text is pending", table.file);
                }
                t
            } else {
                None
            };
            extract_table(table, &source, target.as_ref(), &mut extraction);
        }
        if fetched == 0 {
            return Err(anyhow!("no source data"));
        }
        if spec.dedup_pending {
            extraction.dedup_pending();
        }
        self.progress.info(format!(
            "{category}: {} authoritative pairs, {} pending texts",
            extraction.authoritative_count(),
            extraction.pending_count()
        ));

        let mut table = TranslationTable::load(&self.cfg.output_dir, category.name());
        self.fallback.set_scope(category.name());
        let mut stats = MergeStats::default();
        for (field, ex) in &extraction.fields {
            let fallback: Option<&mut dyn FallbackFill> = if self.cfg.cn_only {
                None
            } else {
                Some(&mut self.fallback)
            };
            stats += table.merge(field, &ex.authoritative, &ex.pending, fallback);
        }
        if stats.deferred > 0 {
            info!("{category}: {} texts left without translation", stats.deferred);
        }

        let paths = TablePaths::new(&self.cfg.output_dir, category.name());
        if self.cfg.dry_run {
            info!(
                "[dry run] would write {} and {}",
                paths.full.display(),
                paths.flat.display()
            );
        } else {
            table.save(&self.cfg.output_dir, category.name())?;
            info!("saved {}", paths.flat.display());
        }
        self.progress.info(format!(
            "{category}: {} new cn, {} updated cn, {} llm",
            stats.authoritative_new, stats.authoritative_updated, stats.generated_new
        ));

        Ok(CategoryReport {
            category,
            stats,
            entries: table.len(),
        })
    }

    pub fn translate_event_stories(&mut self) -> StoryStats {
        self.progress.banner("Extracting event stories");
        let opts = StoryOptions {
            output_dir: &self.cfg.output_dir,
            force: self.cfg.force,
            dry_run: self.cfg.dry_run,
        };
        let stats = extract_event_stories(self.remote.as_ref(), opts, &self.progress);
        self.progress.info(format!("{EVENT_STORY}: {stats}"));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    use serde_json::{json, Value};

    use crate::config::AppConfig;
    use crate::pipeline::config::PipelineArgs;
    use crate::remote::FakeRemote;
    use crate::table::Provenance;

    /// Answers every prompt with one `译:<line>` per input line.
    struct Echo {
        calls: Rc<Cell<usize>>,
    }

    impl ChatBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(prompt.lines().map(|l| format!("译:{l}\n")).collect())
        }
    }

    fn config(dir: &Path, args: PipelineArgs) -> PipelineConfig {
        let file_cfg: AppConfig =
            toml::from_str("[pipeline]\nrate_limit_delay_ms = 0\n").expect("parse");
        // Resolved offline so no credential is needed; tests pick the mode.
        let args = PipelineArgs {
            output_dir: Some(dir.to_path_buf()),
            dry_run: true,
            ..args
        };
        let mut cfg =
            PipelineConfig::resolve(args, PathBuf::from("x.toml"), &file_cfg).expect("resolve");
        cfg.dry_run = false;
        cfg.prompts.game_context = "{{texts}}".to_string();
        cfg
    }

    fn live(dir: &Path, remote: FakeRemote) -> (TranslatorPipeline, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let backend = Echo {
            calls: Rc::clone(&calls),
        };
        let pipeline = TranslatorPipeline::new(
            config(dir, PipelineArgs::default()),
            Box::new(remote),
            Some(Box::new(backend)),
            ConsoleProgress::new(false),
        );
        (pipeline, calls)
    }

    fn cards_remote() -> FakeRemote {
        FakeRemote::default()
            .with_masterdata(
                Server::Source,
                "cards.json",
                json!([
                    {"id": 1, "prefix": "新人", "cardSkillName": "-", "gachaPhrase": ""},
                    {"id": 2, "prefix": "ベテラン"},
                ]),
            )
            .with_masterdata(
                Server::Target,
                "cards.json",
                json!([{"id": 1, "prefix": "新人(CN)"}]),
            )
    }

    fn read(path: PathBuf) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json")
    }

    #[test]
    fn selection_parses_categories_and_event_story() {
        assert_eq!(Selection::parse(None).expect("all"), Selection::All);
        assert_eq!(
            Selection::parse(Some("virtualLive")).expect("cat"),
            Selection::Category(Category::VirtualLive)
        );
        assert_eq!(Selection::parse(Some("eventStory")).expect("story"), Selection::EventStory);
        assert!(Selection::parse(Some("bogus")).is_err());
        assert_eq!(Selection::names().len(), 12);
    }

    #[test]
    fn cards_merge_authoritative_and_generated_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut pipeline, calls) = live(dir.path(), cards_remote());
        let report = pipeline.translate_category(Category::Cards).expect("cards");

        assert_eq!(report.stats.authoritative_new, 1);
        assert_eq!(report.stats.generated_new, 1);
        assert_eq!(calls.get(), 1);

        let full = read(dir.path().join("cards.full.json"));
        assert_eq!(full["prefix"]["新人"], json!({"text": "新人(CN)", "source": "cn"}));
        assert_eq!(full["prefix"]["ベテラン"], json!({"text": "译:ベテラン", "source": "llm"}));
        let flat = read(dir.path().join("cards.json"));
        assert_eq!(flat["prefix"]["新人"], "新人(CN)");
        assert!(flat["skillName"].as_object().expect("field").is_empty());
    }

    #[test]
    fn second_run_changes_nothing_and_calls_no_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut pipeline, calls) = live(dir.path(), cards_remote());
        pipeline.translate_category(Category::Cards).expect("first");
        let report = pipeline.translate_category(Category::Cards).expect("second");
        assert_eq!(report.stats.changed(), 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn official_text_replaces_earlier_generated_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("cards.full.json"),
            r#"{"prefix": {"新人": {"text": "机翻", "source": "llm"}}}"#,
        )
        .expect("seed");
        let (mut pipeline, _) = live(dir.path(), cards_remote());
        let report = pipeline.translate_category(Category::Cards).expect("cards");
        assert_eq!(report.stats.authoritative_updated, 1);

        let table = TranslationTable::load(dir.path(), "cards");
        let entry = table.get("prefix", "新人").expect("entry");
        assert_eq!(entry.text, "新人(CN)");
        assert_eq!(entry.provenance, Provenance::Authoritative);
    }

    #[test]
    fn cn_only_defers_untranslated_texts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = PipelineArgs {
            cn_only: true,
            ..PipelineArgs::default()
        };
        let mut pipeline = TranslatorPipeline::new(
            config(dir.path(), args),
            Box::new(cards_remote()),
            None,
            ConsoleProgress::new(false),
        );
        let report = pipeline.translate_category(Category::Cards).expect("cards");
        assert_eq!(report.stats.generated_new, 0);
        assert_eq!(report.stats.deferred, 1);
        let flat = read(dir.path().join("cards.json"));
        assert!(flat["prefix"].get("ベテラン").is_none());
    }

    #[test]
    fn dry_run_simulates_fallback_and_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(dir.path(), PipelineArgs::default());
        cfg.dry_run = true;
        let mut pipeline = TranslatorPipeline::new(
            cfg,
            Box::new(cards_remote()),
            None,
            ConsoleProgress::new(false),
        );
        let report = pipeline.translate_category(Category::Cards).expect("cards");
        assert_eq!(report.stats.generated_new, 1);
        assert_eq!(report.entries, 2);
        assert!(!dir.path().join("cards.json").exists());
    }

    #[test]
    fn source_only_music_sends_deduplicated_texts_to_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = FakeRemote::default()
            .with_masterdata(
                Server::Source,
                "musics.json",
                json!([
                    {"id": 1, "title": "曲", "lyricist": "甲", "composer": "甲", "arranger": "乙"},
                ]),
            )
            .with_masterdata(Server::Target, "musics.json", json!([{"id": 1, "title": "不用"}]));
        let (mut pipeline, _) = live(dir.path(), remote);
        let report = pipeline.translate_category(Category::Music).expect("music");
        assert_eq!(report.stats.authoritative_new, 0);
        assert_eq!(report.stats.generated_new, 3);
        let flat = read(dir.path().join("music.json"));
        assert_eq!(flat["title"]["曲"], "译:曲");
        assert_eq!(flat["artist"].as_object().expect("artist").len(), 2);
    }

    #[test]
    fn failing_categories_are_recorded_and_the_run_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut pipeline, _) = live(dir.path(), cards_remote());
        let report = pipeline.run(Selection::All);

        assert_eq!(report.categories.len(), 1);
        assert_eq!(report.categories[0].category, Category::Cards);
        assert_eq!(report.failures.len(), Category::ALL.len() - 1);
        assert_eq!(report.failures[0].name, "events");
        assert_eq!(report.story, Some(StoryStats::default()));
        assert!(report.to_string().contains("FAILED"));
    }
}
