//! Incremental source-text → translation table for one content category.
//!
//! Every entry remembers where its translation came from. Authoritative
//! (vendor-published) text always wins over generated text, and generated
//! text is never redone once stored.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::textutil::{is_translatable, value_text};

/// Ordered by authority: `Unknown < Generated < Authoritative`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "cn")]
    Authoritative,
    #[serde(rename = "llm")]
    Generated,
    /// Also what any unrecognized `source` value decodes to.
    #[default]
    #[serde(rename = "unknown")]
    #[serde(other)]
    Unknown,
}

impl Provenance {
    fn rank(self) -> u8 {
        match self {
            Provenance::Unknown => 0,
            Provenance::Generated => 1,
            Provenance::Authoritative => 2,
        }
    }
}

impl PartialOrd for Provenance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Provenance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationEntry {
    pub text: String,
    #[serde(rename = "source", default, deserialize_with = "lenient_provenance")]
    pub provenance: Provenance,
}

/// Any `source` that is not a known tag (`null`, numbers, objects, other
/// strings) reads as `Unknown` so the entry itself survives.
fn lenient_provenance<'de, D>(deserializer: D) -> Result<Provenance, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(Provenance::deserialize(&raw).unwrap_or_default())
}

impl TranslationEntry {
    pub fn new(text: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            text: text.into(),
            provenance,
        }
    }
}

pub type TranslationField = BTreeMap<String, TranslationEntry>;
pub type FlatTable = BTreeMap<String, BTreeMap<String, String>>;

/// Either shape a stored value may take on disk: the provenance-annotated
/// object, or a bare value from the older flat files.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Entry(TranslationEntry),
    Bare(Value),
}

impl StoredValue {
    fn into_entry(self) -> Option<TranslationEntry> {
        let entry = match self {
            StoredValue::Entry(e) => e,
            StoredValue::Bare(v) => TranslationEntry::new(value_text(&v)?, Provenance::Unknown),
        };
        (!entry.text.is_empty()).then_some(entry)
    }
}

/// Counts produced by one merge; callers aggregate them with `+=`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub authoritative_new: usize,
    pub authoritative_updated: usize,
    pub generated_new: usize,
    /// Texts that still have no entry after the merge.
    pub deferred: usize,
}

impl MergeStats {
    pub fn changed(&self) -> usize {
        self.authoritative_new + self.authoritative_updated + self.generated_new
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.authoritative_new += rhs.authoritative_new;
        self.authoritative_updated += rhs.authoritative_updated;
        self.generated_new += rhs.generated_new;
        self.deferred += rhs.deferred;
    }
}

/// Supplies generated translations for texts with no entry at all.
pub trait FallbackFill {
    /// Returns translations for whichever of `texts` could be translated;
    /// omitted texts stay pending.
    fn fill(&mut self, field: &str, texts: &[String]) -> BTreeMap<String, String>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslationTable {
    fields: BTreeMap<String, TranslationField>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn field(&self, name: &str) -> Option<&TranslationField> {
        self.fields.get(name)
    }

    pub fn get(&self, field: &str, source_text: &str) -> Option<&TranslationEntry> {
        self.fields.get(field)?.get(source_text)
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges one field's authoritative pairs, then fills the remaining
    /// pending texts through `fallback` (skipped when `None`).
    pub fn merge(
        &mut self,
        field: &str,
        authoritative: &BTreeMap<String, String>,
        pending: &[String],
        fallback: Option<&mut dyn FallbackFill>,
    ) -> MergeStats {
        let mut stats = self.merge_authoritative(field, authoritative);

        let need = self.missing(field, pending);
        if need.is_empty() {
            return stats;
        }

        if let Some(fallback) = fallback {
            let generated = fallback.fill(field, &need);
            stats.generated_new = self.insert_generated(field, generated);
        }
        stats.deferred = self.missing(field, &need).iter().collect::<BTreeSet<_>>().len();
        stats
    }

    pub fn merge_authoritative(
        &mut self,
        field: &str,
        authoritative: &BTreeMap<String, String>,
    ) -> MergeStats {
        let mut stats = MergeStats::default();
        let entries = self.fields.entry(field.to_string()).or_default();
        for (source, target) in authoritative {
            if !is_translatable(source) || target.is_empty() {
                continue;
            }
            match entries.get_mut(source) {
                None => {
                    entries.insert(
                        source.clone(),
                        TranslationEntry::new(target.clone(), Provenance::Authoritative),
                    );
                    stats.authoritative_new += 1;
                }
                Some(existing)
                    if existing.provenance != Provenance::Authoritative
                        || existing.text != *target =>
                {
                    *existing = TranslationEntry::new(target.clone(), Provenance::Authoritative);
                    stats.authoritative_updated += 1;
                }
                Some(_) => {}
            }
        }
        stats
    }

    /// Pending texts with no entry of any provenance, in input order.
    /// Duplicates within `pending` are kept.
    pub fn missing(&self, field: &str, pending: &[String]) -> Vec<String> {
        let existing = self.fields.get(field);
        pending
            .iter()
            .filter(|t| is_translatable(t))
            .filter(|t| existing.map_or(true, |f| !f.contains_key(t.as_str())))
            .cloned()
            .collect()
    }

    /// Inserts generated translations for texts that have no entry yet.
    pub fn insert_generated(&mut self, field: &str, generated: BTreeMap<String, String>) -> usize {
        let entries = self.fields.entry(field.to_string()).or_default();
        let mut inserted = 0;
        for (source, target) in generated {
            if !is_translatable(&source) || target.is_empty() || entries.contains_key(&source) {
                continue;
            }
            entries.insert(source, TranslationEntry::new(target, Provenance::Generated));
            inserted += 1;
        }
        inserted
    }

    /// Decodes either on-disk shape into canonical entries.
    pub fn from_json(data: Value) -> Self {
        let mut fields = BTreeMap::new();
        let Value::Object(map) = data else {
            return Self { fields };
        };
        for (field, values) in map {
            let Value::Object(values) = values else {
                continue;
            };
            let mut entries = TranslationField::new();
            for (source, raw) in values {
                if !is_translatable(&source) {
                    continue;
                }
                let Ok(stored) = serde_json::from_value::<StoredValue>(raw) else {
                    continue;
                };
                if let Some(entry) = stored.into_entry() {
                    entries.insert(source, entry);
                }
            }
            fields.insert(field, entries);
        }
        Self { fields }
    }

    pub fn to_full_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(&self.fields).context("serialize translation table")
    }

    pub fn flatten(&self) -> FlatTable {
        self.fields
            .iter()
            .map(|(field, entries)| {
                let flat = entries
                    .iter()
                    .map(|(source, entry)| (source.clone(), entry.text.clone()))
                    .collect();
                (field.clone(), flat)
            })
            .collect()
    }

    /// Loads the provenance file, falling back to the flat file, then to empty.
    pub fn load(dir: &Path, category: &str) -> Self {
        let paths = TablePaths::new(dir, category);
        for path in [&paths.full, &paths.flat] {
            if !path.exists() {
                continue;
            }
            match read_json(path) {
                Ok(data) => {
                    let table = Self::from_json(data);
                    debug!("loaded {} entries from {}", table.len(), path.display());
                    return table;
                }
                Err(err) => warn!("ignoring unreadable {}: {err:#}", path.display()),
            }
        }
        Self::new()
    }

    pub fn save(&self, dir: &Path, category: &str) -> anyhow::Result<TablePaths> {
        let paths = TablePaths::new(dir, category);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir: {}", dir.display()))?;
        std::fs::write(&paths.full, self.to_full_json()?)
            .with_context(|| format!("write {}", paths.full.display()))?;
        let flat = serde_json::to_string_pretty(&self.flatten()).context("serialize flat table")?;
        std::fs::write(&paths.flat, flat)
            .with_context(|| format!("write {}", paths.flat.display()))?;
        Ok(paths)
    }
}

#[derive(Clone, Debug)]
pub struct TablePaths {
    /// `<category>.full.json`, with provenance.
    pub full: PathBuf,
    /// `<category>.json`, read by consumers.
    pub flat: PathBuf,
}

impl TablePaths {
    pub fn new(dir: &Path, category: &str) -> Self {
        Self {
            full: dir.join(format!("{category}.full.json")),
            flat: dir.join(format!("{category}.json")),
        }
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Tags each text so tests can tell it was generated.
    struct Echo {
        calls: usize,
        skip: Vec<String>,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                calls: 0,
                skip: Vec::new(),
            }
        }
    }

    impl FallbackFill for Echo {
        fn fill(&mut self, _field: &str, texts: &[String]) -> BTreeMap<String, String> {
            self.calls += 1;
            texts
                .iter()
                .filter(|t| !self.skip.contains(t))
                .map(|t| (t.clone(), format!("gen:{t}")))
                .collect()
        }
    }

    #[test]
    fn provenance_orders_by_authority() {
        assert!(Provenance::Unknown < Provenance::Generated);
        assert!(Provenance::Generated < Provenance::Authoritative);
        assert_eq!(Provenance::default(), Provenance::Unknown);
    }

    #[test]
    fn cards_prefix_example() {
        let mut table = TranslationTable::new();
        let mut echo = Echo::new();
        let stats = table.merge(
            "prefix",
            &pairs(&[("新人", "新人(CN)")]),
            &texts(&["ベテラン"]),
            Some(&mut echo),
        );

        assert_eq!(
            table.get("prefix", "新人"),
            Some(&TranslationEntry::new("新人(CN)", Provenance::Authoritative))
        );
        assert_eq!(
            table.get("prefix", "ベテラン"),
            Some(&TranslationEntry::new("gen:ベテラン", Provenance::Generated))
        );
        assert_eq!(stats.authoritative_new, 1);
        assert_eq!(stats.generated_new, 1);
        assert_eq!(stats.deferred, 0);
    }

    #[test]
    fn merge_is_idempotent() {
        let auth = pairs(&[("a", "甲"), ("b", "乙")]);
        let pending = texts(&["c"]);
        let mut table = TranslationTable::new();
        let mut echo = Echo::new();
        table.merge("name", &auth, &pending, Some(&mut echo));
        let snapshot = table.clone();

        let again = table.merge("name", &auth, &pending, Some(&mut echo));
        assert_eq!(again, MergeStats::default());
        assert_eq!(table, snapshot);
        // Nothing left to generate, so the backend is not called again.
        assert_eq!(echo.calls, 1);
    }

    #[test]
    fn generated_never_replaces_authoritative() {
        let mut table = TranslationTable::new();
        table.merge_authoritative("name", &pairs(&[("a", "甲")]));
        let inserted = table.insert_generated("name", pairs(&[("a", "gen")]));
        assert_eq!(inserted, 0);
        assert_eq!(table.get("name", "a").map(|e| e.provenance), Some(Provenance::Authoritative));

        let mut echo = Echo::new();
        let stats = table.merge("name", &BTreeMap::new(), &texts(&["a"]), Some(&mut echo));
        assert_eq!(stats, MergeStats::default());
        assert_eq!(echo.calls, 0);
        assert_eq!(table.get("name", "a").map(|e| e.text.as_str()), Some("甲"));
    }

    #[test]
    fn authoritative_replaces_generated_and_stale_authoritative() {
        let mut table = TranslationTable::new();
        table.insert_generated("name", pairs(&[("a", "gen")]));
        let stats = table.merge_authoritative("name", &pairs(&[("a", "甲")]));
        assert_eq!(stats.authoritative_updated, 1);
        assert_eq!(
            table.get("name", "a"),
            Some(&TranslationEntry::new("甲", Provenance::Authoritative))
        );

        let stats = table.merge_authoritative("name", &pairs(&[("a", "甲2")]));
        assert_eq!(stats.authoritative_updated, 1);
        assert_eq!(table.get("name", "a").map(|e| e.text.as_str()), Some("甲2"));
    }

    #[test]
    fn unknown_entries_satisfy_pending_and_upgrade_to_authoritative() {
        let mut table = TranslationTable::from_json(json!({"name": {"a": "旧"}}));
        let mut echo = Echo::new();
        let stats = table.merge("name", &BTreeMap::new(), &texts(&["a"]), Some(&mut echo));
        assert_eq!(stats.generated_new, 0);
        assert_eq!(echo.calls, 0);

        let stats = table.merge_authoritative("name", &pairs(&[("a", "旧")]));
        assert_eq!(stats.authoritative_updated, 1);
        assert_eq!(table.get("name", "a").map(|e| e.provenance), Some(Provenance::Authoritative));
    }

    #[test]
    fn disabled_fallback_reports_deferred_without_inserting() {
        let mut table = TranslationTable::new();
        let stats = table.merge("name", &BTreeMap::new(), &texts(&["x", "y", "x", ""]), None);
        assert_eq!(stats.deferred, 2);
        assert_eq!(stats.generated_new, 0);
        assert!(table.get("name", "x").is_none());
    }

    #[test]
    fn texts_missing_from_backend_reply_stay_pending() {
        let mut table = TranslationTable::new();
        let mut echo = Echo::new();
        echo.skip.push("y".to_string());
        let stats = table.merge("name", &BTreeMap::new(), &texts(&["x", "y"]), Some(&mut echo));
        assert_eq!(stats.generated_new, 1);
        assert_eq!(stats.deferred, 1);
        assert_eq!(table.missing("name", &texts(&["x", "y"])), texts(&["y"]));
    }

    #[test]
    fn flatten_then_reload_keeps_text_but_loses_provenance() {
        let mut table = TranslationTable::new();
        table.merge_authoritative("name", &pairs(&[("a", "甲")]));
        table.insert_generated("name", pairs(&[("b", "乙")]));

        let flat = serde_json::to_value(table.flatten()).expect("flat json");
        let reloaded = TranslationTable::from_json(flat);
        assert_eq!(
            reloaded.get("name", "a"),
            Some(&TranslationEntry::new("甲", Provenance::Unknown))
        );
        assert_eq!(
            reloaded.get("name", "b"),
            Some(&TranslationEntry::new("乙", Provenance::Unknown))
        );
    }

    #[test]
    fn from_json_normalizes_mixed_shapes() {
        let table = TranslationTable::from_json(json!({
            "name": {
                "a": {"text": "甲", "source": "cn"},
                "b": {"text": "乙", "source": "llm"},
                "c": {"text": "丙"},
                "d": {"text": "丁", "source": "vendor-x"},
                "g": {"text": "戊", "source": null},
                "h": {"text": "己", "source": 3},
                "e": 5,
                "f": "",
                "-": "placeholder",
            },
            "broken": "not a field",
        }));
        let prov = |k: &str| table.get("name", k).map(|e| e.provenance);
        assert_eq!(prov("a"), Some(Provenance::Authoritative));
        assert_eq!(prov("b"), Some(Provenance::Generated));
        assert_eq!(prov("c"), Some(Provenance::Unknown));
        assert_eq!(prov("d"), Some(Provenance::Unknown));
        assert_eq!(prov("g"), Some(Provenance::Unknown));
        assert_eq!(prov("h"), Some(Provenance::Unknown));
        assert_eq!(table.get("name", "g").map(|e| e.text.as_str()), Some("戊"));
        assert_eq!(table.get("name", "e").map(|e| e.text.as_str()), Some("5"));
        assert!(table.get("name", "f").is_none());
        assert!(table.get("name", "-").is_none());
        assert!(table.field("broken").is_none());
    }

    #[test]
    fn save_and_load_round_trip_through_full_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut table = TranslationTable::new();
        table.merge_authoritative("prefix", &pairs(&[("新人", "新人(CN)")]));
        table.insert_generated("prefix", pairs(&[("ベテラン", "老手")]));
        let paths = table.save(dir.path(), "cards").expect("save");

        let flat: FlatTable =
            serde_json::from_str(&std::fs::read_to_string(&paths.flat).expect("read")).expect("parse");
        assert_eq!(flat["prefix"]["ベテラン"], "老手");

        let loaded = TranslationTable::load(dir.path(), "cards");
        assert_eq!(loaded, table);
    }

    #[test]
    fn corrupt_full_file_falls_back_to_flat_then_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = TablePaths::new(dir.path(), "events");
        std::fs::write(&paths.full, "{ not json").expect("write");
        std::fs::write(&paths.flat, r#"{"name": {"a": "甲"}}"#).expect("write");
        let loaded = TranslationTable::load(dir.path(), "events");
        assert_eq!(loaded.get("name", "a").map(|e| e.provenance), Some(Provenance::Unknown));

        std::fs::write(&paths.flat, "[").expect("write");
        assert!(TranslationTable::load(dir.path(), "events").is_empty());
    }
}
