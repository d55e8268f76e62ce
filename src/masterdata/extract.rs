use std::collections::BTreeMap;

use serde_json::Value;

use super::catalog::TableSpec;
use super::join::{index_by, records_of};
use crate::textutil::{dedup_preserving_order, is_translatable, str_field, value_text};

/// One field's split between texts with a vendor translation and texts
/// still waiting for one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldExtraction {
    pub authoritative: BTreeMap<String, String>,
    pub pending: Vec<String>,
}

impl FieldExtraction {
    /// Routes one source text. A target value that is empty or identical to
    /// the source is not a real translation; the placeholder rule applies to
    /// the source side only.
    pub fn classify(&mut self, source: &str, target: Option<&str>) {
        if !is_translatable(source) {
            return;
        }
        match target {
            Some(t) if !t.is_empty() && t != source => {
                self.authoritative.insert(source.to_string(), t.to_string());
            }
            _ => self.pending.push(source.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub fields: BTreeMap<String, FieldExtraction>,
}

impl Extraction {
    #[cfg(test)]
    pub fn field(&self, name: &str) -> Option<&FieldExtraction> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> &mut FieldExtraction {
        self.fields.entry(name.to_string()).or_default()
    }

    pub fn dedup_pending(&mut self) {
        for f in self.fields.values_mut() {
            f.pending = dedup_preserving_order(std::mem::take(&mut f.pending));
        }
    }

    pub fn authoritative_count(&self) -> usize {
        self.fields.values().map(|f| f.authoritative.len()).sum()
    }

    pub fn pending_count(&self) -> usize {
        self.fields.values().map(|f| f.pending.len()).sum()
    }
}

/// Joins one source-language document against its target-language
/// counterpart (absent = everything pending) and classifies every field
/// the table declares. Pure: no I/O.
pub fn extract_table(spec: &TableSpec, source: &Value, target: Option<&Value>, out: &mut Extraction) {
    for (_, field) in spec.all_fields() {
        out.field_mut(field);
    }

    let target_records = target.map(|t| records_of(t, spec.container)).unwrap_or(&[]);
    let target_by_key = index_by(target_records, spec.join_key);

    for record in records_of(source, spec.container) {
        if let Some(required) = spec.require_field {
            if str_field(record, required).is_empty() {
                continue;
            }
        }
        let joined = record
            .get(spec.join_key)
            .and_then(value_text)
            .and_then(|k| target_by_key.get(&k).copied());

        for (src_field, out_field) in spec.fields {
            let text = str_field(record, src_field);
            out.field_mut(out_field)
                .classify(text, joined.map(|t| str_field(t, src_field)));
        }

        if let Some(parts) = &spec.parts {
            extract_parts(parts, record, joined, out);
        }
    }
}

/// Nested part lists (`{"parts": {"<type>": [..]}}`) joined per part type
/// on the part's own key.
fn extract_parts(parts: &super::catalog::PartsSpec, record: &Value, joined: Option<&Value>, out: &mut Extraction) {
    let Some(groups) = record.get(parts.container).and_then(Value::as_object) else {
        return;
    };
    for (part_type, list) in groups {
        let source_parts = list.as_array().map(Vec::as_slice).unwrap_or(&[]);
        let target_parts = joined
            .and_then(|t| t.get(parts.container))
            .and_then(|g| g.get(part_type))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let target_by_key = index_by(target_parts, parts.join_key);

        for part in source_parts {
            let joined_part = part
                .get(parts.join_key)
                .and_then(value_text)
                .and_then(|k| target_by_key.get(&k).copied());
            for (src_field, out_field) in parts.fields {
                out.field_mut(out_field).classify(
                    str_field(part, src_field),
                    joined_part.map(|t| str_field(t, src_field)),
                );
            }
        }
    }
}
