use std::collections::HashMap;

use serde_json::Value;

use crate::textutil::value_text;

/// Records of a masterdata document: the document itself when it is an
/// array, or the array stored under `container`.
pub fn records_of<'a>(doc: &'a Value, container: Option<&str>) -> &'a [Value] {
    let list = match container {
        Some(key) => doc.get(key),
        None => Some(doc),
    };
    list.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// Builds an id-keyed lookup for the probe side of a hash join. Ids are
/// compared by textual form, so `12` and `"12"` join. Later duplicates win.
pub fn index_by<'a>(records: &'a [Value], key: &str) -> HashMap<String, &'a Value> {
    records
        .iter()
        .filter_map(|r| Some((value_text(r.get(key)?)?, r)))
        .collect()
}
