//! Clause normalizer
//!
//! The backend returns clauses in one of three shapes:
//!
//! - an array of clause records
//! - a flat map of `key -> record`
//! - a nested map of `category -> (index -> text)`, usually under
//!   `template_data.clauses.data`, with persisted edits stored separately
//!   in the document's `clauses` field
//!
//! All three become one ordered `Vec<Clause>`. Unrecognized input yields an
//! empty list. Normalization only borrows its input, so running it twice on
//! the same payload gives identical results.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use shared_types::{Clause, ClauseKey, ClauseStatus, Comment, Document, RiskAssessment};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

const ID_FIELDS: &[&str] = &["id", "_id", "clause_id"];
const KEY_FIELDS: &[&str] = &["clause_key", "key"];
const NAME_FIELDS: &[&str] = &["name", "title", "clause_name"];
const TEXT_FIELDS: &[&str] = &["current_version", "clause_details", "text", "details"];
const SUGGESTION_FIELDS: &[&str] = &[
    "ai_suggestion",
    "suggested_text",
    "ai_suggested_clause",
    "suggestion",
];
const RISK_FIELDS: &[&str] = &["risk", "risk_level", "risk_score"];
const CONFIDENCE_FIELDS: &[&str] = &["confidence", "ai_confidence"];
const REVIEW_FIELDS: &[&str] = &["status", "comments"];

/// Normalize the clause payloads carried by a document
pub fn normalize_document(document: &Document) -> Vec<Clause> {
    let generated = document
        .template_data
        .as_ref()
        .and_then(|t| t.get("clauses"))
        .and_then(|c| c.get("data"));
    normalize(document.clauses.as_ref(), generated)
}

/// Normalize raw payloads.
///
/// `generated` is the nested category map produced at generation time, if
/// any; `clauses` holds either the full clause list or persisted records for
/// the generated clauses.
pub fn normalize(clauses: Option<&Value>, generated: Option<&Value>) -> Vec<Clause> {
    match generated {
        Some(Value::Object(categories)) if !categories.is_empty() && looks_nested(categories) => {
            let persisted = PersistedIndex::build(clauses);
            return from_nested(categories, &persisted);
        }
        Some(Value::Array(items)) if !items.is_empty() && clauses.is_none() => {
            return from_array(items);
        }
        _ => {}
    }

    match clauses {
        Some(Value::Array(items)) => from_array(items),
        Some(Value::Object(map)) if looks_nested(map) => {
            from_nested(map, &PersistedIndex::default())
        }
        Some(Value::Object(map)) => from_flat(map),
        Some(other) => {
            debug!(kind = value_kind(other), "unrecognized clause payload");
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A map is a nested category map when none of its values is a clause record
fn looks_nested(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map.values().all(|v| match v {
            Value::Object(inner) => !is_record(inner),
            Value::Array(_) => true,
            _ => false,
        })
}

fn is_record(map: &Map<String, Value>) -> bool {
    [
        ID_FIELDS,
        KEY_FIELDS,
        NAME_FIELDS,
        TEXT_FIELDS,
        SUGGESTION_FIELDS,
        REVIEW_FIELDS,
    ]
    .iter()
    .any(|fields| fields.iter().any(|f| map.contains_key(*f)))
}

/// Order map keys numerically when they are numbers, lexically otherwise
fn index_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn sorted_entries(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| index_order(a, b));
    entries
}

/// Array items keep their own key when they have one. Items without one get
/// `clause-<index>`; a key seen twice is suffixed with `#<index>` so keys stay
/// unique within the document.
fn from_array(items: &[Value]) -> Vec<Clause> {
    let explicit: Vec<Option<String>> = items
        .iter()
        .map(|item| match item {
            Value::Object(map) => {
                let record = Record(map);
                record
                    .string(KEY_FIELDS)
                    .or_else(|| record.string(ID_FIELDS))
            }
            _ => None,
        })
        .collect();
    // Explicit keys are reserved up front so a fallback never takes one
    let mut taken: HashSet<String> = explicit.iter().flatten().cloned().collect();
    let mut claimed: HashSet<String> = HashSet::new();

    let mut clauses = Vec::with_capacity(items.len());
    for (i, (item, key)) in items.iter().zip(explicit).enumerate() {
        if !matches!(item, Value::Object(_) | Value::String(_)) {
            continue;
        }
        let key = match key {
            Some(key) if claimed.insert(key.clone()) => key,
            Some(key) => {
                let unique = unique_key(&key, i, &mut taken);
                warn!(key = %key, renamed = %unique, "duplicate clause key in payload");
                unique
            }
            None => {
                let fallback = format!("clause-{}", i);
                if taken.insert(fallback.clone()) {
                    fallback
                } else {
                    unique_key(&fallback, i, &mut taken)
                }
            }
        };
        match item {
            Value::Object(map) => clauses.push(Record(map).into_clause(ClauseKey::new(key))),
            Value::String(text) => {
                clauses.push(Clause::new(ClauseKey::new(key.clone()), key, text.clone()))
            }
            _ => {}
        }
    }
    clauses
}

fn unique_key(base: &str, index: usize, taken: &mut HashSet<String>) -> String {
    (index..)
        .map(|n| format!("{}#{}", base, n))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or_else(|| base.to_string())
}

fn from_flat(map: &Map<String, Value>) -> Vec<Clause> {
    sorted_entries(map)
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Object(inner) => Some(Record(inner).into_clause(ClauseKey::new(key.clone()))),
            Value::String(text) => {
                Some(Clause::new(ClauseKey::new(key.clone()), key.clone(), text.clone()))
            }
            _ => None,
        })
        .collect()
}

fn from_nested(categories: &Map<String, Value>, persisted: &PersistedIndex<'_>) -> Vec<Clause> {
    let mut names: Vec<&String> = categories.keys().collect();
    names.sort();

    let mut clauses = Vec::new();
    for category in names {
        let entries: Vec<(String, &Value)> = match &categories[category] {
            Value::Object(inner) => sorted_entries(inner)
                .into_iter()
                .map(|(k, v)| (k.clone(), v))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ => continue,
        };

        for (index, value) in entries {
            let key = ClauseKey::derived(category, &index);
            let mut clause = match value {
                Value::Object(map) => Record(map).into_clause(key),
                Value::String(text) => Clause::new(key, "", text.clone()),
                Value::Null => Clause::new(key, "", ""),
                other => Clause::new(key, "", other.to_string()),
            };
            clause.name = ClauseKey::derived_name(category, &index);
            clause.category = Some(category.clone());

            if let Some(record) = persisted.find(category, &index) {
                record.apply_to(&mut clause);
            }
            clauses.push(clause);
        }
    }
    clauses
}

/// Persisted clause records indexed by every key they can be found under
#[derive(Default)]
struct PersistedIndex<'a> {
    records: HashMap<String, &'a Map<String, Value>>,
}

impl<'a> PersistedIndex<'a> {
    fn build(clauses: Option<&'a Value>) -> Self {
        let mut index = Self::default();
        match clauses {
            Some(Value::Array(items)) => {
                for map in items.iter().filter_map(Value::as_object) {
                    index.insert_record(map);
                }
            }
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    if let Value::Object(record) = value {
                        index.records.entry(key.clone()).or_insert(record);
                        index.insert_record(record);
                    }
                }
            }
            _ => {}
        }
        index
    }

    fn insert_record(&mut self, record: &'a Map<String, Value>) {
        let r = Record(record);
        for fields in [KEY_FIELDS, ID_FIELDS, NAME_FIELDS] {
            for field in fields {
                if let Some(k) = r.string(&[*field]) {
                    self.records.entry(k).or_insert(record);
                }
            }
        }
    }

    fn find(&self, category: &str, index: &str) -> Option<Record<'a>> {
        ClauseKey::lookup_aliases(category, index)
            .iter()
            .find_map(|alias| self.records.get(alias.as_str()))
            .map(|map| Record(*map))
    }
}

/// Read access to one clause record with the backend's field aliases
#[derive(Clone, Copy)]
struct Record<'a>(&'a Map<String, Value>);

impl<'a> Record<'a> {
    fn string(&self, fields: &[&str]) -> Option<String> {
        fields.iter().find_map(|f| match self.0.get(*f)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    fn text(&self) -> Option<String> {
        TEXT_FIELDS
            .iter()
            .find_map(|f| self.0.get(*f)?.as_str().map(str::to_string))
    }

    fn status(&self) -> Option<ClauseStatus> {
        self.0
            .get("status")
            .and_then(Value::as_str)
            .map(ClauseStatus::parse_lenient)
    }

    fn risk(&self) -> Option<RiskAssessment> {
        RISK_FIELDS.iter().find_map(|f| match self.0.get(*f)? {
            Value::String(s) => RiskAssessment::parse(s),
            Value::Number(n) => n.as_f64().and_then(RiskAssessment::from_number),
            _ => None,
        })
    }

    fn confidence(&self) -> Option<f64> {
        CONFIDENCE_FIELDS
            .iter()
            .find_map(|f| self.0.get(*f)?.as_f64())
            .filter(|c| (0.0..=1.0).contains(c))
    }

    fn comments(&self) -> Option<Vec<Comment>> {
        let items = self.0.get("comments")?.as_array()?;
        Some(items.iter().filter_map(parse_comment).collect())
    }

    fn into_clause(self, key: ClauseKey) -> Clause {
        let name = self
            .string(NAME_FIELDS)
            .unwrap_or_else(|| key.as_str().to_string());
        let mut clause = Clause::new(key, name, "");
        clause.category = self.string(&["category"]);
        self.apply_to(&mut clause);
        clause
    }

    /// Overwrite the clause fields this record carries
    fn apply_to(&self, clause: &mut Clause) {
        if let Some(id) = self.string(ID_FIELDS) {
            clause.record_id = Some(id);
        }
        if let Some(text) = self.text() {
            clause.text = text;
        }
        if let Some(suggestion) = self.string(SUGGESTION_FIELDS) {
            clause.suggestion = Some(suggestion);
        }
        if let Some(risk) = self.risk() {
            clause.risk = Some(risk);
        }
        if let Some(status) = self.status() {
            clause.status = status;
        }
        if let Some(comments) = self.comments() {
            clause.comments = comments;
        }
        if let Some(confidence) = self.confidence() {
            clause.confidence = Some(confidence);
        }
    }
}

fn parse_comment(value: &Value) -> Option<Comment> {
    match value {
        Value::String(text) if !text.trim().is_empty() => {
            Some(Comment::server(text.clone(), None, None))
        }
        Value::Object(map) => {
            let r = Record(map);
            let text = r.string(&["text", "comment", "content"])?;
            let author = r.string(&["author", "user", "commented_by"]);
            let created_at = ["created_at", "createdAt", "timestamp"]
                .iter()
                .find_map(|f| map.get(*f)?.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            Some(Comment::server(text, author, created_at))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use shared_types::RiskLevel;

    #[test]
    fn test_array_defaults_missing_fields() {
        let payload = json!([
            {"clause_details": "Rent is due monthly"},
            {"id": "c-9", "name": "Use", "current_version": "Office use", "status": "approved"},
        ]);
        let clauses = normalize(Some(&payload), None);

        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].key.as_str(), "clause-0");
        assert_eq!(clauses[0].name, "clause-0");
        assert_eq!(clauses[0].status, ClauseStatus::Pending);
        assert_eq!(clauses[0].text, "Rent is due monthly");

        assert_eq!(clauses[1].key.as_str(), "c-9");
        assert_eq!(clauses[1].record_id.as_deref(), Some("c-9"));
        assert_eq!(clauses[1].status, ClauseStatus::Approved);
    }

    #[test]
    fn test_array_keys_are_unique() {
        let payload = json!([
            {"text": "a"},
            {"id": "clause-0", "text": "b"},
            {"id": "x", "text": "c"},
            {"id": "x", "text": "d"},
        ]);
        let clauses = normalize(Some(&payload), None);
        let keys: Vec<&str> = clauses.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["clause-0#0", "clause-0", "x", "x#3"]);
        // The server id still addresses the record
        assert_eq!(clauses[3].record_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_current_version_wins_over_details() {
        let payload = json!([{"clause_details": "old", "current_version": "new"}]);
        assert_eq!(normalize(Some(&payload), None)[0].text, "new");
    }

    #[test]
    fn test_flat_map() {
        let payload = json!({
            "rent": {"clause_details": "5000/month", "risk": "High (8/10)"},
            "deposit": {"clause_details": "Two months", "status": "weird"},
        });
        let clauses = normalize(Some(&payload), None);
        let keys: Vec<&str> = clauses.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["deposit", "rent"]);
        assert_eq!(clauses[0].status, ClauseStatus::Pending);
        let risk = clauses[1].risk.as_ref().unwrap();
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.score, Some(8));
    }

    #[test]
    fn test_nested_map_derives_keys() {
        let payload = json!({
            "Rent": {"0": "Base rent", "1": "Escalation"},
            "Use": {"0": "Permitted use"},
        });
        let clauses = normalize(Some(&payload), None);
        let keys: Vec<&str> = clauses.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["Rent::0", "Rent::1", "Use::0"]);
        assert_eq!(clauses[0].name, "Rent #0");
        assert_eq!(clauses[0].category.as_deref(), Some("Rent"));
        assert!(clauses.iter().all(|c| c.status == ClauseStatus::Pending));
        assert!(clauses.iter().all(|c| c.risk.is_none()));
    }

    #[test]
    fn test_nested_indices_sort_numerically() {
        let payload = json!({"Rent": {"10": "ten", "2": "two", "1": "one"}});
        let keys: Vec<String> = normalize(Some(&payload), None)
            .into_iter()
            .map(|c| c.key.to_string())
            .collect();
        assert_eq!(keys, vec!["Rent::1", "Rent::2", "Rent::10"]);
    }

    #[test]
    fn test_nested_array_category() {
        let payload = json!({"Term": ["Five years", "Renewal option"]});
        let clauses = normalize(Some(&payload), None);
        assert_eq!(clauses[1].key.as_str(), "Term::1");
        assert_eq!(clauses[1].text, "Renewal option");
    }

    #[test]
    fn test_generated_merges_persisted_under_any_alias() {
        let generated = json!({
            "Rent": {"0": "Generated rent", "1": "Generated escalation", "2": "Generated cap"},
        });
        let persisted = json!([
            {
                "clause_key": "Rent::0",
                "id": "r0",
                "current_version": "Edited rent",
                "status": "approved"
            },
            {"name": "Rent #1", "status": "rejected", "comments": ["too high"]},
            {"key": "2", "ai_suggestion": "Cap at 3%", "confidence": 0.82},
        ]);
        let document = Document {
            clauses: Some(persisted),
            template_data: Some(json!({"clauses": {"data": generated}})),
            ..Default::default()
        };

        let clauses = normalize_document(&document);
        assert_eq!(clauses.len(), 3);

        assert_eq!(clauses[0].text, "Edited rent");
        assert_eq!(clauses[0].record_id.as_deref(), Some("r0"));
        assert_eq!(clauses[0].status, ClauseStatus::Approved);
        assert_eq!(clauses[0].key.as_str(), "Rent::0");

        assert_eq!(clauses[1].status, ClauseStatus::Rejected);
        assert_eq!(clauses[1].text, "Generated escalation");
        assert_eq!(clauses[1].comments.len(), 1);

        assert_eq!(clauses[2].suggestion.as_deref(), Some("Cap at 3%"));
        assert_eq!(clauses[2].confidence, Some(0.82));
        assert_eq!(clauses[2].status, ClauseStatus::Pending);
    }

    #[test]
    fn test_canonical_alias_beats_legacy_alias() {
        let generated = json!({"Rent": {"0": "g"}});
        let persisted = json!([
            {"key": "0", "current_version": "legacy"},
            {"clause_key": "Rent::0", "current_version": "canonical"},
        ]);
        let clauses = normalize(Some(&persisted), Some(&generated));
        assert_eq!(clauses[0].text, "canonical");
    }

    #[test]
    fn test_unrecognized_shapes_yield_empty() {
        assert!(normalize(None, None).is_empty());
        assert!(normalize(Some(&json!("text")), None).is_empty());
        assert!(normalize(Some(&json!(42)), None).is_empty());
        assert!(normalize(Some(&json!({})), None).is_empty());
        assert!(normalize(Some(&json!([])), Some(&json!(null))).is_empty());
    }

    #[test]
    fn test_confidence_out_of_range_dropped() {
        let payload = json!([{"text": "x", "confidence": 1.7}]);
        assert_eq!(normalize(Some(&payload), None)[0].confidence, None);
    }

    #[test]
    fn test_comment_objects() {
        let payload = json!([{
            "text": "x",
            "comments": [
                {
                    "comment": "Please revise",
                    "author": "Landlord",
                    "created_at": "2024-05-01T10:00:00Z"
                },
                {"text": "  "},
                "plain note"
            ]
        }]);
        let comments = &normalize(Some(&payload), None)[0].comments;
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].author.as_deref(), Some("Landlord"));
        assert!(comments[0].created_at.is_some());
        assert_eq!(comments[1].text, "plain note");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn text() -> impl Strategy<Value = String> {
        "[A-Za-z ]{0,24}"
    }

    fn status() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop_oneof![
            Just("approved".to_string()),
            Just("rejected".to_string()),
            Just("pending".to_string()),
            "[a-z]{3,8}",
        ])
    }

    fn id() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop_oneof![
            "clause-[0-3]",
            "clause-[0-3]#[0-3]",
            "[a-c]",
        ])
    }

    fn record() -> impl Strategy<Value = Value> {
        (text(), status(), id()).prop_map(|(t, s, id)| {
            let mut record = json!({"clause_details": t});
            if let Some(s) = s {
                record["status"] = json!(s);
            }
            if let Some(id) = id {
                record["id"] = json!(id);
            }
            record
        })
    }

    fn payload() -> impl Strategy<Value = Value> {
        prop_oneof![
            prop::collection::vec(record(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", record(), 0..8)
                .prop_map(|m| json!(m)),
            prop::collection::btree_map(
                "[A-Z][a-z]{1,6}",
                prop::collection::btree_map("[0-9]{1,2}", text(), 1..4),
                1..4
            )
            .prop_map(|m| json!(m)),
        ]
    }

    proptest! {
        /// Property: normalizing twice gives identical output and leaves input untouched
        #[test]
        fn normalize_is_idempotent(p in payload()) {
            let before = p.clone();
            let first = normalize(Some(&p), None);
            let second = normalize(Some(&p), None);
            prop_assert_eq!(first, second);
            prop_assert_eq!(p, before);
        }

        /// Property: records without a status field come out pending
        #[test]
        fn missing_status_defaults_to_pending(texts in prop::collection::vec(text(), 1..8)) {
            let items: Vec<Value> = texts.iter().map(|t| json!({"clause_details": t})).collect();
            let clauses = normalize(Some(&Value::Array(items)), None);
            prop_assert!(clauses.iter().all(|c| c.status == ClauseStatus::Pending));
        }

        /// Property: derived keys are unique within a document
        #[test]
        fn derived_keys_are_unique(p in payload()) {
            let clauses = normalize(Some(&p), None);
            let mut keys: Vec<_> = clauses.iter().map(|c| c.key.clone()).collect();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), clauses.len());
        }
    }
}
