//! Suggestion retrieval and normalization into a per-target mapping table.
//!
//! The oracle answers with a loose list of suggestions; [`normalize`] turns
//! that list into a table with exactly one entry per target field, in target
//! order. Conflicting suggestions for one target resolve last-write-wins.

use crate::error::{OracleError, SchemaError};
use crate::oracle::{CompletionOptions, Oracle};
use crate::prompt::RequestPayload;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::future::{self, Future};
use std::path::Path;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

/// One raw proposal from the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSuggestion {
    #[serde(alias = "target_field")]
    pub target_field: String,
    #[serde(default)]
    pub direct: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuggestionDocument {
    mappings: Vec<MappingSuggestion>,
}

/// How one target field is filled. Both empty means unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub direct: String,
    pub formula: String,
}

impl FieldMapping {
    pub fn is_mapped(&self) -> bool {
        !self.direct.is_empty() || !self.formula.is_empty()
    }

    pub fn is_ambiguous(&self) -> bool {
        !self.direct.is_empty() && !self.formula.is_empty()
    }
}

#[cfg(test)]
impl FieldMapping {
    pub fn direct(field: impl Into<String>) -> Self {
        Self {
            direct: field.into(),
            formula: String::new(),
        }
    }

    pub fn formula(expression: impl Into<String>) -> Self {
        Self {
            direct: String::new(),
            formula: expression.into(),
        }
    }
}

impl From<&MappingSuggestion> for FieldMapping {
    fn from(suggestion: &MappingSuggestion) -> Self {
        Self {
            direct: suggestion.direct.clone().unwrap_or_default(),
            formula: suggestion.formula.clone().unwrap_or_default(),
        }
    }
}

/// Target field -> mapping, in target schema order. Serializes as a JSON
/// object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: Vec<(String, FieldMapping)>,
}

impl MappingTable {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldMapping)> {
        self.entries
            .iter()
            .map(|(name, mapping)| (name.as_str(), mapping))
    }

    pub fn mapped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, mapping)| mapping.is_mapped())
            .count()
    }
}

#[cfg(test)]
impl MappingTable {
    pub fn get(&self, target_field: &str) -> Option<&FieldMapping> {
        self.entries
            .iter()
            .find(|(name, _)| name == target_field)
            .map(|(_, mapping)| mapping)
    }
}

impl Serialize for MappingTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, mapping) in &self.entries {
            map.serialize_entry(name, mapping)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub table: MappingTable,
    /// Suggestions that named a target field outside the schema.
    pub discarded: usize,
    /// Accepted suggestions carrying both a direct field and a formula.
    pub ambiguous: usize,
}

/// Which supplier a table was produced for, kept alongside it for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierContext {
    #[serde(rename = "supplier")]
    pub label: String,
    pub supplier_fields: Vec<String>,
}

impl SupplierContext {
    pub fn new(label: impl Into<String>, supplier_fields: Vec<String>) -> Self {
        Self {
            label: label.into(),
            supplier_fields,
        }
    }

    /// Labels the supplier after its file name without extension.
    pub fn from_path(path: &Path, supplier_fields: Vec<String>) -> Self {
        let label = path
            .file_stem()
            .unwrap_or(path.as_os_str())
            .to_string_lossy()
            .into_owned();
        Self::new(label, supplier_fields)
    }
}

/// Removes one markdown code fence around the answer, with or without a
/// language tag, on one line or several.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    let body_start = rest
        .find(|c: char| c == '{' || c == '[' || c.is_whitespace())
        .unwrap_or(rest.len());
    rest.get(body_start..).unwrap_or_default().trim()
}

/// Parses the oracle's raw text into suggestions.
pub fn parse_suggestions(raw: &str) -> Result<Vec<MappingSuggestion>, OracleError> {
    let document: SuggestionDocument =
        serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
            OracleError::MalformedResponse(format!(
                "expected {{\"mappings\": [...]}}: {e}"
            ))
        })?;
    Ok(document.mappings)
}

/// Asks the oracle once and parses its answer. Fails with
/// `OracleError::Timeout` if the answer takes longer than `timeout`.
pub async fn request_suggestions(
    oracle: &dyn Oracle,
    payload: &RequestPayload,
    options: &CompletionOptions,
    timeout: Duration,
) -> Result<Vec<MappingSuggestion>, OracleError> {
    request_suggestions_until(
        oracle,
        payload,
        options,
        timeout,
        future::pending(),
    )
    .await
}

/// Like [`request_suggestions`], but gives up with `OracleError::Cancelled`
/// as soon as `cancel` resolves. Nothing is returned on cancellation.
pub async fn request_suggestions_until<F>(
    oracle: &dyn Oracle,
    payload: &RequestPayload,
    options: &CompletionOptions,
    timeout: Duration,
    cancel: F,
) -> Result<Vec<MappingSuggestion>, OracleError>
where
    F: Future<Output = ()> + Send,
{
    let call = oracle.complete(
        &payload.system_instruction,
        &payload.user_prompt,
        options,
    );

    let completed = tokio::select! {
        biased;
        () = cancel => return Err(OracleError::Cancelled),
        outcome = time::timeout(timeout, call) => outcome,
    };
    let raw = completed.map_err(|_| OracleError::Timeout(timeout))??;

    let suggestions = parse_suggestions(&raw)?;
    info!(count = suggestions.len(), "received mapping suggestions");
    Ok(suggestions)
}

/// Builds the complete table for `target_fields` from `suggestions`.
///
/// Every target starts unmapped. A suggestion for a known target replaces
/// its entry, so the last suggestion for a target wins. Suggestions for
/// unknown targets are dropped and counted in `discarded`.
pub fn normalize<S: AsRef<str>>(
    target_fields: &[S],
    suggestions: &[MappingSuggestion],
) -> Result<NormalizeOutcome, SchemaError> {
    if target_fields.is_empty() {
        return Err(SchemaError::EmptyTargetFields);
    }

    let mut entries: Vec<(String, FieldMapping)> = target_fields
        .iter()
        .map(|field| (field.as_ref().to_owned(), FieldMapping::default()))
        .collect();

    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (position, field) in target_fields.iter().enumerate() {
        positions.entry(field.as_ref()).or_insert(position);
    }

    let mut assigned = HashSet::new();
    let mut unknown: Vec<&str> = Vec::new();
    let mut ambiguous: usize = 0;

    for suggestion in suggestions {
        let name = suggestion.target_field.trim();
        let Some(&position) = positions.get(name) else {
            unknown.push(name);
            continue;
        };

        let mapping = FieldMapping::from(suggestion);
        if mapping.is_ambiguous() {
            ambiguous = ambiguous.saturating_add(1);
        }
        if !assigned.insert(position) {
            debug!(target_field = name, "later suggestion overrides earlier one");
        }
        if let Some(entry) = entries.get_mut(position) {
            entry.1 = mapping;
        }
    }

    if !unknown.is_empty() {
        warn!(
            discarded = unknown.len(),
            fields = ?unknown,
            "dropped suggestions for unknown target fields"
        );
    }
    if ambiguous > 0 {
        warn!(ambiguous, "suggestions set both direct and formula");
    }

    Ok(NormalizeOutcome {
        table: MappingTable { entries },
        discarded: unknown.len(),
        ambiguous,
    })
}

/// Target fields whose direct mapping names a field the supplier lacks.
pub fn unknown_direct_references(
    table: &MappingTable,
    supplier_fields: &[String],
) -> Vec<String> {
    let known: HashSet<&str> =
        supplier_fields.iter().map(String::as_str).collect();
    table
        .iter()
        .filter(|(_, mapping)| {
            !mapping.direct.is_empty() && !known.contains(mapping.direct.as_str())
        })
        .map(|(name, _)| name.to_owned())
        .collect()
}
