use crate::error::{LoadError, SchemaError};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const TARGET_LIST: &str = "target";
pub const SUPPLIER_LIST: &str = "supplier";

/// A field of the fixed destination schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetField {
    pub name: String,
    pub description: Option<String>,
}

#[cfg(test)]
impl TargetField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl AsRef<str> for TargetField {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl<'de> Deserialize<'de> for TargetField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawTargetField {
            field_name: String,
            #[serde(default)]
            description: Option<String>,
        }

        let raw = RawTargetField::deserialize(deserializer)?;

        let description = raw
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            name: raw.field_name.trim().to_owned(),
            description,
        })
    }
}

/// Checks the per-list invariants: every name non-empty, no name twice.
pub fn validate_field_names<'a, I>(
    list: &'static str,
    names: I,
) -> Result<(), SchemaError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();

    for (index, name) in names.into_iter().enumerate() {
        if name.trim().is_empty() {
            return Err(SchemaError::EmptyFieldName {
                list,
                position: index.saturating_add(1),
            });
        }
        if !seen.insert(name) {
            return Err(SchemaError::DuplicateField {
                list,
                name: name.to_owned(),
            });
        }
    }

    Ok(())
}

pub fn validate_target_fields<S: AsRef<str>>(
    fields: &[S],
) -> Result<(), SchemaError> {
    if fields.is_empty() {
        return Err(SchemaError::EmptyTargetFields);
    }
    validate_field_names(TARGET_LIST, fields.iter().map(AsRef::as_ref))
}

pub fn parse_target_csv(
    csv_content: &str,
    path: &Path,
) -> Result<Vec<TargetField>, LoadError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::Headers)
        .from_reader(csv_content.as_bytes());

    let has_name_column = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .any(|h| h == "field_name");
    if !has_name_column {
        return Err(LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: "field_name",
        });
    }

    let fields = reader
        .deserialize()
        .collect::<Result<Vec<TargetField>, _>>()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    validate_target_fields(&fields).map_err(|source| LoadError::Schema {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(fields)
}

/// Supplier field names are the header row of the supplier's data file.
pub fn parse_supplier_headers(
    csv_content: &str,
    delimiter: u8,
    path: &Path,
) -> Result<Vec<String>, LoadError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(csv_content.as_bytes());

    let fields: Vec<String> = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    validate_field_names(SUPPLIER_LIST, fields.iter().map(String::as_str))
        .map_err(|source| LoadError::Schema {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(fields)
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_target_fields(path: &Path) -> Result<Vec<TargetField>, LoadError> {
    parse_target_csv(&read_file(path)?, path)
}

pub fn load_supplier_fields(
    path: &Path,
    delimiter: u8,
) -> Result<Vec<String>, LoadError> {
    parse_supplier_headers(&read_file(path)?, delimiter, path)
}
