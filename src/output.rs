use crate::pipeline::SupplierReport;
use clap::ValueEnum;
use csv::Writer;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One object per supplier with its ordered mapping table
    Json,
    /// One row per supplier and target field
    Csv,
}

pub fn write_json<W: Write>(
    writer: W,
    reports: &[SupplierReport],
) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(writer, reports)
}

pub fn write_csv<W: Write>(
    writer: W,
    reports: &[SupplierReport],
) -> Result<(), csv::Error> {
    let mut writer = Writer::from_writer(writer);

    writer.write_record(["supplier", "target_field", "direct", "formula"])?;

    for report in reports {
        for (target_field, mapping) in report.mappings.iter() {
            writer.write_record([
                report.context.label.as_str(),
                target_field,
                mapping.direct.as_str(),
                mapping.formula.as_str(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn write_to<W: Write>(
    mut writer: W,
    format: OutputFormat,
    reports: &[SupplierReport],
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            write_json(&mut writer, reports)?;
            writeln!(writer)?;
        }
        OutputFormat::Csv => write_csv(&mut writer, reports)?,
    }
    writer.flush()
}

/// Writes to `path`, or to stdout when no path is given.
pub fn write_reports(
    path: Option<&Path>,
    format: OutputFormat,
    reports: &[SupplierReport],
) -> io::Result<()> {
    match path {
        Some(path) => write_to(File::create(path)?, format, reports),
        None => write_to(io::stdout().lock(), format, reports),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingSuggestion, SupplierContext, normalize};
    use std::fs;

    fn report() -> SupplierReport {
        let suggestions = vec![
            MappingSuggestion {
                target_field: "product_id".to_owned(),
                direct: Some("PRODUCTCODE".to_owned()),
                formula: None,
            },
            MappingSuggestion {
                target_field: "is_available".to_owned(),
                direct: None,
                formula: Some("isStocked === \"YES\"".to_owned()),
            },
        ];
        let outcome =
            normalize(&["product_id", "is_available", "price"], &suggestions)
                .unwrap();

        SupplierReport {
            context: SupplierContext::new(
                "acme",
                vec!["PRODUCTCODE".to_owned(), "isStocked".to_owned()],
            ),
            discarded: outcome.discarded,
            ambiguous: outcome.ambiguous,
            unknown_direct: Vec::new(),
            mappings: outcome.table,
        }
    }

    #[test]
    fn test_csv_output() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[report()]).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "supplier,target_field,direct,formula",
                "acme,product_id,PRODUCTCODE,",
                "acme,is_available,,\"isStocked === \"\"YES\"\"\"",
                "acme,price,,",
            ]
        );
    }

    #[test]
    fn test_json_output_keeps_target_order() {
        let mut buffer = Vec::new();
        write_json(&mut buffer, &[report()]).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let product = text.find("\"product_id\"").unwrap();
        let available = text.find("\"is_available\"").unwrap();
        let price = text.find("\"price\"").unwrap();
        assert!(product < available && available < price);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["supplier"], "acme");
        assert_eq!(
            value[0]["mappings"]["is_available"]["formula"],
            "isStocked === \"YES\""
        );
    }

    #[test]
    fn test_write_reports_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.csv");

        write_reports(Some(&path), OutputFormat::Csv, &[report()]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written.lines().next(),
            Some("supplier,target_field,direct,formula")
        );
        assert_eq!(written.lines().count(), 4);
    }
}
