use crate::error::LoadError;
use std::fs;
use std::path::Path;

/// One business-rule hint per line. Blank lines and `#` comments are skipped.
pub fn parse_hints(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Hints from the optional file first, then the ones given on the command line.
pub fn collect_hints(
    hints_file: Option<&Path>,
    inline: &[String],
) -> Result<Vec<String>, LoadError> {
    let mut hints = match hints_file {
        Some(path) => {
            let content =
                fs::read_to_string(path).map_err(|source| LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            parse_hints(&content)
        }
        None => Vec::new(),
    };

    hints.extend(
        inline
            .iter()
            .map(|hint| hint.trim())
            .filter(|hint| !hint.is_empty())
            .map(str::to_owned),
    );

    Ok(hints)
}
