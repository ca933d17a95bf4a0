//! Opinion corpus loading.
//!
//! The input is a CSV file with at least `id` and `comment` columns; any
//! other column is ignored. Ids must be present and unique.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use divcon_common::{Error, Result, ResultExt};

use crate::model::Opinion;

const ID_COLUMN: &str = "id";
const COMMENT_COLUMN: &str = "comment";
const UTF8_BOM: &str = "\u{feff}";

/// Load opinions from a CSV file.
pub fn load_opinions(path: &Path) -> Result<Vec<Opinion>> {
    let file = std::fs::File::open(path)
        .context(format!("Failed to open opinions file {}", path.display()))?;
    let opinions = parse_opinions(file).context(format!("Failed to load {}", path.display()))?;

    tracing::info!(path = %path.display(), count = opinions.len(), "Loaded opinions");
    Ok(opinions)
}

/// Parse opinions from CSV content. Row order is preserved.
pub fn parse_opinions<R: Read>(reader: R) -> Result<Vec<Opinion>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches(UTF8_BOM).trim() == name)
            .ok_or_else(|| Error::InvalidInput(format!("missing '{name}' column")))
    };
    let id_idx = column(ID_COLUMN)?;
    let comment_idx = column(COMMENT_COLUMN)?;

    let mut seen = HashSet::new();
    let mut opinions = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = row + 2;

        let id = record.get(id_idx).map(str::trim).unwrap_or_default();
        if id.is_empty() {
            return Err(Error::InvalidInput(format!("line {line}: empty id")));
        }
        if !seen.insert(id.to_string()) {
            return Err(Error::InvalidInput(format!("line {line}: duplicate id {id}")));
        }

        let comment = record.get(comment_idx).unwrap_or_default();
        opinions.push(Opinion::new(id, comment));
    }

    Ok(opinions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_with_extra_columns_and_bom() {
        let csv = "\u{feff}id,author,comment\n1,anna,More trains\n2,ben,\"Fewer cars, more bikes\"\n";
        let opinions = parse_opinions(csv.as_bytes()).unwrap();

        assert_eq!(opinions.len(), 2);
        assert_eq!(opinions[0].id, "1");
        assert_eq!(opinions[1].comment, "Fewer cars, more bikes");
        assert!(opinions.iter().all(|o| o.topic_id.is_none()));
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let err = parse_opinions("id,text\n1,hello\n".as_bytes()).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("'comment'"));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let err = parse_opinions("id,comment\n7,a\n8,b\n7,c\n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: line 4: duplicate id 7");
    }

    #[test]
    fn test_empty_id_is_rejected() {
        let err = parse_opinions("id,comment\n ,a\n".as_bytes()).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "comment,id").unwrap();
        writeln!(file, "Lower taxes,a1").unwrap();

        let opinions = load_opinions(file.path()).unwrap();
        assert_eq!(opinions, vec![Opinion::new("a1", "Lower taxes")]);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = load_opinions(Path::new("/nonexistent/opinions.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open opinions file"));
        assert!(!err.is_invalid_input());
    }
}
