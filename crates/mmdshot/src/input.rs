//! Batch document loading.

use std::io::Read;
use std::path::Path;

use crate::error::CliError;

/// Path argument meaning "read from stdin".
const STDIN_PATH: &str = "-";

/// Read a raw batch document from `path`, or stdin for `-`.
pub(crate) fn read_batch(path: &Path) -> Result<serde_json::Value, CliError> {
    let text = if path.as_os_str() == STDIN_PATH {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to read {}: {e}", path.display()))
        })?
    };
    parse_batch(&text)
}

fn parse_batch(text: &str) -> Result<serde_json::Value, CliError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_read_batch_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("batch.json");
        std::fs::write(&path, r#"{"mmd": [{"code": "graph TD"}]}"#).unwrap();

        let value = read_batch(&path).unwrap();

        assert_eq!(value, serde_json::json!({"mmd": [{"code": "graph TD"}]}));
    }

    #[test]
    fn test_read_batch_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");

        let err = read_batch(&path).unwrap_err();

        assert!(matches!(err, CliError::Io(_)));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_parse_batch_invalid_json() {
        let err = parse_batch("{\"mmd\": [").unwrap_err();
        assert!(matches!(err, CliError::Json(_)));
        assert!(err.to_string().starts_with("invalid batch JSON"));
    }
}
