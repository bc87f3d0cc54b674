//! Document loading from local files.
//!
//! JSON and YAML by file suffix; the loader performs no interpretation —
//! parsed trees are handed to the identity registry as-is. Network
//! fetching is deliberately unsupported: every document must be supplied
//! locally.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;

/// Load a parsed tree from a file path, choosing the parser from the
/// suffix (`.json`, `.yaml`, `.yml`; anything else is an error).
pub fn load_file(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml")
        .to_ascii_lowercase();
    match extension.as_str() {
        "json" => load_json_str(&content, path),
        "yaml" | "yml" => load_yaml_str(&content, path),
        other => Err(LoadError::UnsupportedFileType {
            path: path.to_path_buf(),
            extension: other.to_string(),
        }),
    }
}

pub fn load_json_str(content: &str, path: &Path) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_yaml_str(content: &str, path: &Path) -> Result<Value, LoadError> {
    // Going through serde_json::Value keeps one tree type everywhere.
    serde_yaml::from_str(content).map_err(|source| LoadError::InvalidYaml {
        path: path.to_path_buf(),
        source,
    })
}

/// `file:` URL for a local path, used as the retrieval location.
pub fn file_url(path: &Path) -> Result<String, LoadError> {
    let canonical = path.canonicalize().map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    url::Url::from_file_path(&canonical)
        .map(|u| u.to_string())
        .map_err(|_| LoadError::FileNotFound {
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_json_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        writeln!(file, r#"{{"openapi": "3.0.3"}}"#).unwrap();
        let tree = load_file(file.path()).unwrap();
        assert_eq!(tree["openapi"], "3.0.3");
    }

    #[test]
    fn load_yaml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "openapi: 3.0.3\ninfo:\n  title: t").unwrap();
        let tree = load_file(file.path()).unwrap();
        assert_eq!(tree["info"]["title"], "t");
    }

    #[test]
    fn missing_file_reported() {
        let result = load_file(Path::new("/nonexistent/openapi.yaml"));
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn invalid_json_reported() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        writeln!(file, "not json").unwrap();
        let result = load_file(file.path());
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn unsupported_suffix_reported() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "a = 1").unwrap();
        let result = load_file(file.path());
        assert!(matches!(result, Err(LoadError::UnsupportedFileType { .. })));
    }

    #[test]
    fn file_url_is_absolute() {
        let file = NamedTempFile::new().unwrap();
        let url = file_url(file.path()).unwrap();
        assert!(url.starts_with("file:///"));
    }
}
