//! YAML document loading with an absent-on-failure contract.
//!
//! Callers get `None` for a missing file and for a malformed one alike; the
//! cause is logged at critical severity and never raised.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Problem opening {}: File was not found", .0.display())]
    NotFound(PathBuf),
    #[error("Problem opening {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Problem parsing {} as YAML: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub struct DocumentLoader;

impl DocumentLoader {
    /// Parse `path` into a generic YAML value.
    pub fn parse(path: impl AsRef<Path>) -> Option<serde_yaml::Value> {
        Self::parse_as(path)
    }

    /// Parse `path` into `T`. A document that is valid YAML but does not fit
    /// `T` counts as malformed.
    pub fn parse_as<T: DeserializeOwned>(path: impl AsRef<Path>) -> Option<T> {
        match Self::try_parse(path.as_ref()) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::error!(critical = true, "{e}");
                None
            }
        }
    }

    /// The fallible form, for callers that want the cause.
    pub fn try_parse<T: DeserializeOwned>(path: &Path) -> Result<T, DocumentError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DocumentError::NotFound(path.to_path_buf())
            } else {
                DocumentError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let doc = serde_yaml::from_str(&text).map_err(|source| DocumentError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Parsed '{}'", path.display());
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
