use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::EngineError;

const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.txt");

/// Opaque text listing the metrics and columns the assistant may talk about.
/// Embedded verbatim in prompts; never parsed.
#[derive(Clone, Debug)]
pub struct Catalog(Arc<str>);

impl Catalog {
    pub fn builtin() -> Self {
        Self(Arc::from(BUILTIN_CATALOG))
    }

    pub fn from_text(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Read a replacement catalog. The file is used as-is.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        debug!(?path, bytes = text.len(), "loaded catalog");
        Ok(Self::from_text(text))
    }

    /// `path` when given, the built-in list otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, EngineError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lists_known_metrics() {
        let c = Catalog::builtin();
        assert!(c.as_str().starts_with("\"merged_metadata\""));
        assert!(c.as_str().contains("\"profit\""));
        assert!(c.as_str().contains("\"markup amount\""));
    }

    #[test]
    fn file_replaces_builtin_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.txt");
        std::fs::write(&path, "metrics: margin, churn\n").unwrap();
        let c = Catalog::load_or_builtin(Some(&path)).unwrap();
        assert_eq!(c.as_str(), "metrics: margin, churn\n");
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::load(&dir.path().join("absent.txt")).unwrap_err();
        assert!(err.is_configuration());
    }
}
