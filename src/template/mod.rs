//! CloudFormation template synthesis
//!
//! Renders a [`ResourceGraph`](crate::graph::ResourceGraph) into the JSON
//! template consumed by the provisioning engine. Rendering is deterministic:
//! the same graph always produces byte-identical output.

pub mod assertions;
pub mod logical_id;
pub mod synth;

pub use assertions::{object_like, Template};
pub use logical_id::logical_id;
pub use synth::{render, SynthOptions};

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::graph::GraphError;

/// Serialize a rendered template for output
pub fn to_string_pretty(template: &Value) -> Result<String, TemplateError> {
    Ok(serde_json::to_string_pretty(template)?)
}

/// Write a rendered template to `path`
pub fn write_to(path: impl AsRef<Path>, template: &Value) -> Result<(), TemplateError> {
    let path = path.as_ref();
    let contents = to_string_pretty(template)?;
    std::fs::write(path, contents).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Wrote template");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Duplicate logical ID: {0}")]
    DuplicateLogicalId(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        let template = json!({ "Resources": { "T": { "Type": "AWS::SNS::Topic" } } });

        write_to(&path, &template).unwrap();
        let parsed: Template = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        assert!(parsed.resource_count_is("AWS::SNS::Topic", 1));
    }

    #[test]
    fn test_write_to_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_to(dir.path().join("no/such/dir.json"), &json!({}));
        assert!(matches!(result, Err(TemplateError::Io { .. })));
    }
}
