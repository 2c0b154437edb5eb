//! Lineage store: reading and writing every document the engine consumes.
//!
//! All I/O goes through `ctx.fs`. Registry, annotation, sidecar and policy
//! documents are YAML or JSON (JSON is read by the YAML parser). Artifacts
//! are always JSON.

use std::path::Path;

use serde::Deserialize;

use crate::artifact;
use crate::context::ServiceContext;
use crate::error::LineageError;
use crate::model::{Flow, LineageArtifact, System, SystemRegistry};
use crate::normalize::{AnnotationDocument, Sidecar};

/// Persistence layer for lineage documents.
pub struct LineageStore<'a> {
    ctx: &'a ServiceContext,
}

/// A registry file: either a document with `systems`/`flows` or a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum SystemsDocument {
    List(Vec<System>),
    Document {
        #[serde(default)]
        systems: Vec<System>,
        #[serde(default)]
        flows: Vec<Flow>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlowsDocument {
    List(Vec<Flow>),
    Document { flows: Vec<Flow> },
}

impl<'a> LineageStore<'a> {
    /// Creates a store over the context's filesystem.
    #[must_use]
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Reads a file as text.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Read`] if the file cannot be read.
    pub fn read(&self, path: &Path) -> Result<String, LineageError> {
        self.ctx.fs.read_to_string(path).map_err(|e| LineageError::read(path, e))
    }

    /// Writes text to a file.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::Write`] if the write fails.
    pub fn write(&self, path: &Path, contents: &str) -> Result<(), LineageError> {
        self.ctx.fs.write(path, contents).map_err(|e| LineageError::write(path, e))
    }

    /// Loads an artifact JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not an artifact.
    pub fn load_artifact(&self, path: &Path) -> Result<LineageArtifact, LineageError> {
        let contents = self.read(path)?;
        let artifact: LineageArtifact = serde_json::from_str(&contents)
            .map_err(|e| LineageError::parse(format!("artifact {}", path.display()), e))?;
        tracing::debug!(path = %path.display(), fields = artifact.fields.len(), "loaded artifact");
        Ok(artifact)
    }

    /// Writes an artifact in its deterministic export form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save_artifact(&self, path: &Path, artifact: &LineageArtifact) -> Result<(), LineageError> {
        self.write(path, &artifact::to_json(artifact)?)
    }

    /// Loads the system registry and an optional separate flow catalog.
    ///
    /// Flows from the catalog file are appended to any flows embedded in the
    /// registry document. Missing paths yield an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is unreadable, malformed or contains
    /// duplicate ids.
    pub fn load_registry(
        &self,
        systems_path: Option<&Path>,
        flows_path: Option<&Path>,
    ) -> Result<SystemRegistry, LineageError> {
        let (systems, mut flows) = match systems_path {
            Some(path) => match self.parse_yaml::<SystemsDocument>(path, "system registry")? {
                SystemsDocument::Document { systems, flows } => (systems, flows),
                SystemsDocument::List(systems) => (systems, Vec::new()),
            },
            None => (Vec::new(), Vec::new()),
        };
        if let Some(path) = flows_path {
            match self.parse_yaml::<FlowsDocument>(path, "flow catalog")? {
                FlowsDocument::Document { flows: extra } | FlowsDocument::List(extra) => {
                    flows.extend(extra);
                }
            }
        }
        SystemRegistry::new(systems, flows)
    }

    /// Loads an adapter annotation file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or malformed.
    pub fn load_annotations(&self, path: &Path) -> Result<AnnotationDocument, LineageError> {
        self.parse_yaml(path, "annotations")
    }

    /// Loads a sidecar. Without an explicit `dir`, it anchors at the
    /// directory containing the sidecar file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or malformed.
    pub fn load_sidecar(&self, path: &Path) -> Result<Sidecar, LineageError> {
        let mut sidecar: Sidecar = self.parse_yaml(path, "sidecar")?;
        if sidecar.dir.trim().is_empty() {
            sidecar.dir = path
                .parent()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
        }
        Ok(sidecar)
    }

    /// Reads a YAML (or JSON) document into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or does not match `T`.
    pub fn parse_yaml<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
        what: &str,
    ) -> Result<T, LineageError> {
        let contents = self.read(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| LineageError::parse(format!("{what} {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixed::FixedClock;
    use crate::adapters::memory::MemoryFileSystem;
    use chrono::NaiveDate;

    fn make_test_context(fs: MemoryFileSystem) -> ServiceContext {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        ServiceContext::new(Box::new(FixedClock::on(today)), Box::new(fs))
    }

    #[test]
    fn save_and_load_artifact_round_trips() {
        let ctx = make_test_context(MemoryFileSystem::new());
        let store = LineageStore::new(&ctx);
        let artifact = LineageArtifact::empty();
        store.save_artifact(Path::new("/out/lineage.json"), &artifact).unwrap();
        assert_eq!(store.load_artifact(Path::new("/out/lineage.json")).unwrap(), artifact);
    }

    #[test]
    fn malformed_artifact_is_a_parse_error() {
        let fs = MemoryFileSystem::new().with_file("/a.json", "{not json");
        let ctx = make_test_context(fs);
        let err = LineageStore::new(&ctx).load_artifact(Path::new("/a.json")).unwrap_err();
        assert!(matches!(err, LineageError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let ctx = make_test_context(MemoryFileSystem::new());
        let err = LineageStore::new(&ctx).load_artifact(Path::new("/nope.json")).unwrap_err();
        assert!(matches!(err, LineageError::Read { .. }));
    }

    #[test]
    fn registry_accepts_list_and_separate_flow_catalog() {
        let fs = MemoryFileSystem::new()
            .with_file("/systems.yaml", "- id: ledger-service\n  owner_team: team.ledger\n  flows: [settlement]\n")
            .with_file("/flows.json", r#"{"flows":[{"id":"settlement","level":2}]}"#);
        let ctx = make_test_context(fs);
        let registry = LineageStore::new(&ctx)
            .load_registry(Some(Path::new("/systems.yaml")), Some(Path::new("/flows.json")))
            .unwrap();
        assert_eq!(registry.systems.len(), 1);
        assert_eq!(registry.flows[0].id, "settlement");
    }

    #[test]
    fn sidecar_anchors_at_its_directory() {
        let fs = MemoryFileSystem::new().with_file("svc/api/lineage.yaml", "defaults:\n  owner: team.api\n");
        let ctx = make_test_context(fs);
        let sidecar = LineageStore::new(&ctx).load_sidecar(Path::new("svc/api/lineage.yaml")).unwrap();
        assert_eq!(sidecar.dir, "svc/api");
    }
}
