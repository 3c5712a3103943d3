//! Persistence for compiled artifacts
//!
//! Artifacts serialize to JSON; a page server recompiles on save and loads
//! the compiled form on every view. `MemoryStore` backs tests and embedders
//! with their own persistence, `DirStore` is the file-per-template layout the
//! CLI uses.

use crate::error::{Result, TemplateError};
use crate::types::CompiledTemplate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub trait TemplateStore {
    fn save(&mut self, id: &str, template: &CompiledTemplate) -> Result<()>;
    /// `Ok(None)` means the id has never been saved. Errors are reserved for
    /// actual storage failures (I/O, corrupt artifact, bad id).
    fn load(&self, id: &str) -> Result<Option<CompiledTemplate>>;
    fn ids(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    templates: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for MemoryStore {
    fn save(&mut self, id: &str, template: &CompiledTemplate) -> Result<()> {
        validate_id(id)?;
        let json = serde_json::to_string(template)
            .map_err(|e| TemplateError::invalid_format(e.to_string()))?;
        self.templates.insert(id.to_string(), json);
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<CompiledTemplate>> {
        match self.templates.get(id) {
            Some(json) => decode(json).map(Some),
            None => Ok(None),
        }
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.templates.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One `<id>.json` per template under a root directory.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateStore for DirStore {
    fn save(&mut self, id: &str, template: &CompiledTemplate) -> Result<()> {
        validate_id(id)?;
        let json = serde_json::to_string_pretty(template)
            .map_err(|e| TemplateError::invalid_format(e.to_string()))?;
        std::fs::write(self.path_for(id), json)?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<CompiledTemplate>> {
        validate_id(id)?;
        let json = match std::fs::read_to_string(self.path_for(id)) {
            Ok(json) => json,
            // Absent is not a failure; anything else (permissions, ...) is.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TemplateError::Io(e)),
        };
        decode(&json).map(Some)
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn decode(json: &str) -> Result<CompiledTemplate> {
    let template: CompiledTemplate = serde_json::from_str(json)
        .map_err(|e| TemplateError::invalid_format(format!("bad template artifact: {}", e)))?;
    if template.version != crate::types::ARTIFACT_VERSION {
        return Err(TemplateError::invalid_format(format!(
            "artifact version {} is not supported (expected {})",
            template.version,
            crate::types::ARTIFACT_VERSION
        )));
    }
    Ok(template)
}

// Ids become file names, so anything path-like is refused outright.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(TemplateError::invalid_format(format!(
            "invalid template id '{}'",
            id
        )))
    }
}
