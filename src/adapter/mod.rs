use crate::error::EngineError;
use crate::model::{EdgeKind, UnitKind};
use anyhow::{Result, bail};
use std::collections::HashMap;

pub mod csharp;
pub mod go;
pub mod javascript;
pub mod python;
pub mod rust;

#[derive(Debug, Clone)]
pub struct UnitInput {
    pub kind: UnitKind,
    pub name: String,
    pub qualname: String,
    pub start_line: i64,
    pub end_line: i64,
}

impl UnitInput {
    pub fn line_count(&self) -> i64 {
        (self.end_line - self.start_line + 1).max(1)
    }
}

/// A dependency observed in one file. `target_qualname` is the adapter's
/// best-effort candidate; the graph builder resolves it against the merged
/// unit map and falls back to a synthetic external node when nothing in the
/// project matches.
#[derive(Debug, Clone)]
pub struct EdgeInput {
    pub kind: EdgeKind,
    pub source_qualname: String,
    pub target_qualname: String,
}

#[derive(Debug, Default)]
pub struct ExtractedFile {
    pub units: Vec<UnitInput>,
    pub edges: Vec<EdgeInput>,
}

/// Per-language extraction contract. Best-effort syntactic extraction: the
/// adapter identifies declared unit boundaries and textual call/import
/// references; it does not type-check. A parse failure on one file returns
/// an error that the builder converts into a diagnostic, never an abort.
pub trait LanguageAdapter {
    fn module_name_from_rel_path(&self, rel_path: &str) -> String;
    fn extract(&mut self, source: &str, module_name: &str) -> Result<ExtractedFile>;
}

/// Registered-adapter table keyed by canonical language name. Workers hold
/// their own registry because tree-sitter parsers require `&mut self`.
pub struct AdapterRegistry {
    adapters: HashMap<String, Box<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    pub fn with_defaults() -> Result<Self> {
        let mut adapters: HashMap<String, Box<dyn LanguageAdapter>> = HashMap::new();
        adapters.insert("python".into(), Box::new(python::PythonAdapter::new()?));
        adapters.insert("rust".into(), Box::new(rust::RustAdapter::new()?));
        adapters.insert(
            "javascript".into(),
            Box::new(javascript::JavascriptAdapter::new()?),
        );
        adapters.insert(
            "typescript".into(),
            Box::new(javascript::TypescriptAdapter::new()?),
        );
        adapters.insert("tsx".into(), Box::new(javascript::TsxAdapter::new()?));
        adapters.insert("go".into(), Box::new(go::GoAdapter::new()?));
        adapters.insert("csharp".into(), Box::new(csharp::CSharpAdapter::new()?));
        Ok(Self { adapters })
    }

    pub fn register(&mut self, language: &str, adapter: Box<dyn LanguageAdapter>) {
        self.adapters.insert(language.to_string(), adapter);
    }

    pub fn for_language(&mut self, language: &str) -> Result<&mut Box<dyn LanguageAdapter>> {
        match self.adapters.get_mut(language) {
            Some(adapter) => Ok(adapter),
            None => bail!(EngineError::UnsupportedLanguage(language.to_string())),
        }
    }

    pub fn supports(&self, language: &str) -> bool {
        self.adapters.contains_key(language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_all_scanned_languages() {
        let registry = AdapterRegistry::with_defaults().unwrap();
        for spec in crate::scan::language_specs() {
            assert!(
                registry.supports(spec.name),
                "no adapter registered for {}",
                spec.name
            );
        }
    }

    #[test]
    fn unknown_language_is_a_capability_error() {
        let mut registry = AdapterRegistry::with_defaults().unwrap();
        let err = registry.for_language("cobol").err().unwrap();
        assert!(err.to_string().contains("unsupported language"));
    }
}
