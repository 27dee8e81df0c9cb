use std::path::PathBuf;
use thiserror::Error;

/// Request-level failures. Everything here aborts the whole analysis; all
/// other problems (per-file parse failures, orphaned foreign keys, truncated
/// cycle searches) degrade into diagnostics on the report instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("project path does not exist or is not a directory: {0}")]
    BadProjectPath(PathBuf),

    #[error("no '{language}' source files found under {path}")]
    EmptyProject { language: String, path: PathBuf },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("unsupported database dialect: {0}")]
    UnsupportedDialect(String),

    #[error("unknown change type: {0} (expected modify|add|delete|refactor)")]
    UnknownChangeType(String),
}
