use anyhow::{Context, Result, bail};
use blake3::Hasher;
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct LanguageFilter {
    pub name: &'static str,
    pub languages: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

static LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        name: "python",
        extensions: &["py", "pyi"],
    },
    LanguageSpec {
        name: "rust",
        extensions: &["rs"],
    },
    LanguageSpec {
        name: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageSpec {
        name: "typescript",
        extensions: &["ts", "mts", "cts"],
    },
    LanguageSpec {
        name: "tsx",
        extensions: &["tsx"],
    },
    LanguageSpec {
        name: "go",
        extensions: &["go"],
    },
    LanguageSpec {
        name: "csharp",
        extensions: &["cs", "csx"],
    },
];

static LANGUAGE_FILTERS: &[LanguageFilter] = &[
    LanguageFilter {
        name: "python",
        languages: &["python"],
    },
    LanguageFilter {
        name: "py",
        languages: &["python"],
    },
    LanguageFilter {
        name: "rust",
        languages: &["rust"],
    },
    LanguageFilter {
        name: "rs",
        languages: &["rust"],
    },
    LanguageFilter {
        name: "javascript",
        languages: &["javascript"],
    },
    LanguageFilter {
        name: "js",
        languages: &["javascript"],
    },
    LanguageFilter {
        name: "node",
        languages: &["javascript"],
    },
    LanguageFilter {
        name: "typescript",
        languages: &["typescript", "tsx"],
    },
    LanguageFilter {
        name: "ts",
        languages: &["typescript", "tsx"],
    },
    LanguageFilter {
        name: "tsx",
        languages: &["tsx"],
    },
    LanguageFilter {
        name: "go",
        languages: &["go"],
    },
    LanguageFilter {
        name: "golang",
        languages: &["go"],
    },
    LanguageFilter {
        name: "csharp",
        languages: &["csharp"],
    },
    LanguageFilter {
        name: "c#",
        languages: &["csharp"],
    },
    LanguageFilter {
        name: "cs",
        languages: &["csharp"],
    },
    LanguageFilter {
        name: "dotnet",
        languages: &["csharp"],
    },
];

pub fn language_specs() -> &'static [LanguageSpec] {
    LANGUAGE_SPECS
}

/// Expand a user-facing language tag ("py", "golang", "c#") into canonical
/// language names, or fail with the unsupported-language precondition.
pub fn expand_language_filter(raw: &str) -> Result<Vec<String>> {
    let key = raw.trim().to_ascii_lowercase();
    let Some(filter) = LANGUAGE_FILTERS.iter().find(|entry| entry.name == key) else {
        bail!(crate::error::EngineError::UnsupportedLanguage(
            raw.to_string()
        ));
    };
    Ok(filter.languages.iter().map(|s| s.to_string()).collect())
}

/// Enumerate source files for the requested languages under the project
/// root. Output is sorted by relative path so downstream order never
/// depends on directory-walk order.
pub fn scan_project(
    project_root: &Path,
    languages: &[String],
    options: ScanOptions,
) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(project_root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let language = match detect_language(path) {
            Some(value) if languages.iter().any(|lang| lang == value) => value,
            _ => continue,
        };
        let rel_path = crate::util::normalize_rel_path(project_root, path)?;
        let hash = hash_file(path).with_context(|| format!("hash {}", path.display()))?;
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            hash,
            language: language.to_string(),
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// Digest over the sorted per-file hashes; stable for identical trees.
pub fn project_digest(files: &[ScannedFile]) -> String {
    let mut hasher = Hasher::new();
    for file in files {
        hasher.update(file.rel_path.as_bytes());
        hasher.update(file.hash.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    entry.file_name() == OsStr::new(".git")
}

fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    for spec in LANGUAGE_SPECS {
        if spec.extensions.iter().any(|candidate| *candidate == ext) {
            return Some(spec.name);
        }
    }
    None
}

fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Hasher::new();
    hasher.update(&data);
    Ok(hasher.finalize().to_hex().to_string())
}

/// Path heuristics for test files: a `tests/` directory component, or a
/// stem with a test_/spec prefix or suffix. Used by the coverage proxy.
pub fn is_test_path(rel_path: &str) -> bool {
    let lower = rel_path.to_ascii_lowercase();
    if lower
        .split('/')
        .any(|part| part == "tests" || part == "test" || part == "__tests__" || part == "spec")
    {
        return true;
    }
    let file = lower.rsplit('/').next().unwrap_or(&lower);
    let stem = file.split('.').next().unwrap_or(file);
    stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
        || file.contains(".test.")
        || file.contains(".spec.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_supported_extensions() {
        assert_eq!(detect_language(Path::new("a/b.py")), Some("python"));
        assert_eq!(detect_language(Path::new("a/b.rs")), Some("rust"));
        assert_eq!(detect_language(Path::new("a/b.ts")), Some("typescript"));
        assert_eq!(detect_language(Path::new("a/b.tsx")), Some("tsx"));
        assert_eq!(detect_language(Path::new("a/b.txt")), None);
    }

    #[test]
    fn filter_expansion_accepts_aliases() {
        assert_eq!(expand_language_filter("golang").unwrap(), vec!["go"]);
        assert_eq!(expand_language_filter("C#").unwrap(), vec!["csharp"]);
        assert!(expand_language_filter("cobol").is_err());
    }

    #[test]
    fn test_path_heuristics() {
        assert!(is_test_path("tests/test_auth.py"));
        assert!(is_test_path("src/auth_test.go"));
        assert!(is_test_path("src/auth.test.ts"));
        assert!(is_test_path("src/__tests__/auth.js"));
        assert!(!is_test_path("src/auth.py"));
        assert!(!is_test_path("src/contest.py"));
    }

    #[test]
    fn digest_changes_with_content_hash() {
        let base = vec![ScannedFile {
            rel_path: "a.py".to_string(),
            abs_path: PathBuf::from("a.py"),
            hash: "aaa".to_string(),
            language: "python".to_string(),
        }];
        let mut changed = base.clone();
        changed[0].hash = "bbb".to_string();
        assert_ne!(project_digest(&base), project_digest(&changed));
    }
}
