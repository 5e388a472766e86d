use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::TaskError;

/// Which concrete loadable form a handler module takes.
///
/// `Yaml` modules must be compiled into the canonical manifest form before
/// the execution context may run them; `Json` modules load as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    Yaml,
    Json,
}

/// A handler module resolved to a concrete file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub path: PathBuf,
    pub format: ModuleFormat,
}

/// The canonical form of a handler module: which registered handler to
/// run, plus optional argument defaults merged beneath the caller's own.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleManifest {
    pub handler: String,
    #[serde(default)]
    pub defaults: Option<Value>,
}

/// Probe order: compiled flavor first, then the plain flavor.
const STRATEGIES: &[(ModuleFormat, &str)] = &[(ModuleFormat::Yaml, "yaml"), (ModuleFormat::Json, "json")];

/// Resolve a base path to a concrete module variant.
///
/// Tries each `(format, extension)` strategy in priority order and returns
/// the first file that exists. A base path matching no strategy is an
/// explicit `SourceNotFound` error, never a silent fallback.
pub async fn resolve(base: &Path) -> Result<ResolvedModule, TaskError> {
    for (format, extension) in STRATEGIES {
        let candidate = with_extension(base, extension);
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            debug!(path = %candidate.display(), format = ?format, "resolved handler module");
            return Ok(ResolvedModule {
                path: candidate,
                format: *format,
            });
        }
    }
    Err(TaskError::SourceNotFound(base.display().to_string()))
}

/// Load a resolved module and compile it into its canonical manifest form.
///
/// The YAML flavor goes through a parse-and-validate step here, before any
/// context is spawned; the JSON flavor is read directly. Both end in the
/// same validation.
pub async fn load_manifest(module: &ResolvedModule) -> Result<ModuleManifest, TaskError> {
    let raw = tokio::fs::read(&module.path).await?;
    let manifest: ModuleManifest = match module.format {
        ModuleFormat::Yaml => serde_yaml::from_slice(&raw)?,
        ModuleFormat::Json => serde_json::from_slice(&raw)?,
    };
    validate(&manifest, &module.path)?;
    Ok(manifest)
}

fn validate(manifest: &ModuleManifest, path: &Path) -> Result<(), TaskError> {
    if manifest.handler.trim().is_empty() {
        return Err(TaskError::Manifest {
            path: path.display().to_string(),
            reason: "handler name is empty".to_string(),
        });
    }
    if let Some(defaults) = &manifest.defaults {
        if !defaults.is_object() {
            return Err(TaskError::Manifest {
                path: path.display().to_string(),
                reason: "defaults must be a mapping".to_string(),
            });
        }
    }
    Ok(())
}

// Appends rather than replaces: `fib.v2` must probe `fib.v2.yaml`.
fn with_extension(base: &Path, extension: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn yaml_takes_priority_over_json() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "task.yaml", "handler: sum\n");
        write(dir.path(), "task.json", r#"{"handler": "sum"}"#);

        let module = resolve(&dir.path().join("task")).await.unwrap();
        assert_eq!(module.format, ModuleFormat::Yaml);
        assert_eq!(module.path, dir.path().join("task.yaml"));
    }

    #[tokio::test]
    async fn falls_through_to_json() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "task.json", r#"{"handler": "sum"}"#);

        let module = resolve(&dir.path().join("task")).await.unwrap();
        assert_eq!(module.format, ModuleFormat::Json);
    }

    #[tokio::test]
    async fn missing_module_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, TaskError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn dotted_base_names_keep_their_stem() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fib.v2.yaml", "handler: fib\n");

        let module = resolve(&dir.path().join("fib.v2")).await.unwrap();
        assert_eq!(module.path, dir.path().join("fib.v2.yaml"));
    }

    #[tokio::test]
    async fn yaml_manifest_compiles() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "task.yaml", "handler: sum\ndefaults:\n  b: 7\n");

        let module = resolve(&dir.path().join("task")).await.unwrap();
        let manifest = load_manifest(&module).await.unwrap();
        assert_eq!(manifest.handler, "sum");
        assert_eq!(manifest.defaults.unwrap()["b"], 7);
    }

    #[tokio::test]
    async fn empty_handler_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "task.yaml", "handler: ''\n");

        let module = resolve(&dir.path().join("task")).await.unwrap();
        let err = load_manifest(&module).await.unwrap_err();
        assert!(matches!(err, TaskError::Manifest { .. }));
    }

    #[tokio::test]
    async fn scalar_defaults_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "task.yaml", "handler: sum\ndefaults: 3\n");

        let module = resolve(&dir.path().join("task")).await.unwrap();
        let err = load_manifest(&module).await.unwrap_err();
        assert!(matches!(err, TaskError::Manifest { .. }));
    }

    #[tokio::test]
    async fn malformed_yaml_is_a_yaml_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "task.yaml", "handler: [unclosed\n");

        let module = resolve(&dir.path().join("task")).await.unwrap();
        let err = load_manifest(&module).await.unwrap_err();
        assert!(matches!(err, TaskError::Yaml(_)));
    }
}
