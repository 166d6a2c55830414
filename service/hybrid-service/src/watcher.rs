//! File-system watcher feeding the indexing queue. Debounces bursts of
//! filesystem events (notify-debouncer-full) and applies the same
//! include/exclude policy the initial knowledge-base walk uses, so a file
//! that would never be indexed on startup is also never re-enqueued on
//! change.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chunk_model::Priority;
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};

use indexing_pipeline::PipelineCoordinator;

const EXCLUDED_DIRS: &[&str] = &[
    ".git", ".svn", ".hg", "node_modules", "__pycache__", ".pytest_cache", ".venv", "venv", "env",
    "dist", "build", ".eggs", ".cache", ".mypy_cache", ".ruff_cache", "target", "bin", "obj",
    ".idea", ".vscode", ".vs", "coverage", "htmlcov",
];

const EXCLUDED_FILE_SUFFIXES: &[&str] =
    &[".pyc", ".pyo", ".pyd", ".so", ".dylib", ".dll", ".class", ".jar", ".war", ".min.js", ".min.css"];

const EXCLUDED_FILE_NAMES: &[&str] = &[".ds_store", "thumbs.db", ".env", ".env.local", ".env.production"];

/// Mirrors the knowledge-base walk's own exclusion policy: hidden
/// dirs/files, VCS and build directories, compiled artifacts, and a handful
/// of secret-ish filenames are never watched or (re)indexed.
pub fn should_exclude(path: &Path) -> bool {
    for part in path.iter() {
        let part = part.to_string_lossy();
        if part.starts_with('.') && part != ".." {
            return true;
        }
        if EXCLUDED_DIRS.contains(&part.as_ref()) {
            return true;
        }
    }
    if let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) {
        if EXCLUDED_FILE_NAMES.contains(&name.as_str()) {
            return true;
        }
        if EXCLUDED_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            return true;
        }
    }
    false
}

/// Owns the debounced watcher handle for the lifetime of the process; the
/// handle must stay alive or the OS-level watch is torn down.
pub struct KnowledgeBaseWatcher {
    _debouncer: notify_debouncer_full::Debouncer<notify::RecommendedWatcher, notify_debouncer_full::RecommendedCache>,
}

impl KnowledgeBaseWatcher {
    pub fn start(root: PathBuf, debounce: Duration, coordinator: Arc<PipelineCoordinator>) -> anyhow::Result<Self> {
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    for path in &event.paths {
                        if !path.is_file() || should_exclude(path) {
                            continue;
                        }
                        let path_str = path.to_string_lossy().to_string();
                        match coordinator.add_file(&path_str, Priority::Normal, false) {
                            Ok(true) => tracing::debug!(path = %path_str, "watcher enqueued changed file"),
                            Ok(false) => {}
                            Err(err) => tracing::warn!(path = %path_str, error = %err, "watcher failed to enqueue changed file"),
                        }
                    }
                }
            }
            Err(errors) => {
                for err in errors {
                    tracing::warn!(error = %err, "filesystem watch error");
                }
            }
        })?;

        debouncer.watch(&root, RecursiveMode::Recursive)?;
        Ok(Self { _debouncer: debouncer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_hidden_and_vcs_directories() {
        assert!(should_exclude(Path::new("repo/.git/HEAD")));
        assert!(should_exclude(Path::new("repo/node_modules/pkg/index.js")));
        assert!(should_exclude(Path::new("repo/.env")));
    }

    #[test]
    fn excludes_compiled_artifacts() {
        assert!(should_exclude(Path::new("repo/target/debug/app.dll")));
        assert!(should_exclude(Path::new("src/main.min.js")));
    }

    #[test]
    fn admits_ordinary_source_files() {
        assert!(!should_exclude(Path::new("repo/docs/readme.md")));
        assert!(!should_exclude(Path::new("knowledge-base/report.pdf")));
    }
}
