//! The local file-tree mirror of the server's workflow set.
//!
//! Layout: `*.json` workflow documents at the mirror root plus zero or more
//! tag subdirectories (nested arbitrarily deep), each file holding the full
//! document as produced by the server's export. A hidden staging directory
//! may exist transiently during a backup and is never treated as content.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use n8n_api::prelude::*;
use tracing::warn;

/// Transient home for pre-existing mirror files while an export runs.
pub const STAGING_DIR: &str = ".n8nback-staging";

/// One workflow file loaded from the mirror.
#[derive(Debug, Clone)]
pub struct MirrorFile {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Path relative to the mirror root
    pub rel_path: PathBuf,
    pub workflow: Workflow,
}

/// Lists every regular file under `root`, recursively, skipping the staging
/// directory. Paths are returned sorted for deterministic processing.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().is_some_and(|name| name == STAGING_DIR) {
                    continue;
                }
                stack.push(path);
                continue;
            }
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Parses one workflow file.
pub fn parse_workflow_file(path: &Path) -> Result<Workflow> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Loads every parseable workflow file under the mirror root.
/// Parse failures are warnings: one malformed file must not block its
/// siblings.
pub fn load_workflows(root: &Path) -> Result<Vec<MirrorFile>> {
    let mut loaded = Vec::new();
    for path in collect_files(root)? {
        if !is_json(&path) {
            continue;
        }
        let workflow = match parse_workflow_file(&path) {
            Ok(workflow) => workflow,
            Err(err) => {
                warn!("skipping {}: {err:#}", path.display());
                continue;
            }
        };
        let rel_path = path
            .strip_prefix(root)
            .with_context(|| format!("file not under mirror root: {}", path.display()))?
            .to_path_buf();
        loaded.push(MirrorFile {
            path,
            rel_path,
            workflow,
        });
    }
    Ok(loaded)
}

/// Writes a workflow document, creating parent directories as needed.
pub fn write_workflow(path: &Path, workflow: &Workflow) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut text = serde_json::to_string_pretty(workflow)?;
    text.push('\n');
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Removes directories left empty under `root` (but never `root` itself).
/// Failures are warnings; a stubborn directory must not abort the operation.
pub fn remove_empty_dirs(root: &Path) -> Result<()> {
    remove_empty_children(root)?;
    Ok(())
}

fn remove_empty_children(dir: &Path) -> Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if remove_empty_children(&path)? {
                if let Err(err) = fs::remove_dir(&path) {
                    warn!("could not remove empty dir {}: {err}", path.display());
                    empty = false;
                }
            } else {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    Ok(empty)
}
