//! The backup and restore orchestrations.
//!
//! Backup: stage pre-existing mirror files out of the way (the server's bulk
//! export is additive-only and silently skips existing paths), export, then
//! deduplicate the union of fresh and staged files. An export failure rolls
//! the mirror back to exactly its pre-operation state; an interrupted run is
//! recovered by re-running the same idempotent move-back on the next
//! invocation.
//!
//! Restore: load the mirror, drop workflows the differ says are unchanged,
//! resolve every cross-workflow reference (against the local batch first,
//! then the remote set), persist the resolved form back to the mirror, and
//! import the remainder one at a time. A single failed import is counted
//! and skipped; sibling workflows still go through.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use chrono::Utc;
use n8n_api::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    dedup::{self, Candidate},
    diff::{self, Classification},
    mirror::{self, STAGING_DIR},
    resolve::{self, Universe},
};

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub mirror: String,
    pub staged: usize,
    pub exported: usize,
    pub kept: usize,
    pub duplicates_removed: usize,
    pub archived_removed: usize,
    pub completed_at: String,
    pub warnings: Vec<String>,
}

/// Full backup: export the server's workflow set into the mirror and
/// collapse it to one canonically-named file per workflow.
pub async fn backup<G: Gateway>(gateway: &G, root: &Path) -> Result<BackupReport> {
    fs::create_dir_all(root)
        .with_context(|| format!("failed to create mirror {}", root.display()))?;
    recover_staging(root)?;

    let staged = stage_existing_files(root)?;
    debug!("staged {staged} pre-existing mirror files");

    let exported = match gateway.export_all(root).await {
        Ok(exported) => exported,
        Err(err) => {
            // put the mirror back exactly as it was
            rollback_staging(root)?;
            return Err(err).context("export failed; mirror restored to pre-backup state");
        }
    };
    info!("exported {exported} workflow files");

    let mut candidates = collect_candidates(root)?;
    let staging = root.join(STAGING_DIR);
    if staging.is_dir() {
        candidates.extend(staged_candidates(&staging)?);
    }

    let outcome = dedup::dedup_mirror(root, candidates)?;
    if staging.is_dir() {
        restore_unclaimed_staged(root, &staging);
        fs::remove_dir_all(&staging)
            .with_context(|| format!("failed to remove {}", staging.display()))?;
    }
    if let Err(err) = mirror::remove_empty_dirs(root) {
        warn!("cleanup: {err:#}");
    }

    Ok(BackupReport {
        mirror: root.display().to_string(),
        staged,
        exported,
        kept: outcome.kept,
        duplicates_removed: outcome.duplicates_removed,
        archived_removed: outcome.archived_removed,
        completed_at: Utc::now().to_rfc3339(),
        warnings: outcome.warnings,
    })
}

/// Moves every pre-existing mirror file into the staging subdirectory,
/// preserving relative paths. Returns the number of files staged.
fn stage_existing_files(root: &Path) -> Result<usize> {
    let files = mirror::collect_files(root)?;
    if files.is_empty() {
        return Ok(0);
    }
    let staging = root.join(STAGING_DIR);
    let mut staged = 0usize;
    for path in files {
        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("file not under mirror root: {}", path.display()))?;
        let target = staging.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::rename(&path, &target)
            .with_context(|| format!("failed to stage {}", path.display()))?;
        staged += 1;
    }
    Ok(staged)
}

/// Undoes staging after a failed export: removes whatever the partial
/// export left behind and moves every staged file back to its original
/// relative path. Pure move-back, safe to re-run.
fn rollback_staging(root: &Path) -> Result<()> {
    for path in mirror::collect_files(root)? {
        if let Err(err) = fs::remove_file(&path) {
            warn!("rollback: could not remove {}: {err}", path.display());
        }
    }
    recover_staging(root)?;
    mirror::remove_empty_dirs(root)?;
    Ok(())
}

/// Moves everything under the staging directory back to the mirror root
/// (used for rollback, and to recover from a previously interrupted run).
/// No-op when there is no staging directory.
fn recover_staging(root: &Path) -> Result<()> {
    let staging = root.join(STAGING_DIR);
    if !staging.is_dir() {
        return Ok(());
    }
    info!("recovering staged files in {}", staging.display());
    for path in walk_files(&staging)? {
        let rel = path
            .strip_prefix(&staging)
            .with_context(|| format!("file not under staging: {}", path.display()))?;
        let target = root.join(rel);
        if target.exists() {
            warn!(
                "recover: {} already exists, dropping staged copy",
                target.display()
            );
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::rename(&path, &target)
            .with_context(|| format!("failed to restore {}", target.display()))?;
    }
    fs::remove_dir_all(&staging)
        .with_context(|| format!("failed to remove {}", staging.display()))?;
    Ok(())
}

fn collect_candidates(root: &Path) -> Result<Vec<Candidate>> {
    Ok(mirror::collect_files(root)?
        .into_iter()
        .filter(|path| mirror::is_json(path))
        .map(|path| Candidate {
            rel_path: path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_path_buf(),
            path,
            from_current_run: true,
        })
        .collect())
}

fn staged_candidates(staging: &Path) -> Result<Vec<Candidate>> {
    Ok(walk_files(staging)?
        .into_iter()
        .filter(|path| mirror::is_json(path))
        .map(|path| Candidate {
            rel_path: path
                .strip_prefix(staging)
                .unwrap_or(&path)
                .to_path_buf(),
            path,
            from_current_run: false,
        })
        .collect())
}

/// Non-workflow files that were staged (notes, dotfiles) go back to their
/// original spots; dedup only ever claims `*.json`.
fn restore_unclaimed_staged(root: &Path, staging: &Path) {
    let Ok(files) = walk_files(staging) else {
        return;
    };
    for path in files {
        let Ok(rel) = path.strip_prefix(staging) else {
            continue;
        };
        if mirror::is_json(&path) {
            // leftover staged workflow files were consumed or dropped by dedup
            continue;
        }
        let target = root.join(rel);
        if target.exists() {
            warn!("{} already exists, dropping staged copy", target.display());
            continue;
        }
        if let Some(parent) = target.parent()
            && fs::create_dir_all(parent).is_err()
        {
            continue;
        }
        if let Err(err) = fs::rename(&path, &target) {
            warn!("could not restore {}: {err}", target.display());
        }
    }
}

fn walk_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)
            .with_context(|| format!("failed to read {}", current.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

// ============================================================================
// Restore
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub mirror: String,
    pub dry_run: bool,
    pub attempted: usize,
    pub imported: usize,
    pub skipped_unchanged: usize,
    pub failed: usize,
    pub fuzzy_resolved: usize,
    pub unresolved_references: usize,
    pub imported_names: Vec<String>,
    pub failed_names: Vec<String>,
    pub completed_at: String,
    pub warnings: Vec<String>,
}

/// Diff-aware re-import of the mirror into the server, rewriting every
/// cross-workflow reference on the way in.
pub async fn restore<G: Gateway>(gateway: &G, root: &Path, dry_run: bool) -> Result<RestoreReport> {
    let files = mirror::load_workflows(root)?;
    let remote = gateway
        .list_all()
        .await
        .context("failed to list remote workflows")?;

    let locals: Vec<Workflow> = files.iter().map(|file| file.workflow.clone()).collect();
    // the local batch comes first so references between two workflows being
    // restored together resolve before either exists remotely
    let universe = Universe::from_workflows([&locals[..], &remote[..]]);
    let remote_by_id: BTreeMap<String, &Workflow> = remote
        .iter()
        .map(|workflow| (workflow.id.clone(), workflow))
        .collect();

    let mut report = RestoreReport {
        mirror: root.display().to_string(),
        dry_run,
        attempted: 0,
        imported: 0,
        skipped_unchanged: 0,
        failed: 0,
        fuzzy_resolved: 0,
        unresolved_references: 0,
        imported_names: Vec::new(),
        failed_names: Vec::new(),
        completed_at: String::new(),
        warnings: Vec::new(),
    };

    for file in &files {
        let classification = diff::classify(&file.workflow, &remote_by_id, &universe);
        if classification == Classification::Unchanged {
            debug!("unchanged, skipping {}", file.workflow.name);
            report.skipped_unchanged += 1;
            continue;
        }

        let resolved = resolve::resolve_workflow(&file.workflow, &universe);
        for outcome in &resolved.outcomes {
            if outcome.is_fuzzy() {
                report.fuzzy_resolved += 1;
            }
            if outcome.is_unresolved() {
                report.unresolved_references += 1;
            }
            if let Some(warning) = &outcome.warning {
                warn!("{warning}");
                report.warnings.push(warning.clone());
            }
        }

        // persist the resolved form so resolution is idempotent across runs
        if !dry_run && resolved.workflow != file.workflow {
            if let Err(err) = mirror::write_workflow(&file.path, &resolved.workflow) {
                let message = format!("could not update {}: {err:#}", file.path.display());
                warn!("{message}");
                report.warnings.push(message);
            }
        }

        report.attempted += 1;
        if dry_run {
            info!(
                "dry-run: would import {} ({classification})",
                resolved.workflow.name
            );
            continue;
        }

        match gateway.import_one(&resolved.workflow).await {
            Ok(stored) => {
                info!(
                    "imported {} ({classification}) as {}",
                    stored.name, stored.id
                );
                report.imported += 1;
                report.imported_names.push(stored.name);
            }
            Err(err) => {
                let message = format!("import failed for {}: {err}", resolved.workflow.name);
                warn!("{message}");
                report.failed += 1;
                report.failed_names.push(resolved.workflow.name.clone());
                report.warnings.push(message);
            }
        }
    }

    report.completed_at = Utc::now().to_rfc3339();
    Ok(report)
}

// ============================================================================
// Status and verify
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub path: String,
    pub id: String,
    pub name: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub mirror: String,
    pub entries: Vec<StatusEntry>,
    pub unchanged: usize,
    pub new: usize,
    pub modified: usize,
}

/// Classifies every mirror file against the server without touching
/// anything.
pub async fn status<G: Gateway>(gateway: &G, root: &Path) -> Result<StatusReport> {
    let files = mirror::load_workflows(root)?;
    let remote = gateway
        .list_all()
        .await
        .context("failed to list remote workflows")?;
    let locals: Vec<Workflow> = files.iter().map(|file| file.workflow.clone()).collect();
    let universe = Universe::from_workflows([&locals[..], &remote[..]]);
    let remote_by_id: BTreeMap<String, &Workflow> = remote
        .iter()
        .map(|workflow| (workflow.id.clone(), workflow))
        .collect();

    let mut report = StatusReport {
        mirror: root.display().to_string(),
        entries: Vec::new(),
        unchanged: 0,
        new: 0,
        modified: 0,
    };
    for file in &files {
        let classification = diff::classify(&file.workflow, &remote_by_id, &universe);
        match classification {
            Classification::Unchanged => report.unchanged += 1,
            Classification::New => report.new += 1,
            Classification::Modified => report.modified += 1,
        }
        report.entries.push(StatusEntry {
            path: file.rel_path.display().to_string(),
            id: file.workflow.id.clone(),
            name: file.workflow.name.clone(),
            classification,
        });
    }
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyEntry {
    pub id: String,
    pub name: String,
    pub drift: diff::TriggerInputDrift,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub mirror: String,
    pub checked: usize,
    pub drifted: Vec<VerifyEntry>,
}

/// Compares declared trigger inputs of each mirrored workflow against its
/// remote counterpart.
pub async fn verify<G: Gateway>(gateway: &G, root: &Path) -> Result<VerifyReport> {
    let files = mirror::load_workflows(root)?;
    let remote = gateway
        .list_all()
        .await
        .context("failed to list remote workflows")?;
    let remote_by_id: BTreeMap<String, &Workflow> = remote
        .iter()
        .map(|workflow| (workflow.id.clone(), workflow))
        .collect();

    let mut report = VerifyReport {
        mirror: root.display().to_string(),
        checked: 0,
        drifted: Vec::new(),
    };
    for file in &files {
        let Some(remote_workflow) = remote_by_id.get(file.workflow.id.as_str()) else {
            continue;
        };
        report.checked += 1;
        let drift = diff::diff_trigger_inputs(
            &file.workflow.trigger_inputs(),
            &remote_workflow.trigger_inputs(),
        );
        if !drift.is_empty() {
            report.drifted.push(VerifyEntry {
                id: file.workflow.id.clone(),
                name: file.workflow.name.clone(),
                drift,
            });
        }
    }
    Ok(report)
}
