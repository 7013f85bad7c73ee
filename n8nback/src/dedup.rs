//! Deduplication and canonical naming of exported workflow files.
//!
//! A bulk export is additive and id-keyed, so after a few backup cycles the
//! mirror can hold several stale copies of the same logical workflow under
//! old names and paths. This pass collapses every id to exactly one file at
//! its canonical path: tag prefix (a leading `[TAG]` in the display name)
//! becomes a subdirectory, the remaining name becomes the sanitized
//! filename, and collisions between distinct ids get a deterministic
//! ` (2)`, ` (3)`, ... suffix.
//!
//! Running the pass on its own output is a no-op: same groups, same
//! representatives, same target paths.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use n8n_api::prelude::*;
use tracing::{debug, warn};

use crate::mirror;

/// One file considered by the dedup pass.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Where the file currently is (possibly inside the staging dir)
    pub path: PathBuf,
    /// Mirror-relative path; for staged files, the original location
    pub rel_path: PathBuf,
    /// True when the file was produced by the current export run.
    /// Current-run files win representative selection so a rename or retag
    /// on the server is reflected in the mirror.
    pub from_current_run: bool,
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Canonical files kept, one per workflow id
    pub kept: usize,
    pub duplicates_removed: usize,
    pub archived_removed: usize,
    pub warnings: Vec<String>,
}

impl DedupOutcome {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

#[derive(Debug)]
struct Entry {
    candidate: Candidate,
    workflow: Workflow,
}

/// Collapses `candidates` to one canonical file per workflow id under
/// `root`. See the module docs for the naming rules.
pub fn dedup_mirror(root: &Path, candidates: Vec<Candidate>) -> Result<DedupOutcome> {
    let mut outcome = DedupOutcome::default();
    let mut groups: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
    let mut stale_unparsed: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        let workflow = match mirror::parse_workflow_file(&candidate.path) {
            Ok(workflow) => workflow,
            Err(err) => {
                outcome.warn(format!("cannot deduplicate: {err:#}"));
                if !candidate.from_current_run {
                    stale_unparsed.push(candidate);
                }
                continue;
            }
        };
        if workflow.id.is_empty() {
            outcome.warn(format!(
                "{} has no workflow id, leaving untouched",
                candidate.path.display()
            ));
            if !candidate.from_current_run {
                stale_unparsed.push(candidate);
            }
            continue;
        }
        groups
            .entry(workflow.id.clone())
            .or_default()
            .push(Entry {
                candidate,
                workflow,
            });
    }

    // pick one representative per id and delete the rest
    let mut representatives: Vec<(String, Entry)> = Vec::new();
    for (id, mut entries) in groups {
        entries.sort_by(|a, b| {
            // current-run files first, then lexicographic path order
            // (deterministic, not otherwise meaningful)
            b.candidate
                .from_current_run
                .cmp(&a.candidate.from_current_run)
                .then_with(|| a.candidate.rel_path.cmp(&b.candidate.rel_path))
        });
        let mut drained = entries.into_iter();
        let Some(representative) = drained.next() else {
            continue;
        };
        if representative.workflow.is_archived {
            // archived workflows never keep a file in the mirror, and the
            // freshest copy decides: stale files predating the archival go
            // too, whatever their own flag says
            for entry in std::iter::once(representative).chain(drained) {
                match fs::remove_file(&entry.candidate.path) {
                    Ok(()) => outcome.archived_removed += 1,
                    Err(err) => outcome.warn(format!(
                        "could not remove archived {}: {err}",
                        entry.candidate.path.display()
                    )),
                }
            }
            continue;
        }
        for duplicate in drained {
            match fs::remove_file(&duplicate.candidate.path) {
                Ok(()) => outcome.duplicates_removed += 1,
                Err(err) => outcome.warn(format!(
                    "could not remove duplicate {}: {err}",
                    duplicate.candidate.path.display()
                )),
            }
        }
        representatives.push((id, representative));
    }

    // canonical target paths, with deterministic collision suffixes:
    // groups mapping to the same (dir, base) are ordered by (name, id)
    let mut buckets: BTreeMap<(String, String), Vec<(String, String)>> = BTreeMap::new();
    for (id, entry) in &representatives {
        let (dir, base) = canonical_components(&entry.workflow.name, id);
        buckets
            .entry((dir, base))
            .or_default()
            .push((entry.workflow.name.clone(), id.clone()));
    }
    let mut targets: BTreeMap<String, PathBuf> = BTreeMap::new();
    for ((dir, base), mut members) in buckets {
        members.sort();
        for (index, (_name, id)) in members.into_iter().enumerate() {
            let file_name = if index == 0 {
                format!("{base}.json")
            } else {
                format!("{base} ({}).json", index + 1)
            };
            let target = if dir.is_empty() {
                root.join(file_name)
            } else {
                root.join(&dir).join(file_name)
            };
            targets.insert(id, target);
        }
    }

    // two-phase move so one group's target never clobbers another group's
    // not-yet-moved representative
    let mut pending: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (id, entry) in &representatives {
        let Some(target) = targets.get(id) else {
            continue;
        };
        outcome.kept += 1;
        if &entry.candidate.path == target {
            continue;
        }
        let temp = root.join(format!(".dedup-{id}.json.tmp"));
        match fs::rename(&entry.candidate.path, &temp) {
            Ok(()) => pending.push((temp, target.clone())),
            Err(err) => outcome.warn(format!(
                "could not move {}: {err}",
                entry.candidate.path.display()
            )),
        }
    }
    for (temp, target) in pending {
        if let Some(parent) = target.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            outcome.warn(format!("could not create {}: {err}", parent.display()));
            continue;
        }
        if target.exists() {
            // stale unrelated occupant; the canonical file wins
            debug!("overwriting stale file {}", target.display());
            if let Err(err) = fs::remove_file(&target) {
                outcome.warn(format!(
                    "could not overwrite stale {}: {err}",
                    target.display()
                ));
                continue;
            }
        }
        if let Err(err) = fs::rename(&temp, &target) {
            outcome.warn(format!("could not place {}: {err}", target.display()));
        }
    }

    // files that predate this run and cannot be deduplicated safely go back
    // where they were, unless a fresh export now owns that path
    for candidate in stale_unparsed {
        let target = root.join(&candidate.rel_path);
        if target.exists() {
            outcome.warn(format!(
                "dropping stale unparsable {} (superseded by fresh export)",
                candidate.rel_path.display()
            ));
            continue;
        }
        if let Some(parent) = target.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            outcome.warn(format!("could not create {}: {err}", parent.display()));
            continue;
        }
        if let Err(err) = fs::rename(&candidate.path, &target) {
            outcome.warn(format!("could not restore {}: {err}", target.display()));
        }
    }

    Ok(outcome)
}

/// Canonical (directory, file base) for a workflow display name.
/// Falls back to the id when sanitization leaves nothing usable.
fn canonical_components(name: &str, id: &str) -> (String, String) {
    let (tag, rest) = split_tag_prefix(name);
    let dir = tag.map(|tag| sanitize_file_name(&tag)).unwrap_or_default();
    let mut base = sanitize_file_name(rest);
    if base.is_empty() {
        base = id.to_string();
    }
    (dir, base)
}

/// Splits a leading `[TAG]` convention off a display name.
/// Returns `(None, name)` when there is no usable tag or no remainder.
fn split_tag_prefix(name: &str) -> (Option<String>, &str) {
    let Some(stripped) = name.strip_prefix('[') else {
        return (None, name);
    };
    let Some(close) = stripped.find(']') else {
        return (None, name);
    };
    let tag = stripped[..close].trim();
    let rest = stripped[close + 1..].trim_start();
    if tag.is_empty() || rest.is_empty() {
        return (None, name);
    }
    (Some(tag.to_string()), rest)
}

/// Replaces filesystem-unsafe characters with `_`, collapsing runs, and
/// trims separators and dots from the ends. Case and interior spaces are
/// preserved so filenames stay readable.
fn sanitize_file_name(input: &str) -> String {
    const SEP: char = '_';
    let mut out = String::with_capacity(input.len());
    let mut prev_sep = false;
    for ch in input.chars() {
        let unsafe_char = matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            || ch.is_control();
        let mapped = if unsafe_char { SEP } else { ch };
        if mapped == SEP {
            if !prev_sep {
                out.push(SEP);
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches([SEP, ' ', '.']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use n8n_api::test_util::workflow;

    fn write(root: &Path, rel: &str, workflow: &Workflow) {
        mirror::write_workflow(&root.join(rel), workflow).unwrap();
    }

    fn candidates_from_tree(root: &Path, from_current_run: bool) -> Vec<Candidate> {
        mirror::collect_files(root)
            .unwrap()
            .into_iter()
            .filter(|path| mirror::is_json(path))
            .map(|path| Candidate {
                rel_path: path.strip_prefix(root).unwrap().to_path_buf(),
                path,
                from_current_run,
            })
            .collect()
    }

    fn tree_snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        mirror::collect_files(root)
            .unwrap()
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path).unwrap();
                (path.strip_prefix(root).unwrap().to_path_buf(), bytes)
            })
            .collect()
    }

    #[test]
    fn sanitize_preserves_readable_names() {
        assert_eq!(sanitize_file_name("Helper2"), "Helper2");
        assert_eq!(sanitize_file_name("Test Data"), "Test Data");
        assert_eq!(sanitize_file_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_file_name("what?*"), "what");
        assert_eq!(sanitize_file_name("  ../evil  "), "evil");
    }

    #[test]
    fn tag_prefix_split() {
        assert_eq!(
            split_tag_prefix("[HELPERS] Test Data"),
            (Some("HELPERS".to_string()), "Test Data")
        );
        assert_eq!(split_tag_prefix("No Tag"), (None, "No Tag"));
        assert_eq!(split_tag_prefix("[] Empty"), (None, "[] Empty"));
        assert_eq!(split_tag_prefix("[ONLY]"), (None, "[ONLY]"));
        assert_eq!(
            split_tag_prefix("[A] [B] rest"),
            (Some("A".to_string()), "[B] rest")
        );
    }

    #[test]
    fn stale_copies_collapse_to_fresh_name() {
        // Scenario: A.json and B.json both hold id x1 under an old name;
        // the fresh export of x1 was renamed to Helper2
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(root, "A.json", &workflow("x1x1x1x1x1x1", "Helper"));
        write(root, "B.json", &workflow("x1x1x1x1x1x1", "Helper"));
        let mut candidates = candidates_from_tree(root, false);
        write(root, "x1x1x1x1x1x1.json", &workflow("x1x1x1x1x1x1", "Helper2"));
        candidates.push(Candidate {
            path: root.join("x1x1x1x1x1x1.json"),
            rel_path: PathBuf::from("x1x1x1x1x1x1.json"),
            from_current_run: true,
        });

        let outcome = dedup_mirror(root, candidates).unwrap();
        assert_eq!(outcome.kept, 1);
        assert_eq!(outcome.duplicates_removed, 2);

        let files = mirror::collect_files(root).unwrap();
        assert_eq!(files.len(), 1);
        assert!(root.join("Helper2.json").exists());
    }

    #[test]
    fn tagged_names_get_subdirectories() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(
            root,
            "aaaa11112222.json",
            &workflow("aaaa11112222", "[HELPERS] Test Data"),
        );
        write(root, "bbbb11112222.json", &workflow("bbbb11112222", "Plain"));

        let outcome = dedup_mirror(root, candidates_from_tree(root, true)).unwrap();
        assert_eq!(outcome.kept, 2);
        assert!(root.join("HELPERS/Test Data.json").exists());
        assert!(root.join("Plain.json").exists());
    }

    #[test]
    fn distinct_ids_with_same_name_get_stable_suffixes() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(root, "zzzz11112222.json", &workflow("zzzz11112222", "Helper"));
        write(root, "aaaa11112222.json", &workflow("aaaa11112222", "Helper"));

        let outcome = dedup_mirror(root, candidates_from_tree(root, true)).unwrap();
        assert_eq!(outcome.kept, 2);
        // suffix order keyed by (name, id): the lower id keeps the bare name
        let base: Workflow = mirror::parse_workflow_file(&root.join("Helper.json")).unwrap();
        assert_eq!(base.id, "aaaa11112222");
        let suffixed: Workflow =
            mirror::parse_workflow_file(&root.join("Helper (2).json")).unwrap();
        assert_eq!(suffixed.id, "zzzz11112222");
    }

    #[test]
    fn archived_workflows_are_deleted() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let mut archived = workflow("arch11112222", "Old Thing");
        archived.is_archived = true;
        write(root, "arch11112222.json", &archived);
        write(root, "live11112222.json", &workflow("live11112222", "Live"));

        let outcome = dedup_mirror(root, candidates_from_tree(root, true)).unwrap();
        assert_eq!(outcome.archived_removed, 1);
        assert_eq!(outcome.kept, 1);
        assert!(!root.join("arch11112222.json").exists());
        assert!(root.join("Live.json").exists());
    }

    #[test]
    fn stale_copy_of_newly_archived_workflow_removed() {
        // the stale mirror file predates the archival and still says
        // isArchived=false; the fresh export decides for the whole group
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(root, "Old Name.json", &workflow("arch11112222", "Old Name"));
        let mut candidates = candidates_from_tree(root, false);

        let mut archived = workflow("arch11112222", "Old Name");
        archived.is_archived = true;
        write(root, "arch11112222.json", &archived);
        candidates.push(Candidate {
            path: root.join("arch11112222.json"),
            rel_path: PathBuf::from("arch11112222.json"),
            from_current_run: true,
        });

        let outcome = dedup_mirror(root, candidates).unwrap();
        assert_eq!(outcome.archived_removed, 2);
        assert_eq!(outcome.kept, 0);
        assert!(mirror::collect_files(root).unwrap().is_empty());
    }

    #[test]
    fn dedup_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(root, "id1000000001.json", &workflow("id1000000001", "[CORE] Main Flow"));
        write(root, "id1000000002.json", &workflow("id1000000002", "Helper"));
        write(root, "id1000000003.json", &workflow("id1000000003", "Helper"));

        dedup_mirror(root, candidates_from_tree(root, true)).unwrap();
        let first = tree_snapshot(root);
        let outcome = dedup_mirror(root, candidates_from_tree(root, true)).unwrap();
        let second = tree_snapshot(root);
        assert_eq!(first, second);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn unparsable_stale_file_restored_unless_superseded() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let staging = root.join(mirror::STAGING_DIR);
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("notes.json"), b"{broken").unwrap();

        let candidates = vec![Candidate {
            path: staging.join("notes.json"),
            rel_path: PathBuf::from("notes.json"),
            from_current_run: false,
        }];
        let outcome = dedup_mirror(root, candidates).unwrap();
        assert!(root.join("notes.json").exists());
        assert_eq!(outcome.kept, 0);
        assert!(!outcome.warnings.is_empty());
    }
}
