//! Cross-workflow reference resolution.
//!
//! The server reassigns workflow ids on re-import, so any id baked into a
//! `workflowId` parameter can dangle. [`resolve_workflow`] rewrites every
//! reference in a workflow to a currently valid id using a layered match:
//!
//! 1. exact id - authoritative; already-correct references must win so they
//!    are not churned
//! 2. exact name - the common case right after a restore, since names
//!    survive id reassignment
//! 3. cached name - the reference's last-known display name of its target
//! 4. fuzzy - last resort for historical hand-authored identifiers; can
//!    misfire, so every fuzzy hit is reported as a warning
//!
//! A reference that matches no rule is left unchanged and reported; a
//! half-broken workflow is still worth importing and fixing later.
//!
//! Everything here is a pure transform: inputs are never mutated, and no
//! I/O happens. That keeps the restore pipeline's two-pass universe
//! (local batch first, then remote) composable and testable.

use std::collections::HashMap;

use n8n_api::prelude::*;

/// Minimum shared-stem ratio for a fuzzy match.
const FUZZY_OVERLAP_THRESHOLD: f64 = 0.7;

/// One known workflow identity a reference may resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseEntry {
    pub id: String,
    pub name: String,
}

/// The set of workflow identities available as resolution targets,
/// in a stable iteration order.
///
/// Duplicate ids and names keep their first occurrence, so entries listed
/// earlier shadow later ones. Restore exploits this by listing the local
/// batch before the remote set: references between two workflows restored
/// together resolve even before either exists remotely.
#[derive(Debug, Default)]
pub struct Universe {
    entries: Vec<UniverseEntry>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Universe {
    /// Builds a universe from workflow lists, earlier lists taking
    /// precedence. Workflows without an id cannot be targets and are skipped.
    pub fn from_workflows<'a>(lists: impl IntoIterator<Item = &'a [Workflow]>) -> Self {
        let mut universe = Self::default();
        for list in lists {
            for workflow in list {
                universe.push(&workflow.id, &workflow.name);
            }
        }
        universe
    }

    pub fn push(&mut self, id: &str, name: &str) {
        if id.is_empty() {
            return;
        }
        let index = self.entries.len();
        if self.by_id.contains_key(id) {
            return;
        }
        self.entries.push(UniverseEntry {
            id: id.to_string(),
            name: name.to_string(),
        });
        self.by_id.insert(id.to_string(), index);
        self.by_name.entry(name.to_string()).or_insert(index);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup_id(&self, id: &str) -> Option<&UniverseEntry> {
        self.by_id.get(id).map(|&index| &self.entries[index])
    }

    fn lookup_name(&self, name: &str) -> Option<&UniverseEntry> {
        self.by_name.get(name).map(|&index| &self.entries[index])
    }

    /// First entry (in insertion order) whose name fuzzily matches `value`.
    fn lookup_fuzzy(&self, value: &str) -> Option<&UniverseEntry> {
        self.entries
            .iter()
            .find(|entry| fuzzy_match(value, &entry.name))
    }
}

/// Which rule resolved (or failed to resolve) a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResolutionRule {
    ExactId,
    ExactName,
    CachedName,
    Fuzzy,
    Unresolved,
    /// Expression values are dynamic lookups and are never rewritten
    Expression,
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReferenceOutcome {
    /// Name of the node carrying the reference
    pub node: String,
    pub rule: ResolutionRule,
    /// The original reference value
    pub value: String,
    /// Resolved target id, when a rule matched
    pub target_id: Option<String>,
    /// Warning text for fuzzy hits and misses
    pub warning: Option<String>,
}

impl ReferenceOutcome {
    pub fn is_fuzzy(&self) -> bool {
        self.rule == ResolutionRule::Fuzzy
    }

    pub fn is_unresolved(&self) -> bool {
        self.rule == ResolutionRule::Unresolved
    }
}

/// A workflow with every reference rewritten, plus per-reference outcomes.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub workflow: Workflow,
    pub outcomes: Vec<ReferenceOutcome>,
}

/// Returns a copy of `workflow` with every embedded reference resolved
/// against `universe`. The input is never mutated; unresolvable references
/// are copied through unchanged.
pub fn resolve_workflow(workflow: &Workflow, universe: &Universe) -> Resolved {
    let mut resolved = workflow.clone();
    let mut outcomes = Vec::new();
    for node in &mut resolved.nodes {
        let node_name = node.name.clone();
        let NodeParameters::Reference { reference, .. } = &mut node.parameters else {
            continue;
        };
        let outcome = resolve_reference(reference, universe, &workflow.name, &node_name);
        outcomes.push(outcome);
    }
    Resolved {
        workflow: resolved,
        outcomes,
    }
}

/// Resolves one reference in place (on the caller's copy), returning the
/// outcome. The reference is only written when a rule produced a target
/// that is known valid; otherwise it is untouched.
fn resolve_reference(
    reference: &mut WorkflowReference,
    universe: &Universe,
    workflow_name: &str,
    node_name: &str,
) -> ReferenceOutcome {
    let value = reference.value.clone();
    if reference.is_expression() {
        return ReferenceOutcome {
            node: node_name.to_string(),
            rule: ResolutionRule::Expression,
            value,
            target_id: None,
            warning: None,
        };
    }

    if let Some(entry) = universe.lookup_id(&value) {
        // already valid; still normalize mode and refresh the cached hints
        let target_id = entry.id.clone();
        apply_target(reference, entry);
        return ReferenceOutcome {
            node: node_name.to_string(),
            rule: ResolutionRule::ExactId,
            value,
            target_id: Some(target_id),
            warning: None,
        };
    }

    if let Some(entry) = universe.lookup_name(&value) {
        let target_id = entry.id.clone();
        apply_target(reference, entry);
        return ReferenceOutcome {
            node: node_name.to_string(),
            rule: ResolutionRule::ExactName,
            value,
            target_id: Some(target_id),
            warning: None,
        };
    }

    if let Some(entry) = reference
        .cached_result_name
        .as_deref()
        .and_then(|cached| universe.lookup_name(cached))
    {
        let target_id = entry.id.clone();
        apply_target(reference, entry);
        return ReferenceOutcome {
            node: node_name.to_string(),
            rule: ResolutionRule::CachedName,
            value,
            target_id: Some(target_id),
            warning: None,
        };
    }

    if let Some(entry) = universe.lookup_fuzzy(&value) {
        let warning = format!(
            "{workflow_name} / {node_name}: fuzzy-matched '{value}' to '{}' ({})",
            entry.name, entry.id
        );
        let target_id = entry.id.clone();
        apply_target(reference, entry);
        return ReferenceOutcome {
            node: node_name.to_string(),
            rule: ResolutionRule::Fuzzy,
            value,
            target_id: Some(target_id),
            warning: Some(warning),
        };
    }

    let detail = if looks_like_workflow_id(&value) && !looks_like_display_name(&value) {
        " (dangling id)"
    } else {
        ""
    };
    ReferenceOutcome {
        node: node_name.to_string(),
        rule: ResolutionRule::Unresolved,
        value: value.clone(),
        target_id: None,
        warning: Some(format!(
            "{workflow_name} / {node_name}: could not resolve workflow reference '{value}'{detail}"
        )),
    }
}

fn apply_target(reference: &mut WorkflowReference, entry: &UniverseEntry) {
    reference.value = entry.id.clone();
    reference.mode = TargetMode::Id;
    reference.cached_result_name = Some(entry.name.clone());
    reference.cached_result_url = Some(workflow_url_path(&entry.id));
}

// ============================================================================
// Fuzzy scoring
// ============================================================================

/// Strips `[..]` tag segments and whitespace, lowercased.
/// "[HELPERS] Test Data" -> "testdata"
pub fn normalize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_bracket = false;
    for ch in value.chars() {
        match ch {
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            ch if in_bracket || ch.is_whitespace() => {}
            ch => out.extend(ch.to_lowercase()),
        }
    }
    out
}

/// Splits on separators and camelCase boundaries, then stems each token by
/// trimming trailing digits and a plural 's'.
/// "TestDataHelper001" -> {"test", "data", "helper"}
pub fn tokens(value: &str) -> Vec<String> {
    let mut raw = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                raw.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_numeric();
            current.extend(ch.to_lowercase());
        } else {
            prev_lower = false;
            if !current.is_empty() {
                raw.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        raw.push(current);
    }

    let mut stemmed: Vec<String> = raw
        .into_iter()
        .map(|token| stem(&token))
        .filter(|token| !token.is_empty())
        .collect();
    stemmed.sort_unstable();
    stemmed.dedup();
    stemmed
}

fn stem(token: &str) -> String {
    let trimmed = token.trim_end_matches(|ch: char| ch.is_ascii_digit());
    let trimmed = if trimmed.len() > 3 {
        trimmed.strip_suffix('s').unwrap_or(trimmed)
    } else {
        trimmed
    };
    trimmed.to_string()
}

/// Shared stems over the smaller token set; 0.0 when either set is empty.
pub fn token_overlap_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = tokens(a);
    let tokens_b = tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let shared = tokens_a
        .iter()
        .filter(|token| tokens_b.contains(token))
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        shared as f64 / tokens_a.len().min(tokens_b.len()) as f64
    }
}

/// True if `value` fuzzily names the workflow called `name`:
/// normalized equality, containment either way, or token overlap at or
/// above the threshold.
pub fn fuzzy_match(value: &str, name: &str) -> bool {
    let normalized_value = normalize(value);
    let normalized_name = normalize(name);
    if normalized_value.is_empty() || normalized_name.is_empty() {
        return false;
    }
    if normalized_value == normalized_name
        || normalized_value.contains(&normalized_name)
        || normalized_name.contains(&normalized_value)
    {
        return true;
    }
    token_overlap_ratio(value, name) >= FUZZY_OVERLAP_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use n8n_api::test_util::{workflow, workflow_with_reference};
    use serde_json::Map;

    fn universe_of(entries: &[(&str, &str)]) -> Universe {
        let mut universe = Universe::default();
        for (id, name) in entries {
            universe.push(id, name);
        }
        universe
    }

    fn single_reference(resolved: &Resolved) -> &WorkflowReference {
        resolved.workflow.nodes[0]
            .reference()
            .expect("reference present")
    }

    #[test]
    fn name_reference_resolves_to_id() {
        // workflow 'Caller' references 'Callee' by display name
        let caller = workflow_with_reference("", "Caller", "Callee", TargetMode::List);
        let universe = universe_of(&[("zz9zz9zz9zz9", "Callee")]);

        let resolved = resolve_workflow(&caller, &universe);
        let reference = single_reference(&resolved);
        assert_eq!(reference.value, "zz9zz9zz9zz9");
        assert_eq!(reference.mode, TargetMode::Id);
        assert_eq!(reference.cached_result_name.as_deref(), Some("Callee"));
        assert_eq!(
            reference.cached_result_url.as_deref(),
            Some("/workflow/zz9zz9zz9zz9")
        );
        assert_eq!(resolved.outcomes[0].rule, ResolutionRule::ExactName);

        // the input was not mutated
        assert_eq!(caller.nodes[0].reference().unwrap().value, "Callee");
    }

    #[test]
    fn exact_id_wins_and_backfills_cached_url() {
        let caller =
            workflow_with_reference("", "Caller", "abcabcabcabc", TargetMode::List);
        let universe = universe_of(&[
            ("abcabcabcabc", "Exact Target"),
            ("otherotherid", "abcabcabcabc"), // a workflow pathologically named like the id
        ]);

        let resolved = resolve_workflow(&caller, &universe);
        let reference = single_reference(&resolved);
        assert_eq!(resolved.outcomes[0].rule, ResolutionRule::ExactId);
        assert_eq!(reference.value, "abcabcabcabc");
        assert_eq!(
            reference.cached_result_url.as_deref(),
            Some("/workflow/abcabcabcabc")
        );
    }

    #[test]
    fn cached_name_used_when_value_dangles() {
        let mut caller = workflow_with_reference("", "Caller", "deaddeadbeef", TargetMode::Id);
        if let NodeParameters::Reference { reference, .. } = &mut caller.nodes[0].parameters {
            reference.cached_result_name = Some("Live Target".to_string());
        }
        let universe = universe_of(&[("livelivelive", "Live Target")]);

        let resolved = resolve_workflow(&caller, &universe);
        assert_eq!(resolved.outcomes[0].rule, ResolutionRule::CachedName);
        assert_eq!(single_reference(&resolved).value, "livelivelive");
    }

    #[test]
    fn fuzzy_match_on_legacy_identifier_warns() {
        // legacy hand-authored identifier vs tagged display name
        let caller =
            workflow_with_reference("", "Caller", "TestDataHelper001", TargetMode::List);
        let universe = universe_of(&[
            ("aaaaaaaaaaaa", "[CORE] Unrelated"),
            ("bbbbbbbbbbbb", "[HELPERS] Test Data"),
        ]);

        let resolved = resolve_workflow(&caller, &universe);
        let outcome = &resolved.outcomes[0];
        assert_eq!(outcome.rule, ResolutionRule::Fuzzy);
        assert!(outcome.warning.is_some());
        assert_eq!(single_reference(&resolved).value, "bbbbbbbbbbbb");
    }

    #[test]
    fn fuzzy_tie_takes_first_in_universe_order() {
        let caller = workflow_with_reference("", "Caller", "Cache System", TargetMode::List);
        let universe = universe_of(&[
            ("firstfirst11", "[HELPERS] Global Cache System"),
            ("secondsecond", "[LEGACY] Cache System"),
        ]);

        let resolved = resolve_workflow(&caller, &universe);
        assert_eq!(single_reference(&resolved).value, "firstfirst11");
    }

    #[test]
    fn unresolved_reference_left_unchanged() {
        let caller = workflow_with_reference("", "Caller", "No Such Workflow", TargetMode::List);
        let universe = universe_of(&[("aaaaaaaaaaaa", "Entirely Different")]);

        let resolved = resolve_workflow(&caller, &universe);
        let outcome = &resolved.outcomes[0];
        assert_eq!(outcome.rule, ResolutionRule::Unresolved);
        assert!(outcome.warning.is_some());
        // byte-for-byte unchanged
        assert_eq!(
            resolved.workflow.nodes[0].reference(),
            caller.nodes[0].reference()
        );
    }

    #[test]
    fn expression_values_never_rewritten() {
        let caller = workflow_with_reference(
            "",
            "Caller",
            "={{ $json.targetWorkflow }}",
            TargetMode::Id,
        );
        let universe = universe_of(&[("aaaaaaaaaaaa", "Anything")]);

        let resolved = resolve_workflow(&caller, &universe);
        assert_eq!(resolved.outcomes[0].rule, ResolutionRule::Expression);
        assert!(resolved.outcomes[0].warning.is_none());
        assert_eq!(
            resolved.workflow.nodes[0].reference(),
            caller.nodes[0].reference()
        );
    }

    #[test]
    fn local_entries_shadow_remote_names() {
        let locals = [workflow("localid12345", "Callee")];
        let remotes = [workflow("remoteid1234", "Callee")];
        let universe = Universe::from_workflows([&locals[..], &remotes[..]]);

        let caller = workflow_with_reference("", "Caller", "Callee", TargetMode::List);
        let resolved = resolve_workflow(&caller, &universe);
        assert_eq!(single_reference(&resolved).value, "localid12345");
    }

    #[test]
    fn resolution_is_idempotent() {
        let caller = workflow_with_reference("", "Caller", "Callee", TargetMode::List);
        let universe = universe_of(&[("zz9zz9zz9zz9", "Callee")]);

        let once = resolve_workflow(&caller, &universe);
        let twice = resolve_workflow(&once.workflow, &universe);
        assert_eq!(once.workflow, twice.workflow);
        assert_eq!(twice.outcomes[0].rule, ResolutionRule::ExactId);
    }

    #[test]
    fn normalize_strips_tags_and_whitespace() {
        assert_eq!(normalize("[HELPERS] Test Data"), "testdata");
        assert_eq!(normalize("  Global  Cache "), "globalcache");
        assert_eq!(normalize("[A][B] x"), "x");
    }

    #[test]
    fn tokens_split_camel_case_and_stem() {
        assert_eq!(tokens("TestDataHelper001"), vec!["data", "helper", "test"]);
        assert_eq!(tokens("[HELPERS] Test Data"), vec!["data", "helper", "test"]);
        assert_eq!(tokens("telegram-contact-fetch"), vec![
            "contact", "fetch", "telegram"
        ]);
    }

    #[test]
    fn overlap_ratio_thresholds() {
        assert!(token_overlap_ratio("TestDataHelper001", "[HELPERS] Test Data") >= 0.7);
        assert!(token_overlap_ratio("Discord Guild Fetch", "Telegram Contact Fetch") < 0.7);
        assert_eq!(token_overlap_ratio("", "anything"), 0.0);
    }

    #[test]
    fn fuzzy_rejects_unrelated_names() {
        assert!(!fuzzy_match("TelegramContactFetch", "[HELPERS] Discord Guild Fetch"));
        assert!(fuzzy_match("TelegramContactFetch", "[HELPERS] Telegram Contact Fetch"));
    }

    #[test]
    fn universe_skips_idless_workflows() {
        let mut no_id = workflow("", "Floating");
        no_id.extra = Map::new();
        let universe = Universe::from_workflows([&[no_id][..]]);
        assert!(universe.is_empty());
    }
}
