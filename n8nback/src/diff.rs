//! Classifies local mirror workflows against the server's current state,
//! so Restore only imports what actually changed.
//!
//! The comparison looks at the fields an import would change (`nodes`,
//! `connections`) after both copies have their references canonicalized
//! against the same universe. Two copies whose embedded reference ids
//! differ, but resolve to the same logical target, compare equal - an id
//! reassigned by a past re-import must not force a redundant import.
//!
//! This classification is an optimization, not a correctness requirement.

use std::collections::BTreeMap;

use n8n_api::prelude::*;
use serde_json::Value;

use crate::resolve::{Universe, resolve_workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Classification {
    Unchanged,
    New,
    Modified,
}

/// Classifies one local workflow against the remote set.
pub fn classify(
    local: &Workflow,
    remote_by_id: &BTreeMap<String, &Workflow>,
    universe: &Universe,
) -> Classification {
    let Some(remote) = remote_by_id.get(local.id.as_str()) else {
        return Classification::New;
    };
    if comparable_form(local, universe) == comparable_form(remote, universe) {
        Classification::Unchanged
    } else {
        Classification::Modified
    }
}

/// Projects a workflow onto the fields that matter for import, with every
/// reference replaced by a canonical token naming its resolved target.
/// Resolved references collapse to the target's name (names are the
/// identity that survives id churn); unresolved ones keep their raw value.
fn comparable_form(workflow: &Workflow, universe: &Universe) -> Value {
    let resolved = resolve_workflow(workflow, universe);
    let mut canonical = resolved.workflow;
    let mut outcomes = resolved.outcomes.iter();
    for node in &mut canonical.nodes {
        let NodeParameters::Reference { reference, .. } = &mut node.parameters else {
            continue;
        };
        // outcomes are produced in node order by resolve_workflow
        if let Some(outcome) = outcomes.next()
            && outcome.target_id.is_some()
            && let Some(name) = reference.cached_result_name.clone()
        {
            reference.value = format!("name:{name}");
            reference.cached_result_url = None;
        }
    }
    serde_json::json!({
        "nodes": canonical.nodes,
        "connections": canonical.connections,
    })
}

/// Field-level drift between two trigger-input declarations.
/// Shared with the verify command.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TriggerInputDrift {
    pub added: Vec<TriggerInput>,
    pub removed: Vec<TriggerInput>,
    /// (name, local type, remote type)
    pub retyped: Vec<(String, String, String)>,
}

impl TriggerInputDrift {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retyped.is_empty()
    }
}

/// Diffs declared trigger inputs by name: local-only inputs are `added`
/// (declared locally, missing remotely), remote-only are `removed`, and
/// same-name inputs with different types are `retyped`.
pub fn diff_trigger_inputs(local: &[TriggerInput], remote: &[TriggerInput]) -> TriggerInputDrift {
    let remote_by_name: BTreeMap<&str, &TriggerInput> = remote
        .iter()
        .map(|input| (input.name.as_str(), input))
        .collect();
    let local_by_name: BTreeMap<&str, &TriggerInput> = local
        .iter()
        .map(|input| (input.name.as_str(), input))
        .collect();

    let mut drift = TriggerInputDrift::default();
    for (name, input) in &local_by_name {
        match remote_by_name.get(name) {
            None => drift.added.push((*input).clone()),
            Some(remote_input) if remote_input.kind != input.kind => {
                drift.retyped.push((
                    (*name).to_string(),
                    input.kind.clone(),
                    remote_input.kind.clone(),
                ));
            }
            Some(_) => {}
        }
    }
    for (name, input) in &remote_by_name {
        if !local_by_name.contains_key(name) {
            drift.removed.push((*input).clone());
        }
    }
    drift
}

#[cfg(test)]
mod tests {
    use super::*;
    use n8n_api::test_util::{workflow, workflow_with_reference};

    fn remote_map(remote: &[Workflow]) -> BTreeMap<String, &Workflow> {
        remote
            .iter()
            .map(|workflow| (workflow.id.clone(), workflow))
            .collect()
    }

    #[test]
    fn absent_remote_id_is_new() {
        let local = workflow("gonegonegone", "Fresh");
        let remote: Vec<Workflow> = Vec::new();
        let universe = Universe::from_workflows([&remote[..]]);
        assert_eq!(
            classify(&local, &remote_map(&remote), &universe),
            Classification::New
        );
    }

    #[test]
    fn identical_copies_unchanged() {
        let local = workflow("sameid123456", "Same");
        let remote = vec![local.clone()];
        let universe = Universe::from_workflows([&remote[..]]);
        assert_eq!(
            classify(&local, &remote_map(&remote), &universe),
            Classification::Unchanged
        );
    }

    #[test]
    fn reference_id_churn_is_not_a_modification() {
        // local copy still points at the callee's pre-reimport id; both
        // resolve to the same logical workflow
        let callee_old = workflow("oldcallee123", "Callee");
        let callee_new = workflow("newcallee456", "Callee");

        let local = workflow_with_reference("caller123456", "Caller", "oldcallee123", TargetMode::Id);
        let remote_caller =
            workflow_with_reference("caller123456", "Caller", "newcallee456", TargetMode::Id);

        let locals = vec![local.clone(), callee_old];
        let remote = vec![remote_caller, callee_new];
        let universe = Universe::from_workflows([&locals[..], &remote[..]]);

        assert_eq!(
            classify(&local, &remote_map(&remote), &universe),
            Classification::Unchanged
        );
    }

    #[test]
    fn node_change_is_modified() {
        let local = workflow_with_reference("id1234567890", "Caller", "Callee", TargetMode::List);
        let mut remote_copy = workflow("id1234567890", "Caller");
        remote_copy.nodes = Vec::new();
        let remote = vec![remote_copy];
        let universe = Universe::from_workflows([&remote[..]]);
        assert_eq!(
            classify(&local, &remote_map(&remote), &universe),
            Classification::Modified
        );
    }

    #[test]
    fn trigger_input_drift_cases() {
        let local = vec![
            TriggerInput {
                name: "chatId".to_string(),
                kind: "string".to_string(),
            },
            TriggerInput {
                name: "limit".to_string(),
                kind: "number".to_string(),
            },
        ];
        let remote = vec![
            TriggerInput {
                name: "chatId".to_string(),
                kind: "number".to_string(),
            },
            TriggerInput {
                name: "payload".to_string(),
                kind: "any".to_string(),
            },
        ];

        let drift = diff_trigger_inputs(&local, &remote);
        assert_eq!(drift.added.len(), 1);
        assert_eq!(drift.added[0].name, "limit");
        assert_eq!(drift.removed.len(), 1);
        assert_eq!(drift.removed[0].name, "payload");
        assert_eq!(drift.retyped.len(), 1);
        assert_eq!(
            drift.retyped[0],
            (
                "chatId".to_string(),
                "string".to_string(),
                "number".to_string()
            )
        );
        assert!(!drift.is_empty());
    }
}
