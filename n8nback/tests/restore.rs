//! End-to-end restore tests over the in-memory gateway and a tempdir mirror.

use n8n_api::prelude::*;
use n8n_api::test_util::{
    FakeGateway, reference_node, workflow, workflow_with_reference,
};
use n8nback_sync::{mirror, sync};

fn stored_reference_value(gateway: &FakeGateway, name: &str) -> String {
    let stored = gateway.find_by_name(name).expect("workflow stored");
    stored.nodes[0]
        .reference()
        .expect("reference present")
        .value
        .clone()
}

#[test_log::test(tokio::test)]
async fn round_trip_name_reference_resolves_to_new_remote_id() {
    // backup from one instance, restore into a fresh one: the name-mode
    // reference must come out pointing at the callee's id on the new server
    let temp = tempfile::tempdir().unwrap();
    let source = FakeGateway::new();
    source.seed(workflow("", "Callee"));
    source.seed(workflow_with_reference("", "Caller", "Callee", TargetMode::List));

    sync::backup(&source, temp.path()).await.unwrap();

    let destination = FakeGateway::new();
    let report = sync::restore(&destination, temp.path(), false)
        .await
        .unwrap();
    assert_eq!(report.imported, 2);
    assert_eq!(report.failed, 0);

    let callee = destination.find_by_name("Callee").expect("callee stored");
    let reference_value = stored_reference_value(&destination, "Caller");
    assert_eq!(reference_value, callee.id);

    let caller = destination.find_by_name("Caller").unwrap();
    let reference = caller.nodes[0].reference().unwrap();
    assert_eq!(reference.mode, TargetMode::Id);
    assert_eq!(reference.cached_result_name.as_deref(), Some("Callee"));
    assert_eq!(
        reference.cached_result_url.as_deref(),
        Some(&*workflow_url_path(&callee.id))
    );
}

#[test_log::test(tokio::test)]
async fn unchanged_workflows_are_not_reimported() {
    let temp = tempfile::tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.seed(workflow("", "Stable One"));
    gateway.seed(workflow("", "Stable Two"));

    sync::backup(&gateway, temp.path()).await.unwrap();
    let report = sync::restore(&gateway, temp.path(), false).await.unwrap();

    assert_eq!(report.skipped_unchanged, 2);
    assert_eq!(report.attempted, 0);
    assert!(gateway.import_order().is_empty());
}

#[test_log::test(tokio::test)]
async fn modified_workflow_is_reimported() {
    let temp = tempfile::tempdir().unwrap();
    let gateway = FakeGateway::new();
    let stored = gateway.seed(workflow("", "Editable"));

    sync::backup(&gateway, temp.path()).await.unwrap();

    // edit the local copy: add a node
    let path = temp.path().join("Editable.json");
    let mut local = mirror::parse_workflow_file(&path).unwrap();
    local
        .nodes
        .push(reference_node("New Call", "Editable", TargetMode::List));
    mirror::write_workflow(&path, &local).unwrap();

    let report = sync::restore(&gateway, temp.path(), false).await.unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.imported_names, vec!["Editable".to_string()]);
    assert_eq!(gateway.import_order(), vec![stored.id.clone()]);

    let now_remote = gateway.find_by_name("Editable").unwrap();
    assert_eq!(now_remote.nodes.len(), 1);
    // the self-reference was resolved on the way in
    assert_eq!(now_remote.nodes[0].reference().unwrap().value, stored.id);
}

#[test_log::test(tokio::test)]
async fn one_failed_import_does_not_block_siblings() {
    let temp = tempfile::tempdir().unwrap();
    let source = FakeGateway::new();
    let bad = source.seed(workflow("", "Bad Apple"));
    source.seed(workflow("", "Good One"));
    source.seed(workflow("", "Good Two"));

    sync::backup(&source, temp.path()).await.unwrap();

    let destination = FakeGateway::new();
    destination.fail_import(&bad.id);
    let report = sync::restore(&destination, temp.path(), false)
        .await
        .unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_names, vec!["Bad Apple".to_string()]);
    assert!(destination.find_by_name("Good One").is_some());
    assert!(destination.find_by_name("Good Two").is_some());
    assert!(destination.find_by_name("Bad Apple").is_none());
}

#[test_log::test(tokio::test)]
async fn dry_run_imports_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let source = FakeGateway::new();
    source.seed(workflow("", "Something"));
    sync::backup(&source, temp.path()).await.unwrap();

    let destination = FakeGateway::new();
    let report = sync::restore(&destination, temp.path(), true).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.imported, 0);
    assert!(destination.snapshot().is_empty());
}

#[test_log::test(tokio::test)]
async fn unresolved_reference_imported_with_warning() {
    let temp = tempfile::tempdir().unwrap();
    mirror::write_workflow(
        &temp.path().join("Caller.json"),
        &workflow_with_reference("call11111111", "Caller", "Ghost Workflow", TargetMode::List),
    )
    .unwrap();

    let gateway = FakeGateway::new();
    let report = sync::restore(&gateway, temp.path(), false).await.unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.unresolved_references, 1);
    assert!(!report.warnings.is_empty());

    // no false invalidation: the reference is exactly what the file had
    let stored = gateway.find_by_name("Caller").unwrap();
    let reference = stored.nodes[0].reference().unwrap();
    assert_eq!(reference.value, "Ghost Workflow");
    assert_eq!(reference.mode, TargetMode::List);
    assert!(reference.cached_result_url.is_none());
}

#[test_log::test(tokio::test)]
async fn legacy_identifier_resolved_by_fuzzy_match() {
    let temp = tempfile::tempdir().unwrap();
    mirror::write_workflow(
        &temp.path().join("Caller.json"),
        &workflow_with_reference(
            "call11111111",
            "Caller",
            "TestDataHelper001",
            TargetMode::List,
        ),
    )
    .unwrap();

    let gateway = FakeGateway::new();
    let target = gateway.seed(workflow("", "[HELPERS] Test Data"));

    let report = sync::restore(&gateway, temp.path(), false).await.unwrap();
    assert_eq!(report.fuzzy_resolved, 1);
    assert!(report.warnings.iter().any(|warning| warning.contains("fuzzy")));
    assert_eq!(stored_reference_value(&gateway, "Caller"), target.id);
}

#[test_log::test(tokio::test)]
async fn resolved_form_persisted_makes_second_restore_a_noop() {
    let temp = tempfile::tempdir().unwrap();
    let gateway = FakeGateway::new();
    let callee = gateway.seed(workflow("", "Callee"));

    mirror::write_workflow(
        &temp.path().join("Caller.json"),
        &workflow_with_reference("call11111111", "Caller", "Callee", TargetMode::List),
    )
    .unwrap();

    let first = sync::restore(&gateway, temp.path(), false).await.unwrap();
    assert_eq!(first.imported, 1);

    // the mirror file now holds the resolved reference
    let local = mirror::parse_workflow_file(&temp.path().join("Caller.json")).unwrap();
    assert_eq!(local.nodes[0].reference().unwrap().value, callee.id);

    let second = sync::restore(&gateway, temp.path(), false).await.unwrap();
    assert_eq!(second.skipped_unchanged, 1);
    assert_eq!(second.attempted, 0);
}

#[test_log::test(tokio::test)]
async fn forward_reference_within_batch_resolves() {
    // Caller is imported before Callee exists remotely; the local batch is
    // the resolution universe so import order does not matter
    let temp = tempfile::tempdir().unwrap();
    mirror::write_workflow(
        &temp.path().join("A Caller.json"),
        &workflow_with_reference("call11111111", "A Caller", "Z Callee", TargetMode::List),
    )
    .unwrap();
    mirror::write_workflow(
        &temp.path().join("Z Callee.json"),
        &workflow("zcal11111111", "Z Callee"),
    )
    .unwrap();

    let gateway = FakeGateway::new();
    let report = sync::restore(&gateway, temp.path(), false).await.unwrap();
    assert_eq!(report.imported, 2);

    // the callee kept its submitted id on the fresh instance
    let callee = gateway.find_by_name("Z Callee").unwrap();
    assert_eq!(callee.id, "zcal11111111");
    assert_eq!(stored_reference_value(&gateway, "A Caller"), callee.id);
}

#[test_log::test(tokio::test)]
async fn verify_reports_trigger_input_drift() {
    let temp = tempfile::tempdir().unwrap();
    let gateway = FakeGateway::new();

    let mut remote = workflow("", "Callable");
    remote
        .nodes
        .push(n8n_api::test_util::trigger_node(&[("chatId", "number"), ("payload", "any")]));
    let remote = gateway.seed(remote);

    let mut local = workflow(&remote.id, "Callable");
    local
        .nodes
        .push(n8n_api::test_util::trigger_node(&[("chatId", "string"), ("limit", "number")]));
    mirror::write_workflow(&temp.path().join("Callable.json"), &local).unwrap();

    let report = sync::verify(&gateway, temp.path()).await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.drifted.len(), 1);
    let drift = &report.drifted[0].drift;
    assert_eq!(drift.added.len(), 1);
    assert_eq!(drift.removed.len(), 1);
    assert_eq!(drift.retyped.len(), 1);
}

#[test_log::test(tokio::test)]
async fn status_classifies_without_side_effects() {
    let temp = tempfile::tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.seed(workflow("", "Stable"));
    sync::backup(&gateway, temp.path()).await.unwrap();

    // a brand new local-only workflow
    mirror::write_workflow(
        &temp.path().join("Fresh.json"),
        &workflow("", "Fresh"),
    )
    .unwrap();

    let report = sync::status(&gateway, temp.path()).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.new, 1);
    assert_eq!(report.modified, 0);
    assert!(gateway.import_order().is_empty());
}
