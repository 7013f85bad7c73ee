//! # n8n Workflows
//!
//! Data model for n8n workflow documents and the workflow REST methods on
//! [`N8nClient`].
//!
//! The model is deliberately "thin": only the fields this crate acts on are
//! typed (`id`, `name`, `nodes`, `connections`, `isArchived`), and everything
//! else is carried through a flattened `extra` map so a document survives a
//! parse/serialize round trip without losing fields. The same applies one
//! level down: a node's parameters are opaque JSON unless the node is one of
//! the sub-workflow invoking kinds, in which case the embedded
//! [`WorkflowReference`] is parsed into a typed value.
//!
//! ## Workflow methods on `N8nClient`
//!
//! - [`workflows`](N8nClient::workflows) - list workflows (cursor pagination)
//! - [`get_workflow`](N8nClient::get_workflow) - fetch one workflow by id
//! - [`create_workflow`](N8nClient::create_workflow) - create (server assigns the id)
//! - [`update_workflow`](N8nClient::update_workflow) - update in place by id
//! - [`delete_workflow`](N8nClient::delete_workflow) - delete by id

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Result,
    client::N8nClient,
    config::{DEFAULT_PAGINATION_LIMIT, MAX_PAGINATION_LIMIT},
};

/// Node kind that invokes another workflow as a subroutine.
pub const EXECUTE_WORKFLOW_NODE: &str = "n8n-nodes-base.executeWorkflow";

/// Agent-tool node kind that invokes another workflow.
pub const TOOL_WORKFLOW_NODE: &str = "@n8n/n8n-nodes-langchain.toolWorkflow";

/// Trigger node kind that declares the workflow's callable inputs.
pub const EXECUTE_WORKFLOW_TRIGGER_NODE: &str = "n8n-nodes-base.executeWorkflowTrigger";

/// Returns true for node kinds that carry a [`WorkflowReference`].
pub fn is_reference_kind(kind: &str) -> bool {
    kind == EXECUTE_WORKFLOW_NODE || kind == TOOL_WORKFLOW_NODE
}

/// Builds the display url path for a workflow id.
/// Always a path, never an absolute url.
pub fn workflow_url_path(id: &str) -> String {
    format!("/workflow/{id}")
}

/// How a [`WorkflowReference`] names its target.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetMode {
    /// Target named by its opaque server-assigned id
    Id,
    /// Target chosen from the workflow list picker; the value is a display name
    #[default]
    List,
}

/// A cross-workflow reference embedded in a node's parameters
/// (the `parameters.workflowId` resource-locator object).
///
/// `value` is an id, a display name, or a historical hand-authored
/// identifier; which one is only known after resolution. `cachedResultName`
/// and `cachedResultUrl` are display hints, never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReference {
    /// Resource-locator marker; references without it are not rewritten
    #[serde(rename = "__rl", default)]
    pub is_resource_locator: bool,

    /// Target id, display name, or legacy identifier
    #[serde(default)]
    pub value: String,

    /// How `value` names the target
    #[serde(default)]
    pub mode: TargetMode,

    /// Last known display name of the target
    #[serde(rename = "cachedResultName", default, skip_serializing_if = "Option::is_none")]
    pub cached_result_name: Option<String>,

    /// Display url path for the target, `/workflow/{id}`
    #[serde(rename = "cachedResultUrl", default, skip_serializing_if = "Option::is_none")]
    pub cached_result_url: Option<String>,

    /// Unmodeled sibling keys, passed through verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowReference {
    /// True if the value is an n8n expression (dynamic lookup), which must
    /// never be rewritten.
    pub fn is_expression(&self) -> bool {
        self.value.starts_with("={{") || self.value.contains("{{")
    }
}

/// A declared trigger input (name/type pair) of a callable workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInput {
    pub name: String,
    #[serde(rename = "type", default = "default_trigger_type")]
    pub kind: String,
}

fn default_trigger_type() -> String {
    "any".to_string()
}

/// Parameters of a single node.
///
/// Only the sub-workflow invoking kinds are understood by this crate; every
/// other node's parameters pass through untouched as raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeParameters {
    /// Parameters of a reference-carrying node. `rest` holds the sibling
    /// keys next to `workflowId`, preserved verbatim.
    Reference {
        reference: WorkflowReference,
        rest: Map<String, Value>,
    },
    /// Anything else
    Opaque(Value),
}

impl Serialize for NodeParameters {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Opaque(value) => value.serialize(serializer),
            Self::Reference { reference, rest } => {
                let mut map = serializer.serialize_map(Some(rest.len() + 1))?;
                map.serialize_entry("workflowId", reference)?;
                for (key, value) in rest {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// A single node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    /// The node kind, e.g. `n8n-nodes-base.executeWorkflow`
    /// (serialized as `type`)
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: NodeParameters,
    /// Unmodeled node fields (position, credentials, ...), passed through
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    /// The embedded cross-workflow reference, if this node carries one.
    pub fn reference(&self) -> Option<&WorkflowReference> {
        match &self.parameters {
            NodeParameters::Reference { reference, .. } => Some(reference),
            NodeParameters::Opaque(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    parameters: Value,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawNode::deserialize(deserializer)?;
        let parameters = classify_parameters(&raw.kind, raw.parameters);
        Ok(Node {
            id: raw.id,
            name: raw.name,
            kind: raw.kind,
            parameters,
            extra: raw.extra,
        })
    }
}

/// Splits a reference-carrying node's parameters into the typed reference
/// plus its preserved siblings. Parameters that don't look like a
/// resource locator (no `__rl`, plain-string `workflowId`, unknown `mode`)
/// stay opaque so they are never rewritten.
fn classify_parameters(kind: &str, parameters: Value) -> NodeParameters {
    if !is_reference_kind(kind) {
        return NodeParameters::Opaque(parameters);
    }
    let mut map = match parameters {
        Value::Object(map) => map,
        other => return NodeParameters::Opaque(other),
    };
    if let Some(raw) = map.remove("workflowId") {
        match serde_json::from_value::<WorkflowReference>(raw.clone()) {
            Ok(reference) if reference.is_resource_locator => {
                return NodeParameters::Reference {
                    reference,
                    rest: map,
                };
            }
            _ => {
                map.insert("workflowId".to_string(), raw);
            }
        }
    }
    NodeParameters::Opaque(Value::Object(map))
}

/// An n8n workflow document: the unit of synchronization.
///
/// The server assigns `id` at creation time and may assign a fresh one on
/// re-import, which is why nothing in this workspace treats `id` as a stable
/// identity across imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Node wiring; opaque to this crate and copied through verbatim
    #[serde(default = "empty_connections")]
    pub connections: Value,
    #[serde(rename = "isArchived", default)]
    pub is_archived: bool,
    /// Unmodeled workflow fields (settings, active, timestamps, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_connections() -> Value {
    Value::Object(Map::new())
}

impl Workflow {
    /// Declared trigger inputs, extracted from the workflow's
    /// executeWorkflowTrigger nodes.
    pub fn trigger_inputs(&self) -> Vec<TriggerInput> {
        let mut inputs = Vec::new();
        for node in &self.nodes {
            if node.kind != EXECUTE_WORKFLOW_TRIGGER_NODE {
                continue;
            }
            let NodeParameters::Opaque(params) = &node.parameters else {
                continue;
            };
            let Some(values) = params
                .get("workflowInputs")
                .and_then(|inputs| inputs.get("values"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for value in values {
                if let Ok(input) = serde_json::from_value::<TriggerInput>(value.clone()) {
                    inputs.push(input);
                }
            }
        }
        inputs
    }

    /// Iterates the references embedded in this workflow's nodes.
    pub fn references(&self) -> impl Iterator<Item = (&Node, &WorkflowReference)> {
        self.nodes
            .iter()
            .filter_map(|node| node.reference().map(|reference| (node, reference)))
    }
}

// ============================================================================
// RESPONSE TYPES (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct WorkflowListPage {
    #[serde(default)]
    data: Vec<Workflow>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

/// Body accepted by the create/update endpoints. The public api rejects
/// server-owned fields (`id`, `active`, timestamps), so the upsert body is
/// narrowed to the writable subset.
#[derive(Debug, Serialize)]
struct WorkflowUpsert<'a> {
    name: &'a str,
    nodes: &'a [Node],
    connections: &'a Value,
    settings: Value,
}

impl<'a> WorkflowUpsert<'a> {
    fn from_workflow(workflow: &'a Workflow) -> Self {
        WorkflowUpsert {
            name: &workflow.name,
            nodes: &workflow.nodes,
            connections: &workflow.connections,
            settings: workflow
                .extra
                .get("settings")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        }
    }
}

// ============================================================================
// BUILDER STRUCTS (public)
// ============================================================================

/// Request builder for listing workflows.
#[derive(Debug)]
pub struct ListWorkflowsRequest {
    client: N8nClient,
    limit: u32,
    include_archived: bool,
}

impl ListWorkflowsRequest {
    /// Sets the page size (server max 250).
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.min(MAX_PAGINATION_LIMIT);
        self
    }

    /// Includes archived workflows in the result (excluded by default).
    pub fn include_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    /// Fetches all pages and returns the combined list.
    pub async fn list(self) -> Result<Vec<Workflow>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![("limit".to_string(), self.limit.to_string())];
            if let Some(cursor) = cursor.as_ref() {
                query.push(("cursor".to_string(), cursor.clone()));
            }
            let page: WorkflowListPage = self
                .client
                .http()
                .get_json("/workflows", &query)
                .await?;
            all.extend(page.data);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        if !self.include_archived {
            all.retain(|workflow| !workflow.is_archived);
        }
        Ok(all)
    }
}

// ============================================================================
// CLIENT METHODS
// ============================================================================

impl N8nClient {
    /// Lists workflows. By default archived workflows are filtered out.
    pub fn workflows(&self) -> ListWorkflowsRequest {
        ListWorkflowsRequest {
            client: self.clone(),
            limit: DEFAULT_PAGINATION_LIMIT,
            include_archived: false,
        }
    }

    /// Fetches a single workflow by id.
    pub async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        self.http().get_json(&format!("/workflows/{id}"), &[]).await
    }

    /// Creates a workflow. The server assigns the resulting id.
    pub async fn create_workflow(&self, workflow: &Workflow) -> Result<Workflow> {
        self.http()
            .post_json("/workflows", &WorkflowUpsert::from_workflow(workflow))
            .await
    }

    /// Updates the workflow stored under `id` in place.
    pub async fn update_workflow(&self, id: &str, workflow: &Workflow) -> Result<Workflow> {
        self.http()
            .put_json(
                &format!("/workflows/{id}"),
                &WorkflowUpsert::from_workflow(workflow),
            )
            .await
    }

    /// Deletes the workflow stored under `id`.
    pub async fn delete_workflow(&self, id: &str) -> Result<Workflow> {
        self.http().delete_json(&format!("/workflows/{id}")).await
    }
}
