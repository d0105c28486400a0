//! MCP Server Implementation
//!
//! Implements the Model Context Protocol server for the Follow Up Boss
//! tool gateway. Every tool resolves to exactly one CRM call and hands the
//! CRM's JSON response back to the agent unchanged.

use rmcp::{
    handler::server::ServerHandler,
    model::*,
    schemars::{self, JsonSchema},
    serde::{Deserialize, Serialize},
    tool, ServiceExt,
};
use std::sync::Arc;
use tracing::{debug, info};

use leadbridge_crm::{CrmClient, PageQuery};
use serde_json::{Map, Value};

use crate::auth::{AuthDecision, AuthManager};
use crate::rpc_error;

/// Main MCP server for the CRM tool gateway.
#[derive(Clone)]
pub struct LeadbridgeMcpServer {
    crm: Arc<CrmClient>,
    auth: AuthManager,
    /// Key the connected agent presented at startup (stdio has no
    /// per-request headers).
    agent_key: Option<String>,
}

impl LeadbridgeMcpServer {
    /// Create a server with an open gateway (no agent keys).
    pub fn new(crm: Arc<CrmClient>) -> Self {
        Self { crm, auth: AuthManager::open(), agent_key: None }
    }

    /// Create a server that validates the presented agent key on every
    /// tool call.
    pub fn with_auth(crm: Arc<CrmClient>, auth: AuthManager, agent_key: Option<String>) -> Self {
        Self { crm, auth, agent_key }
    }

    /// Run the server with stdio transport.
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        use tokio::io::{stdin, stdout};

        info!("starting MCP server with stdio transport");

        let service = self.serve((stdin(), stdout())).await?;
        let _quit = service.waiting().await?;

        info!("MCP server shutdown complete");
        Ok(())
    }

    async fn guard(&self) -> Result<(), rmcp::Error> {
        match self.auth.authorize(self.agent_key.as_deref()).await {
            AuthDecision::Allowed { .. } => Ok(()),
            AuthDecision::Denied { reason, retry_after_secs } => {
                let data = retry_after_secs
                    .map(|secs| serde_json::json!({"retry_after_secs": secs}));
                Err(rmcp::Error::internal_error(reason, data))
            }
        }
    }
}

// Implement ServerHandler trait for MCP protocol
#[tool(tool_box)]
impl ServerHandler for LeadbridgeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..Default::default()
            },
            server_info: Implementation {
                name: "leadbridge-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Follow Up Boss CRM gateway. Manage contacts, notes, tasks, \
                 log calls, and ingest leads through events."
                    .to_string(),
            ),
        }
    }
}

fn crm_response(value: Value) -> Result<CallToolResult, rmcp::Error> {
    let content = serde_json::to_string_pretty(&value)
        .map_err(|e| rmcp::Error::internal_error(e.to_string(), None))?;
    Ok(CallToolResult { content: vec![Content::text(content)], is_error: Some(false) })
}

/// Turn a flattened filter map into query parameters. Strings pass
/// through; scalars are stringified; null filters are dropped.
fn filter_params(filters: Map<String, Value>) -> Vec<(String, String)> {
    filters
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

fn default_limit() -> u32 {
    25
}

// ============================================================================
// People Tools
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListPeopleInput {
    #[schemars(description = "Maximum results per page (1-100)", default = "default_limit")]
    #[serde(default = "default_limit")]
    pub limit: u32,

    #[schemars(description = "Number of results to skip")]
    #[serde(default)]
    pub offset: u32,

    #[schemars(description = "Additional CRM filters, e.g. email, phone, stage")]
    #[serde(flatten)]
    pub filters: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetPersonInput {
    #[schemars(description = "CRM person id")]
    pub person_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreatePersonInput {
    #[schemars(description = "Contact fields; at least a name or an email is required")]
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdatePersonInput {
    #[schemars(description = "CRM person id")]
    pub person_id: String,

    #[schemars(description = "Fields to change; the id itself cannot be changed")]
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeletePersonInput {
    #[schemars(description = "CRM person id")]
    pub person_id: String,
}

#[tool(tool_box)]
impl LeadbridgeMcpServer {
    /// List contacts with pagination and optional filters
    #[tool(name = "list_people", description = "List CRM contacts with pagination and filters")]
    async fn list_people(
        &self,
        #[tool(aggr)] input: ListPeopleInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        debug!(limit = input.limit, offset = input.offset, "list_people called");

        let page = PageQuery { limit: input.limit, offset: input.offset };
        let result = self
            .crm
            .list_people(page, &filter_params(input.filters))
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// Fetch a single contact by id
    #[tool(name = "get_person", description = "Fetch one CRM contact by id")]
    async fn get_person(
        &self,
        #[tool(aggr)] input: GetPersonInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self.crm.get_person(&input.person_id).await.map_err(rpc_error)?;
        crm_response(result)
    }

    /// Create a new contact
    #[tool(name = "create_person", description = "Create a CRM contact (requires name or email)")]
    async fn create_person(
        &self,
        #[tool(aggr)] input: CreatePersonInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self.crm.create_person(input.fields).await.map_err(rpc_error)?;
        crm_response(result)
    }

    /// Update an existing contact
    #[tool(name = "update_person", description = "Update fields on an existing CRM contact")]
    async fn update_person(
        &self,
        #[tool(aggr)] input: UpdatePersonInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self
            .crm
            .update_person(&input.person_id, input.fields)
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// Delete a contact
    #[tool(name = "delete_person", description = "Delete a CRM contact by id")]
    async fn delete_person(
        &self,
        #[tool(aggr)] input: DeletePersonInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self.crm.delete_person(&input.person_id).await.map_err(rpc_error)?;
        crm_response(result)
    }

    /// List notes, optionally scoped to one person
    #[tool(name = "list_notes", description = "List CRM notes, optionally for one contact")]
    async fn list_notes(
        &self,
        #[tool(aggr)] input: ListNotesInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let page = PageQuery { limit: input.limit, offset: input.offset };
        let result = self
            .crm
            .list_notes(page, input.person_id.as_deref())
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// Fetch a single note by id
    #[tool(name = "get_note", description = "Fetch one CRM note by id")]
    async fn get_note(
        &self,
        #[tool(aggr)] input: GetNoteInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self.crm.get_note(&input.note_id).await.map_err(rpc_error)?;
        crm_response(result)
    }

    /// Attach a note to a contact
    #[tool(name = "create_note", description = "Attach a note to a CRM contact")]
    async fn create_note(
        &self,
        #[tool(aggr)] input: CreateNoteInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self
            .crm
            .create_note(&input.person_id, &input.body, input.is_html)
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// List tasks with pagination and optional filters
    #[tool(name = "list_tasks", description = "List CRM tasks with pagination and filters")]
    async fn list_tasks(
        &self,
        #[tool(aggr)] input: ListTasksInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let page = PageQuery { limit: input.limit, offset: input.offset };
        let result = self
            .crm
            .list_tasks(page, &filter_params(input.filters))
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// Create a follow-up task
    #[tool(name = "create_task", description = "Create a CRM follow-up task")]
    async fn create_task(
        &self,
        #[tool(aggr)] input: CreateTaskInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self
            .crm
            .create_task(
                &input.description,
                input.person_id.as_deref(),
                input.due_date.as_deref(),
                input.assigned_to.as_deref(),
            )
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// Update an existing task
    #[tool(name = "update_task", description = "Update or complete an existing CRM task")]
    async fn update_task(
        &self,
        #[tool(aggr)] input: UpdateTaskInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let task_id = input.task_id.clone();
        let result = self
            .crm
            .update_task(&task_id, input.into_fields())
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// Log a phone call against a contact
    #[tool(name = "create_call", description = "Log a phone call against a CRM contact")]
    async fn create_call(
        &self,
        #[tool(aggr)] input: CreateCallInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self
            .crm
            .create_call(
                &input.person_id,
                input.outcome.as_deref(),
                input.note.as_deref(),
                input.duration,
                input.call_time.as_deref(),
            )
            .await
            .map_err(rpc_error)?;
        crm_response(result)
    }

    /// Ingest a lead through the CRM's event pipeline
    #[tool(
        name = "create_event",
        description = "Create a CRM event; the CRM finds or creates the person itself"
    )]
    async fn create_event(
        &self,
        #[tool(aggr)] input: CreateEventInput,
    ) -> Result<CallToolResult, rmcp::Error> {
        self.guard().await?;
        let result = self.crm.create_event(input.into_event()).await.map_err(rpc_error)?;
        crm_response(result)
    }
}

// ============================================================================
// Note Tools
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListNotesInput {
    #[schemars(description = "Only notes attached to this person")]
    #[serde(default)]
    pub person_id: Option<String>,

    #[schemars(description = "Maximum results per page (1-100)", default = "default_limit")]
    #[serde(default = "default_limit")]
    pub limit: u32,

    #[schemars(description = "Number of results to skip")]
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetNoteInput {
    #[schemars(description = "CRM note id")]
    pub note_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateNoteInput {
    #[schemars(description = "Person the note is attached to")]
    pub person_id: String,

    #[schemars(description = "Note text")]
    pub body: String,

    #[schemars(description = "Whether the body is HTML")]
    #[serde(default)]
    pub is_html: bool,
}

// ============================================================================
// Task Tools
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListTasksInput {
    #[schemars(description = "Maximum results per page (1-100)", default = "default_limit")]
    #[serde(default = "default_limit")]
    pub limit: u32,

    #[schemars(description = "Number of results to skip")]
    #[serde(default)]
    pub offset: u32,

    #[schemars(description = "Additional CRM filters, e.g. personId, assignedTo")]
    #[serde(flatten)]
    pub filters: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateTaskInput {
    #[schemars(description = "What needs to be done")]
    pub description: String,

    #[schemars(description = "Person the task relates to")]
    #[serde(default)]
    pub person_id: Option<String>,

    #[schemars(description = "Due date, e.g. 2026-09-01")]
    #[serde(default)]
    pub due_date: Option<String>,

    #[schemars(description = "User the task is assigned to")]
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTaskInput {
    #[schemars(description = "CRM task id")]
    pub task_id: String,

    #[schemars(description = "New description")]
    #[serde(default)]
    pub description: Option<String>,

    #[schemars(description = "New due date")]
    #[serde(default)]
    pub due_date: Option<String>,

    #[schemars(description = "New assignee")]
    #[serde(default)]
    pub assigned_to: Option<String>,

    #[schemars(description = "Mark the task complete or incomplete")]
    #[serde(default)]
    pub completed: Option<bool>,
}

impl UpdateTaskInput {
    /// Assemble the mutable-field map the CRM accepts. The task id stays
    /// in the route.
    fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(description) = self.description {
            fields.insert("description".to_string(), Value::String(description));
        }
        if let Some(due_date) = self.due_date {
            fields.insert("dueDate".to_string(), Value::String(due_date));
        }
        if let Some(assigned_to) = self.assigned_to {
            fields.insert("assignedTo".to_string(), Value::String(assigned_to));
        }
        if let Some(completed) = self.completed {
            fields.insert("completed".to_string(), Value::Bool(completed));
        }
        fields
    }
}

// ============================================================================
// Call and Event Tools
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateCallInput {
    #[schemars(description = "Person the call was with")]
    pub person_id: String,

    #[schemars(description = "Call outcome, e.g. Interested, No Answer")]
    #[serde(default)]
    pub outcome: Option<String>,

    #[schemars(description = "Free-form call notes")]
    #[serde(default)]
    pub note: Option<String>,

    #[schemars(description = "Call duration in seconds")]
    #[serde(default)]
    pub duration: Option<u64>,

    #[schemars(description = "When the call happened (ISO 8601)")]
    #[serde(default)]
    pub call_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateEventInput {
    #[schemars(description = "Person payload: name, emails, phones, source, stage")]
    pub person: Map<String, Value>,

    #[schemars(description = "Event type, e.g. Inquiry, Registration")]
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,

    #[schemars(description = "Lead source shown in the CRM")]
    #[serde(default)]
    pub source: Option<String>,

    #[schemars(description = "Event message or note")]
    #[serde(default)]
    pub message: Option<String>,

    #[schemars(description = "Additional event fields passed through to the CRM")]
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CreateEventInput {
    fn into_event(self) -> Map<String, Value> {
        let mut event = self.extra;
        event.insert("person".to_string(), Value::Object(self.person));
        if let Some(event_type) = self.event_type {
            event.insert("type".to_string(), Value::String(event_type));
        }
        if let Some(source) = self.source {
            event.insert("source".to_string(), Value::String(source));
        }
        if let Some(message) = self.message {
            event.insert("message".to_string(), Value::String(message));
        }
        event
    }
}
