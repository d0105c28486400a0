//! Tool registry for the CRM gateway.
//!
//! The tools are grouped by CRM entity:
//! - People: contact search and CRUD
//! - Notes: note listing and creation
//! - Tasks: follow-up task management
//! - Calls: call logging
//! - Events: lead ingestion through the CRM's event pipeline

/// People tools category
pub struct PeopleTools;

/// Note tools category
pub struct NoteTools;

/// Task tools category
pub struct TaskTools;

/// Call tools category
pub struct CallTools;

/// Event tools category
pub struct EventTools;

/// Tool category trait
pub trait ToolCategory {
    /// Category name
    fn category_name() -> &'static str where Self: Sized;
    /// List of tool names in this category
    fn tool_names() -> &'static [&'static str] where Self: Sized;
}

impl ToolCategory for PeopleTools {
    fn category_name() -> &'static str { "people" }
    fn tool_names() -> &'static [&'static str] {
        &["list_people", "get_person", "create_person", "update_person", "delete_person"]
    }
}

impl ToolCategory for NoteTools {
    fn category_name() -> &'static str { "notes" }
    fn tool_names() -> &'static [&'static str] { &["list_notes", "get_note", "create_note"] }
}

impl ToolCategory for TaskTools {
    fn category_name() -> &'static str { "tasks" }
    fn tool_names() -> &'static [&'static str] { &["list_tasks", "create_task", "update_task"] }
}

impl ToolCategory for CallTools {
    fn category_name() -> &'static str { "calls" }
    fn tool_names() -> &'static [&'static str] { &["create_call"] }
}

impl ToolCategory for EventTools {
    fn category_name() -> &'static str { "events" }
    fn tool_names() -> &'static [&'static str] { &["create_event"] }
}

/// All tool names
pub const ALL_TOOL_NAMES: &[&str] = &[
    "list_people", "get_person", "create_person", "update_person", "delete_person",
    "list_notes", "get_note", "create_note",
    "list_tasks", "create_task", "update_task",
    "create_call",
    "create_event",
];

/// Total number of tools
pub const TOTAL_TOOLS: usize = ALL_TOOL_NAMES.len();
