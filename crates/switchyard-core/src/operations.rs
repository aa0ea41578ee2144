//! Operation table
//!
//! Known `(command_type, action)` pairs resolve to a closed [`Operation`]
//! enum through a table built once on first use. Each operation knows the
//! permission it needs; commands whose action is not in the table still get
//! a derived permission of the form `"<command_type>:<action>"`.

use crate::command::{Command, CommandType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Resource a permission applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Free-form questions
    Query,
    /// Search indexes
    Search,
    /// Documents and drafts
    Document,
    /// Case records
    Case,
    /// Tools
    Tool,
    /// Workflow runs
    Workflow,
    /// Validation services
    Validation,
    /// Administrative surface
    Admin,
    /// Petitions and filings
    Petition,
}

impl Resource {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Search => "search",
            Self::Document => "document",
            Self::Case => "case",
            Self::Tool => "tool",
            Self::Workflow => "workflow",
            Self::Validation => "validation",
            Self::Admin => "admin",
            Self::Petition => "petition",
        }
    }

    /// Default resource of a command type
    #[must_use]
    pub fn for_command_type(command_type: CommandType) -> Self {
        match command_type {
            CommandType::Ask => Self::Query,
            CommandType::Search => Self::Search,
            CommandType::Tool => Self::Tool,
            CommandType::Case => Self::Case,
            CommandType::Generate => Self::Document,
            CommandType::Validate => Self::Validation,
            CommandType::Workflow => Self::Workflow,
            CommandType::Admin => Self::Admin,
            CommandType::HighValue => Self::Petition,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission a command requires
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionTarget {
    /// Action string checked against role tables, e.g. `case:create`
    pub action: String,
    /// Resource type
    pub resource: Resource,
}

/// Closed set of known operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// ask:query
    AskQuery,
    /// search:documents
    SearchDocuments,
    /// search:cases
    SearchCases,
    /// tool:invoke
    ToolInvoke,
    /// case:create
    CaseCreate,
    /// case:read
    CaseRead,
    /// case:update
    CaseUpdate,
    /// case:delete
    CaseDelete,
    /// generate:draft
    GenerateDraft,
    /// generate:summary
    GenerateSummary,
    /// validate:document
    ValidateDocument,
    /// validate:citations
    ValidateCitations,
    /// workflow:run
    WorkflowRun,
    /// workflow:resume
    WorkflowResume,
    /// admin:assign_role
    AdminAssignRole,
    /// admin:audit_query
    AdminAuditQuery,
    /// high_value:full_petition
    FullPetition,
    /// high_value:appeal_brief
    AppealBrief,
    /// high_value:case_strategy
    CaseStrategy,
    /// high_value:multi_document_review
    MultiDocumentReview,
}

impl Operation {
    /// Every operation
    pub const ALL: [Operation; 20] = [
        Self::AskQuery,
        Self::SearchDocuments,
        Self::SearchCases,
        Self::ToolInvoke,
        Self::CaseCreate,
        Self::CaseRead,
        Self::CaseUpdate,
        Self::CaseDelete,
        Self::GenerateDraft,
        Self::GenerateSummary,
        Self::ValidateDocument,
        Self::ValidateCitations,
        Self::WorkflowRun,
        Self::WorkflowResume,
        Self::AdminAssignRole,
        Self::AdminAuditQuery,
        Self::FullPetition,
        Self::AppealBrief,
        Self::CaseStrategy,
        Self::MultiDocumentReview,
    ];

    /// The `(command_type, action)` pair this operation answers to
    #[must_use]
    pub fn key(&self) -> (CommandType, &'static str) {
        match self {
            Self::AskQuery => (CommandType::Ask, "query"),
            Self::SearchDocuments => (CommandType::Search, "documents"),
            Self::SearchCases => (CommandType::Search, "cases"),
            Self::ToolInvoke => (CommandType::Tool, "invoke"),
            Self::CaseCreate => (CommandType::Case, "create"),
            Self::CaseRead => (CommandType::Case, "read"),
            Self::CaseUpdate => (CommandType::Case, "update"),
            Self::CaseDelete => (CommandType::Case, "delete"),
            Self::GenerateDraft => (CommandType::Generate, "draft"),
            Self::GenerateSummary => (CommandType::Generate, "summary"),
            Self::ValidateDocument => (CommandType::Validate, "document"),
            Self::ValidateCitations => (CommandType::Validate, "citations"),
            Self::WorkflowRun => (CommandType::Workflow, "run"),
            Self::WorkflowResume => (CommandType::Workflow, "resume"),
            Self::AdminAssignRole => (CommandType::Admin, "assign_role"),
            Self::AdminAuditQuery => (CommandType::Admin, "audit_query"),
            Self::FullPetition => (CommandType::HighValue, "full_petition"),
            Self::AppealBrief => (CommandType::HighValue, "appeal_brief"),
            Self::CaseStrategy => (CommandType::HighValue, "case_strategy"),
            Self::MultiDocumentReview => (CommandType::HighValue, "multi_document_review"),
        }
    }

    /// Permission this operation requires
    #[must_use]
    pub fn permission(&self) -> PermissionTarget {
        let (action, resource) = match self {
            Self::AskQuery => ("ask:query", Resource::Query),
            Self::SearchDocuments => ("search:documents", Resource::Search),
            Self::SearchCases => ("search:cases", Resource::Search),
            Self::ToolInvoke => ("tool:invoke", Resource::Tool),
            Self::CaseCreate => ("case:create", Resource::Case),
            Self::CaseRead => ("case:read", Resource::Case),
            Self::CaseUpdate => ("case:update", Resource::Case),
            Self::CaseDelete => ("case:delete", Resource::Case),
            Self::GenerateDraft => ("document:draft", Resource::Document),
            Self::GenerateSummary => ("document:summarize", Resource::Document),
            Self::ValidateDocument => ("validate:document", Resource::Validation),
            Self::ValidateCitations => ("validate:citations", Resource::Validation),
            Self::WorkflowRun => ("workflow:run", Resource::Workflow),
            Self::WorkflowResume => ("workflow:resume", Resource::Workflow),
            Self::AdminAssignRole => ("admin:assign_role", Resource::Admin),
            Self::AdminAuditQuery => ("admin:audit_query", Resource::Admin),
            Self::FullPetition => ("petition:file", Resource::Petition),
            Self::AppealBrief => ("petition:appeal", Resource::Petition),
            Self::CaseStrategy => ("petition:strategy", Resource::Petition),
            Self::MultiDocumentReview => ("petition:review", Resource::Petition),
        };
        PermissionTarget {
            action: action.to_string(),
            resource,
        }
    }
}

/// Lookup table from `(command_type, action)` to [`Operation`]
pub struct OperationTable {
    entries: HashMap<(CommandType, String), Operation>,
}

impl OperationTable {
    fn build() -> Self {
        let entries = Operation::ALL
            .iter()
            .map(|op| {
                let (command_type, action) = op.key();
                ((command_type, action.to_string()), *op)
            })
            .collect();
        Self { entries }
    }

    /// Process-wide table, built on first use
    #[must_use]
    pub fn global() -> &'static OperationTable {
        static TABLE: OnceLock<OperationTable> = OnceLock::new();
        TABLE.get_or_init(Self::build)
    }

    /// Resolve a known operation
    #[must_use]
    pub fn resolve(&self, command_type: CommandType, action: &str) -> Option<Operation> {
        let key = (command_type, action.trim().to_ascii_lowercase());
        self.entries.get(&key).copied()
    }

    /// Resolve a command's operation
    #[must_use]
    pub fn resolve_command(&self, command: &Command) -> Option<Operation> {
        self.resolve(command.command_type, command.effective_action())
    }

    /// Permission a command requires, derived when the operation is unknown
    #[must_use]
    pub fn permission_for(&self, command: &Command) -> PermissionTarget {
        match self.resolve_command(command) {
            Some(op) => op.permission(),
            None => PermissionTarget {
                action: format!(
                    "{}:{}",
                    command.command_type.as_str(),
                    command.effective_action().to_ascii_lowercase()
                ),
                resource: Resource::for_command_type(command.command_type),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_resolves_to_itself() {
        let table = OperationTable::global();
        for op in Operation::ALL {
            let (t, a) = op.key();
            assert_eq!(table.resolve(t, a), Some(op));
        }
    }

    #[test]
    fn test_permission_mapping() {
        let table = OperationTable::global();
        let create = Command::new("u", CommandType::Case, "Create");
        let target = table.permission_for(&create);
        assert_eq!(target.action, "case:create");
        assert_eq!(target.resource, Resource::Case);

        let draft = Command::new("u", CommandType::Generate, "");
        assert_eq!(table.permission_for(&draft).action, "document:draft");
    }

    #[test]
    fn test_unknown_action_gets_derived_permission() {
        let table = OperationTable::global();
        let cmd = Command::new("u", CommandType::Admin, "purge_cache");
        assert!(table.resolve_command(&cmd).is_none());
        let target = table.permission_for(&cmd);
        assert_eq!(target.action, "admin:purge_cache");
        assert_eq!(target.resource, Resource::Admin);
    }
}
