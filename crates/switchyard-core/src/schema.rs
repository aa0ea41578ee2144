//! Payload schemas
//!
//! Schemas are registered per `(command_type, action)`; registering with
//! `action = None` covers every action of that type. Exact registrations
//! win over the wildcard.

use crate::command::{Command, CommandType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Expected JSON kind of a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// Integral JSON number
    Integer,
    /// JSON boolean
    Bool,
    /// JSON array
    Array,
    /// JSON object
    Object,
    /// Anything but null
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => !value.is_null(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpec {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// Shape a payload must have
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSchema {
    fields: Vec<FieldSpec>,
}

impl PayloadSchema {
    /// Empty schema (accepts any object)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Add an optional field (type-checked when present)
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Check a payload, collecting every problem
    pub fn check(&self, payload: &Map<String, Value>) -> std::result::Result<(), Vec<String>> {
        let problems: Vec<String> = self
            .fields
            .iter()
            .filter_map(|field| match payload.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    Some(format!("missing required field '{}'", field.name))
                }
                None | Some(Value::Null) => None,
                Some(value) if !field.kind.matches(value) => Some(format!(
                    "field '{}' must be {}",
                    field.name,
                    field.kind.as_str()
                )),
                Some(_) => None,
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// Validation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Reject commands with no registered schema
    #[serde(default)]
    pub deny_unregistered: bool,
}

impl ValidationConfig {
    /// Enable deny-by-default
    #[must_use]
    pub fn with_deny_unregistered(mut self, deny: bool) -> Self {
        self.deny_unregistered = deny;
        self
    }
}

/// Registry of payload schemas
pub struct SchemaRegistry {
    schemas: HashMap<(CommandType, Option<String>), PayloadSchema>,
    deny_unregistered: bool,
}

impl SchemaRegistry {
    /// Empty registry
    #[must_use]
    pub fn empty(config: &ValidationConfig) -> Self {
        Self {
            schemas: HashMap::new(),
            deny_unregistered: config.deny_unregistered,
        }
    }

    /// Registry with the built-in schemas
    #[must_use]
    pub fn new(config: &ValidationConfig) -> Self {
        let mut registry = Self::empty(config);
        registry.register_defaults();
        registry
    }

    fn register_defaults(&mut self) {
        use FieldKind::*;

        self.register(
            CommandType::Ask,
            None,
            PayloadSchema::new()
                .required("query", String)
                .optional("top_k", Integer),
        );
        self.register(
            CommandType::Search,
            None,
            PayloadSchema::new()
                .required("query", String)
                .optional("top_k", Integer),
        );
        self.register(
            CommandType::Tool,
            Some("invoke"),
            PayloadSchema::new()
                .required("tool_id", String)
                .optional("arguments", Object)
                .optional("policy", String)
                .optional("timeout_secs", Integer),
        );
        self.register(
            CommandType::Case,
            Some("create"),
            PayloadSchema::new().required("title", String),
        );
        self.register(
            CommandType::Case,
            None,
            PayloadSchema::new().required("case_id", String),
        );
        self.register(
            CommandType::Generate,
            None,
            PayloadSchema::new().required("prompt", String),
        );
        self.register(
            CommandType::Validate,
            None,
            PayloadSchema::new().required("document", String),
        );
        self.register(
            CommandType::Workflow,
            None,
            PayloadSchema::new()
                .required("workflow", String)
                .optional("input", Object)
                .optional("thread_id", String),
        );
        self.register(
            CommandType::HighValue,
            Some("full_petition"),
            PayloadSchema::new()
                .required("documents", Array)
                .optional("steps", Array),
        );
    }

    /// Register a schema; `action = None` covers every action of the type
    pub fn register(&mut self, command_type: CommandType, action: Option<&str>, schema: PayloadSchema) {
        let key = (command_type, action.map(|a| a.trim().to_ascii_lowercase()));
        self.schemas.insert(key, schema);
    }

    /// Schema for a command: exact match first, then the type wildcard
    #[must_use]
    pub fn lookup(&self, command_type: CommandType, action: &str) -> Option<&PayloadSchema> {
        let action = action.trim().to_ascii_lowercase();
        self.schemas
            .get(&(command_type, Some(action)))
            .or_else(|| self.schemas.get(&(command_type, None)))
    }

    /// Validate a command's payload
    pub fn validate(&self, command: &Command) -> Result<()> {
        let action = command.effective_action();
        let Some(schema) = self.lookup(command.command_type, action) else {
            if self.deny_unregistered {
                return Err(Error::Validation(format!(
                    "no payload schema registered for {}:{action}",
                    command.command_type
                )));
            }
            debug!(
                command_id = %command.id,
                command_type = %command.command_type,
                action = %action,
                "No payload schema registered, passing unchecked"
            );
            return Ok(());
        };

        schema.check(&command.payload).map_err(|problems| {
            Error::Validation(format!(
                "{}:{action}: {}",
                command.command_type,
                problems.join("; ")
            ))
        })
    }
}
