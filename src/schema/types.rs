//! Space layout definitions
//!
//! A [`SpaceSchema`] renders itself into the administrative Lua statements
//! the engine evaluates during bootstrap.

use std::fmt;

use super::errors::{BootstrapError, BootstrapResult, BootstrapStep};

/// Field types used by the key-value space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
}

impl FieldType {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
        }
    }
}

/// A named, typed tuple field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::String,
        }
    }
}

/// Index structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Ordered; supports equality and range lookups
    Tree,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexType::Tree => write!(f, "tree"),
        }
    }
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub parts: Vec<String>,
    pub index_type: IndexType,
}

/// Full layout of a space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceSchema {
    pub name: String,
    pub storage_engine: String,
    pub fields: Vec<FieldDef>,
    pub primary: IndexDef,
}

/// Space names are spliced into Lua as `box.space.<name>`.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SpaceSchema {
    /// The `(id: string, value: string)` space with a tree primary index on `id`.
    pub fn key_value(name: &str) -> BootstrapResult<Self> {
        if !is_identifier(name) {
            return Err(BootstrapError::InvalidSpaceName(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            storage_engine: "memtx".to_string(),
            fields: vec![FieldDef::string("id"), FieldDef::string("value")],
            primary: IndexDef {
                name: "primary".to_string(),
                parts: vec!["id".to_string()],
                index_type: IndexType::Tree,
            },
        })
    }

    pub fn create_space_expr(&self) -> String {
        format!(
            "box.schema.space.create('{}', {{ if_not_exists = true, engine = '{}' }})",
            self.name, self.storage_engine
        )
    }

    pub fn format_expr(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{{ name = '{}', type = '{}' }}", f.name, f.field_type.type_name()))
            .collect();
        format!("box.space.{}:format({{ {} }})", self.name, fields.join(", "))
    }

    pub fn create_index_expr(&self) -> String {
        let parts: Vec<String> = self
            .primary
            .parts
            .iter()
            .map(|p| format!("'{}'", p))
            .collect();
        format!(
            "box.space.{}:create_index('{}', {{ parts = {{ {} }}, type = '{}', if_not_exists = true }})",
            self.name,
            self.primary.name,
            parts.join(", "),
            self.primary.index_type
        )
    }

    pub fn space_id_expr(&self) -> String {
        format!("return box.space.{}.id", self.name)
    }

    /// Provisioning statements in execution order
    pub fn statements(&self) -> Vec<(BootstrapStep, String)> {
        vec![
            (BootstrapStep::CreateSpace, self.create_space_expr()),
            (BootstrapStep::Format, self.format_expr()),
            (BootstrapStep::CreateIndex, self.create_index_expr()),
        ]
    }
}
