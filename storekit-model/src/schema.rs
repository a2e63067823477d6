use serde::{Deserialize, Serialize};
use storekit_types::Enumeration;
use thiserror::Error;

/// An entity schema that a backing-context adapter cannot use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid table name '{0}': use ASCII letters, digits and underscores")]
    InvalidTable(String),

    #[error("invalid field path '{0}': must be a JSON pointer starting with '/'")]
    InvalidFieldPath(String),

    #[error("field '{0}' is indexed more than once")]
    DuplicateField(String),
}

/// Describes an entity type's storage layout.
///
/// Supplied alongside the entity type when it is registered with a backing
/// engine. Stores never inspect it; only adapters do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the partition column is indexed.
    #[serde(default)]
    pub partitioned: bool,
    #[serde(default)]
    pub indexed_fields: Vec<IndexedField>,
}

impl EntitySchema {
    /// A schema whose table is named after the entity type.
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.into(),
            table: entity_type.into(),
            description: None,
            partitioned: false,
            indexed_fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.into();
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn partitioned(mut self) -> Self {
        self.partitioned = true;
        self
    }

    pub fn index(mut self, field: IndexedField) -> Self {
        self.indexed_fields.push(field);
        self
    }

    /// Checks that the schema can be turned into storage DDL.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !is_identifier(&self.table) {
            return Err(SchemaError::InvalidTable(self.table.clone()));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.indexed_fields {
            if !field.field_path.starts_with('/') || field.field_path.len() < 2 {
                return Err(SchemaError::InvalidFieldPath(field.field_path.clone()));
            }
            if !field.field_path[1..].split('/').all(is_identifier) {
                return Err(SchemaError::InvalidFieldPath(field.field_path.clone()));
            }
            if !seen.insert(field.field_path.as_str()) {
                return Err(SchemaError::DuplicateField(field.field_path.clone()));
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A field extracted from entity JSON for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedField {
    /// JSON pointer path (e.g., "/name", "/address/city").
    pub field_path: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub unique: bool,
    /// Free-text column comment carried into the schema description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Allowed enumeration names. Only meaningful when FieldType is Enum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_options: Option<Vec<String>>,
}

impl IndexedField {
    fn simple(path: &str, field_type: FieldType) -> Self {
        Self {
            field_path: path.into(),
            field_type,
            unique: false,
            comment: None,
            enum_options: None,
        }
    }

    /// Shorthand for a text field.
    pub fn text(path: &str) -> Self {
        Self::simple(path, FieldType::Text)
    }

    /// Shorthand for a numeric field.
    pub fn number(path: &str) -> Self {
        Self::simple(path, FieldType::Number)
    }

    /// Shorthand for a boolean field.
    pub fn bool(path: &str) -> Self {
        Self::simple(path, FieldType::Bool)
    }

    /// Shorthand for a DateTime field.
    pub fn datetime(path: &str) -> Self {
        Self::simple(path, FieldType::DateTime)
    }

    /// Shorthand for a field holding another entity's id.
    pub fn reference(path: &str) -> Self {
        Self::simple(path, FieldType::Reference)
    }

    /// An enumeration field; options are the registered member names.
    pub fn enumeration<T: Enumeration>(path: &str) -> Self {
        Self {
            enum_options: Some(T::all().iter().map(|m| m.name().to_string()).collect()),
            ..Self::simple(path, FieldType::Enum)
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// The data type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Bool,
    DateTime,
    Reference,
    Enum,
}
