//! Declarative collection and index definitions
//!
//! Index names follow the document-store convention of joining each key
//! with its direction: `{ status: 1, createdAt: -1 }` is `status_1_createdAt_-1`
//! and a text key on `title` contributes `title_text`.

use crate::docstore::query::{field_expr, validate_collection, validate_field};
use crate::error::{BookverseError, Result};
use serde::{Deserialize, Serialize};

/// Direction or kind of one index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Ascending,
    Descending,
    /// Full-text key; stored as an ascending key and matched with `Filter::contains_any`
    Text,
}

impl IndexKind {
    /// Key marker used in index names and listings (`1`, `-1`, `text`)
    pub fn name_suffix(&self) -> &'static str {
        match self {
            IndexKind::Ascending => "1",
            IndexKind::Descending => "-1",
            IndexKind::Text => "text",
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            IndexKind::Ascending | IndexKind::Text => "ASC",
            IndexKind::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub kind: IndexKind,
}

/// One index on one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub collection: String,
    pub name: String,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
}

impl IndexSpec {
    /// Build an index with the conventional name derived from its keys
    pub fn new(collection: &str, keys: &[(&str, IndexKind)]) -> Self {
        let keys: Vec<IndexKey> = keys
            .iter()
            .map(|(field, kind)| IndexKey {
                field: field.to_string(),
                kind: *kind,
            })
            .collect();

        let name = keys
            .iter()
            .map(|k| format!("{}_{}", k.field, k.kind.name_suffix()))
            .collect::<Vec<_>>()
            .join("_");

        Self {
            collection: collection.to_string(),
            name,
            keys,
            unique: false,
        }
    }

    /// Key list as `field: kind` pairs, e.g. `status: 1, createdAt: -1`
    pub fn describe_keys(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}: {}", k.field, k.kind.name_suffix()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn ascending(collection: &str, field: &str) -> Self {
        Self::new(collection, &[(field, IndexKind::Ascending)])
    }

    pub fn descending(collection: &str, field: &str) -> Self {
        Self::new(collection, &[(field, IndexKind::Descending)])
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Name of the backing SQLite index (index names are database-global)
    pub(crate) fn sqlite_name(&self) -> String {
        format!("{}.{}", self.collection, self.name)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_collection(&self.collection)?;
        if self.keys.is_empty() {
            return Err(BookverseError::invalid_input(format!(
                "Index {} on {} has no keys",
                self.name, self.collection
            )));
        }
        if self.name.is_empty() || self.name.contains('"') {
            return Err(BookverseError::invalid_input(format!("Invalid index name: {:?}", self.name)));
        }
        for key in &self.keys {
            validate_field(&key.field)?;
        }
        Ok(())
    }

    /// CREATE INDEX statement for this spec
    pub(crate) fn create_sql(&self) -> String {
        let columns = self
            .keys
            .iter()
            .map(|k| format!("{} {}", field_expr(&k.field), k.kind.sql()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "CREATE {}INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.sqlite_name(),
            self.collection,
            columns
        )
    }

    /// Same key pattern, regardless of name or uniqueness
    pub(crate) fn same_keys(&self, other: &IndexSpec) -> bool {
        self.collection == other.collection && self.keys == other.keys
    }
}

/// A collection with its declared indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub indexes: Vec<IndexSpec>,
    /// Documents can be inserted but never updated or deleted
    pub append_only: bool,
}

impl CollectionSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            indexes: Vec::new(),
            append_only: false,
        }
    }

    pub fn append_only(mut self) -> Self {
        self.append_only = true;
        self
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }
}
