//! Filters and find options for document queries
//!
//! A `Filter` is a conjunction of conditions on document fields. Field paths
//! are dotted identifiers (`status`, `uploadedFile.path`) and are rendered
//! as `json_extract(doc, '$.<path>')`, the same expression the index
//! builder uses, so equality and sort on indexed fields hit the index.

use crate::error::{BookverseError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments};

lazy_static! {
    static ref FIELD_PATH: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
    static ref COLLECTION_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
}

/// Reject anything that is not a dotted identifier
pub(crate) fn validate_field(field: &str) -> Result<()> {
    if FIELD_PATH.is_match(field) {
        Ok(())
    } else {
        Err(BookverseError::invalid_input(format!("Invalid field path: {:?}", field)))
    }
}

/// Collection names are plain identifiers; a leading underscore is reserved
pub(crate) fn validate_collection(name: &str) -> Result<()> {
    if COLLECTION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(BookverseError::invalid_input(format!("Invalid collection name: {:?}", name)))
    }
}

/// SQL expression reading `field` out of the stored document
pub(crate) fn field_expr(field: &str) -> String {
    format!("json_extract(doc, '$.{}')", field)
}

/// Sort direction, matching index key directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    /// Case-insensitive substring match on any of the fields
    ContainsAny(Vec<String>, String),
}

/// Conjunction of field conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field == value`; a `null` value matches missing fields too
    pub fn eq<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.conditions.push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    /// `field != value`; documents missing the field match
    pub fn ne<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.conditions.push(Condition::Ne(field.to_string(), value.into()));
        self
    }

    /// Any of `fields` contains `needle`, ignoring ASCII case
    pub fn contains_any(mut self, fields: &[&str], needle: &str) -> Self {
        self.conditions.push(Condition::ContainsAny(
            fields.iter().map(|f| f.to_string()).collect(),
            needle.to_string(),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render as a WHERE clause (empty string for the empty filter)
    pub(crate) fn to_sql(&self, binds: &mut Vec<SqlValue>) -> Result<String> {
        let mut clauses = Vec::with_capacity(self.conditions.len());

        for condition in &self.conditions {
            let clause = match condition {
                Condition::Eq(field, Value::Null) => {
                    validate_field(field)?;
                    format!("{} IS NULL", field_expr(field))
                }
                Condition::Eq(field, value) => {
                    validate_field(field)?;
                    binds.push(SqlValue::from_json(value)?);
                    format!("{} = ?", field_expr(field))
                }
                Condition::Ne(field, Value::Null) => {
                    validate_field(field)?;
                    format!("{} IS NOT NULL", field_expr(field))
                }
                Condition::Ne(field, value) => {
                    validate_field(field)?;
                    binds.push(SqlValue::from_json(value)?);
                    format!("{} IS NOT ?", field_expr(field))
                }
                Condition::ContainsAny(fields, needle) => {
                    let pattern = format!("%{}%", escape_like(needle));
                    let mut any = Vec::with_capacity(fields.len());
                    for field in fields {
                        validate_field(field)?;
                        binds.push(SqlValue::Text(pattern.clone()));
                        any.push(format!("{} LIKE ? ESCAPE '\\'", field_expr(field)));
                    }
                    if any.is_empty() {
                        return Err(BookverseError::invalid_input("contains_any needs at least one field"));
                    }
                    format!("({})", any.join(" OR "))
                }
            };
            clauses.push(clause);
        }

        if clauses.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", clauses.join(" AND ")))
        }
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
pub(crate) fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Sort, skip and limit for `find`
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    sort: Vec<(String, SortDirection)>,
    limit: Option<u32>,
    skip: Option<u32>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_asc(mut self, field: &str) -> Self {
        self.sort.push((field.to_string(), SortDirection::Ascending));
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort.push((field.to_string(), SortDirection::Descending));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Render ORDER BY / LIMIT / OFFSET. Insertion order breaks ties.
    pub(crate) fn to_sql(&self) -> Result<String> {
        let mut sql = String::new();

        let mut keys = Vec::with_capacity(self.sort.len() + 1);
        for (field, direction) in &self.sort {
            validate_field(field)?;
            keys.push(format!("{} {}", field_expr(field), direction.sql()));
        }
        keys.push("rowid ASC".to_string());
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));

        match (self.limit, self.skip) {
            (Some(limit), Some(skip)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, skip)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(skip)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", skip)),
            (None, None) => {}
        }

        Ok(sql)
    }
}

/// Scalar bound into a document query
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
}

impl SqlValue {
    /// Convert a JSON scalar into what `json_extract` yields for it
    ///
    /// Booleans come out of `json_extract` as 0/1 integers.
    pub(crate) fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Bool(b) => Ok(SqlValue::Int(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlValue::Int(i)),
                None => n
                    .as_f64()
                    .map(SqlValue::Real)
                    .ok_or_else(|| BookverseError::invalid_input(format!("Unsupported number: {}", n))),
            },
            other => Err(BookverseError::invalid_input(format!(
                "Only scalar values can be compared, got {}",
                other
            ))),
        }
    }
}

pub(crate) fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: &[SqlValue],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in binds {
        query = match value {
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_validation() {
        assert!(validate_field("status").is_ok());
        assert!(validate_field("uploadedFile.path").is_ok());
        assert!(validate_field("_id").is_ok());
        assert!(validate_field("status') OR 1=1 --").is_err());
        assert!(validate_field("a..b").is_err());
        assert!(validate_field("").is_err());
    }

    #[test]
    fn test_collection_validation() {
        assert!(validate_collection("books").is_ok());
        assert!(validate_collection("_indexes").is_err());
        assert!(validate_collection("books; DROP TABLE users").is_err());
    }

    #[test]
    fn test_filter_sql() {
        let mut binds = Vec::new();
        let sql = Filter::new()
            .eq("status", "approved")
            .eq("read", false)
            .ne("category", Value::Null)
            .to_sql(&mut binds)
            .unwrap();

        assert_eq!(
            sql,
            " WHERE json_extract(doc, '$.status') = ? AND json_extract(doc, '$.read') = ? \
             AND json_extract(doc, '$.category') IS NOT NULL"
        );
        assert_eq!(binds, vec![SqlValue::Text("approved".into()), SqlValue::Int(0)]);
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let mut binds = Vec::new();
        Filter::new()
            .contains_any(&["title", "author"], "100%_real")
            .to_sql(&mut binds)
            .unwrap();
        assert_eq!(binds.len(), 2);
        assert_eq!(binds[0], SqlValue::Text("%100\\%\\_real%".into()));
    }

    #[test]
    fn test_non_scalar_rejected() {
        let mut binds = Vec::new();
        let err = Filter::new().eq("tags", json!(["a"])).to_sql(&mut binds);
        assert!(matches!(err, Err(BookverseError::InvalidInput(_))));
    }

    #[test]
    fn test_find_options_sql() {
        let sql = FindOptions::new().sort_desc("createdAt").limit(10).to_sql().unwrap();
        assert_eq!(sql, " ORDER BY json_extract(doc, '$.createdAt') DESC, rowid ASC LIMIT 10");

        let sql = FindOptions::new().skip(5).to_sql().unwrap();
        assert_eq!(sql, " ORDER BY rowid ASC LIMIT -1 OFFSET 5");

        // LIMIT -1 would mean "no limit"; only the skip path may emit it
        let sql = FindOptions::new().limit(0).skip(u32::MAX).to_sql().unwrap();
        assert_eq!(sql, " ORDER BY rowid ASC LIMIT 0 OFFSET 4294967295");
    }
}
