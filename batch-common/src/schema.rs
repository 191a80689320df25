use std::collections::HashMap;

use sqlx::MySqlPool;
use thiserror::Error;
use tracing::warn;

use crate::statement::{normalize_date, SqlValue, Statement};

/// Enumeration of errors for schema discovery and mutation generation.
/// `FieldCountMismatch` is the only recoverable one: the caller skips the
/// offending line and continues.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to read columns for table {table}: {error}")]
    Introspection { table: String, error: sqlx::Error },
    #[error("table {0} has no columns")]
    EmptyTable(String),
    #[error("no header column matches a column of table {0}")]
    NoUsableColumns(String),
    #[error("line has {found} fields but {expected} columns are active")]
    FieldCountMismatch { expected: usize, found: usize },
}

/// Column name/type cache for one target table, plus the ordered subset of
/// columns selected for the current run.
///
/// Populated once at startup and read-only afterwards, so it is shared across
/// workers behind an `Arc` with no further synchronization.
pub struct TableSchema {
    table: String,
    columns: HashMap<String, String>,
    active: Vec<String>,
}

impl TableSchema {
    /// Discover the columns of `table` in the currently selected database.
    pub async fn load(pool: &MySqlPool, table: &str) -> Result<Self, SchemaError> {
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ?",
        )
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|error| SchemaError::Introspection {
            table: table.to_owned(),
            error,
        })?;

        if columns.is_empty() {
            return Err(SchemaError::EmptyTable(table.to_owned()));
        }

        Ok(Self {
            table: table.to_owned(),
            columns: columns.into_iter().collect(),
            active: Vec::new(),
        })
    }

    #[cfg(test)]
    fn from_columns(table: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            table: table.to_owned(),
            columns: columns
                .iter()
                .map(|(name, data_type)| ((*name).to_owned(), (*data_type).to_owned()))
                .collect(),
            active: Vec::new(),
        }
    }

    /// Select the active column list from the header line, in header order.
    /// Header fields that name no column of the table are ignored with a
    /// warning. The list is set once; it never changes during a run.
    pub fn set_active_columns(&mut self, header: &[&str]) -> Result<(), SchemaError> {
        for name in header {
            if !self.columns.contains_key(*name) {
                warn!(column = *name, table = %self.table, "column does not exist in table, ignoring");
                continue;
            }
            self.active.push((*name).to_owned());
        }
        if self.active.is_empty() {
            return Err(SchemaError::NoUsableColumns(self.table.clone()));
        }
        Ok(())
    }

    pub fn active_columns(&self) -> &[String] {
        &self.active
    }

    /// Generate a replace-on-conflict upsert for one data line.
    ///
    /// Tokens align positionally with the active column list; a line with
    /// fewer fields than active columns is rejected up front so generation
    /// never indexes past the end. Empty tokens are substituted with a
    /// type-appropriate default; non-empty tokens pass through as-is, except
    /// datetime columns which are normalized.
    pub fn upsert_statement(&self, tokens: &[&str]) -> Result<Statement, SchemaError> {
        if tokens.len() < self.active.len() {
            return Err(SchemaError::FieldCountMismatch {
                expected: self.active.len(),
                found: tokens.len(),
            });
        }

        let mut columns = Vec::with_capacity(self.active.len());
        let mut placeholders = Vec::with_capacity(self.active.len());
        let mut values = Vec::with_capacity(self.active.len());

        for (i, column) in self.active.iter().enumerate() {
            columns.push(format!("`{column}`"));
            placeholders.push("?");
            // set_active_columns only admits known columns
            let data_type = self.columns.get(column).map(String::as_str).unwrap_or("");
            values.push(coerce(data_type, tokens[i]));
        }

        let sql = format!(
            "REPLACE INTO `{}` ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", "),
        );

        Ok(Statement::new(sql, values))
    }
}

fn coerce(data_type: &str, token: &str) -> SqlValue {
    if token.is_empty() {
        return match data_type {
            "int" | "bigint" => SqlValue::Integer(0),
            "decimal" => SqlValue::Decimal(0.0),
            "datetime" => SqlValue::Null,
            _ => SqlValue::Text(String::new()),
        };
    }

    if data_type == "datetime" {
        SqlValue::Text(normalize_date(token))
    } else {
        SqlValue::Text(token.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_schema() -> TableSchema {
        let mut schema = TableSchema::from_columns(
            "t",
            &[("id", "int"), ("name", "varchar"), ("joined", "datetime")],
        );
        schema
            .set_active_columns(&["id", "name", "joined"])
            .expect("header columns exist");
        schema
    }

    #[test]
    fn test_upsert_statement_shape_and_values() {
        let schema = demo_schema();

        let statement = schema
            .upsert_statement(&["7", "", "2023"])
            .expect("aligned token count");

        assert_eq!(
            statement.sql,
            "REPLACE INTO `t` (`id`, `name`, `joined`) VALUES (?, ?, ?)"
        );
        assert_eq!(
            statement.values,
            vec![
                SqlValue::Text("7".to_owned()),
                SqlValue::Text(String::new()),
                SqlValue::Text("20230101".to_owned()),
            ]
        );
    }

    #[test]
    fn test_empty_tokens_get_typed_defaults() {
        let mut schema = TableSchema::from_columns(
            "t",
            &[
                ("id", "bigint"),
                ("amount", "decimal"),
                ("joined", "datetime"),
                ("name", "varchar"),
            ],
        );
        schema
            .set_active_columns(&["id", "amount", "joined", "name"])
            .unwrap();

        let statement = schema.upsert_statement(&["", "", "", ""]).unwrap();

        assert_eq!(
            statement.values,
            vec![
                SqlValue::Integer(0),
                SqlValue::Decimal(0.0),
                SqlValue::Null,
                SqlValue::Text(String::new()),
            ]
        );
    }

    #[test]
    fn test_short_line_is_a_recoverable_mismatch() {
        let schema = demo_schema();

        let result = schema.upsert_statement(&["7", "alice"]);

        assert!(matches!(
            result,
            Err(SchemaError::FieldCountMismatch {
                expected: 3,
                found: 2
            })
        ));

        // the schema is untouched and keeps generating for valid lines
        assert!(schema.upsert_statement(&["8", "bob", "20230102"]).is_ok());
    }

    #[test]
    fn test_extra_tokens_are_ignored() {
        let schema = demo_schema();

        let statement = schema
            .upsert_statement(&["7", "alice", "20230101", "trailing"])
            .unwrap();

        assert_eq!(statement.values.len(), 3);
    }

    #[test]
    fn test_unknown_header_columns_are_skipped() {
        let mut schema = TableSchema::from_columns("t", &[("id", "int")]);
        schema
            .set_active_columns(&["bogus", "id"])
            .expect("one real column remains");

        assert_eq!(schema.active_columns().to_vec(), vec!["id".to_owned()]);
    }

    #[test]
    fn test_header_with_no_known_columns_is_fatal() {
        let mut schema = TableSchema::from_columns("t", &[("id", "int")]);

        assert!(matches!(
            schema.set_active_columns(&["bogus"]),
            Err(SchemaError::NoUsableColumns(_))
        ));
    }
}
