use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::MySql;

/// A single bound parameter value.
///
/// Mutation generation is the only place values are produced, so an explicit
/// variant per storage class keeps the coercion logic exhaustive.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
    Null,
}

/// A generated mutation: a parameterized SQL template plus its bound values,
/// in placeholder order. Fully self-contained; built once, executed at most
/// once by the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: String, values: Vec<SqlValue>) -> Self {
        Self { sql, values }
    }

    /// Bind this statement's values onto an executable query.
    pub fn as_query(&self) -> Query<'_, MySql, MySqlArguments> {
        let mut query = sqlx::query(&self.sql);
        for value in &self.values {
            query = match value {
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Decimal(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }
}

/// Normalize a datetime digit string by right-padding short values with "01"
/// pairs until they are at least 8 characters, so partial dates gain a
/// default month and day: "2023" -> "20230101", "202301" -> "20230101".
/// Empty input and values already 8 characters or longer pass unchanged.
pub fn normalize_date(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let mut normalized = raw.to_owned();
    while normalized.len() < 8 {
        normalized.push_str("01");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_date_pads_partial_dates() {
        assert_eq!(normalize_date("2023"), "20230101");
        assert_eq!(normalize_date("202301"), "20230101");
    }

    #[test]
    fn test_normalize_date_passes_full_dates_through() {
        assert_eq!(normalize_date("20230101"), "20230101");
        assert_eq!(normalize_date("2023010112"), "2023010112");
    }

    #[test]
    fn test_normalize_date_keeps_empty_input_empty() {
        assert_eq!(normalize_date(""), "");
    }
}
