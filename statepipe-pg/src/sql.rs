//! SQL text for the states table.
//!
//! Identifiers come from a validated [`TableLayout`]; every value is bound
//! as a text parameter and cast server-side.

use statepipe_core::IdentityFilter;

use crate::config::TableLayout;

/// A statement and its text parameters, in `$n` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<String>,
}

/// JSON object of the columns a record is built from.
///
/// Only the configured document column is projected, so ingestion never
/// picks up another holder the table happens to carry.
fn row_projection(layout: &TableLayout) -> String {
    format!(
        "json_build_object('state_id', s.state_id, '{col}', s.\"{col}\", \
         'created_at', s.created_at, 'updated_at', s.updated_at)::jsonb",
        col = layout.column.as_str()
    )
}

/// Select rows as JSON objects, filtered on identifier keys inside the
/// document column.
///
/// Each clause compares the key's JSON value with the parameter as a JSON
/// string, so only string-valued keys match. The row limit is the last
/// parameter, clamped to the `bigint` range.
pub fn fetch_statement(layout: &TableLayout, filter: &IdentityFilter, limit: usize) -> Statement {
    let column = layout.column.as_str();
    let mut params = Vec::new();
    let mut clauses = Vec::new();

    for (key, value) in filter.clauses() {
        params.push(value.to_string());
        clauses.push(format!(
            "(s.\"{column}\" -> '{}') = to_jsonb(${}::text)",
            key.as_str(),
            params.len()
        ));
    }

    let mut sql = format!(
        "SELECT {} FROM {} s",
        row_projection(layout),
        layout.qualified_table()
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    params.push(i64::try_from(limit).unwrap_or(i64::MAX).to_string());
    sql.push_str(&format!(" LIMIT ${}::text::bigint", params.len()));

    Statement { sql, params }
}

/// Select one row as a JSON object by state id.
pub fn get_statement(layout: &TableLayout) -> String {
    format!(
        "SELECT {} FROM {} s WHERE s.state_id = $1::text::uuid",
        row_projection(layout),
        layout.qualified_table()
    )
}

/// Targeted update: `$1` document text, `$2` state id.
///
/// `updated_at` is set server-side and never moves backwards.
pub fn update_document_statement(layout: &TableLayout) -> String {
    format!(
        "UPDATE {} SET \"{col}\" = $1::text::jsonb, updated_at = GREATEST(now(), updated_at) \
         WHERE state_id = $2::text::uuid",
        layout.qualified_table(),
        col = layout.column.as_str()
    )
}

/// Insert-or-update keyed by state id: `$1` state id, `$2` document text,
/// `$3` created_at, `$4` updated_at (both RFC 3339 text or null).
///
/// An existing row keeps its `created_at`.
pub fn upsert_statement(layout: &TableLayout) -> String {
    format!(
        "INSERT INTO {} AS t (state_id, \"{col}\", created_at, updated_at) \
         VALUES ($1::text::uuid, $2::text::jsonb, \
         COALESCE($3::text::timestamptz, now()), GREATEST(now(), $4::text::timestamptz)) \
         ON CONFLICT (state_id) DO UPDATE SET \"{col}\" = EXCLUDED.\"{col}\", \
         updated_at = GREATEST(EXCLUDED.updated_at, t.updated_at)",
        layout.qualified_table(),
        col = layout.column.as_str()
    )
}

/// Columns of the states table whose names start with a literal prefix:
/// `$1` schema, `$2` table, `$3` LIKE pattern.
pub const LIST_COLUMNS: &str = "SELECT column_name::text, is_nullable::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema::text = $1::text AND table_name::text = $2::text \
     AND column_name::text LIKE $3::text \
     ORDER BY ordinal_position";

/// LIKE pattern matching names that start with `prefix` taken literally.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

// =============================================================================
// TESTS
// =============================================================================
