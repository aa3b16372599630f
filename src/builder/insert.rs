//! INSERT statement builder

use crate::error::{DbError, Result};
use crate::precompiler::Precompiler;
use crate::types::SqlValue;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Accumulates INSERT build instructions, supporting multi-row batches
/// indexed by row number
pub struct InsertBuilder {
	pre: Arc<dyn Precompiler>,
	table: String,
	// Column order is first-seen order across all rows; rows missing a column
	// are filled with NULL so every tuple has the same shape.
	columns: Vec<String>,
	rows: BTreeMap<usize, IndexMap<String, SqlValue>>,
}

impl InsertBuilder {
	pub fn new(pre: Arc<dyn Precompiler>, table: impl Into<String>) -> Self {
		Self {
			pre,
			table: table.into(),
			columns: Vec::new(),
			rows: BTreeMap::new(),
		}
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn row_count(&self) -> usize {
		self.rows.len()
	}

	/// Set a column value on the first row
	pub fn set(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
		self.set_row(0, column, value)
	}

	/// Set a column value on a specific batch row
	pub fn set_row(
		mut self,
		row: usize,
		column: impl Into<String>,
		value: impl Into<SqlValue>,
	) -> Self {
		let column = column.into();
		if !self.columns.contains(&column) {
			self.columns.push(column.clone());
		}
		self.rows.entry(row).or_default().insert(column, value.into());
		self
	}

	/// Render the accumulated instructions to SQL text
	pub fn statement(&self, terminated: bool) -> Result<String> {
		if self.rows.is_empty() {
			return Err(DbError::BuildInstruction(
				"insert requires at least one row".to_string(),
			));
		}
		let pre = self.pre.as_ref();

		let mut sql = String::from("INSERT INTO ");
		sql.push_str(&pre.identifier(&self.table));

		let rendered_columns: Vec<String> =
			self.columns.iter().map(|c| pre.identifier(c)).collect();
		sql.push_str(" (");
		sql.push_str(&rendered_columns.join(", "));
		sql.push_str(") VALUES ");

		let tuples: Vec<String> = self
			.rows
			.values()
			.map(|row| {
				let cells: Vec<String> = self
					.columns
					.iter()
					.map(|column| {
						let value = row.get(column).cloned().unwrap_or(SqlValue::Null);
						pre.value(&value, false)
					})
					.collect();
				format!("({})", cells.join(", "))
			})
			.collect();
		sql.push_str(&tuples.join(", "));

		if terminated {
			sql.push(';');
		}
		Ok(sql)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::precompiler::{PostgresPrecompiler, SqlitePrecompiler};
	use rstest::rstest;

	fn pg() -> Arc<dyn Precompiler> {
		Arc::new(PostgresPrecompiler)
	}

	#[rstest]
	fn test_single_row_insert() {
		let sql = InsertBuilder::new(pg(), "users")
			.set("name", "Alice")
			.set("age", 30i64)
			.statement(true)
			.unwrap();
		assert_eq!(
			sql,
			"INSERT INTO \"users\" (\"name\", \"age\") VALUES ('Alice', 30);"
		);
	}

	#[rstest]
	fn test_batch_rows_fill_missing_columns_with_null() {
		// Arrange: row 1 omits `age`, row 0 omits `email`
		let builder = InsertBuilder::new(pg(), "users")
			.set_row(0, "name", "Alice")
			.set_row(0, "age", 30i64)
			.set_row(1, "name", "Bob")
			.set_row(1, "email", "bob@example.com");

		// Act
		let sql = builder.statement(false).unwrap();

		// Assert: one consistent column set across both tuples
		assert_eq!(
			sql,
			"INSERT INTO \"users\" (\"name\", \"age\", \"email\") VALUES \
			 ('Alice', 30, NULL), ('Bob', NULL, 'bob@example.com')"
		);
	}

	#[rstest]
	fn test_rows_render_in_index_order() {
		let sql = InsertBuilder::new(Arc::new(SqlitePrecompiler), "tags")
			.set_row(2, "name", "c")
			.set_row(0, "name", "a")
			.set_row(1, "name", "b")
			.statement(false)
			.unwrap();
		assert_eq!(
			sql,
			"INSERT INTO \"tags\" (\"name\") VALUES ('a'), ('b'), ('c')"
		);
	}

	#[rstest]
	fn test_empty_insert_rejected() {
		let result = InsertBuilder::new(pg(), "users").statement(false);
		assert!(matches!(result, Err(DbError::BuildInstruction(_))));
	}
}
