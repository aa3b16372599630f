//! UPDATE statement builder

use super::ConditionStream;
use crate::error::{DbError, Result};
use crate::precompiler::Precompiler;
use crate::types::{Connector, Operator, SqlValue};
use std::sync::Arc;

/// Accumulates UPDATE build instructions
pub struct UpdateBuilder {
	pre: Arc<dyn Precompiler>,
	table: String,
	sets: Vec<(String, SqlValue)>,
	wheres: ConditionStream,
}

impl UpdateBuilder {
	pub fn new(pre: Arc<dyn Precompiler>, table: impl Into<String>) -> Self {
		Self {
			pre,
			table: table.into(),
			sets: Vec::new(),
			wheres: ConditionStream::new(),
		}
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
		self.sets.push((column.into(), value.into()));
		self
	}

	pub fn where_(
		mut self,
		column: impl Into<String>,
		operator: Operator,
		value: impl Into<SqlValue>,
	) -> Result<Self> {
		self.wheres
			.push(Connector::And, column, operator, value.into())?;
		Ok(self)
	}

	pub fn or_where(
		mut self,
		column: impl Into<String>,
		operator: Operator,
		value: impl Into<SqlValue>,
	) -> Result<Self> {
		self.wheres
			.push(Connector::Or, column, operator, value.into())?;
		Ok(self)
	}

	pub fn begin_group(mut self, connector: Connector) -> Self {
		self.wheres.open(connector);
		self
	}

	pub fn end_group(mut self) -> Self {
		self.wheres.close();
		self
	}

	/// Render the accumulated instructions to SQL text
	pub fn statement(&self, terminated: bool) -> Result<String> {
		if self.sets.is_empty() {
			return Err(DbError::BuildInstruction(
				"update requires at least one SET pair".to_string(),
			));
		}
		let pre = self.pre.as_ref();

		let mut sql = String::from("UPDATE ");
		sql.push_str(&pre.identifier(&self.table));
		sql.push_str(" SET ");

		// SET targets are bare column names; qualification applies to the
		// where stream only.
		let assignments: Vec<String> = self
			.sets
			.iter()
			.map(|(column, value)| {
				format!("{} = {}", pre.identifier(column), pre.value(value, false))
			})
			.collect();
		sql.push_str(&assignments.join(", "));

		if !self.wheres.is_empty() {
			sql.push_str(" WHERE ");
			sql.push_str(&self.wheres.render(pre, Some(&self.table)));
		}

		if terminated {
			sql.push(';');
		}
		Ok(sql)
	}
}
