//! DELETE statement builder

use super::ConditionStream;
use crate::error::Result;
use crate::precompiler::Precompiler;
use crate::types::{Connector, Operator, SqlValue};
use std::sync::Arc;

/// Accumulates DELETE build instructions
pub struct DeleteBuilder {
	pre: Arc<dyn Precompiler>,
	table: String,
	wheres: ConditionStream,
}

impl DeleteBuilder {
	pub fn new(pre: Arc<dyn Precompiler>, table: impl Into<String>) -> Self {
		Self {
			pre,
			table: table.into(),
			wheres: ConditionStream::new(),
		}
	}

	pub fn table(&self) -> &str {
		&self.table
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
		let pre = self.pre.as_ref();
		let mut sql = String::from("DELETE FROM ");
		sql.push_str(&pre.identifier(&self.table));

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
