//! SELECT statement builder

use super::ConditionStream;
use crate::error::{DbError, Result};
use crate::precompiler::Precompiler;
use crate::types::{Combinator, Connector, JoinKind, NullsOrder, Operator, OrderDirection, SqlValue};
use std::sync::Arc;

/// Join constraint variants
#[derive(Debug, Clone)]
pub enum JoinConstraint {
	/// Equality pairs, each rendered `left = right`
	On(Vec<(String, String)>),
	Using(Vec<String>),
	Bare,
}

#[derive(Debug, Clone)]
pub struct Join {
	pub kind: JoinKind,
	pub table: String,
	pub constraint: JoinConstraint,
}

/// Accumulates SELECT build instructions; renders on [`SelectBuilder::statement`]
pub struct SelectBuilder {
	pre: Arc<dyn Precompiler>,
	table: String,
	distinct: bool,
	columns: Vec<(String, Option<String>)>,
	joins: Vec<Join>,
	wheres: ConditionStream,
	group_by: Vec<String>,
	havings: ConditionStream,
	orders: Vec<(String, OrderDirection, Option<NullsOrder>)>,
	limit: u64,
	offset: u64,
	combines: Vec<(Combinator, String)>,
}

impl SelectBuilder {
	pub fn new(pre: Arc<dyn Precompiler>, table: impl Into<String>) -> Self {
		Self {
			pre,
			table: table.into(),
			distinct: false,
			columns: Vec::new(),
			joins: Vec::new(),
			wheres: ConditionStream::new(),
			group_by: Vec::new(),
			havings: ConditionStream::new(),
			orders: Vec::new(),
			// 0 means unbounded until a limit is set explicitly
			limit: 0,
			offset: 0,
			combines: Vec::new(),
		}
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn distinct(mut self) -> Self {
		self.distinct = true;
		self
	}

	/// Select an explicit column or expression
	pub fn column(mut self, expr: impl Into<String>) -> Self {
		self.columns.push((expr.into(), None));
		self
	}

	/// Select an explicit column under an alias
	pub fn column_as(mut self, expr: impl Into<String>, alias: impl Into<String>) -> Self {
		self.columns.push((expr.into(), Some(alias.into())));
		self
	}

	pub fn columns<I, S>(mut self, exprs: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		for expr in exprs {
			self.columns.push((expr.into(), None));
		}
		self
	}

	pub fn join(
		mut self,
		kind: JoinKind,
		table: impl Into<String>,
		on: Vec<(String, String)>,
	) -> Self {
		self.joins.push(Join {
			kind,
			table: table.into(),
			constraint: JoinConstraint::On(on),
		});
		self
	}

	pub fn join_using(
		mut self,
		kind: JoinKind,
		table: impl Into<String>,
		columns: Vec<String>,
	) -> Self {
		self.joins.push(Join {
			kind,
			table: table.into(),
			constraint: JoinConstraint::Using(columns),
		});
		self
	}

	pub fn cross_join(mut self, table: impl Into<String>) -> Self {
		self.joins.push(Join {
			kind: JoinKind::Cross,
			table: table.into(),
			constraint: JoinConstraint::Bare,
		});
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

	/// Open a parenthesized group in the where stream
	pub fn begin_group(mut self, connector: Connector) -> Self {
		self.wheres.open(connector);
		self
	}

	pub fn end_group(mut self) -> Self {
		self.wheres.close();
		self
	}

	pub fn group_by(mut self, column: impl Into<String>) -> Self {
		self.group_by.push(column.into());
		self
	}

	pub fn having(
		mut self,
		column: impl Into<String>,
		operator: Operator,
		value: impl Into<SqlValue>,
	) -> Result<Self> {
		self.havings
			.push(Connector::And, column, operator, value.into())?;
		Ok(self)
	}

	pub fn or_having(
		mut self,
		column: impl Into<String>,
		operator: Operator,
		value: impl Into<SqlValue>,
	) -> Result<Self> {
		self.havings
			.push(Connector::Or, column, operator, value.into())?;
		Ok(self)
	}

	pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
		self.orders.push((column.into(), direction, None));
		self
	}

	pub fn order_by_nulls(
		mut self,
		column: impl Into<String>,
		direction: OrderDirection,
		nulls: NullsOrder,
	) -> Self {
		self.orders.push((column.into(), direction, Some(nulls)));
		self
	}

	/// Set the row bound; 0 restores the unbounded default
	pub fn limit(mut self, limit: i64) -> Self {
		self.limit = self.pre.natural(limit);
		self
	}

	pub fn offset(mut self, offset: i64) -> Self {
		self.offset = self.pre.natural(offset);
		self
	}

	/// Page convenience: zero-based page index and page size
	pub fn page(mut self, page: i64, size: i64) -> Self {
		let size = self.pre.natural(size);
		self.limit = size;
		self.offset = self.pre.natural(page) * size;
		self
	}

	/// Splice another select under a set combinator
	///
	/// The other statement is rendered now and carried as literal text.
	pub fn combine(mut self, combinator: Combinator, other: &SelectBuilder) -> Result<Self> {
		let rendered = other.statement(false)?;
		self.combines.push((combinator, rendered));
		Ok(self)
	}

	/// Render the accumulated instructions to SQL text
	///
	/// Rendering reads the accumulated state without mutating it, so repeated
	/// calls on an unmutated builder return identical text.
	pub fn statement(&self, terminated: bool) -> Result<String> {
		if self.table.is_empty() {
			return Err(DbError::BuildInstruction(
				"select requires a target table".to_string(),
			));
		}
		let pre = self.pre.as_ref();
		let mut sql = String::from("SELECT ");
		if self.distinct {
			sql.push_str("DISTINCT ");
		}

		if self.columns.is_empty() {
			sql.push_str(&pre.identifier(&format!("{}.*", self.table)));
		} else {
			let rendered: Vec<String> = self
				.columns
				.iter()
				.map(|(expr, alias)| {
					let mut col = pre.identifier(expr);
					if let Some(alias) = alias {
						col.push_str(" AS ");
						col.push_str(&pre.identifier(alias));
					}
					col
				})
				.collect();
			sql.push_str(&rendered.join(", "));
		}

		sql.push_str(" FROM ");
		sql.push_str(&pre.identifier(&self.table));

		for join in &self.joins {
			sql.push(' ');
			sql.push_str(join.kind.as_sql());
			sql.push(' ');
			sql.push_str(&pre.identifier(&join.table));
			match &join.constraint {
				JoinConstraint::On(pairs) => {
					let rendered: Vec<String> = pairs
						.iter()
						.map(|(left, right)| {
							format!("{} = {}", pre.identifier(left), pre.identifier(right))
						})
						.collect();
					sql.push_str(" ON ");
					sql.push_str(&rendered.join(" AND "));
				}
				JoinConstraint::Using(columns) => {
					let rendered: Vec<String> =
						columns.iter().map(|c| pre.identifier(c)).collect();
					sql.push_str(" USING (");
					sql.push_str(&rendered.join(", "));
					sql.push(')');
				}
				JoinConstraint::Bare => {}
			}
		}

		if !self.wheres.is_empty() {
			sql.push_str(" WHERE ");
			sql.push_str(&self.wheres.render(pre, Some(&self.table)));
		}

		if !self.group_by.is_empty() {
			let rendered: Vec<String> = self
				.group_by
				.iter()
				.map(|c| pre.identifier(&super::qualify_column(Some(&self.table), c)))
				.collect();
			sql.push_str(" GROUP BY ");
			sql.push_str(&rendered.join(", "));
		}

		if !self.havings.is_empty() {
			sql.push_str(" HAVING ");
			sql.push_str(&self.havings.render(pre, Some(&self.table)));
		}

		for (combinator, text) in &self.combines {
			sql.push(' ');
			sql.push_str(combinator.as_sql());
			sql.push(' ');
			sql.push_str(text);
		}

		if !self.orders.is_empty() {
			let rendered: Vec<String> = self
				.orders
				.iter()
				.map(|(column, direction, nulls)| {
					let qualified = super::qualify_column(Some(&self.table), column);
					pre.ordering(&qualified, *direction, *nulls)
				})
				.collect();
			sql.push_str(" ORDER BY ");
			sql.push_str(&rendered.join(", "));
		}

		if self.limit > 0 {
			sql.push_str(&format!(" LIMIT {}", self.limit));
		}
		if self.offset > 0 {
			sql.push_str(&format!(" OFFSET {}", self.offset));
		}

		if terminated {
			sql.push(';');
		}
		Ok(sql)
	}
}
