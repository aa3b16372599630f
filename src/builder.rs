//! Statement builders: accumulate build instructions, render SQL on demand

pub mod delete;
pub mod insert;
pub mod select;
pub mod update;

pub use delete::DeleteBuilder;
pub use insert::InsertBuilder;
pub use select::SelectBuilder;
pub use update::UpdateBuilder;

use crate::error::{DbError, Result};
use crate::precompiler::Precompiler;
use crate::types::{Connector, Operator, SqlValue};

/// One entry in a flat where/having instruction stream
///
/// Grouping is expressed with explicit open/close markers rather than a tree:
/// every dialect renders grouping as literal in-line parentheses, so the
/// stream is kept flat and replayed in order at render time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionToken {
	Open(Connector),
	Close,
	Predicate {
		connector: Connector,
		column: String,
		operator: Operator,
		value: SqlValue,
	},
}

/// Ordered accumulator for condition tokens
#[derive(Debug, Clone, Default)]
pub struct ConditionStream {
	tokens: Vec<ConditionToken>,
}

impl ConditionStream {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	pub fn tokens(&self) -> &[ConditionToken] {
		&self.tokens
	}

	/// Append one predicate, validating the operator/value contract
	///
	/// BETWEEN and IN (and their negations) take array-typed values only; a
	/// scalar fails here, before the statement can reach any connection.
	pub fn push(
		&mut self,
		connector: Connector,
		column: impl Into<String>,
		operator: Operator,
		value: SqlValue,
	) -> Result<()> {
		if operator.requires_list() && !value.is_list() {
			return Err(DbError::BuildInstruction(format!(
				"{:?} requires an array value, got {:?}",
				operator, value
			)));
		}
		if matches!(operator, Operator::Between | Operator::NotBetween)
			&& let SqlValue::List(items) = &value
			&& items.len() != 2
		{
			return Err(DbError::BuildInstruction(format!(
				"{:?} requires exactly two bounds, got {}",
				operator,
				items.len()
			)));
		}
		self.tokens.push(ConditionToken::Predicate {
			connector,
			column: column.into(),
			operator,
			value,
		});
		Ok(())
	}

	pub fn open(&mut self, connector: Connector) {
		self.tokens.push(ConditionToken::Open(connector));
	}

	pub fn close(&mut self) {
		self.tokens.push(ConditionToken::Close);
	}

	/// Replay the stream into clause text
	pub fn render(&self, pre: &dyn Precompiler, qualify_table: Option<&str>) -> String {
		let mut out = String::new();
		// Connectors are suppressed for the first token of the clause and the
		// first token inside a freshly opened group.
		let mut at_group_start = true;
		for token in &self.tokens {
			match token {
				ConditionToken::Open(connector) => {
					if !at_group_start {
						out.push(' ');
						out.push_str(pre.connector(*connector));
						out.push(' ');
					}
					out.push_str(pre.parenthesis(true));
					at_group_start = true;
				}
				ConditionToken::Close => {
					out.push_str(pre.parenthesis(false));
					at_group_start = false;
				}
				ConditionToken::Predicate {
					connector,
					column,
					operator,
					value,
				} => {
					if !at_group_start {
						out.push(' ');
						out.push_str(pre.connector(*connector));
						out.push(' ');
					}
					out.push_str(&render_predicate(
						pre,
						qualify_column(qualify_table, column),
						*operator,
						value,
					));
					at_group_start = false;
				}
			}
		}
		out
	}
}

/// Qualify a bare column with the statement's target table
pub(crate) fn qualify_column(table: Option<&str>, column: &str) -> String {
	match table {
		Some(table) if !column.contains('.') => format!("{}.{}", table, column),
		_ => column.to_string(),
	}
}

fn render_predicate(
	pre: &dyn Precompiler,
	column: String,
	operator: Operator,
	value: &SqlValue,
) -> String {
	let column = pre.identifier(&column);
	let op_text = pre.operator(operator, value);
	match operator {
		Operator::Between | Operator::NotBetween => {
			let SqlValue::List(bounds) = value else {
				// unreachable by construction: push() enforces the contract
				return format!("{} {} {}", column, op_text, pre.value(value, false));
			};
			format!(
				"{} {} {} AND {}",
				column,
				op_text,
				pre.value(&bounds[0], false),
				pre.value(&bounds[1], false)
			)
		}
		Operator::In | Operator::NotIn => {
			format!("{} {} {}", column, op_text, pre.value(value, false))
		}
		_ => {
			let like_escape = operator.is_pattern();
			format!("{} {} {}", column, op_text, pre.value(value, like_escape))
		}
	}
}
