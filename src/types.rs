//! Common value and SQL vocabulary types

use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A literal value carried through builders and drivers
///
/// Values are rendered into statements as escaped literals by the dialect
/// precompiler; `List` carries the array-typed arguments that BETWEEN and IN
/// require.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Bytes(Vec<u8>),
	Timestamp(chrono::DateTime<chrono::Utc>),
	List(Vec<SqlValue>),
}

impl SqlValue {
	pub fn is_null(&self) -> bool {
		matches!(self, SqlValue::Null)
	}

	pub fn is_list(&self) -> bool {
		matches!(self, SqlValue::List(_))
	}
}

impl From<&str> for SqlValue {
	fn from(s: &str) -> Self {
		SqlValue::String(s.to_string())
	}
}

impl From<String> for SqlValue {
	fn from(s: String) -> Self {
		SqlValue::String(s)
	}
}

impl From<i64> for SqlValue {
	fn from(i: i64) -> Self {
		SqlValue::Int(i)
	}
}

impl From<i32> for SqlValue {
	fn from(i: i32) -> Self {
		SqlValue::Int(i as i64)
	}
}

impl From<f64> for SqlValue {
	fn from(f: f64) -> Self {
		SqlValue::Float(f)
	}
}

impl From<bool> for SqlValue {
	fn from(b: bool) -> Self {
		SqlValue::Bool(b)
	}
}

impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
	fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
		SqlValue::Timestamp(dt)
	}
}

impl<V: Into<SqlValue>> From<Vec<V>> for SqlValue {
	fn from(items: Vec<V>) -> Self {
		SqlValue::List(items.into_iter().map(Into::into).collect())
	}
}

/// One materialized result row: column name to value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
	pub data: HashMap<String, SqlValue>,
}

impl Row {
	pub fn new() -> Self {
		Self {
			data: HashMap::new(),
		}
	}

	pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
		self.data.insert(column.into(), value);
	}

	/// Fetch a column converted to a concrete type
	pub fn get<T: TryFrom<SqlValue, Error = DbError>>(
		&self,
		column: &str,
	) -> crate::error::Result<T> {
		self.data
			.get(column)
			.cloned()
			.ok_or_else(|| DbError::Sql(format!("column not found: {}", column)))
			.and_then(TryFrom::try_from)
	}

	/// Fetch a column as a raw value, `Null` when absent
	pub fn value(&self, column: &str) -> SqlValue {
		self.data.get(column).cloned().unwrap_or(SqlValue::Null)
	}
}

impl TryFrom<SqlValue> for i64 {
	type Error = DbError;

	fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
		match value {
			SqlValue::Int(i) => Ok(i),
			_ => Err(DbError::Sql(format!("cannot convert {:?} to i64", value))),
		}
	}
}

impl TryFrom<SqlValue> for String {
	type Error = DbError;

	fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
		match value {
			SqlValue::String(s) => Ok(s),
			_ => Err(DbError::Sql(format!("cannot convert {:?} to String", value))),
		}
	}
}

impl TryFrom<SqlValue> for bool {
	type Error = DbError;

	fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
		match value {
			SqlValue::Bool(b) => Ok(b),
			SqlValue::Int(i) => Ok(i != 0),
			_ => Err(DbError::Sql(format!("cannot convert {:?} to bool", value))),
		}
	}
}

impl TryFrom<SqlValue> for f64 {
	type Error = DbError;

	fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
		match value {
			SqlValue::Float(f) => Ok(f),
			SqlValue::Int(i) => Ok(i as f64),
			_ => Err(DbError::Sql(format!("cannot convert {:?} to f64", value))),
		}
	}
}

impl TryFrom<SqlValue> for chrono::DateTime<chrono::Utc> {
	type Error = DbError;

	fn try_from(value: SqlValue) -> Result<Self, Self::Error> {
		match value {
			SqlValue::Timestamp(dt) => Ok(dt),
			_ => Err(DbError::Sql(format!(
				"cannot convert {:?} to DateTime<Utc>",
				value
			))),
		}
	}
}

/// Abstract comparison tokens mapped to dialect text by the precompiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
	EqualTo,
	NotEquivalent,
	GreaterThan,
	GreaterThanOrEqual,
	LessThan,
	LessThanOrEqual,
	Like,
	NotLike,
	Between,
	NotBetween,
	In,
	NotIn,
	Is,
	IsNot,
}

impl Operator {
	/// Whether this operator takes an array-typed right-hand side
	pub fn requires_list(&self) -> bool {
		matches!(
			self,
			Operator::Between | Operator::NotBetween | Operator::In | Operator::NotIn
		)
	}

	/// Whether this operator renders a LIKE pattern literal
	pub fn is_pattern(&self) -> bool {
		matches!(self, Operator::Like | Operator::NotLike)
	}
}

/// Connectors between condition tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
	#[default]
	And,
	Or,
}

/// Join variants supported by the select builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
	Inner,
	Left,
	Right,
	Cross,
}

impl JoinKind {
	pub fn as_sql(&self) -> &'static str {
		match self {
			JoinKind::Inner => "INNER JOIN",
			JoinKind::Left => "LEFT JOIN",
			JoinKind::Right => "RIGHT JOIN",
			JoinKind::Cross => "CROSS JOIN",
		}
	}
}

/// Set combinators spliced between rendered select statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
	Union,
	UnionAll,
	Intersect,
	Except,
}

impl Combinator {
	pub fn as_sql(&self) -> &'static str {
		match self {
			Combinator::Union => "UNION",
			Combinator::UnionAll => "UNION ALL",
			Combinator::Intersect => "INTERSECT",
			Combinator::Except => "EXCEPT",
		}
	}
}

/// Ordering direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
	#[default]
	Asc,
	Desc,
}

impl OrderDirection {
	pub fn as_sql(&self) -> &'static str {
		match self {
			OrderDirection::Asc => "ASC",
			OrderDirection::Desc => "DESC",
		}
	}
}

/// Placement of NULL values in an ordering, where the dialect supports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
	First,
	Last,
}

impl NullsOrder {
	pub fn as_sql(&self) -> &'static str {
		match self {
			NullsOrder::First => "NULLS FIRST",
			NullsOrder::Last => "NULLS LAST",
		}
	}
}
