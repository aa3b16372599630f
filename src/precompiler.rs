//! Dialect precompilers: abstract build instructions to literal SQL fragments

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MysqlPrecompiler;
pub use postgres::PostgresPrecompiler;
pub use sqlite::SqlitePrecompiler;

use crate::datasource::Dialect;
use crate::types::{Connector, NullsOrder, Operator, OrderDirection, SqlValue};
use std::sync::Arc;

/// Per-dialect translation of abstract build instructions into SQL text
///
/// Rendered statements inline values as escaped literals; the escaping done
/// here is a security boundary and must stay exact.
pub trait Precompiler: Send + Sync {
	fn dialect(&self) -> Dialect;

	/// Quote one bare identifier segment
	fn quote_segment(&self, segment: &str) -> String;

	/// Escape the inside of a string literal
	///
	/// `like_escape` marks LIKE/NOT LIKE pattern literals so pattern-escape
	/// characters survive encoding unchanged.
	fn escape_string(&self, s: &str, like_escape: bool) -> String;

	/// Dialect rendering of a boolean literal
	fn boolean(&self, value: bool) -> &'static str;

	/// Whether ORDER BY accepts NULLS FIRST/LAST
	fn supports_nulls_ordering(&self) -> bool;

	/// Quote an identifier, handling dotted `table.column` paths and `table.*`
	fn identifier(&self, path: &str) -> String {
		path.split('.')
			.map(|segment| {
				if segment == "*" {
					"*".to_string()
				} else {
					self.quote_segment(segment)
				}
			})
			.collect::<Vec<_>>()
			.join(".")
	}

	/// Encode a value as an inline literal
	fn value(&self, value: &SqlValue, like_escape: bool) -> String {
		match value {
			SqlValue::Null => "NULL".to_string(),
			SqlValue::Bool(b) => self.boolean(*b).to_string(),
			SqlValue::Int(i) => i.to_string(),
			SqlValue::Float(f) => f.to_string(),
			SqlValue::String(s) => format!("'{}'", self.escape_string(s, like_escape)),
			SqlValue::Bytes(bytes) => self.bytes_literal(bytes),
			SqlValue::Timestamp(dt) => {
				format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S"))
			}
			SqlValue::List(items) => {
				let rendered = items
					.iter()
					.map(|item| self.value(item, like_escape))
					.collect::<Vec<_>>()
					.join(", ");
				format!("({})", rendered)
			}
		}
	}

	/// Hex-encoded binary literal
	fn bytes_literal(&self, bytes: &[u8]) -> String {
		let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
		format!("X'{}'", hex)
	}

	/// Map an abstract operator to dialect text
	///
	/// Equality against NULL is promoted to the IS form so the rendered
	/// predicate never reads `= NULL`.
	fn operator(&self, op: Operator, value: &SqlValue) -> &'static str {
		let op = match (op, value.is_null()) {
			(Operator::EqualTo, true) => Operator::Is,
			(Operator::NotEquivalent, true) => Operator::IsNot,
			(op, _) => op,
		};
		match op {
			Operator::EqualTo => "=",
			Operator::NotEquivalent => "!=",
			Operator::GreaterThan => ">",
			Operator::GreaterThanOrEqual => ">=",
			Operator::LessThan => "<",
			Operator::LessThanOrEqual => "<=",
			Operator::Like => "LIKE",
			Operator::NotLike => "NOT LIKE",
			Operator::Between => "BETWEEN",
			Operator::NotBetween => "NOT BETWEEN",
			Operator::In => "IN",
			Operator::NotIn => "NOT IN",
			Operator::Is => "IS",
			Operator::IsNot => "IS NOT",
		}
	}

	fn connector(&self, connector: Connector) -> &'static str {
		match connector {
			Connector::And => "AND",
			Connector::Or => "OR",
		}
	}

	/// Grouping marker, rendered as a literal in-line parenthesis
	fn parenthesis(&self, open: bool) -> &'static str {
		if open { "(" } else { ")" }
	}

	/// Render one ORDER BY element
	fn ordering(
		&self,
		column: &str,
		direction: OrderDirection,
		nulls: Option<NullsOrder>,
	) -> String {
		let mut rendered = format!("{} {}", self.identifier(column), direction.as_sql());
		if let Some(nulls) = nulls
			&& self.supports_nulls_ordering()
		{
			rendered.push(' ');
			rendered.push_str(nulls.as_sql());
		}
		rendered
	}

	/// Clamp a LIMIT/OFFSET argument to a non-negative integer
	fn natural(&self, n: i64) -> u64 {
		n.max(0) as u64
	}
}

/// Resolve the precompiler for a dialect tag
pub fn precompiler_for(dialect: Dialect) -> Arc<dyn Precompiler> {
	match dialect {
		Dialect::Postgres => Arc::new(PostgresPrecompiler),
		Dialect::MySql => Arc::new(MysqlPrecompiler),
		Dialect::Sqlite => Arc::new(SqlitePrecompiler),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Dialect::Postgres)]
	#[case(Dialect::MySql)]
	#[case(Dialect::Sqlite)]
	fn test_equal_to_null_promotes_to_is(#[case] dialect: Dialect) {
		// Arrange
		let pre = precompiler_for(dialect);

		// Act & Assert
		assert_eq!(pre.operator(Operator::EqualTo, &SqlValue::Null), "IS");
		assert_eq!(pre.operator(Operator::NotEquivalent, &SqlValue::Null), "IS NOT");
		assert_eq!(pre.operator(Operator::EqualTo, &SqlValue::Int(1)), "=");
	}

	#[rstest]
	#[case(-5, 0)]
	#[case(0, 0)]
	#[case(42, 42)]
	fn test_natural_clamp(#[case] input: i64, #[case] expected: u64) {
		let pre = precompiler_for(Dialect::Postgres);
		assert_eq!(pre.natural(input), expected);
	}

	#[rstest]
	fn test_list_value_renders_parenthesized() {
		let pre = precompiler_for(Dialect::Postgres);
		let list = SqlValue::List(vec![SqlValue::Int(1), SqlValue::Int(2)]);
		assert_eq!(pre.value(&list, false), "(1, 2)");
	}

	#[rstest]
	fn test_timestamp_rendering() {
		use chrono::TimeZone;
		let pre = precompiler_for(Dialect::Sqlite);
		let dt = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 15, 4, 5).unwrap();
		assert_eq!(pre.value(&dt.into(), false), "'2024-03-09 15:04:05'");
	}
}
