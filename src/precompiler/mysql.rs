//! MySQL precompiler

use super::Precompiler;
use crate::datasource::Dialect;

/// MySQL fragment rendering: backtick identifiers, backslash-aware string
/// escaping, numeric booleans, no NULLS ordering clause.
pub struct MysqlPrecompiler;

impl Precompiler for MysqlPrecompiler {
	fn dialect(&self) -> Dialect {
		Dialect::MySql
	}

	fn quote_segment(&self, segment: &str) -> String {
		format!("`{}`", segment.replace('`', "``"))
	}

	fn escape_string(&self, s: &str, like_escape: bool) -> String {
		// Backslash is an escape character in MySQL string literals. Inside a
		// LIKE pattern the backslash is already the pattern-escape character,
		// so doubling it there would change the pattern's meaning.
		let mut escaped = String::with_capacity(s.len());
		for c in s.chars() {
			match c {
				'\\' if !like_escape => escaped.push_str("\\\\"),
				'\'' => escaped.push_str("''"),
				'\0' => escaped.push_str("\\0"),
				_ => escaped.push(c),
			}
		}
		escaped
	}

	fn boolean(&self, value: bool) -> &'static str {
		if value { "1" } else { "0" }
	}

	fn supports_nulls_ordering(&self) -> bool {
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{NullsOrder, OrderDirection, SqlValue};
	use rstest::rstest;

	#[rstest]
	fn test_backtick_identifiers() {
		let pre = MysqlPrecompiler;
		assert_eq!(pre.identifier("users.id"), "`users`.`id`");
		assert_eq!(pre.identifier("users.*"), "`users`.*");
	}

	#[rstest]
	fn test_backslash_doubled_in_plain_literal() {
		let pre = MysqlPrecompiler;
		assert_eq!(
			pre.value(&SqlValue::String("C:\\temp".into()), false),
			"'C:\\\\temp'"
		);
	}

	#[rstest]
	fn test_like_pattern_escape_round_trips() {
		// Arrange: a pattern matching a literal percent sign
		let pre = MysqlPrecompiler;
		let pattern = "50\\% off";

		// Act
		let plain = pre.value(&SqlValue::String(pattern.into()), false);
		let like = pre.value(&SqlValue::String(pattern.into()), true);

		// Assert: the pattern-escape backslash survives only under the marker
		assert_eq!(plain, "'50\\\\% off'");
		assert_eq!(like, "'50\\% off'");
	}

	#[rstest]
	fn test_nulls_ordering_dropped() {
		let pre = MysqlPrecompiler;
		assert_eq!(
			pre.ordering("created", OrderDirection::Asc, Some(NullsOrder::First)),
			"`created` ASC"
		);
	}

	#[rstest]
	fn test_numeric_booleans() {
		let pre = MysqlPrecompiler;
		assert_eq!(pre.value(&SqlValue::Bool(true), false), "1");
	}
}
