//! PostgreSQL precompiler

use super::Precompiler;
use crate::datasource::Dialect;

/// PostgreSQL fragment rendering: double-quoted identifiers, standard
/// single-quote doubling, TRUE/FALSE booleans, NULLS ordering supported.
pub struct PostgresPrecompiler;

impl Precompiler for PostgresPrecompiler {
	fn dialect(&self) -> Dialect {
		Dialect::Postgres
	}

	fn quote_segment(&self, segment: &str) -> String {
		format!("\"{}\"", segment.replace('"', "\"\""))
	}

	fn escape_string(&self, s: &str, _like_escape: bool) -> String {
		// standard_conforming_strings: backslash is not an escape character,
		// so LIKE patterns need no special treatment here
		s.replace('\'', "''")
	}

	fn boolean(&self, value: bool) -> &'static str {
		if value { "TRUE" } else { "FALSE" }
	}

	fn supports_nulls_ordering(&self) -> bool {
		true
	}

	fn bytes_literal(&self, bytes: &[u8]) -> String {
		let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
		format!("'\\x{}'", hex)
	}
}
