//! SQLite precompiler

use super::Precompiler;
use crate::datasource::Dialect;

/// SQLite fragment rendering: double-quoted identifiers, quote doubling,
/// numeric booleans. NULLS FIRST/LAST is accepted since SQLite 3.30.
pub struct SqlitePrecompiler;

impl Precompiler for SqlitePrecompiler {
	fn dialect(&self) -> Dialect {
		Dialect::Sqlite
	}

	fn quote_segment(&self, segment: &str) -> String {
		format!("\"{}\"", segment.replace('"', "\"\""))
	}

	fn escape_string(&self, s: &str, _like_escape: bool) -> String {
		s.replace('\'', "''")
	}

	fn boolean(&self, value: bool) -> &'static str {
		if value { "1" } else { "0" }
	}

	fn supports_nulls_ordering(&self) -> bool {
		true
	}
}
