//! Error taxonomy for the database access layer

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors raised by the pool, builders, drivers and relation engine
///
/// Native backend failures are caught at the driver boundary and re-raised
/// here with the native message preserved verbatim. Builder contract
/// violations fail before any statement reaches a connection.
#[derive(Debug, Error)]
pub enum DbError {
	/// Opening a native connection failed
	#[error("connection error: {0}")]
	Connection(String),

	/// The pool would exceed its configured maximum of live connections
	///
	/// Reported separately from [`DbError::Connection`] so callers can apply
	/// their own back-pressure policy.
	#[error("connection pool exhausted: {max_size} connections already open")]
	PoolExhausted { max_size: usize },

	/// An execute/query/transaction call failed on the backend
	#[error("sql error: {0}")]
	Sql(String),

	/// A malformed builder instruction, e.g. BETWEEN/IN given a scalar value
	#[error("invalid build instruction: {0}")]
	BuildInstruction(String),

	/// A proxy call that neither the proxy nor its extension implements
	#[error("unimplemented method {method}({args})")]
	UnimplementedMethod { method: String, args: String },

	/// An unknown metadata key on a field or relation descriptor
	#[error("invalid property: {0}")]
	InvalidProperty(String),
}

impl DbError {
	/// Build an [`DbError::UnimplementedMethod`] naming the call and its arguments
	pub fn unimplemented(method: impl Into<String>, args: &[crate::types::SqlValue]) -> Self {
		let rendered = args
			.iter()
			.map(|a| format!("{:?}", a))
			.collect::<Vec<_>>()
			.join(", ");
		DbError::UnimplementedMethod {
			method: method.into(),
			args: rendered,
		}
	}
}

impl From<sqlx::Error> for DbError {
	fn from(err: sqlx::Error) -> Self {
		match err {
			sqlx::Error::Configuration(e) => DbError::Connection(e.to_string()),
			sqlx::Error::Io(e) => DbError::Connection(e.to_string()),
			sqlx::Error::Tls(e) => DbError::Connection(e.to_string()),
			sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
				DbError::Connection(err.to_string())
			}
			other => DbError::Sql(other.to_string()),
		}
	}
}
