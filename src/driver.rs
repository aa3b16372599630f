//! Driver adapters: the fixed contract over each dialect's native client

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub use mysql::MysqlDriver;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

use crate::datasource::{DataSource, Dialect, DriverKind};
use crate::error::{DbError, Result};
use crate::precompiler::Precompiler;
use crate::types::Row;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed per-dialect contract over a specific native client
///
/// The contract and error taxonomy are identical across every dialect; only
/// the native calls underneath differ. Each call runs to completion before
/// returning; no cancellation or timeout is layered on top.
#[async_trait]
pub trait DriverAdapter: Send {
	fn dialect(&self) -> Dialect;

	/// The precompiler matching this driver's dialect
	fn precompiler(&self) -> &Arc<dyn Precompiler>;

	/// Establish the native handle
	async fn open(&mut self) -> Result<()>;

	/// Release the native handle
	async fn close(&mut self) -> Result<()>;

	fn is_connected(&self) -> bool;

	/// Run a non-returning statement; returns the affected row count
	async fn execute(&mut self, sql: &str) -> Result<u64>;

	/// Run a row-returning statement
	///
	/// Served from the statement-result cache before touching the network
	/// when the data source enables caching.
	async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

	async fn begin_transaction(&mut self) -> Result<()>;

	async fn commit(&mut self) -> Result<()>;

	async fn rollback(&mut self) -> Result<()>;

	/// Native auto-increment retrieval for the last inserted row
	async fn native_insert_id(&mut self) -> Result<Option<i64>>;

	/// Last inserted id, with a portable fallback
	///
	/// Given a table and column, issues `SELECT MAX(column) FROM table`;
	/// otherwise defers to the backend's native retrieval.
	async fn last_insert_id(
		&mut self,
		table: Option<&str>,
		column: Option<&str>,
	) -> Result<Option<i64>> {
		match (table, column) {
			(Some(table), Some(column)) => {
				let pre = self.precompiler().clone();
				let sql = format!(
					"SELECT MAX({}) AS last_id FROM {}",
					pre.identifier(column),
					pre.identifier(table)
				);
				let rows = self.query(&sql).await?;
				Ok(rows
					.first()
					.and_then(|row| row.get::<i64>("last_id").ok()))
			}
			_ => self.native_insert_id().await,
		}
	}

	/// Produce a dialect-safe string literal
	fn quote(&self, value: &str, like_escape: bool) -> String {
		let pre = self.precompiler();
		format!("'{}'", pre.escape_string(value, like_escape))
	}
}

/// Statement-result cache keyed by statement text
///
/// Consulted before the network on row-returning statements; any mutating
/// call through the same driver clears it.
#[derive(Debug, Default)]
pub struct StatementCache {
	enabled: bool,
	entries: HashMap<String, Vec<Row>>,
}

impl StatementCache {
	pub fn new(enabled: bool) -> Self {
		Self {
			enabled,
			entries: HashMap::new(),
		}
	}

	pub fn get(&self, sql: &str) -> Option<&Vec<Row>> {
		if !self.enabled {
			return None;
		}
		self.entries.get(sql)
	}

	pub fn insert(&mut self, sql: &str, rows: Vec<Row>) {
		if self.enabled {
			self.entries.insert(sql.to_string(), rows);
		}
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}

/// Resolve a data source into its driver adapter
///
/// The mapping from driver tag to constructor is fixed here; a driver whose
/// backing feature is compiled out fails with a construction-time error.
pub fn driver_for(source: &DataSource) -> Result<Box<dyn DriverAdapter>> {
	match source.driver() {
		#[cfg(feature = "postgres")]
		DriverKind::Postgres => Ok(Box::new(PostgresDriver::new(source.clone()))),
		#[cfg(feature = "mysql")]
		DriverKind::MySql => Ok(Box::new(MysqlDriver::new(source.clone()))),
		#[cfg(feature = "sqlite")]
		DriverKind::Sqlite => Ok(Box::new(SqliteDriver::new(source.clone()))),
		#[allow(unreachable_patterns)]
		other => Err(DbError::InvalidProperty(format!(
			"driver not compiled in: {:?}",
			other
		))),
	}
}
