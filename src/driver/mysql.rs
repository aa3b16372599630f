//! MySQL driver adapter

use super::{DriverAdapter, StatementCache};
use crate::datasource::{DataSource, Dialect};
use crate::error::{DbError, Result};
use crate::precompiler::{Precompiler, precompiler_for};
use crate::types::{Row, SqlValue};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Connection as _, Row as SqlxRow};
use std::sync::Arc;
use tracing::debug;

/// Driver adapter over a single native MySQL connection
///
/// Transactions disable autocommit on begin; commit and rollback explicitly
/// re-enable it, since the server keeps the session flag otherwise.
pub struct MysqlDriver {
	source: DataSource,
	pre: Arc<dyn Precompiler>,
	conn: Option<MySqlConnection>,
	cache: StatementCache,
}

impl MysqlDriver {
	pub fn new(source: DataSource) -> Self {
		let caching = source.caching();
		Self {
			pre: precompiler_for(Dialect::MySql),
			conn: None,
			cache: StatementCache::new(caching),
			source,
		}
	}

	fn handle(&mut self) -> Result<&mut MySqlConnection> {
		self.conn
			.as_mut()
			.ok_or_else(|| DbError::Connection("connection is closed".to_string()))
	}

	fn convert_row(my_row: MySqlRow) -> Row {
		let mut row = Row::new();
		for column in my_row.columns() {
			let name = column.name();
			if let Ok(value) = my_row.try_get::<i64, _>(name) {
				row.insert(name, SqlValue::Int(value));
			} else if let Ok(value) = my_row.try_get::<f64, _>(name) {
				row.insert(name, SqlValue::Float(value));
			} else if let Ok(value) = my_row.try_get::<String, _>(name) {
				row.insert(name, SqlValue::String(value));
			} else if let Ok(value) = my_row.try_get::<Vec<u8>, _>(name) {
				row.insert(name, SqlValue::Bytes(value));
			} else if let Ok(value) = my_row.try_get::<chrono::NaiveDateTime, _>(name) {
				row.insert(
					name,
					SqlValue::Timestamp(chrono::DateTime::from_naive_utc_and_offset(
						value,
						chrono::Utc,
					)),
				);
			} else if let Ok(value) = my_row.try_get::<chrono::DateTime<chrono::Utc>, _>(name) {
				row.insert(name, SqlValue::Timestamp(value));
			} else if let Ok(value) = my_row.try_get::<bool, _>(name) {
				row.insert(name, SqlValue::Bool(value));
			} else {
				row.insert(name, SqlValue::Null);
			}
		}
		row
	}
}

#[async_trait]
impl DriverAdapter for MysqlDriver {
	fn dialect(&self) -> Dialect {
		Dialect::MySql
	}

	fn precompiler(&self) -> &Arc<dyn Precompiler> {
		&self.pre
	}

	async fn open(&mut self) -> Result<()> {
		debug!(url = %self.source.masked_url(), "opening mysql connection");
		let conn = MySqlConnection::connect(&self.source.url())
			.await
			.map_err(|e| DbError::Connection(e.to_string()))?;
		self.conn = Some(conn);
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		if let Some(conn) = self.conn.take() {
			conn.close()
				.await
				.map_err(|e| DbError::Connection(e.to_string()))?;
		}
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.conn.is_some()
	}

	async fn execute(&mut self, sql: &str) -> Result<u64> {
		debug!(sql, "mysql execute");
		let conn = self.handle()?;
		let result = sqlx::query(sql)
			.execute(&mut *conn)
			.await
			.map_err(|e| DbError::Sql(e.to_string()))?;
		self.cache.clear();
		Ok(result.rows_affected())
	}

	async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
		if let Some(rows) = self.cache.get(sql) {
			debug!(sql, "mysql query served from statement cache");
			return Ok(rows.clone());
		}
		debug!(sql, "mysql query");
		let conn = self.handle()?;
		let my_rows = sqlx::query(sql)
			.fetch_all(&mut *conn)
			.await
			.map_err(|e| DbError::Sql(e.to_string()))?;
		let rows: Vec<Row> = my_rows.into_iter().map(Self::convert_row).collect();
		self.cache.insert(sql, rows.clone());
		Ok(rows)
	}

	async fn begin_transaction(&mut self) -> Result<()> {
		self.execute("SET autocommit = 0").await?;
		self.execute("START TRANSACTION").await.map(|_| ())
	}

	async fn commit(&mut self) -> Result<()> {
		self.execute("COMMIT").await?;
		// the session keeps autocommit off until told otherwise
		self.execute("SET autocommit = 1").await.map(|_| ())
	}

	async fn rollback(&mut self) -> Result<()> {
		self.execute("ROLLBACK").await?;
		self.execute("SET autocommit = 1").await.map(|_| ())
	}

	async fn native_insert_id(&mut self) -> Result<Option<i64>> {
		let rows = self.query("SELECT LAST_INSERT_ID() AS id").await?;
		Ok(rows.first().and_then(|row| row.get::<i64>("id").ok()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datasource::DataSourceConfig;

	fn source() -> DataSource {
		let cfg = DataSourceConfig {
			dialect: Some("mysql".to_string()),
			host: Some("localhost".to_string()),
			database: Some("test".to_string()),
			..Default::default()
		};
		DataSource::from_config("test", cfg).unwrap()
	}

	#[test]
	fn test_starts_disconnected() {
		let driver = MysqlDriver::new(source());
		assert!(!driver.is_connected());
		assert_eq!(driver.dialect(), Dialect::MySql);
	}

	#[test]
	fn test_quote_keeps_like_escape_marker() {
		let driver = MysqlDriver::new(source());
		assert_eq!(driver.quote("50\\%", false), "'50\\\\%'");
		assert_eq!(driver.quote("50\\%", true), "'50\\%'");
	}
}
