//! PostgreSQL driver adapter

use super::{DriverAdapter, StatementCache};
use crate::datasource::{DataSource, Dialect};
use crate::error::{DbError, Result};
use crate::precompiler::{Precompiler, precompiler_for};
use crate::types::{Row, SqlValue};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection as _, Row as SqlxRow};
use std::sync::Arc;
use tracing::debug;

/// Driver adapter over a single native PostgreSQL connection
pub struct PostgresDriver {
	source: DataSource,
	pre: Arc<dyn Precompiler>,
	conn: Option<PgConnection>,
	cache: StatementCache,
}

impl PostgresDriver {
	pub fn new(source: DataSource) -> Self {
		let caching = source.caching();
		Self {
			pre: precompiler_for(Dialect::Postgres),
			conn: None,
			cache: StatementCache::new(caching),
			source,
		}
	}

	fn handle(&mut self) -> Result<&mut PgConnection> {
		self.conn
			.as_mut()
			.ok_or_else(|| DbError::Connection("connection is closed".to_string()))
	}

	fn convert_row(pg_row: PgRow) -> Row {
		let mut row = Row::new();
		for column in pg_row.columns() {
			let name = column.name();
			if let Ok(value) = pg_row.try_get::<bool, _>(name) {
				row.insert(name, SqlValue::Bool(value));
			} else if let Ok(value) = pg_row.try_get::<i64, _>(name) {
				row.insert(name, SqlValue::Int(value));
			} else if let Ok(value) = pg_row.try_get::<i32, _>(name) {
				row.insert(name, SqlValue::Int(value as i64));
			} else if let Ok(value) = pg_row.try_get::<f64, _>(name) {
				row.insert(name, SqlValue::Float(value));
			} else if let Ok(value) = pg_row.try_get::<uuid::Uuid, _>(name) {
				row.insert(name, SqlValue::String(value.to_string()));
			} else if let Ok(value) = pg_row.try_get::<String, _>(name) {
				row.insert(name, SqlValue::String(value));
			} else if let Ok(value) = pg_row.try_get::<Vec<u8>, _>(name) {
				row.insert(name, SqlValue::Bytes(value));
			} else if let Ok(value) = pg_row.try_get::<chrono::NaiveDateTime, _>(name) {
				row.insert(
					name,
					SqlValue::Timestamp(chrono::DateTime::from_naive_utc_and_offset(
						value,
						chrono::Utc,
					)),
				);
			} else if let Ok(value) = pg_row.try_get::<chrono::DateTime<chrono::Utc>, _>(name) {
				row.insert(name, SqlValue::Timestamp(value));
			} else {
				row.insert(name, SqlValue::Null);
			}
		}
		row
	}
}

#[async_trait]
impl DriverAdapter for PostgresDriver {
	fn dialect(&self) -> Dialect {
		Dialect::Postgres
	}

	fn precompiler(&self) -> &Arc<dyn Precompiler> {
		&self.pre
	}

	async fn open(&mut self) -> Result<()> {
		debug!(url = %self.source.masked_url(), "opening postgres connection");
		let conn = PgConnection::connect(&self.source.url())
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
		debug!(sql, "postgres execute");
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
			debug!(sql, "postgres query served from statement cache");
			return Ok(rows.clone());
		}
		debug!(sql, "postgres query");
		let conn = self.handle()?;
		let pg_rows = sqlx::query(sql)
			.fetch_all(&mut *conn)
			.await
			.map_err(|e| DbError::Sql(e.to_string()))?;
		let rows: Vec<Row> = pg_rows.into_iter().map(Self::convert_row).collect();
		self.cache.insert(sql, rows.clone());
		Ok(rows)
	}

	async fn begin_transaction(&mut self) -> Result<()> {
		self.execute("BEGIN").await.map(|_| ())
	}

	async fn commit(&mut self) -> Result<()> {
		self.execute("COMMIT").await.map(|_| ())
	}

	async fn rollback(&mut self) -> Result<()> {
		self.execute("ROLLBACK").await.map(|_| ())
	}

	async fn native_insert_id(&mut self) -> Result<Option<i64>> {
		let rows = self.query("SELECT LASTVAL() AS id").await?;
		Ok(rows.first().and_then(|row| row.get::<i64>("id").ok()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datasource::DataSourceConfig;

	fn source() -> DataSource {
		let cfg = DataSourceConfig {
			dialect: Some("postgres".to_string()),
			host: Some("localhost".to_string()),
			database: Some("test".to_string()),
			..Default::default()
		};
		DataSource::from_config("test", cfg).unwrap()
	}

	#[test]
	fn test_starts_disconnected() {
		let driver = PostgresDriver::new(source());
		assert!(!driver.is_connected());
		assert_eq!(driver.dialect(), Dialect::Postgres);
	}

	#[test]
	fn test_quote_produces_escaped_literal() {
		let driver = PostgresDriver::new(source());
		assert_eq!(driver.quote("O'Brien", false), "'O''Brien'");
	}
}
