//! SQLite driver adapter

use super::{DriverAdapter, StatementCache};
use crate::datasource::{DataSource, Dialect};
use crate::error::{DbError, Result};
use crate::precompiler::{Precompiler, precompiler_for};
use crate::types::{Row, SqlValue};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Connection as _, Row as SqlxRow};
use std::sync::Arc;
use tracing::debug;

/// Driver adapter over a single native SQLite connection
pub struct SqliteDriver {
	source: DataSource,
	pre: Arc<dyn Precompiler>,
	conn: Option<SqliteConnection>,
	cache: StatementCache,
}

impl SqliteDriver {
	pub fn new(source: DataSource) -> Self {
		let caching = source.caching();
		Self {
			pre: precompiler_for(Dialect::Sqlite),
			conn: None,
			cache: StatementCache::new(caching),
			source,
		}
	}

	fn handle(&mut self) -> Result<&mut SqliteConnection> {
		self.conn
			.as_mut()
			.ok_or_else(|| DbError::Connection("connection is closed".to_string()))
	}

	// SQLite stores dynamically typed cells; integers are tried first so
	// 0/1 columns stay integers rather than collapsing into booleans.
	fn convert_row(sq_row: SqliteRow) -> Row {
		let mut row = Row::new();
		for column in sq_row.columns() {
			let name = column.name();
			if let Ok(value) = sq_row.try_get::<i64, _>(name) {
				row.insert(name, SqlValue::Int(value));
			} else if let Ok(value) = sq_row.try_get::<f64, _>(name) {
				row.insert(name, SqlValue::Float(value));
			} else if let Ok(value) = sq_row.try_get::<String, _>(name) {
				row.insert(name, SqlValue::String(value));
			} else if let Ok(value) = sq_row.try_get::<Vec<u8>, _>(name) {
				row.insert(name, SqlValue::Bytes(value));
			} else {
				row.insert(name, SqlValue::Null);
			}
		}
		row
	}
}

#[async_trait]
impl DriverAdapter for SqliteDriver {
	fn dialect(&self) -> Dialect {
		Dialect::Sqlite
	}

	fn precompiler(&self) -> &Arc<dyn Precompiler> {
		&self.pre
	}

	async fn open(&mut self) -> Result<()> {
		debug!(url = %self.source.masked_url(), "opening sqlite connection");
		let conn = SqliteConnection::connect(&self.source.url())
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
		debug!(sql, "sqlite execute");
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
			debug!(sql, "sqlite query served from statement cache");
			return Ok(rows.clone());
		}
		debug!(sql, "sqlite query");
		let conn = self.handle()?;
		let sq_rows = sqlx::query(sql)
			.fetch_all(&mut *conn)
			.await
			.map_err(|e| DbError::Sql(e.to_string()))?;
		let rows: Vec<Row> = sq_rows.into_iter().map(Self::convert_row).collect();
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
		let rows = self.query("SELECT last_insert_rowid() AS id").await?;
		Ok(rows.first().and_then(|row| row.get::<i64>("id").ok()))
	}
}
