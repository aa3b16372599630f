//! Connection ownership and the process-scoped connection registry

use crate::datasource::DataSource;
use crate::driver::{DriverAdapter, driver_for};
use crate::error::{DbError, Result};
use crate::types::Row;
use indexmap::IndexMap;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// One pooled connection: owns its native handle exclusively
///
/// The handle moves between Closed and Open through `open`/`close`; the text
/// of the last statement pushed through it is kept for diagnostics.
pub struct Connection {
	id: Uuid,
	source: DataSource,
	driver: Box<dyn DriverAdapter>,
	last_statement: Option<String>,
}

impl Connection {
	/// Build a connection for a data source, resolving its driver
	///
	/// The connection starts Closed; call [`Connection::open`] to establish
	/// the native handle.
	pub fn new(source: DataSource) -> Result<Self> {
		let driver = driver_for(&source)?;
		Ok(Self::with_driver(source, driver))
	}

	/// Build a connection over an explicit driver adapter
	pub fn with_driver(source: DataSource, driver: Box<dyn DriverAdapter>) -> Self {
		Self {
			id: Uuid::new_v4(),
			source,
			driver,
			last_statement: None,
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn source(&self) -> &DataSource {
		&self.source
	}

	pub fn is_open(&self) -> bool {
		self.driver.is_connected()
	}

	/// Text of the last statement dispatched through this connection
	pub fn last_statement(&self) -> Option<&str> {
		self.last_statement.as_deref()
	}

	pub async fn open(&mut self) -> Result<()> {
		self.driver.open().await
	}

	pub async fn close(&mut self) -> Result<()> {
		self.driver.close().await
	}

	pub async fn execute(&mut self, sql: &str) -> Result<u64> {
		self.last_statement = Some(sql.to_string());
		self.driver.execute(sql).await
	}

	pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
		self.last_statement = Some(sql.to_string());
		self.driver.query(sql).await
	}

	pub async fn begin_transaction(&mut self) -> Result<()> {
		self.driver.begin_transaction().await
	}

	pub async fn commit(&mut self) -> Result<()> {
		self.driver.commit().await
	}

	pub async fn rollback(&mut self) -> Result<()> {
		self.driver.rollback().await
	}

	pub async fn last_insert_id(
		&mut self,
		table: Option<&str>,
		column: Option<&str>,
	) -> Result<Option<i64>> {
		self.driver.last_insert_id(table, column).await
	}

	pub fn quote(&self, value: &str, like_escape: bool) -> String {
		self.driver.quote(value, like_escape)
	}
}

/// Cloneable handle to one pooled connection
///
/// The connection itself sits behind an async mutex: one caller at a time.
/// Identity and data-source id are carried outside the lock so the registry
/// can be consulted without blocking on a busy connection.
#[derive(Clone)]
pub struct SharedConnection {
	id: Uuid,
	source_id: String,
	inner: Arc<Mutex<Connection>>,
}

impl SharedConnection {
	fn new(connection: Connection) -> Self {
		Self {
			id: connection.id(),
			source_id: connection.source().id().to_string(),
			inner: Arc::new(Mutex::new(connection)),
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn source_id(&self) -> &str {
		&self.source_id
	}

	pub async fn lock(&self) -> MutexGuard<'_, Connection> {
		self.inner.lock().await
	}

	/// Closed-state probe that refuses to wait: a connection currently locked
	/// by another caller is in use and cannot be handed out.
	fn is_idle_and_closed(&self) -> bool {
		match self.inner.try_lock() {
			Ok(guard) => !guard.is_open(),
			Err(_) => false,
		}
	}
}

struct RegistryInner {
	/// data-source id → insertion-ordered (LRU → MRU) connection map
	sources: HashMap<String, IndexMap<Uuid, SharedConnection>>,
	/// reverse lookup: connection id → data-source id
	index: HashMap<Uuid, String>,
}

/// Process-scoped registry of open connections, keyed by data-source id
///
/// An explicit, owned registry: construct it at startup, share it by `Arc`,
/// and tear it down with [`ConnectionRegistry::close_all`] at the end of its
/// owning scope.
pub struct ConnectionRegistry {
	max_size: SyncMutex<usize>,
	factory: Box<dyn Fn(&DataSource) -> Result<Connection> + Send + Sync>,
	inner: SyncMutex<RegistryInner>,
}

impl ConnectionRegistry {
	pub const DEFAULT_MAX_SIZE: usize = 10;

	pub fn new(max_size: usize) -> Self {
		Self::with_factory(max_size, |source| Connection::new(source.clone()))
	}

	/// Registry with an explicit connection factory
	///
	/// The factory seam lets callers substitute driver adapters, e.g. for
	/// tests that must observe open/execute traffic.
	pub fn with_factory<F>(max_size: usize, factory: F) -> Self
	where
		F: Fn(&DataSource) -> Result<Connection> + Send + Sync + 'static,
	{
		Self {
			max_size: SyncMutex::new(max_size),
			factory: Box::new(factory),
			inner: SyncMutex::new(RegistryInner {
				sources: HashMap::new(),
				index: HashMap::new(),
			}),
		}
	}

	pub fn max_size(&self) -> usize {
		*self.max_size.lock()
	}

	pub fn set_max_size(&self, max_size: usize) {
		*self.max_size.lock() = max_size;
	}

	/// Number of connections currently tracked
	pub fn count(&self) -> usize {
		self.inner.lock().index.len()
	}

	/// Hand out a connection for a data source
	///
	/// With `reuse_existing`, the most-recently-used cached connection for
	/// the source is returned, reopened first if it went dead. Without it, a
	/// closed cached slot is reopened, or a brand-new connection is opened —
	/// guaranteeing a connection not currently serving another caller.
	pub async fn get_connection(
		&self,
		source: &DataSource,
		reuse_existing: bool,
	) -> Result<SharedConnection> {
		if reuse_existing {
			let cached = {
				let mut inner = self.inner.lock();
				inner
					.sources
					.get_mut(source.id())
					.and_then(|map| map.last().map(|(id, conn)| (*id, conn.clone())))
			};
			if let Some((id, shared)) = cached {
				self.touch(source.id(), id);
				let mut conn = shared.lock().await;
				if !conn.is_open() {
					warn!(source = source.id(), connection = %id, "reopening dead connection");
					conn.open().await?;
				}
				drop(conn);
				debug!(source = source.id(), connection = %id, "reusing cached connection");
				return Ok(shared);
			}
			return self.open_new(source).await;
		}

		// Exclusive path: pick up a closed slot nobody holds, else open fresh.
		let reusable = {
			let inner = self.inner.lock();
			inner.sources.get(source.id()).and_then(|map| {
				map.iter()
					.find(|(_, conn)| conn.is_idle_and_closed())
					.map(|(id, conn)| (*id, conn.clone()))
			})
		};
		if let Some((id, shared)) = reusable {
			self.touch(source.id(), id);
			shared.lock().await.open().await?;
			debug!(source = source.id(), connection = %id, "reopened closed slot");
			return Ok(shared);
		}
		self.open_new(source).await
	}

	async fn open_new(&self, source: &DataSource) -> Result<SharedConnection> {
		let max_size = self.max_size();
		if self.count() >= max_size {
			return Err(DbError::PoolExhausted { max_size });
		}
		let mut connection = (self.factory)(source)?;
		connection.open().await?;
		let shared = SharedConnection::new(connection);
		debug!(source = source.id(), connection = %shared.id(), "opened new connection");
		self.add_connection(shared.clone());
		Ok(shared)
	}

	/// Idempotent insert keyed by connection id
	pub fn add_connection(&self, connection: SharedConnection) {
		let mut inner = self.inner.lock();
		if inner.index.contains_key(&connection.id()) {
			return;
		}
		inner
			.index
			.insert(connection.id(), connection.source_id().to_string());
		inner
			.sources
			.entry(connection.source_id().to_string())
			.or_default()
			.insert(connection.id(), connection);
	}

	/// Remove a connection from the registry
	///
	/// The native handle is not force-closed here; it is released when the
	/// last holder drops the connection or closes it explicitly.
	pub fn release(&self, connection: &SharedConnection) {
		let mut inner = self.inner.lock();
		if inner.index.remove(&connection.id()).is_some() {
			let emptied = if let Some(map) = inner.sources.get_mut(connection.source_id()) {
				map.shift_remove(&connection.id());
				map.is_empty()
			} else {
				false
			};
			if emptied {
				inner.sources.remove(connection.source_id());
			}
			debug!(
				source = connection.source_id(),
				connection = %connection.id(),
				"released connection from registry"
			);
		}
	}

	/// Data-source id for a tracked connection id
	pub fn source_of(&self, connection_id: Uuid) -> Option<String> {
		self.inner.lock().index.get(&connection_id).cloned()
	}

	/// Close every tracked connection and clear the registry
	///
	/// The deterministic teardown for the registry's owning scope.
	pub async fn close_all(&self) {
		let drained: Vec<SharedConnection> = {
			let mut inner = self.inner.lock();
			inner.index.clear();
			inner
				.sources
				.drain()
				.flat_map(|(_, map)| map.into_values())
				.collect()
		};
		for shared in drained {
			let mut conn = shared.lock().await;
			if conn.is_open()
				&& let Err(err) = conn.close().await
			{
				warn!(connection = %shared.id(), error = %err, "error closing connection during teardown");
			}
		}
	}

	/// Move a connection to the MRU end of its source map
	fn touch(&self, source_id: &str, connection_id: Uuid) {
		let mut inner = self.inner.lock();
		if let Some(map) = inner.sources.get_mut(source_id)
			&& let Some(conn) = map.shift_remove(&connection_id)
		{
			map.insert(connection_id, conn);
		}
	}
}

impl Default for ConnectionRegistry {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MAX_SIZE)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datasource::{DataSourceConfig, Dialect};
	use crate::precompiler::{Precompiler, precompiler_for};
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Driver double: records opens and statements, never touches a network
	struct MockDriver {
		pre: Arc<dyn Precompiler>,
		connected: bool,
		opens: Arc<AtomicUsize>,
		statements: Arc<SyncMutex<Vec<String>>>,
	}

	impl MockDriver {
		fn new(opens: Arc<AtomicUsize>, statements: Arc<SyncMutex<Vec<String>>>) -> Self {
			Self {
				pre: precompiler_for(Dialect::Sqlite),
				connected: false,
				opens,
				statements,
			}
		}
	}

	#[async_trait]
	impl DriverAdapter for MockDriver {
		fn dialect(&self) -> Dialect {
			Dialect::Sqlite
		}

		fn precompiler(&self) -> &Arc<dyn Precompiler> {
			&self.pre
		}

		async fn open(&mut self) -> Result<()> {
			self.opens.fetch_add(1, Ordering::SeqCst);
			self.connected = true;
			Ok(())
		}

		async fn close(&mut self) -> Result<()> {
			self.connected = false;
			Ok(())
		}

		fn is_connected(&self) -> bool {
			self.connected
		}

		async fn execute(&mut self, sql: &str) -> Result<u64> {
			self.statements.lock().push(sql.to_string());
			Ok(1)
		}

		async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
			self.statements.lock().push(sql.to_string());
			Ok(Vec::new())
		}

		async fn begin_transaction(&mut self) -> Result<()> {
			Ok(())
		}

		async fn commit(&mut self) -> Result<()> {
			Ok(())
		}

		async fn rollback(&mut self) -> Result<()> {
			Ok(())
		}

		async fn native_insert_id(&mut self) -> Result<Option<i64>> {
			Ok(Some(1))
		}
	}

	fn test_source(id: &str) -> DataSource {
		let cfg = DataSourceConfig {
			dialect: Some("sqlite".to_string()),
			..Default::default()
		};
		DataSource::from_config(id, cfg).unwrap()
	}

	fn mock_registry(max_size: usize) -> (Arc<ConnectionRegistry>, Arc<AtomicUsize>) {
		let opens = Arc::new(AtomicUsize::new(0));
		let statements = Arc::new(SyncMutex::new(Vec::new()));
		let opens_for_factory = opens.clone();
		let registry = ConnectionRegistry::with_factory(max_size, move |source| {
			Ok(Connection::with_driver(
				source.clone(),
				Box::new(MockDriver::new(
					opens_for_factory.clone(),
					statements.clone(),
				)),
			))
		});
		(Arc::new(registry), opens)
	}

	#[tokio::test]
	async fn test_reuse_returns_same_connection_while_open() {
		// Arrange
		let (registry, opens) = mock_registry(4);
		let source = test_source("main");

		// Act
		let first = registry.get_connection(&source, true).await.unwrap();
		let second = registry.get_connection(&source, true).await.unwrap();

		// Assert
		assert_eq!(first.id(), second.id());
		assert_eq!(opens.load(Ordering::SeqCst), 1);
		assert_eq!(registry.count(), 1);
	}

	#[tokio::test]
	async fn test_exclusive_connections_are_distinct() {
		let (registry, _) = mock_registry(4);
		let source = test_source("main");

		let first = registry.get_connection(&source, false).await.unwrap();
		let second = registry.get_connection(&source, false).await.unwrap();

		assert_ne!(first.id(), second.id());
		assert_eq!(registry.count(), 2);
	}

	#[tokio::test]
	async fn test_capacity_exceeded_is_distinct_error() {
		// Arrange
		let (registry, _) = mock_registry(2);
		let source = test_source("main");
		let _a = registry.get_connection(&source, false).await.unwrap();
		let _b = registry.get_connection(&source, false).await.unwrap();

		// Act: the (max_size + 1)-th open attempt
		let result = registry.get_connection(&source, false).await;

		// Assert
		assert!(matches!(result, Err(DbError::PoolExhausted { max_size: 2 })));
	}

	#[tokio::test]
	async fn test_exclusive_path_reopens_closed_slot() {
		// Arrange
		let (registry, opens) = mock_registry(4);
		let source = test_source("main");
		let first = registry.get_connection(&source, false).await.unwrap();
		first.lock().await.close().await.unwrap();

		// Act
		let second = registry.get_connection(&source, false).await.unwrap();

		// Assert: same slot reopened, not a new pool entry
		assert_eq!(first.id(), second.id());
		assert_eq!(registry.count(), 1);
		assert_eq!(opens.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_reuse_reopens_dead_connection() {
		let (registry, opens) = mock_registry(4);
		let source = test_source("main");

		let first = registry.get_connection(&source, true).await.unwrap();
		first.lock().await.close().await.unwrap();

		let second = registry.get_connection(&source, true).await.unwrap();
		assert_eq!(first.id(), second.id());
		assert!(second.lock().await.is_open());
		assert_eq!(opens.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_release_then_fresh_open() {
		// Arrange
		let (registry, opens) = mock_registry(4);
		let source = test_source("main");
		let first = registry.get_connection(&source, true).await.unwrap();

		// Act
		registry.release(&first);
		let second = registry.get_connection(&source, true).await.unwrap();

		// Assert: emptied pool means a brand-new connection
		assert_ne!(first.id(), second.id());
		assert_eq!(opens.load(Ordering::SeqCst), 2);
		assert_eq!(registry.count(), 1);
	}

	#[tokio::test]
	async fn test_add_connection_is_idempotent() {
		let (registry, _) = mock_registry(4);
		let source = test_source("main");
		let conn = registry.get_connection(&source, true).await.unwrap();

		registry.add_connection(conn.clone());
		registry.add_connection(conn.clone());

		assert_eq!(registry.count(), 1);
	}

	#[tokio::test]
	async fn test_reverse_lookup_tracks_source() {
		let (registry, _) = mock_registry(4);
		let source = test_source("analytics");
		let conn = registry.get_connection(&source, true).await.unwrap();

		assert_eq!(registry.source_of(conn.id()).as_deref(), Some("analytics"));
		registry.release(&conn);
		assert_eq!(registry.source_of(conn.id()), None);
	}

	#[tokio::test]
	async fn test_close_all_clears_and_closes() {
		let (registry, _) = mock_registry(4);
		let source = test_source("main");
		let conn = registry.get_connection(&source, true).await.unwrap();

		registry.close_all().await;

		assert_eq!(registry.count(), 0);
		assert!(!conn.lock().await.is_open());
	}

	#[tokio::test]
	async fn test_last_statement_recorded() {
		let (registry, _) = mock_registry(4);
		let source = test_source("main");
		let shared = registry.get_connection(&source, true).await.unwrap();

		let mut conn = shared.lock().await;
		conn.execute("DELETE FROM sessions;").await.unwrap();
		assert_eq!(conn.last_statement(), Some("DELETE FROM sessions;"));
	}

	#[tokio::test]
	async fn test_max_size_accessor_and_mutator() {
		let (registry, _) = mock_registry(2);
		assert_eq!(registry.max_size(), 2);
		registry.set_max_size(8);
		assert_eq!(registry.max_size(), 8);
	}
}
