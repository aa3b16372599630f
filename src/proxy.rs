//! Model proxy: fluent statement façade plus extension dispatch

use crate::builder::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};
use crate::datasource::DataSource;
use crate::error::{DbError, Result};
use crate::model::ModelSchema;
use crate::pool::ConnectionRegistry;
use crate::precompiler::{Precompiler, precompiler_for};
use crate::resultset::ResultSet;
use crate::types::{Connector, JoinKind, Operator, OrderDirection, Row, SqlValue};
use std::sync::Arc;
use tracing::debug;

/// The statement currently being built through the proxy
pub enum ActiveStatement {
	Select(SelectBuilder),
	Insert(InsertBuilder),
	Update(UpdateBuilder),
	Delete(DeleteBuilder),
}

impl ActiveStatement {
	fn kind(&self) -> &'static str {
		match self {
			ActiveStatement::Select(_) => "select",
			ActiveStatement::Insert(_) => "insert",
			ActiveStatement::Update(_) => "update",
			ActiveStatement::Delete(_) => "delete",
		}
	}
}

/// Outcome of dispatching an unrecognized call to a proxy extension
///
/// `Chain` means the extension operated on the builder: the proxy itself
/// stays the active object, so the fluent chain continues on it rather than
/// leaking the extension's return type. Any other outcome passes through
/// unchanged.
pub enum ExtensionResult {
	Chain,
	Value(SqlValue),
	Rows(Vec<Row>),
}

/// Optional per-model command table consulted for unrecognized proxy calls
pub trait ProxyExtension: Send + Sync {
	fn call(&self, proxy: &mut Proxy, method: &str, args: &[SqlValue]) -> Result<ExtensionResult>;
}

/// Result of running a statement through the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutcome {
	pub rows_affected: u64,
	/// New row id, populated for inserts on auto-incrementing models
	pub inserted_id: Option<i64>,
}

/// Binds a model to the statement builders of its dialect
///
/// Fluent calls forward to the active builder and hand the proxy back, so a
/// chain reads the same across statement kinds and dialects.
pub struct Proxy {
	model: Arc<ModelSchema>,
	source: DataSource,
	registry: Arc<ConnectionRegistry>,
	pre: Arc<dyn Precompiler>,
	table: String,
	statement: Option<ActiveStatement>,
	extension: Option<Arc<dyn ProxyExtension>>,
}

impl Proxy {
	pub fn new(
		model: Arc<ModelSchema>,
		source: DataSource,
		registry: Arc<ConnectionRegistry>,
	) -> Self {
		let pre = precompiler_for(source.dialect());
		let table = match source.table_prefix() {
			Some(prefix) => format!("{}{}", prefix, model.table()),
			None => model.table().to_string(),
		};
		Self {
			model,
			source,
			registry,
			pre,
			table,
			statement: None,
			extension: None,
		}
	}

	pub fn with_extension(mut self, extension: Arc<dyn ProxyExtension>) -> Self {
		self.extension = Some(extension);
		self
	}

	pub fn model(&self) -> &Arc<ModelSchema> {
		&self.model
	}

	pub fn source(&self) -> &DataSource {
		&self.source
	}

	/// The resolved target table, with any configured prefix applied
	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn select(&mut self) -> &mut Self {
		self.statement = Some(ActiveStatement::Select(SelectBuilder::new(
			self.pre.clone(),
			self.table.clone(),
		)));
		self
	}

	pub fn insert(&mut self) -> &mut Self {
		self.statement = Some(ActiveStatement::Insert(InsertBuilder::new(
			self.pre.clone(),
			self.table.clone(),
		)));
		self
	}

	pub fn update(&mut self) -> &mut Self {
		self.statement = Some(ActiveStatement::Update(UpdateBuilder::new(
			self.pre.clone(),
			self.table.clone(),
		)));
		self
	}

	pub fn delete(&mut self) -> &mut Self {
		self.statement = Some(ActiveStatement::Delete(DeleteBuilder::new(
			self.pre.clone(),
			self.table.clone(),
		)));
		self
	}

	fn active(&mut self) -> Result<ActiveStatement> {
		self.statement.take().ok_or_else(|| {
			DbError::BuildInstruction("no active statement on proxy".to_string())
		})
	}

	fn wrong_kind(&mut self, method: &str, statement: ActiveStatement) -> DbError {
		let err = DbError::BuildInstruction(format!(
			"{} is not valid on an active {} statement",
			method,
			statement.kind()
		));
		// the mismatched statement stays active; only the bad call is refused
		self.statement = Some(statement);
		err
	}

	pub fn columns<I, S>(&mut self, exprs: I) -> Result<&mut Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.columns(exprs)));
				Ok(self)
			}
			other => Err(self.wrong_kind("columns", other)),
		}
	}

	pub fn distinct(&mut self) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.distinct()));
				Ok(self)
			}
			other => Err(self.wrong_kind("distinct", other)),
		}
	}

	pub fn join(
		&mut self,
		kind: JoinKind,
		table: impl Into<String>,
		on: Vec<(String, String)>,
	) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.join(kind, table, on)));
				Ok(self)
			}
			other => Err(self.wrong_kind("join", other)),
		}
	}

	pub fn where_(
		&mut self,
		column: impl Into<String>,
		operator: Operator,
		value: impl Into<SqlValue>,
	) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(
					builder.where_(column, operator, value)?,
				));
				Ok(self)
			}
			ActiveStatement::Update(builder) => {
				self.statement = Some(ActiveStatement::Update(
					builder.where_(column, operator, value)?,
				));
				Ok(self)
			}
			ActiveStatement::Delete(builder) => {
				self.statement = Some(ActiveStatement::Delete(
					builder.where_(column, operator, value)?,
				));
				Ok(self)
			}
			other => Err(self.wrong_kind("where", other)),
		}
	}

	pub fn or_where(
		&mut self,
		column: impl Into<String>,
		operator: Operator,
		value: impl Into<SqlValue>,
	) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(
					builder.or_where(column, operator, value)?,
				));
				Ok(self)
			}
			ActiveStatement::Update(builder) => {
				self.statement = Some(ActiveStatement::Update(
					builder.or_where(column, operator, value)?,
				));
				Ok(self)
			}
			ActiveStatement::Delete(builder) => {
				self.statement = Some(ActiveStatement::Delete(
					builder.or_where(column, operator, value)?,
				));
				Ok(self)
			}
			other => Err(self.wrong_kind("or_where", other)),
		}
	}

	pub fn begin_group(&mut self, connector: Connector) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.begin_group(connector)));
				Ok(self)
			}
			ActiveStatement::Update(builder) => {
				self.statement = Some(ActiveStatement::Update(builder.begin_group(connector)));
				Ok(self)
			}
			ActiveStatement::Delete(builder) => {
				self.statement = Some(ActiveStatement::Delete(builder.begin_group(connector)));
				Ok(self)
			}
			other => Err(self.wrong_kind("begin_group", other)),
		}
	}

	pub fn end_group(&mut self) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.end_group()));
				Ok(self)
			}
			ActiveStatement::Update(builder) => {
				self.statement = Some(ActiveStatement::Update(builder.end_group()));
				Ok(self)
			}
			ActiveStatement::Delete(builder) => {
				self.statement = Some(ActiveStatement::Delete(builder.end_group()));
				Ok(self)
			}
			other => Err(self.wrong_kind("end_group", other)),
		}
	}

	pub fn set(
		&mut self,
		column: impl Into<String>,
		value: impl Into<SqlValue>,
	) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Insert(builder) => {
				self.statement = Some(ActiveStatement::Insert(builder.set(column, value)));
				Ok(self)
			}
			ActiveStatement::Update(builder) => {
				self.statement = Some(ActiveStatement::Update(builder.set(column, value)));
				Ok(self)
			}
			other => Err(self.wrong_kind("set", other)),
		}
	}

	/// Set a value on a specific insert batch row
	pub fn set_row(
		&mut self,
		row: usize,
		column: impl Into<String>,
		value: impl Into<SqlValue>,
	) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Insert(builder) => {
				self.statement = Some(ActiveStatement::Insert(builder.set_row(row, column, value)));
				Ok(self)
			}
			other => Err(self.wrong_kind("set_row", other)),
		}
	}

	pub fn group_by(&mut self, column: impl Into<String>) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.group_by(column)));
				Ok(self)
			}
			other => Err(self.wrong_kind("group_by", other)),
		}
	}

	pub fn having(
		&mut self,
		column: impl Into<String>,
		operator: Operator,
		value: impl Into<SqlValue>,
	) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(
					builder.having(column, operator, value)?,
				));
				Ok(self)
			}
			other => Err(self.wrong_kind("having", other)),
		}
	}

	pub fn order_by(
		&mut self,
		column: impl Into<String>,
		direction: OrderDirection,
	) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.order_by(column, direction)));
				Ok(self)
			}
			other => Err(self.wrong_kind("order_by", other)),
		}
	}

	pub fn limit(&mut self, limit: i64) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.limit(limit)));
				Ok(self)
			}
			other => Err(self.wrong_kind("limit", other)),
		}
	}

	pub fn offset(&mut self, offset: i64) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.offset(offset)));
				Ok(self)
			}
			other => Err(self.wrong_kind("offset", other)),
		}
	}

	pub fn page(&mut self, page: i64, size: i64) -> Result<&mut Self> {
		match self.active()? {
			ActiveStatement::Select(builder) => {
				self.statement = Some(ActiveStatement::Select(builder.page(page, size)));
				Ok(self)
			}
			other => Err(self.wrong_kind("page", other)),
		}
	}

	/// Dispatch an unrecognized call to the registered extension
	///
	/// With no extension registered, or an extension that does not know the
	/// method, the call fails naming the method and its arguments.
	pub fn call(&mut self, method: &str, args: &[SqlValue]) -> Result<ExtensionResult> {
		match self.extension.clone() {
			Some(extension) => extension.call(self, method, args),
			None => Err(DbError::unimplemented(method, args)),
		}
	}

	/// Render the active statement
	pub fn statement(&self, terminated: bool) -> Result<String> {
		match &self.statement {
			Some(ActiveStatement::Select(builder)) => builder.statement(terminated),
			Some(ActiveStatement::Insert(builder)) => builder.statement(terminated),
			Some(ActiveStatement::Update(builder)) => builder.statement(terminated),
			Some(ActiveStatement::Delete(builder)) => builder.statement(terminated),
			None => Err(DbError::BuildInstruction(
				"no active statement on proxy".to_string(),
			)),
		}
	}

	/// Run the active statement as a non-returning execute
	///
	/// A pooled connection for the proxy's data source is acquired with the
	/// reuse policy; inserts on auto-incrementing models also report the new
	/// row id.
	pub async fn execute(&mut self) -> Result<ExecuteOutcome> {
		let sql = self.statement(true)?;
		let is_insert = matches!(self.statement, Some(ActiveStatement::Insert(_)));
		debug!(model = self.model.name(), sql = %sql, "proxy execute");

		let shared = self.registry.get_connection(&self.source, true).await?;
		let mut conn = shared.lock().await;
		let rows_affected = conn.execute(&sql).await?;
		let inserted_id = if is_insert && self.model.is_auto_increment() {
			conn.last_insert_id(None, None).await?
		} else {
			None
		};
		Ok(ExecuteOutcome {
			rows_affected,
			inserted_id,
		})
	}

	/// Run the active statement as a row-returning query
	pub async fn query(&mut self) -> Result<ResultSet<Row>> {
		let sql = self.statement(true)?;
		debug!(model = self.model.name(), sql = %sql, "proxy query");

		let shared = self.registry.get_connection(&self.source, true).await?;
		let mut conn = shared.lock().await;
		let rows = conn.query(&sql).await?;
		Ok(ResultSet::new(rows))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datasource::{DataSourceConfig, Dialect};
	use crate::driver::DriverAdapter;
	use crate::pool::Connection;
	use async_trait::async_trait;
	use parking_lot::Mutex as SyncMutex;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct MockDriver {
		pre: Arc<dyn Precompiler>,
		connected: bool,
		opens: Arc<AtomicUsize>,
		statements: Arc<SyncMutex<Vec<String>>>,
	}

	#[async_trait]
	impl DriverAdapter for MockDriver {
		fn dialect(&self) -> Dialect {
			Dialect::Postgres
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
			Ok(Some(42))
		}
	}

	struct Fixture {
		registry: Arc<ConnectionRegistry>,
		source: DataSource,
		opens: Arc<AtomicUsize>,
		statements: Arc<SyncMutex<Vec<String>>>,
	}

	fn fixture(table_prefix: Option<&str>) -> Fixture {
		let cfg = DataSourceConfig {
			dialect: Some("postgres".to_string()),
			table_prefix: table_prefix.map(|p| p.to_string()),
			..Default::default()
		};
		let source = DataSource::from_config("main", cfg).unwrap();
		let opens = Arc::new(AtomicUsize::new(0));
		let statements = Arc::new(SyncMutex::new(Vec::new()));
		let opens_factory = opens.clone();
		let statements_factory = statements.clone();
		let registry = Arc::new(ConnectionRegistry::with_factory(4, move |source| {
			Ok(Connection::with_driver(
				source.clone(),
				Box::new(MockDriver {
					pre: precompiler_for(Dialect::Postgres),
					connected: false,
					opens: opens_factory.clone(),
					statements: statements_factory.clone(),
				}),
			))
		}));
		Fixture {
			registry,
			source,
			opens,
			statements,
		}
	}

	fn user_model() -> Arc<ModelSchema> {
		Arc::new(ModelSchema::new("User", "users", "main"))
	}

	#[test]
	fn test_fluent_chain_renders_statement() {
		// Arrange
		let fx = fixture(None);
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone());

		// Act
		proxy
			.select()
			.where_("id", Operator::EqualTo, 5i64)
			.unwrap()
			.limit(1)
			.unwrap();
		let sql = proxy.statement(true).unwrap();

		// Assert
		assert_eq!(
			sql,
			"SELECT \"users\".* FROM \"users\" WHERE \"users\".\"id\" = 5 LIMIT 1;"
		);
	}

	#[test]
	fn test_table_prefix_applied() {
		let fx = fixture(Some("app_"));
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone());
		proxy.select();
		let sql = proxy.statement(false).unwrap();
		assert_eq!(sql, "SELECT \"app_users\".* FROM \"app_users\"");
	}

	#[test]
	fn test_unrecognized_call_without_extension_fails() {
		let fx = fixture(None);
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone());

		let result = proxy.call("find_active", &[SqlValue::Int(3)]);

		match result {
			Err(DbError::UnimplementedMethod { method, args }) => {
				assert_eq!(method, "find_active");
				assert!(args.contains("Int(3)"));
			}
			other => panic!("expected UnimplementedMethod, got {:?}", other.err()),
		}
	}

	struct ActiveFinder;

	impl ProxyExtension for ActiveFinder {
		fn call(
			&self,
			proxy: &mut Proxy,
			method: &str,
			args: &[SqlValue],
		) -> Result<ExtensionResult> {
			match method {
				"find_active" => {
					proxy
						.select()
						.where_("active", Operator::EqualTo, true)?;
					Ok(ExtensionResult::Chain)
				}
				"version" => Ok(ExtensionResult::Value(SqlValue::String("1.0".into()))),
				_ => Err(DbError::unimplemented(method, args)),
			}
		}
	}

	#[test]
	fn test_extension_builder_result_continues_chain() {
		// Arrange
		let fx = fixture(None);
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone())
			.with_extension(Arc::new(ActiveFinder));

		// Act: extension configures the builder, proxy chain continues
		let outcome = proxy.call("find_active", &[]).unwrap();
		assert!(matches!(outcome, ExtensionResult::Chain));
		proxy.limit(10).unwrap();

		// Assert
		let sql = proxy.statement(false).unwrap();
		assert_eq!(
			sql,
			"SELECT \"users\".* FROM \"users\" WHERE \"users\".\"active\" = TRUE LIMIT 10"
		);
	}

	#[test]
	fn test_extension_value_passes_through() {
		let fx = fixture(None);
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone())
			.with_extension(Arc::new(ActiveFinder));

		match proxy.call("version", &[]).unwrap() {
			ExtensionResult::Value(SqlValue::String(v)) => assert_eq!(v, "1.0"),
			_ => panic!("expected pass-through value"),
		}
	}

	#[test]
	fn test_extension_miss_names_call() {
		let fx = fixture(None);
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone())
			.with_extension(Arc::new(ActiveFinder));

		let result = proxy.call("nonexistent", &[]);
		assert!(matches!(
			result,
			Err(DbError::UnimplementedMethod { .. })
		));
	}

	#[test]
	fn test_where_on_insert_is_rejected() {
		let fx = fixture(None);
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone());
		proxy.insert();
		let result = proxy.where_("id", Operator::EqualTo, 1i64);
		assert!(matches!(result, Err(DbError::BuildInstruction(_))));
	}

	#[tokio::test]
	async fn test_insert_execute_returns_new_row_id() {
		// Arrange
		let fx = fixture(None);
		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone());
		proxy.insert().set("name", "Alice").unwrap();

		// Act
		let outcome = proxy.execute().await.unwrap();

		// Assert
		assert_eq!(outcome.rows_affected, 1);
		assert_eq!(outcome.inserted_id, Some(42));
	}

	#[tokio::test]
	async fn test_insert_without_auto_increment_skips_id_lookup() {
		let fx = fixture(None);
		let model = Arc::new(
			ModelSchema::new("Setting", "settings", "main").auto_increment(false),
		);
		let mut proxy = Proxy::new(model, fx.source.clone(), fx.registry.clone());
		proxy.insert().set("key", "theme").unwrap();

		let outcome = proxy.execute().await.unwrap();
		assert_eq!(outcome.inserted_id, None);
	}

	#[tokio::test]
	async fn test_execute_against_warm_pool_opens_nothing() {
		// Arrange: pool already holds an open connection for the source
		let fx = fixture(None);
		let _warm = fx
			.registry
			.get_connection(&fx.source, true)
			.await
			.unwrap();
		assert_eq!(fx.opens.load(Ordering::SeqCst), 1);

		let mut proxy = Proxy::new(user_model(), fx.source.clone(), fx.registry.clone());
		proxy
			.select()
			.where_("id", Operator::EqualTo, 5i64)
			.unwrap()
			.limit(1)
			.unwrap();

		// Act
		let rows = proxy.query().await.unwrap();

		// Assert: zero additional opens, statement went through the pool
		assert!(rows.is_empty());
		assert_eq!(fx.opens.load(Ordering::SeqCst), 1);
		assert_eq!(
			fx.statements.lock().last().map(String::as_str),
			Some("SELECT \"users\".* FROM \"users\" WHERE \"users\".\"id\" = 5 LIMIT 1;")
		);
	}
}
