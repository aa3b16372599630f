//! Common test doubles for access-layer integration tests

// Each test binary compiles common/ separately, causing unused code warnings.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlbridge::datasource::{DataSource, DataSourceConfig, Dialect};
use sqlbridge::driver::DriverAdapter;
use sqlbridge::error::Result;
use sqlbridge::pool::{Connection, ConnectionRegistry};
use sqlbridge::precompiler::{Precompiler, precompiler_for};
use sqlbridge::types::Row;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Observable traffic shared between a test and its mock drivers
#[derive(Default)]
pub struct Traffic {
	pub opens: AtomicUsize,
	pub statements: Mutex<Vec<(String, String)>>,
	pub responses: Mutex<HashMap<String, VecDeque<Vec<Row>>>>,
}

impl Traffic {
	pub fn open_count(&self) -> usize {
		self.opens.load(Ordering::SeqCst)
	}

	pub fn statement_count(&self) -> usize {
		self.statements.lock().len()
	}

	pub fn last_statement(&self) -> Option<String> {
		self.statements.lock().last().map(|(_, sql)| sql.clone())
	}

	pub fn push_response(&self, source_id: &str, rows: Vec<Row>) {
		self.responses
			.lock()
			.entry(source_id.to_string())
			.or_default()
			.push_back(rows);
	}
}

/// Driver double: records traffic and serves scripted rows, no network
pub struct RecordingDriver {
	source_id: String,
	dialect: Dialect,
	pre: Arc<dyn Precompiler>,
	connected: bool,
	traffic: Arc<Traffic>,
}

#[async_trait]
impl DriverAdapter for RecordingDriver {
	fn dialect(&self) -> Dialect {
		self.dialect
	}

	fn precompiler(&self) -> &Arc<dyn Precompiler> {
		&self.pre
	}

	async fn open(&mut self) -> Result<()> {
		self.traffic.opens.fetch_add(1, Ordering::SeqCst);
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
		self.traffic
			.statements
			.lock()
			.push((self.source_id.clone(), sql.to_string()));
		Ok(1)
	}

	async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
		self.traffic
			.statements
			.lock()
			.push((self.source_id.clone(), sql.to_string()));
		let mut responses = self.traffic.responses.lock();
		Ok(responses
			.get_mut(&self.source_id)
			.and_then(|queue| queue.pop_front())
			.unwrap_or_default())
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
		Ok(Some(101))
	}
}

/// Build a data source with a given id and dialect tag
pub fn data_source(id: &str, dialect: &str) -> DataSource {
	let config = DataSourceConfig {
		dialect: Some(dialect.to_string()),
		host: Some("localhost".to_string()),
		database: Some("app".to_string()),
		..Default::default()
	};
	DataSource::from_config(id, config).expect("valid data source config")
}

/// Registry wired to recording drivers
pub fn recording_registry(max_size: usize) -> (Arc<ConnectionRegistry>, Arc<Traffic>) {
	let traffic = Arc::new(Traffic::default());
	let traffic_factory = traffic.clone();
	let registry = ConnectionRegistry::with_factory(max_size, move |source| {
		Ok(Connection::with_driver(
			source.clone(),
			Box::new(RecordingDriver {
				source_id: source.id().to_string(),
				dialect: source.dialect(),
				pre: precompiler_for(source.dialect()),
				connected: false,
				traffic: traffic_factory.clone(),
			}),
		))
	});
	(Arc::new(registry), traffic)
}
