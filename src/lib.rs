//! # sqlbridge
//!
//! Cross-backend database access layer.
//!
//! This crate provides a unified access layer over several SQL backends:
//! - **Data Sources**: immutable, validated connection descriptors
//! - **Connection Pool**: an explicit registry of pooled native connections
//! - **Precompilers**: per-dialect rendering of identifiers, literals and operators
//! - **Statement Builders**: fluent SELECT/INSERT/UPDATE/DELETE construction
//! - **Proxy**: model-bound fluent façade with extension dispatch
//! - **Relation Engine**: lazy HasOne/HasMany/BelongsTo resolution
//!
//! ## Supported Backends
//!
//! | Backend | Feature Flag | Driver |
//! |---------|--------------|--------|
//! | PostgreSQL | `postgres` | [`driver::PostgresDriver`] |
//! | MySQL/MariaDB | `mysql` | [`driver::MysqlDriver`] |
//! | SQLite | `sqlite` | [`driver::SqliteDriver`] |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqlbridge::datasource::{DataSource, DataSourceConfig};
//! use sqlbridge::pool::ConnectionRegistry;
//! use sqlbridge::builder::SelectBuilder;
//! use sqlbridge::precompiler::precompiler_for;
//! use sqlbridge::types::Operator;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), sqlbridge::error::DbError> {
//! let config = DataSourceConfig {
//!     dialect: Some("postgres".to_string()),
//!     host: Some("localhost".to_string()),
//!     database: Some("app".to_string()),
//!     username: Some("app".to_string()),
//!     ..Default::default()
//! };
//! let source = DataSource::from_config("main", config)?;
//!
//! let registry = Arc::new(ConnectionRegistry::new(10));
//! let connection = registry.get_connection(&source, true).await?;
//!
//! let sql = SelectBuilder::new(precompiler_for(source.dialect()), "users")
//!     .where_("id", Operator::EqualTo, 5i64)?
//!     .limit(1)
//!     .statement(true)?;
//! let rows = connection.lock().await.query(&sql).await?;
//! # let _ = rows;
//! registry.close_all().await;
//! # Ok(())
//! # }
//! ```
//!
//! Rendered statements inline values as escaped literals; the precompiler's
//! escaping is the security boundary. There is no parameter-placeholder
//! binding layer in this design.

pub mod builder;
pub mod datasource;
pub mod driver;
pub mod error;
pub mod model;
pub mod pool;
pub mod precompiler;
pub mod proxy;
pub mod relations;
pub mod resultset;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
	pub use crate::builder::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};
	pub use crate::datasource::{
		ConfigStore, DataSource, DataSourceConfig, DataSourceSpec, Dialect, DriverKind,
	};
	pub use crate::driver::DriverAdapter;
	pub use crate::error::{DbError, Result};
	pub use crate::model::{
		FieldDef, ModelSchema, Record, RelationDef, RelationKind, RelationState, SchemaRegistry,
	};
	pub use crate::pool::{Connection, ConnectionRegistry, SharedConnection};
	pub use crate::precompiler::{Precompiler, precompiler_for};
	pub use crate::proxy::{ExecuteOutcome, ExtensionResult, Proxy, ProxyExtension};
	pub use crate::relations::RelationEngine;
	pub use crate::resultset::ResultSet;
	pub use crate::types::{
		Combinator, Connector, JoinKind, NullsOrder, Operator, OrderDirection, Row, SqlValue,
	};
}

// Re-export top-level commonly used types
pub use datasource::{DataSource, Dialect};
pub use error::{DbError, Result};
pub use pool::{Connection, ConnectionRegistry};
pub use resultset::ResultSet;
pub use types::{Operator, Row, SqlValue};
