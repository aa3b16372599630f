//! Static model schema descriptions and record instances
//!
//! Schemas are declared once and consulted by the generic engines; records
//! carry per-instance values and memoized relation state.

use crate::datasource::DataSource;
use crate::error::{DbError, Result};
use crate::resultset::ResultSet;
use crate::types::{OrderDirection, Row, SqlValue};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Declared association kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
	HasOne,
	HasMany,
	BelongsTo,
}

/// Pivot model declaration for HasMany-through associations
#[derive(Debug, Clone)]
pub struct ThroughDef {
	/// The pivot model name
	pub model: String,
	/// Pivot columns referencing the parent side, in parent-key order
	pub parent_columns: Vec<String>,
	/// Pivot columns referencing the child side, in child-key order
	pub child_columns: Vec<String>,
}

/// An extra query option declared on a relation, applied in declaration order
#[derive(Debug, Clone, PartialEq)]
pub enum RelationOption {
	OrderBy(String, OrderDirection),
	Limit(i64),
	Offset(i64),
	Distinct,
}

/// One declared association between two models
#[derive(Debug, Clone)]
pub struct RelationDef {
	pub name: String,
	pub kind: RelationKind,
	/// The related model name
	pub model: String,
	/// Owning-side key columns, ordered
	pub local_columns: Vec<String>,
	/// Related-side key columns, positionally matched to `local_columns`
	pub remote_columns: Vec<String>,
	pub through: Option<ThroughDef>,
	pub options: Vec<RelationOption>,
}

impl RelationDef {
	pub fn new(
		name: impl Into<String>,
		kind: RelationKind,
		model: impl Into<String>,
		local_columns: Vec<String>,
		remote_columns: Vec<String>,
	) -> Self {
		Self {
			name: name.into(),
			kind,
			model: model.into(),
			local_columns,
			remote_columns,
			through: None,
			options: Vec::new(),
		}
	}

	pub fn through(
		mut self,
		model: impl Into<String>,
		parent_columns: Vec<String>,
		child_columns: Vec<String>,
	) -> Self {
		self.through = Some(ThroughDef {
			model: model.into(),
			parent_columns,
			child_columns,
		});
		self
	}

	/// Attach an extra query option by method name
	///
	/// Option names map to builder calls; anything unrecognized is an invalid
	/// property on the relation descriptor.
	pub fn with_option(mut self, method: &str, args: Vec<SqlValue>) -> Result<Self> {
		let option = match method {
			"order_by" => {
				let column = match args.first() {
					Some(SqlValue::String(column)) => column.clone(),
					_ => {
						return Err(DbError::InvalidProperty(
							"order_by requires a column name".to_string(),
						));
					}
				};
				let direction = match args.get(1) {
					Some(SqlValue::String(dir)) if dir.eq_ignore_ascii_case("desc") => {
						OrderDirection::Desc
					}
					_ => OrderDirection::Asc,
				};
				RelationOption::OrderBy(column, direction)
			}
			"limit" => match args.first() {
				Some(SqlValue::Int(n)) => RelationOption::Limit(*n),
				_ => {
					return Err(DbError::InvalidProperty(
						"limit requires an integer".to_string(),
					));
				}
			},
			"offset" => match args.first() {
				Some(SqlValue::Int(n)) => RelationOption::Offset(*n),
				_ => {
					return Err(DbError::InvalidProperty(
						"offset requires an integer".to_string(),
					));
				}
			},
			"distinct" => RelationOption::Distinct,
			other => {
				return Err(DbError::InvalidProperty(format!(
					"unknown relation option: {}",
					other
				)));
			}
		};
		self.options.push(option);
		Ok(self)
	}
}

/// One declared field with validated metadata
#[derive(Debug, Clone, Default)]
pub struct FieldDef {
	pub name: String,
	pub meta: HashMap<String, SqlValue>,
}

impl FieldDef {
	const KNOWN_META: &'static [&'static str] = &["type", "length", "null", "default"];

	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			meta: HashMap::new(),
		}
	}

	/// Attach a metadata key, rejecting anything unrecognized
	pub fn with_meta(mut self, key: &str, value: impl Into<SqlValue>) -> Result<Self> {
		if !Self::KNOWN_META.contains(&key) {
			return Err(DbError::InvalidProperty(format!(
				"unknown field property: {}",
				key
			)));
		}
		self.meta.insert(key.to_string(), value.into());
		Ok(self)
	}
}

/// Static description of one model: table, keys, fields, relations
#[derive(Debug, Clone)]
pub struct ModelSchema {
	name: String,
	table: String,
	source_id: String,
	primary_key: Vec<String>,
	auto_increment: bool,
	fields: Vec<FieldDef>,
	relations: Vec<RelationDef>,
}

impl ModelSchema {
	pub fn new(
		name: impl Into<String>,
		table: impl Into<String>,
		source_id: impl Into<String>,
	) -> Self {
		Self {
			name: name.into(),
			table: table.into(),
			source_id: source_id.into(),
			primary_key: vec!["id".to_string()],
			auto_increment: true,
			fields: Vec::new(),
			relations: Vec::new(),
		}
	}

	pub fn primary_key(mut self, columns: Vec<String>) -> Self {
		self.primary_key = columns;
		self
	}

	pub fn auto_increment(mut self, auto_increment: bool) -> Self {
		self.auto_increment = auto_increment;
		self
	}

	pub fn field(mut self, field: FieldDef) -> Self {
		self.fields.push(field);
		self
	}

	pub fn relation(mut self, relation: RelationDef) -> Self {
		self.relations.push(relation);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn source_id(&self) -> &str {
		&self.source_id
	}

	pub fn primary_key_columns(&self) -> &[String] {
		&self.primary_key
	}

	pub fn is_auto_increment(&self) -> bool {
		self.auto_increment
	}

	pub fn fields(&self) -> &[FieldDef] {
		&self.fields
	}

	pub fn relations(&self) -> &[RelationDef] {
		&self.relations
	}

	pub fn relation_named(&self, name: &str) -> Option<&RelationDef> {
		self.relations.iter().find(|r| r.name == name)
	}
}

/// Registry of model schemas and the data sources they live in
#[derive(Default)]
pub struct SchemaRegistry {
	models: HashMap<String, Arc<ModelSchema>>,
	sources: HashMap<String, DataSource>,
}

impl SchemaRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_model(&mut self, schema: ModelSchema) -> Arc<ModelSchema> {
		let schema = Arc::new(schema);
		self.models.insert(schema.name().to_string(), schema.clone());
		schema
	}

	pub fn register_source(&mut self, source: DataSource) {
		self.sources.insert(source.id().to_string(), source);
	}

	pub fn model(&self, name: &str) -> Result<Arc<ModelSchema>> {
		self.models
			.get(name)
			.cloned()
			.ok_or_else(|| DbError::InvalidProperty(format!("unknown model: {}", name)))
	}

	pub fn source(&self, id: &str) -> Result<DataSource> {
		self.sources
			.get(id)
			.cloned()
			.ok_or_else(|| DbError::InvalidProperty(format!("unknown data source: {}", id)))
	}
}

/// Memoized association state on one record
///
/// Unloaded until first access, then Loaded for the record's lifetime; there
/// is no auto-invalidation.
#[derive(Debug, Clone)]
pub enum RelationState {
	Unloaded,
	LoadedOne(Box<Record>),
	LoadedMany(ResultSet<Record>),
}

impl RelationState {
	pub fn is_loaded(&self) -> bool {
		!matches!(self, RelationState::Unloaded)
	}
}

/// One model instance: column values plus memoized relation state
#[derive(Debug, Clone)]
pub struct Record {
	schema: Arc<ModelSchema>,
	values: IndexMap<String, SqlValue>,
	saved: bool,
	relations: HashMap<String, RelationState>,
}

impl Record {
	/// A fresh, unsaved instance
	pub fn new_unsaved(schema: Arc<ModelSchema>) -> Self {
		Self {
			schema,
			values: IndexMap::new(),
			saved: false,
			relations: HashMap::new(),
		}
	}

	/// Materialize a fetched row into a saved record
	pub fn from_row(schema: Arc<ModelSchema>, row: &Row) -> Self {
		let mut values = IndexMap::new();
		for (column, value) in &row.data {
			values.insert(column.clone(), value.clone());
		}
		Self {
			schema,
			values,
			saved: true,
			relations: HashMap::new(),
		}
	}

	pub fn schema(&self) -> &Arc<ModelSchema> {
		&self.schema
	}

	pub fn is_saved(&self) -> bool {
		self.saved
	}

	pub fn value(&self, column: &str) -> SqlValue {
		self.values.get(column).cloned().unwrap_or(SqlValue::Null)
	}

	pub fn set_value(&mut self, column: impl Into<String>, value: SqlValue) {
		self.values.insert(column.into(), value);
	}

	/// Memoized state for a declared relation
	pub fn relation_state(&self, name: &str) -> &RelationState {
		self.relations.get(name).unwrap_or(&RelationState::Unloaded)
	}

	pub(crate) fn store_relation(&mut self, name: &str, state: RelationState) {
		self.relations.insert(name.to_string(), state);
	}
}
