//! Lazy relation resolution engine

use crate::builder::SelectBuilder;
use crate::datasource::DataSource;
use crate::error::{DbError, Result};
use crate::model::{
	ModelSchema, Record, RelationDef, RelationKind, RelationOption, RelationState, SchemaRegistry,
	ThroughDef,
};
use crate::pool::ConnectionRegistry;
use crate::precompiler::precompiler_for;
use crate::resultset::ResultSet;
use crate::types::{Connector, JoinKind, Operator, Row};
use std::sync::Arc;
use tracing::debug;

/// Resolves declared associations into related records on first access
///
/// Resolution is lazy and memoized per record: Unloaded moves to Loaded once
/// and stays there for the record's lifetime.
pub struct RelationEngine {
	registry: Arc<ConnectionRegistry>,
	catalog: Arc<SchemaRegistry>,
	/// When a pivot lives in a different data source than the child, the
	/// child predicate is filled from the parent's own key values rather
	/// than the fetched pivot tuples. This mirrors the long-standing
	/// behavior of the pivot branch; disable to match on pivot values.
	match_children_on_parent_key: bool,
}

impl RelationEngine {
	pub fn new(registry: Arc<ConnectionRegistry>, catalog: Arc<SchemaRegistry>) -> Self {
		Self {
			registry,
			catalog,
			match_children_on_parent_key: true,
		}
	}

	/// Control which side's key values fill the cross-source child predicate
	pub fn match_children_on_parent_key(mut self, enabled: bool) -> Self {
		self.match_children_on_parent_key = enabled;
		self
	}

	/// Resolve one declared relation on a record, memoizing the result
	pub async fn resolve(&self, record: &mut Record, name: &str) -> Result<RelationState> {
		if record.relation_state(name).is_loaded() {
			return Ok(record.relation_state(name).clone());
		}
		let relation = record
			.schema()
			.relation_named(name)
			.cloned()
			.ok_or_else(|| {
				DbError::InvalidProperty(format!(
					"unknown relation {} on model {}",
					name,
					record.schema().name()
				))
			})?;

		debug!(
			model = record.schema().name(),
			relation = name,
			kind = ?relation.kind,
			"resolving relation"
		);
		let state = match relation.kind {
			RelationKind::HasOne | RelationKind::BelongsTo => {
				RelationState::LoadedOne(Box::new(self.fetch_one(record, &relation).await?))
			}
			RelationKind::HasMany => {
				let records = match &relation.through {
					None => self.fetch_many(record, &relation).await?,
					Some(through) => self.fetch_many_through(record, &relation, through).await?,
				};
				RelationState::LoadedMany(records)
			}
		};
		record.store_relation(name, state.clone());
		Ok(state)
	}

	/// One SELECT constrained by positional equality across the ordered
	/// composite-key columns
	///
	/// Zero matching rows is not an error: the result is a new, unsaved
	/// record with its key columns pre-populated from the owning side.
	async fn fetch_one(&self, record: &Record, relation: &RelationDef) -> Result<Record> {
		let related = self.catalog.model(&relation.model)?;
		let source = self.catalog.source(related.source_id())?;
		let table = table_for(&related, &source);

		let mut builder = SelectBuilder::new(precompiler_for(source.dialect()), table);
		for (local, remote) in relation.local_columns.iter().zip(&relation.remote_columns) {
			builder = builder.where_(remote.clone(), Operator::EqualTo, record.value(local))?;
		}
		builder = builder.limit(1);

		let rows = self.run_query(&source, &builder.statement(true)?).await?;
		match rows.first() {
			Some(row) => Ok(Record::from_row(related, row)),
			None => {
				let mut fresh = Record::new_unsaved(related);
				for (local, remote) in relation.local_columns.iter().zip(&relation.remote_columns)
				{
					fresh.set_value(remote.clone(), record.value(local));
				}
				Ok(fresh)
			}
		}
	}

	/// One SELECT over the child's foreign-key columns, with declared extra
	/// query options applied in declaration order
	async fn fetch_many(
		&self,
		record: &Record,
		relation: &RelationDef,
	) -> Result<ResultSet<Record>> {
		let child = self.catalog.model(&relation.model)?;
		let source = self.catalog.source(child.source_id())?;
		let table = table_for(&child, &source);

		let mut builder = SelectBuilder::new(precompiler_for(source.dialect()), table);
		for (local, remote) in relation.local_columns.iter().zip(&relation.remote_columns) {
			builder = builder.where_(remote.clone(), Operator::EqualTo, record.value(local))?;
		}
		builder = apply_options(builder, &relation.options)?;

		let rows = self.run_query(&source, &builder.statement(true)?).await?;
		Ok(materialize(&child, rows))
	}

	/// HasMany through a pivot model
	///
	/// When pivot and child share a data source this is a single INNER JOIN
	/// query. Across data sources no single join is possible, so the pivot
	/// key tuples are fetched first and the children matched with an
	/// OR-of-ANDs predicate in a second query.
	async fn fetch_many_through(
		&self,
		record: &Record,
		relation: &RelationDef,
		through: &ThroughDef,
	) -> Result<ResultSet<Record>> {
		let child = self.catalog.model(&relation.model)?;
		let child_source = self.catalog.source(child.source_id())?;
		let pivot = self.catalog.model(&through.model)?;
		let pivot_source = self.catalog.source(pivot.source_id())?;

		let child_table = table_for(&child, &child_source);
		let pivot_table = table_for(&pivot, &pivot_source);

		if pivot_source.id() == child_source.id() {
			let on_pairs: Vec<(String, String)> = through
				.child_columns
				.iter()
				.zip(&relation.remote_columns)
				.map(|(pivot_col, child_col)| {
					(
						format!("{}.{}", pivot_table, pivot_col),
						format!("{}.{}", child_table, child_col),
					)
				})
				.collect();

			let mut builder =
				SelectBuilder::new(precompiler_for(child_source.dialect()), child_table.clone())
					.join(JoinKind::Inner, pivot_table.clone(), on_pairs);
			for (pivot_col, local) in through.parent_columns.iter().zip(&relation.local_columns) {
				builder = builder.where_(
					format!("{}.{}", pivot_table, pivot_col),
					Operator::EqualTo,
					record.value(local),
				)?;
			}
			builder = apply_options(builder, &relation.options)?;

			let rows = self
				.run_query(&child_source, &builder.statement(true)?)
				.await?;
			return Ok(materialize(&child, rows));
		}

		// First leg: the pivot rows' child-side key tuples.
		let mut pivot_builder =
			SelectBuilder::new(precompiler_for(pivot_source.dialect()), pivot_table)
				.columns(through.child_columns.clone());
		for (pivot_col, local) in through.parent_columns.iter().zip(&relation.local_columns) {
			pivot_builder =
				pivot_builder.where_(pivot_col.clone(), Operator::EqualTo, record.value(local))?;
		}
		let tuples = self
			.run_query(&pivot_source, &pivot_builder.statement(true)?)
			.await?;
		if tuples.is_empty() {
			return Ok(ResultSet::empty());
		}

		// Second leg: children matched by an OR of per-tuple AND groups.
		let mut builder = SelectBuilder::new(precompiler_for(child_source.dialect()), child_table);
		for (index, tuple) in tuples.iter().enumerate() {
			let connector = if index == 0 {
				Connector::And
			} else {
				Connector::Or
			};
			builder = builder.begin_group(connector);
			for (position, (child_col, pivot_col)) in relation
				.remote_columns
				.iter()
				.zip(&through.child_columns)
				.enumerate()
			{
				let value = if self.match_children_on_parent_key {
					relation
						.local_columns
						.get(position)
						.map(|local| record.value(local))
						.unwrap_or_else(|| tuple.value(pivot_col))
				} else {
					tuple.value(pivot_col)
				};
				builder = builder.where_(child_col.clone(), Operator::EqualTo, value)?;
			}
			builder = builder.end_group();
		}
		builder = apply_options(builder, &relation.options)?;

		let rows = self
			.run_query(&child_source, &builder.statement(true)?)
			.await?;
		Ok(materialize(&child, rows))
	}

	async fn run_query(&self, source: &DataSource, sql: &str) -> Result<Vec<Row>> {
		let shared = self.registry.get_connection(source, true).await?;
		let mut conn = shared.lock().await;
		conn.query(sql).await
	}
}

fn table_for(schema: &ModelSchema, source: &DataSource) -> String {
	match source.table_prefix() {
		Some(prefix) => format!("{}{}", prefix, schema.table()),
		None => schema.table().to_string(),
	}
}

fn materialize(schema: &Arc<ModelSchema>, rows: Vec<Row>) -> ResultSet<Record> {
	ResultSet::new(
		rows.iter()
			.map(|row| Record::from_row(schema.clone(), row))
			.collect(),
	)
}

fn apply_options(
	mut builder: SelectBuilder,
	options: &[RelationOption],
) -> Result<SelectBuilder> {
	for option in options {
		builder = match option {
			RelationOption::OrderBy(column, direction) => builder.order_by(column, *direction),
			RelationOption::Limit(limit) => builder.limit(*limit),
			RelationOption::Offset(offset) => builder.offset(*offset),
			RelationOption::Distinct => builder.distinct(),
		};
	}
	Ok(builder)
}
