// Dweve GraphStore - Property Graph Import Orchestration
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Validation, deduplication and writing of graph document batches.
//!
//! An import runs in four phases and only the last one writes data:
//!
//! 1. every document is validated; the first violation rejects the batch;
//! 2. property types are checked against the
//!    [`TypeConsistency`](crate::TypeConsistency) policy;
//! 3. every document is planned, converting all properties up front;
//! 4. all tables the batch needs are created, then each document is written.
//!
//! Within a document nodes are written first, then its source attribution
//! (best-effort), then its relationships.

use crate::config::{ImportOptions, WriteStrategy};
use crate::cypher::templates::{self, CHUNK_TABLE, MENTIONS, MERGED_COLUMN};
use crate::cypher::{relationship_table, table_name};
use crate::error::{GraphStoreError, Result};
use crate::executor::Executor;
use crate::mapping::PropertyConverter;
use crate::schema::{infer_property_types, RelationshipKey, SchemaManager, RESERVED_NODE_KEYS};
use graphstore_core::{GraphDocument, Node, Relationship, SourceDocument};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::xxh64;

/// Counters for one import call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Documents written.
    pub documents: usize,
    /// Node upserts issued.
    pub nodes: usize,
    /// Relationship upserts issued.
    pub relationships: usize,
    /// Nodes and relationships dropped as duplicates.
    pub duplicates_dropped: usize,
    /// Tables created by this call.
    pub tables_created: usize,
    /// Property keys seen with more than one type.
    pub type_conflicts: usize,
    /// Documents whose source attribution was skipped or failed.
    pub attribution_skipped: usize,
    /// Node tables written to.
    pub node_tables: BTreeSet<String>,
    /// Relationship tables written to.
    pub relationship_tables: BTreeSet<String>,
}

/// Running totals across every import of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStatistics {
    /// Completed import calls.
    pub imports: usize,
    /// Summed counters and the union of table names.
    pub totals: ImportReport,
}

impl ImportStatistics {
    /// Fold one report into the totals.
    pub fn record(&mut self, report: &ImportReport) {
        self.imports += 1;
        let totals = &mut self.totals;
        totals.documents += report.documents;
        totals.nodes += report.nodes;
        totals.relationships += report.relationships;
        totals.duplicates_dropped += report.duplicates_dropped;
        totals.tables_created += report.tables_created;
        totals.type_conflicts += report.type_conflicts;
        totals.attribution_skipped += report.attribution_skipped;
        totals.node_tables.extend(report.node_tables.iter().cloned());
        totals
            .relationship_tables
            .extend(report.relationship_tables.iter().cloned());
    }
}

/// Keep the first node for each id, preserving order.
///
/// Ids are unique across types: a later node reusing an id under another
/// type is dropped as well (logged at `debug`), so relationships naming it
/// by that type fail with `UnmatchedEndpoint`.
pub fn deduplicate_nodes(nodes: &[Node]) -> Vec<Node> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    nodes
        .iter()
        .filter(|node| match seen.entry(node.id.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(node.node_type.as_str());
                true
            }
            Entry::Occupied(first) => {
                if *first.get() != node.node_type {
                    debug!(
                        id = %node.id,
                        kept = %first.get(),
                        dropped = %node.node_type,
                        "dropping node whose id is taken by another type"
                    );
                }
                false
            }
        })
        .cloned()
        .collect()
}

/// Keep the first relationship for each
/// `(source id, type, target id, source type, target type)`, preserving order.
pub fn deduplicate_relationships(relationships: &[Relationship]) -> Vec<Relationship> {
    let mut seen = HashSet::new();
    relationships
        .iter()
        .filter(|rel| {
            seen.insert((
                rel.source.id.as_str(),
                rel.rel_type.as_str(),
                rel.target.id.as_str(),
                rel.source.node_type.as_str(),
                rel.target.node_type.as_str(),
            ))
        })
        .cloned()
        .collect()
}

/// Reject the batch at the first malformed node or relationship.
pub fn validate_documents(documents: &[GraphDocument]) -> Result<()> {
    for (index, doc) in documents.iter().enumerate() {
        validate_document(doc).map_err(|message| GraphStoreError::Validation {
            document: index,
            message,
        })?;
    }
    Ok(())
}

fn validate_document(doc: &GraphDocument) -> std::result::Result<(), String> {
    for (i, node) in doc.nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(format!("node at index {} has empty id", i));
        }
        if node.node_type.is_empty() {
            return Err(format!("node '{}' has empty type", node.id));
        }
    }
    for (i, rel) in doc.relationships.iter().enumerate() {
        let missing = if rel.rel_type.is_empty() {
            "type"
        } else if rel.source.id.is_empty() {
            "source id"
        } else if rel.target.id.is_empty() {
            "target id"
        } else if rel.source.node_type.is_empty() {
            "source type"
        } else if rel.target.node_type.is_empty() {
            "target type"
        } else {
            continue;
        };
        return Err(format!("relationship at index {} has empty {}", i, missing));
    }
    Ok(())
}

/// Id of the chunk node for a source document: its `id` metadata when that
/// is a non-empty string, otherwise `doc_` and the xxh64 of the content.
pub fn chunk_id(source: &SourceDocument) -> String {
    match source.explicit_id() {
        Some(id) => id.to_string(),
        None => format!("doc_{:016x}", xxh64(source.page_content.as_bytes(), 0)),
    }
}

#[derive(Debug)]
struct NodeWrite {
    table: String,
    id: String,
    node_type: String,
    keys: Vec<String>,
    values: Vec<String>,
}

#[derive(Debug)]
struct RelationshipWrite {
    key: RelationshipKey,
    source_id: String,
    target_id: String,
    keys: Vec<String>,
    values: Vec<String>,
    description: String,
}

#[derive(Debug)]
struct AttributionWrite {
    chunk_id: String,
    text: String,
    keys: Vec<String>,
    values: Vec<String>,
    /// Entity table -> node ids.
    mentions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
struct DocumentPlan {
    index: usize,
    batched: bool,
    nodes: Vec<NodeWrite>,
    relationships: Vec<RelationshipWrite>,
    attribution: Option<AttributionWrite>,
    duplicates: usize,
}

/// Which attribution tables could be created.
#[derive(Debug, Default)]
struct AttributionTables {
    chunk: bool,
    mentions: BTreeSet<String>,
}

/// Writes batches of graph documents through an [`Executor`].
#[derive(Debug)]
pub struct ImportPipeline<'a> {
    schema: &'a SchemaManager,
    properties: &'a PropertyConverter,
    options: &'a ImportOptions,
}

impl<'a> ImportPipeline<'a> {
    /// Create a pipeline.
    pub fn new(
        schema: &'a SchemaManager,
        properties: &'a PropertyConverter,
        options: &'a ImportOptions,
    ) -> Self {
        Self {
            schema,
            properties,
            options,
        }
    }

    /// Import `documents`. Nothing is written if validation or conversion fails.
    pub async fn import(
        &self,
        documents: &[GraphDocument],
        exec: &mut dyn Executor,
    ) -> Result<ImportReport> {
        let started = Instant::now();
        let mut report = ImportReport::default();
        if documents.is_empty() {
            return Ok(report);
        }

        validate_documents(documents)?;
        let types = infer_property_types(documents, self.properties, self.options.type_consistency)?;
        report.type_conflicts = types.conflicts.len();

        let plans = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| self.plan(index, doc))
            .collect::<Result<Vec<_>>>()?;

        let attribution = self.ensure_tables(&plans, exec, &mut report).await?;

        for plan in plans {
            self.write(plan, exec, &attribution, &mut report).await?;
        }

        info!(
            documents = report.documents,
            nodes = report.nodes,
            relationships = report.relationships,
            duplicates = report.duplicates_dropped,
            tables_created = report.tables_created,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "import complete"
        );
        Ok(report)
    }

    fn plan(&self, index: usize, doc: &GraphDocument) -> Result<DocumentPlan> {
        let batched = match self.options.strategy {
            WriteStrategy::Individual => false,
            WriteStrategy::Batched => true,
            WriteStrategy::Auto => {
                doc.nodes.len() > self.options.batch_threshold
                    || doc.relationships.len() > self.options.batch_threshold
            }
        };

        let (nodes, relationships) = if self.options.deduplicate {
            (
                deduplicate_nodes(&doc.nodes),
                deduplicate_relationships(&doc.relationships),
            )
        } else {
            (doc.nodes.clone(), doc.relationships.clone())
        };
        let duplicates =
            doc.nodes.len() - nodes.len() + doc.relationships.len() - relationships.len();

        let node_writes = nodes
            .iter()
            .map(|node| {
                let (keys, values) = self
                    .properties
                    .to_property_map(&node.properties, RESERVED_NODE_KEYS)
                    .map_err(|e| GraphStoreError::conversion(format!("node '{}'", node.id), e))?;
                Ok(NodeWrite {
                    table: table_name(&node.node_type),
                    id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    keys,
                    values,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let relationship_writes = relationships
            .iter()
            .map(|rel| {
                let description = rel.describe();
                let (keys, values) = self
                    .properties
                    .to_property_map(&rel.properties, &[])
                    .map_err(|e| GraphStoreError::conversion(description.clone(), e))?;
                Ok(RelationshipWrite {
                    key: RelationshipKey::new(&rel.rel_type, &rel.source.node_type, &rel.target.node_type),
                    source_id: rel.source.id.clone(),
                    target_id: rel.target.id.clone(),
                    keys,
                    values,
                    description,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let attribution = if self.options.include_source && !doc.source.page_content.is_empty() {
            self.plan_attribution(&doc.source, &node_writes)
        } else {
            None
        };

        Ok(DocumentPlan {
            index,
            batched,
            nodes: node_writes,
            relationships: relationship_writes,
            attribution,
            duplicates,
        })
    }

    fn plan_attribution(&self, source: &SourceDocument, nodes: &[NodeWrite]) -> Option<AttributionWrite> {
        let (keys, values) = match self.properties.to_property_map(&source.metadata, &[]) {
            Ok(columns) => columns,
            Err(e) => {
                warn!(error = %e, "source metadata not convertible, attribution skipped");
                return None;
            }
        };
        let mut mentions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in nodes {
            mentions.entry(node.table.clone()).or_default().push(node.id.clone());
        }
        Some(AttributionWrite {
            chunk_id: chunk_id(source),
            text: source.page_content.clone(),
            keys,
            values,
            mentions,
        })
    }

    async fn ensure_tables(
        &self,
        plans: &[DocumentPlan],
        exec: &mut dyn Executor,
        report: &mut ImportReport,
    ) -> Result<AttributionTables> {
        let node_tables: BTreeSet<&str> = plans
            .iter()
            .flat_map(|p| p.nodes.iter().map(|n| n.table.as_str()))
            .collect();
        let relationship_keys: BTreeSet<&RelationshipKey> = plans
            .iter()
            .flat_map(|p| p.relationships.iter().map(|r| &r.key))
            .collect();

        for table in &node_tables {
            if self.schema.ensure_node_table_named(table, exec).await? {
                report.tables_created += 1;
            }
        }
        for key in &relationship_keys {
            if self.schema.ensure_relationship_key(key, exec).await? {
                report.tables_created += 1;
            }
        }

        let mut attribution = AttributionTables::default();
        if plans.iter().any(|p| p.attribution.is_some()) {
            attribution.chunk = self.schema.ensure_chunk_table(exec).await;
            if attribution.chunk {
                let entities: BTreeSet<&str> = plans
                    .iter()
                    .filter_map(|p| p.attribution.as_ref())
                    .flat_map(|a| a.mentions.keys().map(String::as_str))
                    .collect();
                for entity in entities {
                    if self.schema.ensure_mentions_table_named(entity, exec).await {
                        attribution.mentions.insert(entity.to_string());
                    }
                }
            }
        }
        Ok(attribution)
    }

    async fn write(
        &self,
        plan: DocumentPlan,
        exec: &mut dyn Executor,
        tables: &AttributionTables,
        report: &mut ImportReport,
    ) -> Result<()> {
        debug!(
            document = plan.index,
            nodes = plan.nodes.len(),
            relationships = plan.relationships.len(),
            batched = plan.batched,
            "writing document"
        );
        report.duplicates_dropped += plan.duplicates;
        report
            .node_tables
            .extend(plan.nodes.iter().map(|n| n.table.clone()));
        report
            .relationship_tables
            .extend(plan.relationships.iter().map(|r| r.key.table()));

        let node_count = plan.nodes.len();
        let relationship_count = plan.relationships.len();

        if plan.batched {
            self.write_nodes_batched(plan.nodes, exec).await?;
        } else {
            write_nodes_individually(plan.nodes, exec).await?;
        }
        report.nodes += node_count;

        match plan.attribution {
            Some(attribution) => {
                if !write_attribution(attribution, exec, tables).await {
                    report.attribution_skipped += 1;
                }
            }
            None if self.options.include_source => report.attribution_skipped += 1,
            None => {}
        }

        if plan.batched {
            self.write_relationships_batched(plan.relationships, exec).await?;
        } else {
            write_relationships_individually(plan.relationships, exec).await?;
        }
        report.relationships += relationship_count;
        report.documents += 1;
        Ok(())
    }

    async fn write_nodes_batched(&self, nodes: Vec<NodeWrite>, exec: &mut dyn Executor) -> Result<()> {
        let mut groups: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for node in nodes {
            let row = templates::node_row(&node.id, &node.node_type, node.keys, node.values);
            groups.entry(node.table).or_default().push(row);
        }

        for (table, rows) in groups {
            for chunk in rows.chunks(self.options.chunk_size.max(1)) {
                exec.execute(templates::merge_node_rows(&table, chunk.to_vec()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn write_relationships_batched(
        &self,
        relationships: Vec<RelationshipWrite>,
        exec: &mut dyn Executor,
    ) -> Result<()> {
        let mut groups: BTreeMap<RelationshipKey, Vec<_>> = BTreeMap::new();
        for rel in relationships {
            let row = templates::relationship_row(&rel.source_id, &rel.target_id, rel.keys, rel.values);
            groups.entry(rel.key).or_default().push(row);
        }

        for (key, rows) in groups {
            let table = key.table();
            for chunk in rows.chunks(self.options.chunk_size.max(1)) {
                let result = exec
                    .execute(templates::merge_relationship_rows(
                        &table,
                        &key.source,
                        &key.target,
                        chunk.to_vec(),
                    ))
                    .await?;
                let merged = merged_count(&result);
                if merged < chunk.len() as u64 {
                    return Err(GraphStoreError::UnmatchedEndpoint(format!(
                        "{} of {} relationships in {} matched both endpoints",
                        merged,
                        chunk.len(),
                        table
                    )));
                }
            }
        }
        Ok(())
    }
}

fn merged_count(result: &graphstore_core::QueryResult) -> u64 {
    result
        .rows
        .iter()
        .filter_map(|row| row.get(MERGED_COLUMN))
        .filter_map(|v| v.as_u64())
        .sum()
}

async fn write_nodes_individually(nodes: Vec<NodeWrite>, exec: &mut dyn Executor) -> Result<()> {
    for node in nodes {
        exec.execute(templates::merge_node(
            &node.table,
            &node.id,
            &node.node_type,
            node.keys,
            node.values,
        ))
        .await?;
    }
    Ok(())
}

async fn write_relationships_individually(
    relationships: Vec<RelationshipWrite>,
    exec: &mut dyn Executor,
) -> Result<()> {
    for rel in relationships {
        let result = exec
            .execute(templates::merge_relationship(
                &rel.key.table(),
                &rel.key.source,
                &rel.key.target,
                &rel.source_id,
                &rel.target_id,
                rel.keys,
                rel.values,
            ))
            .await?;
        if merged_count(&result) == 0 {
            return Err(GraphStoreError::UnmatchedEndpoint(rel.description));
        }
    }
    Ok(())
}

/// Returns false when any part of the attribution was skipped.
async fn write_attribution(
    attribution: AttributionWrite,
    exec: &mut dyn Executor,
    tables: &AttributionTables,
) -> bool {
    if !tables.chunk {
        return false;
    }
    let chunk = templates::merge_chunk(
        &attribution.chunk_id,
        &attribution.text,
        attribution.keys,
        attribution.values,
    );
    if exec.execute_best_effort(chunk).await.is_none() {
        return false;
    }

    let mut complete = true;
    for (entity, ids) in attribution.mentions {
        if !tables.mentions.contains(&entity) {
            complete = false;
            continue;
        }
        let mentions_table = relationship_table(MENTIONS, CHUNK_TABLE, &entity);
        let link = templates::link_mentions(&mentions_table, &entity, &attribution.chunk_id, ids);
        if exec.execute_best_effort(link).await.is_none() {
            complete = false;
        }
    }
    complete
}
