//! Neo4j-backed graph store over Bolt.

use super::{Edge, GraphStore, Holder, LinkRule, NodeKey, Properties, RelType, ResourceKind, Traversal};
use crate::{config::GraphConfig, Error, Result};
use async_trait::async_trait;
use fhirgraph_extract::PropertyValue;
use neo4rs::{query, BoltType, ConfigBuilder, Graph, Query, Row};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Rows sent per `UNWIND` statement when creating nodes.
const NODE_BATCH_SIZE: usize = 500;

/// [`GraphStore`] talking to a Neo4j server.
///
/// Labels and relationship types are interpolated from closed enums; every
/// value travels as a query parameter.
pub struct Neo4jGraphStore {
    graph: Graph,
    timeout: Duration,
}

impl Neo4jGraphStore {
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size);
        if let Some(database) = &config.database {
            builder = builder.db(database.as_str());
        }
        let neo_config = builder
            .build()
            .map_err(|e| Error::Config(format!("graph connection settings: {e}")))?;

        let timeout = config.request_timeout();
        let graph = tokio::time::timeout(timeout, Graph::connect(neo_config))
            .await
            .map_err(|_| Error::Timeout(timeout.as_secs()))??;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph, timeout })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))?
    }

    async fn run(&self, q: Query) -> Result<()> {
        self.bounded(async { self.graph.run(q).await.map_err(Error::from) })
            .await
    }

    async fn rows(&self, q: Query) -> Result<Vec<Row>> {
        self.bounded(async {
            let mut stream = self.graph.execute(q).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok::<_, Error>(rows)
        })
        .await
    }

    /// Run a query returning a single integer column `n`.
    async fn scalar(&self, q: Query) -> Result<u64> {
        let rows = self.rows(q).await?;
        let n = match rows.first() {
            Some(row) => row.get::<i64>("n")?,
            None => 0,
        };
        Ok(n.max(0) as u64)
    }

    async fn property_rows(&self, q: Query) -> Result<Vec<Properties>> {
        self.rows(q)
            .await?
            .iter()
            .map(row_properties)
            .collect()
    }
}

fn to_bolt(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::Bool(b) => (*b).into(),
        PropertyValue::Integer(i) => (*i).into(),
        PropertyValue::Float(f) => (*f).into(),
        PropertyValue::Text(s) => s.clone().into(),
    }
}

fn to_bolt_map(properties: &Properties) -> HashMap<String, BoltType> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), to_bolt(v)))
        .collect()
}

fn row_properties(row: &Row) -> Result<Properties> {
    let props: HashMap<String, PropertyValue> = row.get("props")?;
    Ok(props.into_iter().collect())
}

/// Tail of a link query: create the rule's edge between the bound `h` and `o`
/// unless it exists, and return how many were created as `n`.
fn create_link(rule: &LinkRule) -> String {
    let (source, target) = match rule.holder {
        Holder::Source => ("h", "o"),
        Holder::Target => ("o", "h"),
    };
    let set_edge = rule
        .edge_property
        .map(|(name, from)| format!("SET r.{name} = h.{from}"))
        .unwrap_or_default();
    format!(
        "OPTIONAL MATCH ({source})-[existing:{rel}]->({target})
         WITH h, o, existing WHERE existing IS NULL
         CREATE ({source})-[r:{rel}]->({target})
         {set_edge}
         RETURN count(r) AS n",
        rel = rule.rel.as_str(),
    )
}

fn index_name(kind: ResourceKind, property: &str) -> String {
    format!("{}_{}_index", kind.label().to_lowercase(), property.to_lowercase())
}

fn constraint_name(kind: ResourceKind) -> String {
    format!("{}_id_unique", kind.label().to_lowercase())
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ensure_unique_constraint(&self, kind: ResourceKind) -> Result<()> {
        let cypher = format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE n.id IS UNIQUE",
            name = constraint_name(kind),
            label = kind.label(),
        );
        self.run(query(&cypher)).await?;
        tracing::debug!(label = kind.label(), "Uniqueness constraint ensured");
        Ok(())
    }

    async fn create_nodes(&self, kind: ResourceKind, nodes: &[Properties]) -> Result<u64> {
        let cypher = format!(
            "UNWIND $rows AS row
             OPTIONAL MATCH (existing:{label} {{id: row.id}})
             WITH row, existing WHERE existing IS NULL
             CREATE (c:{label})
             SET c = row
             RETURN count(c) AS n",
            label = kind.label(),
        );

        let mut created = 0;
        for chunk in nodes.chunks(NODE_BATCH_SIZE) {
            let rows: Vec<HashMap<String, BoltType>> = chunk.iter().map(to_bolt_map).collect();
            created += self.scalar(query(&cypher).param("rows", rows)).await?;
        }
        Ok(created)
    }

    async fn ensure_index(&self, kind: ResourceKind, property: &str) -> Result<()> {
        let cypher = format!(
            "CREATE INDEX {name} IF NOT EXISTS FOR (n:{label}) ON (n.{property})",
            name = index_name(kind, property),
            label = kind.label(),
        );
        self.run(query(&cypher)).await?;
        tracing::debug!(label = kind.label(), property, "Property index ensured");
        Ok(())
    }

    async fn link_by_reference(&self, rule: &LinkRule, holder_ids: &[String]) -> Result<u64> {
        if holder_ids.is_empty() {
            return Ok(0);
        }
        let cypher = format!(
            "UNWIND $ids AS hid
             MATCH (h:{holder} {{id: hid}})
             WHERE h.{reference} IS NOT NULL
             MATCH (o:{other} {{{matched}: h.{reference}}})
             {create}",
            holder = rule.holder_kind().label(),
            other = rule.other_kind().label(),
            reference = rule.reference_property,
            matched = rule.match_property,
            create = create_link(rule),
        );
        self.scalar(query(&cypher).param("ids", holder_ids.to_vec()))
            .await
    }

    async fn link_referrers(&self, rule: &LinkRule, other_ids: &[String]) -> Result<u64> {
        if other_ids.is_empty() {
            return Ok(0);
        }
        let cypher = format!(
            "UNWIND $ids AS oid
             MATCH (o:{other} {{id: oid}})
             WHERE o.{matched} IS NOT NULL
             MATCH (h:{holder} {{{reference}: o.{matched}}})
             {create}",
            holder = rule.holder_kind().label(),
            other = rule.other_kind().label(),
            reference = rule.reference_property,
            matched = rule.match_property,
            create = create_link(rule),
        );
        self.scalar(query(&cypher).param("ids", other_ids.to_vec()))
            .await
    }

    async fn create_edge(&self, edge: &Edge) -> Result<bool> {
        let cypher = format!(
            "MATCH (a:{from} {{id: $from_id}})
             MATCH (b:{to} {{id: $to_id}})
             OPTIONAL MATCH (a)-[existing:{rel}]->(b)
             WITH a, b, existing WHERE existing IS NULL
             CREATE (a)-[r:{rel}]->(b)
             SET r = $props
             RETURN count(r) AS n",
            from = edge.from.kind.label(),
            to = edge.to.kind.label(),
            rel = edge.rel.as_str(),
        );
        let q = query(&cypher)
            .param("from_id", edge.from.id.as_str())
            .param("to_id", edge.to.id.as_str())
            .param("props", to_bolt_map(&edge.properties));
        Ok(self.scalar(q).await? > 0)
    }

    async fn remove_edges(&self, from: &NodeKey, rel: RelType) -> Result<u64> {
        let cypher = format!(
            "MATCH (a:{label} {{id: $id}})-[r:{rel}]->()
             DELETE r
             RETURN count(r) AS n",
            label = from.kind.label(),
            rel = rel.as_str(),
        );
        self.scalar(query(&cypher).param("id", from.id.as_str()))
            .await
    }

    async fn get_node(&self, key: &NodeKey) -> Result<Option<Properties>> {
        let cypher = format!(
            "MATCH (n:{label} {{id: $id}}) RETURN properties(n) AS props LIMIT 1",
            label = key.kind.label(),
        );
        let mut found = self
            .property_rows(query(&cypher).param("id", key.id.as_str()))
            .await?;
        Ok(found.pop())
    }

    async fn list_nodes(
        &self,
        kind: ResourceKind,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Properties>> {
        let cypher = format!(
            "MATCH (n:{label})
             RETURN properties(n) AS props
             ORDER BY n.id ASC
             SKIP $skip LIMIT $limit",
            label = kind.label(),
        );
        let q = query(&cypher)
            .param("skip", i64::try_from(skip).unwrap_or(i64::MAX))
            .param("limit", i64::try_from(limit).unwrap_or(i64::MAX));
        self.property_rows(q).await
    }

    async fn traverse(&self, traversal: &Traversal) -> Result<Vec<Properties>> {
        let cypher = format!(
            "MATCH (a:{from} {{id: $id}})-[:{rel}]->(t:{target})
             RETURN properties(t) AS props
             ORDER BY t.id ASC",
            from = traversal.from.kind.label(),
            rel = traversal.rel.as_str(),
            target = traversal.target.label(),
        );
        self.property_rows(query(&cypher).param("id", traversal.from.id.as_str()))
            .await
    }

    async fn count_nodes(&self, kind: ResourceKind) -> Result<u64> {
        let cypher = format!("MATCH (node:{label}) RETURN count(node) AS n", label = kind.label());
        self.scalar(query(&cypher)).await
    }

    async fn count_edges(&self, from: &NodeKey, rel: RelType) -> Result<u64> {
        let cypher = format!(
            "MATCH (a:{label} {{id: $id}})-[r:{rel}]->() RETURN count(r) AS n",
            label = from.kind.label(),
            rel = rel.as_str(),
        );
        self.scalar(query(&cypher).param("id", from.id.as_str()))
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.run(query("MATCH (n) DETACH DELETE n")).await?;
        tracing::info!("Graph cleared");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.scalar(query("RETURN 1 AS n")).await.map(|_| ())
    }
}
