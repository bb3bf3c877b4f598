//! Process-local graph store.

use super::{Edge, GraphStore, Holder, LinkRule, NodeKey, Properties, RelType, ResourceKind, Traversal};
use crate::{Error, Result};
use async_trait::async_trait;
use fhirgraph_extract::PropertyValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type EdgeKey = (NodeKey, RelType, NodeKey);

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<ResourceKind, BTreeMap<String, Properties>>,
    /// Keyed so that all outgoing edges of a node with one type are contiguous.
    edges: BTreeMap<EdgeKey, Properties>,
}

impl Inner {
    fn node(&self, key: &NodeKey) -> Option<&Properties> {
        self.nodes.get(&key.kind).and_then(|nodes| nodes.get(&key.id))
    }

    fn outgoing<'a>(
        &'a self,
        from: &'a NodeKey,
        rel: RelType,
    ) -> impl Iterator<Item = (&'a EdgeKey, &'a Properties)> + 'a {
        let start = (from.clone(), rel, NodeKey::new(ResourceKind::ALL[0], ""));
        self.edges
            .range(start..)
            .take_while(move |((f, r, _), _)| f == from && *r == rel)
    }

    fn text(&self, key: &NodeKey, property: &str) -> Option<String> {
        self.node(key)?
            .get(property)
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
    }

    /// Ids of `kind` nodes whose `property` equals `value`.
    fn ids_matching(&self, kind: ResourceKind, property: &str, value: &str) -> Vec<String> {
        if property == "id" {
            let key = NodeKey::new(kind, value);
            return match self.node(&key) {
                Some(_) => vec![key.id],
                None => Vec::new(),
            };
        }
        self.nodes
            .get(&kind)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|(_, p)| p.get(property).and_then(PropertyValue::as_str) == Some(value))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Create the `rule` edge between a holder and a node of the other kind.
    fn link(&mut self, rule: &LinkRule, holder_id: &str, other_id: &str) -> bool {
        let holder = NodeKey::new(rule.holder_kind(), holder_id);
        let mut edge_properties = Properties::new();
        if let Some((name, from_property)) = rule.edge_property {
            if let Some(value) = self.node(&holder).and_then(|p| p.get(from_property)) {
                edge_properties.insert(name.to_string(), value.clone());
            }
        }

        let other = NodeKey::new(rule.other_kind(), other_id);
        let key = match rule.holder {
            Holder::Source => (holder, rule.rel, other),
            Holder::Target => (other, rule.rel, holder),
        };
        self.insert_edge(key, edge_properties)
    }

    fn insert_edge(&mut self, key: EdgeKey, properties: Properties) -> bool {
        if self.node(&key.0).is_none() || self.node(&key.2).is_none() {
            return false;
        }
        if self.edges.contains_key(&key) {
            return false;
        }
        self.edges.insert(key, properties);
        true
    }
}

/// [`GraphStore`] backed by ordered maps behind a lock.
///
/// `id` uniqueness per label always holds, so
/// [`GraphStore::ensure_unique_constraint`] is a no-op.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<Inner>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::Internal("in-memory graph lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::Internal("in-memory graph lock poisoned".to_string()))
    }

    /// Properties of the `(from)-[rel]->(to)` edge, if it exists.
    pub fn edge(&self, from: &NodeKey, rel: RelType, to: &NodeKey) -> Result<Option<Properties>> {
        let key = (from.clone(), rel, to.clone());
        Ok(self.read()?.edges.get(&key).cloned())
    }
}

fn id_of(properties: &Properties) -> Option<&str> {
    properties.get("id").and_then(PropertyValue::as_str)
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ensure_unique_constraint(&self, _kind: ResourceKind) -> Result<()> {
        Ok(())
    }

    async fn create_nodes(&self, kind: ResourceKind, nodes: &[Properties]) -> Result<u64> {
        let mut inner = self.write()?;
        let table = inner.nodes.entry(kind).or_default();
        let mut created = 0;
        for properties in nodes {
            let Some(id) = properties.get("id").and_then(PropertyValue::as_str) else {
                return Err(Error::Internal(format!("{kind} node without an id")));
            };
            if !table.contains_key(id) {
                table.insert(id.to_string(), properties.clone());
                created += 1;
            }
        }
        Ok(created)
    }

    async fn ensure_index(&self, _kind: ResourceKind, _property: &str) -> Result<()> {
        Ok(())
    }

    async fn link_by_reference(&self, rule: &LinkRule, holder_ids: &[String]) -> Result<u64> {
        let mut inner = self.write()?;
        let mut created = 0;
        for holder_id in holder_ids {
            let holder = NodeKey::new(rule.holder_kind(), holder_id.as_str());
            let Some(reference) = inner.text(&holder, rule.reference_property) else {
                continue;
            };
            for other_id in inner.ids_matching(rule.other_kind(), rule.match_property, &reference) {
                if inner.link(rule, holder_id, &other_id) {
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    async fn link_referrers(&self, rule: &LinkRule, other_ids: &[String]) -> Result<u64> {
        let mut inner = self.write()?;
        let mut created = 0;
        for other_id in other_ids {
            let other = NodeKey::new(rule.other_kind(), other_id.as_str());
            let Some(value) = inner.text(&other, rule.match_property) else {
                continue;
            };
            for holder_id in inner.ids_matching(rule.holder_kind(), rule.reference_property, &value) {
                if inner.link(rule, &holder_id, other_id) {
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    async fn create_edge(&self, edge: &Edge) -> Result<bool> {
        let mut inner = self.write()?;
        let key = (edge.from.clone(), edge.rel, edge.to.clone());
        Ok(inner.insert_edge(key, edge.properties.clone()))
    }

    async fn remove_edges(&self, from: &NodeKey, rel: RelType) -> Result<u64> {
        let mut inner = self.write()?;
        let doomed: Vec<EdgeKey> = inner.outgoing(from, rel).map(|(k, _)| k.clone()).collect();
        for key in &doomed {
            inner.edges.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn get_node(&self, key: &NodeKey) -> Result<Option<Properties>> {
        Ok(self.read()?.node(key).cloned())
    }

    async fn list_nodes(
        &self,
        kind: ResourceKind,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Properties>> {
        let inner = self.read()?;
        Ok(inner
            .nodes
            .get(&kind)
            .map(|nodes| nodes.values().skip(skip).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn traverse(&self, traversal: &Traversal) -> Result<Vec<Properties>> {
        let inner = self.read()?;
        let mut found: Vec<Properties> = inner
            .outgoing(&traversal.from, traversal.rel)
            .filter(|((_, _, to), _)| to.kind == traversal.target)
            .filter_map(|((_, _, to), _)| inner.node(to).cloned())
            .collect();
        found.sort_by(|a, b| id_of(a).cmp(&id_of(b)));
        Ok(found)
    }

    async fn count_nodes(&self, kind: ResourceKind) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.nodes.get(&kind).map_or(0, |nodes| nodes.len() as u64))
    }

    async fn count_edges(&self, from: &NodeKey, rel: RelType) -> Result<u64> {
        Ok(self.read()?.outgoing(from, rel).count() as u64)
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.nodes.clear();
        inner.edges.clear();
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn create_nodes_skips_existing_ids() {
        let store = InMemoryGraphStore::new();
        let first = store
            .create_nodes(ResourceKind::Patient, &[props(&[("id", "p1"), ("name", "Ann")])])
            .await
            .unwrap();
        let second = store
            .create_nodes(ResourceKind::Patient, &[props(&[("id", "p1"), ("name", "Bob")])])
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        let node = store
            .get_node(&NodeKey::new(ResourceKind::Patient, "p1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.get("name").and_then(PropertyValue::as_str), Some("Ann"));
    }

    #[tokio::test]
    async fn edges_need_both_endpoints_and_are_not_duplicated() {
        let store = InMemoryGraphStore::new();
        store
            .create_nodes(ResourceKind::Patient, &[props(&[("id", "p1")])])
            .await
            .unwrap();
        store
            .create_nodes(ResourceKind::Encounter, &[props(&[("id", "e1")])])
            .await
            .unwrap();

        let edge = Edge {
            from: NodeKey::new(ResourceKind::Patient, "p1"),
            rel: RelType::HasEncounter,
            to: NodeKey::new(ResourceKind::Encounter, "e1"),
            properties: Properties::new(),
        };
        assert!(store.create_edge(&edge).await.unwrap());
        assert!(!store.create_edge(&edge).await.unwrap());

        let dangling = Edge {
            to: NodeKey::new(ResourceKind::Encounter, "missing"),
            ..edge.clone()
        };
        assert!(!store.create_edge(&dangling).await.unwrap());
        assert_eq!(
            store.count_edges(&edge.from, RelType::HasEncounter).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn traverse_is_ordered_by_id() {
        let store = InMemoryGraphStore::new();
        let patient = NodeKey::new(ResourceKind::Patient, "p1");
        store
            .create_nodes(ResourceKind::Patient, &[props(&[("id", "p1")])])
            .await
            .unwrap();
        store
            .create_nodes(
                ResourceKind::Encounter,
                &[
                    props(&[("id", "e3")]),
                    props(&[("id", "e1")]),
                    props(&[("id", "e2")]),
                ],
            )
            .await
            .unwrap();
        for id in ["e2", "e3", "e1"] {
            store
                .create_edge(&Edge {
                    from: patient.clone(),
                    rel: RelType::HasEncounter,
                    to: NodeKey::new(ResourceKind::Encounter, id),
                    properties: Properties::new(),
                })
                .await
                .unwrap();
        }

        let found = store
            .traverse(&Traversal {
                from: patient,
                rel: RelType::HasEncounter,
                target: ResourceKind::Encounter,
            })
            .await
            .unwrap();
        let ids: Vec<_> = found
            .iter()
            .filter_map(|n| n.get("id").and_then(PropertyValue::as_str))
            .collect();
        assert_eq!(ids, ["e1", "e2", "e3"]);
    }

    #[tokio::test]
    async fn remove_edges_only_touches_one_type() {
        let store = InMemoryGraphStore::new();
        store
            .create_nodes(ResourceKind::Patient, &[props(&[("id", "p1")])])
            .await
            .unwrap();
        store
            .create_nodes(ResourceKind::Condition, &[props(&[("id", "c1")])])
            .await
            .unwrap();
        let patient = NodeKey::new(ResourceKind::Patient, "p1");
        let condition = NodeKey::new(ResourceKind::Condition, "c1");
        for rel in [RelType::HasCondition, RelType::FirstCondition] {
            store
                .create_edge(&Edge {
                    from: patient.clone(),
                    rel,
                    to: condition.clone(),
                    properties: Properties::new(),
                })
                .await
                .unwrap();
        }

        assert_eq!(store.remove_edges(&patient, RelType::FirstCondition).await.unwrap(), 1);
        assert_eq!(store.count_edges(&patient, RelType::FirstCondition).await.unwrap(), 0);
        assert_eq!(store.count_edges(&patient, RelType::HasCondition).await.unwrap(), 1);
    }
}
