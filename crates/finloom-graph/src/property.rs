//! Embedded property-graph store.
//!
//! Typed nodes and relationships over the embedded database, with unique
//! keys per label (`Company.cik`, `Filing.accession_number`) and batched
//! relationship writes. Properties are JSON documents merged on upsert.

use finloom::error::{FinloomError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Node labels in the knowledge graph.
pub mod labels {
    /// Reporting company
    pub const COMPANY: &str = "Company";
    /// Executive or director
    pub const PERSON: &str = "Person";
    /// One filing
    pub const FILING: &str = "Filing";
    /// One extracted section
    pub const SECTION: &str = "Section";
    /// One reported financial metric
    pub const FINANCIAL_METRIC: &str = "FinancialMetric";
    /// One disclosed risk factor
    pub const RISK_FACTOR: &str = "RiskFactor";
    /// One business segment
    pub const BUSINESS_SEGMENT: &str = "BusinessSegment";
    /// One disclosed event
    pub const EVENT: &str = "Event";
}

/// Relationship types in the knowledge graph.
pub mod rels {
    /// Company filed a filing
    pub const FILED: &str = "FILED";
    /// Company has an executive
    pub const HAS_EXECUTIVE: &str = "HAS_EXECUTIVE";
    /// Filing discloses a risk factor
    pub const DISCLOSES_RISK: &str = "DISCLOSES_RISK";
    /// Filing reports a financial metric
    pub const REPORTS_METRIC: &str = "REPORTS_METRIC";
    /// Filing contains a section
    pub const HAS_SECTION: &str = "HAS_SECTION";
    /// Company operates a segment
    pub const OPERATES_SEGMENT: &str = "OPERATES_SEGMENT";
    /// Filing describes an event
    pub const DESCRIBES_EVENT: &str = "DESCRIBES_EVENT";
    /// Section mentions another company
    pub const MENTIONS_COMPANY: &str = "MENTIONS_COMPANY";
    /// Section mentions a person
    pub const MENTIONS_PERSON: &str = "MENTIONS_PERSON";
    /// Section mentions a metric
    pub const MENTIONS_METRIC: &str = "MENTIONS_METRIC";
    /// Section mentions a risk phrase
    pub const MENTIONS_RISK: &str = "MENTIONS_RISK";
    /// Section mentions a monetary amount
    pub const MENTIONS_MONEY: &str = "MENTIONS_MONEY";
    /// Section mentions a date
    pub const MENTIONS_DATE: &str = "MENTIONS_DATE";
    /// Section mentions a location
    pub const MENTIONS_LOCATION: &str = "MENTIONS_LOCATION";
}

/// One node row.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Internal node id
    pub id: i64,
    /// Label
    pub label: String,
    /// Unique key within the label
    pub key: String,
    /// JSON properties
    pub properties: Value,
}

/// One relationship to write (ids resolved beforehand).
#[derive(Debug, Clone)]
pub struct RelationshipSpec {
    /// Source node id
    pub from_id: i64,
    /// Target node id
    pub to_id: i64,
    /// Relationship type
    pub rel_type: String,
    /// JSON properties
    pub properties: Value,
}

const GRAPH_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    label      TEXT NOT NULL,
    key        TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    UNIQUE (label, key)
);
CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label);

CREATE TABLE IF NOT EXISTS relationships (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id    INTEGER NOT NULL REFERENCES nodes(id),
    to_id      INTEGER NOT NULL REFERENCES nodes(id),
    rel_type   TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    UNIQUE (from_id, to_id, rel_type)
);
CREATE INDEX IF NOT EXISTS idx_rel_from ON relationships(from_id);
CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_id);
CREATE INDEX IF NOT EXISTS idx_rel_type ON relationships(rel_type);
";

/// Embedded property graph.
///
/// The connection is mutex-guarded so one instance can be shared across
/// retrieval tasks; builder workers still prefer one instance each.
#[derive(Debug)]
pub struct PropertyGraph {
    conn: Mutex<Connection>,
    batch_size: usize,
}

impl PropertyGraph {
    /// Open (creating if needed) the graph store. Schema bootstrap is
    /// idempotent.
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::bootstrap(conn, batch_size)
    }

    /// In-memory graph (tests).
    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?, 500)
    }

    fn bootstrap(conn: Connection, batch_size: usize) -> Result<Self> {
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.execute_batch(GRAPH_SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn), batch_size: batch_size.max(1) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or merge a node; existing properties survive unless the new
    /// document overwrites them.
    pub fn upsert_node(&self, label: &str, key: &str, properties: Value) -> Result<i64> {
        let conn = self.conn();
        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, properties FROM nodes WHERE label = ?1 AND key = ?2",
                params![label, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, old_json)) => {
                let merged = merge_properties(&old_json, &properties)?;
                conn.execute(
                    "UPDATE nodes SET properties = ?1 WHERE id = ?2",
                    params![merged.to_string(), id],
                )?;
                Ok(id)
            }
            None => {
                conn.execute(
                    "INSERT INTO nodes (label, key, properties) VALUES (?1, ?2, ?3)",
                    params![label, key, properties.to_string()],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    /// Fetch one node.
    pub fn get_node(&self, label: &str, key: &str) -> Result<Option<GraphNode>> {
        let node = self
            .conn()
            .query_row(
                "SELECT id, label, key, properties FROM nodes WHERE label = ?1 AND key = ?2",
                params![label, key],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    /// Fetch a node by internal id.
    pub fn get_node_by_id(&self, id: i64) -> Result<Option<GraphNode>> {
        let node = self
            .conn()
            .query_row(
                "SELECT id, label, key, properties FROM nodes WHERE id = ?1",
                params![id],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    /// All nodes with a label.
    pub fn nodes_by_label(&self, label: &str) -> Result<Vec<GraphNode>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, label, key, properties FROM nodes WHERE label = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![label], row_to_node)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    /// Every node, for whole-graph algorithms.
    pub fn all_nodes(&self) -> Result<Vec<GraphNode>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, label, key, properties FROM nodes ORDER BY id")?;
        let rows = stmt.query_map([], row_to_node)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    /// Set one property on a node, preserving the rest.
    pub fn set_node_property(&self, id: i64, key: &str, value: Value) -> Result<()> {
        let mut patch = Map::new();
        patch.insert(key.to_string(), value);
        let conn = self.conn();
        let old: String = conn.query_row(
            "SELECT properties FROM nodes WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let merged = merge_properties(&old, &Value::Object(patch))?;
        conn.execute(
            "UPDATE nodes SET properties = ?1 WHERE id = ?2",
            params![merged.to_string(), id],
        )?;
        Ok(())
    }

    /// Write one relationship (idempotent on `(from, to, type)`).
    pub fn create_relationship(&self, spec: &RelationshipSpec) -> Result<()> {
        self.conn().execute(
            "INSERT INTO relationships (from_id, to_id, rel_type, properties)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(from_id, to_id, rel_type) DO UPDATE SET
                properties = excluded.properties",
            params![spec.from_id, spec.to_id, spec.rel_type, spec.properties.to_string()],
        )?;
        Ok(())
    }

    /// Write relationships in transactional batches.
    pub fn batch_relationships(&self, specs: &[RelationshipSpec]) -> Result<usize> {
        let mut written = 0usize;
        let conn = self.conn();
        for batch in specs.chunks(self.batch_size) {
            let tx = conn.unchecked_transaction()?;
            for spec in batch {
                tx.execute(
                    "INSERT INTO relationships (from_id, to_id, rel_type, properties)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(from_id, to_id, rel_type) DO UPDATE SET
                        properties = excluded.properties",
                    params![spec.from_id, spec.to_id, spec.rel_type, spec.properties.to_string()],
                )?;
                written += 1;
            }
            tx.commit()?;
        }
        debug!(written, "relationships written");
        Ok(written)
    }

    /// Neighbor node ids of `id`, both directions, optionally one type.
    pub fn neighbors(&self, id: i64, rel_type: Option<&str>) -> Result<Vec<(i64, String)>> {
        let mut sql = String::from(
            "SELECT CASE WHEN from_id = ?1 THEN to_id ELSE from_id END AS other, rel_type
             FROM relationships WHERE (from_id = ?1 OR to_id = ?1)",
        );
        if rel_type.is_some() {
            sql.push_str(" AND rel_type = ?2");
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let map_row =
            |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, String)> { Ok((row.get(0)?, row.get(1)?)) };
        let mut out = Vec::new();
        match rel_type {
            Some(t) => {
                for row in stmt.query_map(params![id, t], map_row)? {
                    out.push(row?);
                }
            }
            None => {
                for row in stmt.query_map(params![id], map_row)? {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    /// Undirected edge list over the whole graph. Community detection
    /// requires undirected edges, so relation direction is dropped here.
    pub fn undirected_edges(&self) -> Result<Vec<(i64, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT from_id, to_id FROM relationships")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    /// Relationship-type counts touching a set of nodes.
    pub fn relationship_type_counts(&self, node_ids: &[i64]) -> Result<Vec<(String, usize)>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=node_ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT rel_type, COUNT(*) FROM relationships
             WHERE from_id IN ({0}) OR to_id IN ({0})
             GROUP BY rel_type ORDER BY COUNT(*) DESC",
            placeholders.join(", ")
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(node_ids.iter()),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)),
        )?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Node and relationship totals.
    pub fn counts(&self) -> Result<(usize, usize)> {
        let nodes: i64 = self.conn().query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
        let rels: i64 =
            self.conn().query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))?;
        Ok((nodes as usize, rels as usize))
    }
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphNode> {
    let properties: String = row.get(3)?;
    Ok(GraphNode {
        id: row.get(0)?,
        label: row.get(1)?,
        key: row.get(2)?,
        properties: serde_json::from_str(&properties).unwrap_or(Value::Null),
    })
}

fn merge_properties(old_json: &str, new: &Value) -> Result<Value> {
    let mut merged: Value =
        serde_json::from_str(old_json).unwrap_or_else(|_| Value::Object(Map::new()));
    let (Value::Object(target), Value::Object(patch)) = (&mut merged, new) else {
        return if new.is_null() {
            Ok(merged)
        } else {
            Err(FinloomError::Validation("node properties must be JSON objects".to_string()))
        };
    };
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_upsert_merges_properties() {
        let graph = PropertyGraph::in_memory().unwrap();
        let id = graph
            .upsert_node(labels::COMPANY, "0000320193", json!({"name": "Apple Inc.", "ticker": "AAPL"}))
            .unwrap();
        let id2 = graph
            .upsert_node(labels::COMPANY, "0000320193", json!({"sic": "3571"}))
            .unwrap();
        assert_eq!(id, id2);

        let node = graph.get_node(labels::COMPANY, "0000320193").unwrap().unwrap();
        assert_eq!(node.properties["name"], "Apple Inc.");
        assert_eq!(node.properties["sic"], "3571");
    }

    #[test]
    fn test_unique_key_per_label() {
        let graph = PropertyGraph::in_memory().unwrap();
        let company = graph.upsert_node(labels::COMPANY, "x", json!({})).unwrap();
        let filing = graph.upsert_node(labels::FILING, "x", json!({})).unwrap();
        assert_ne!(company, filing);
    }

    #[test]
    fn test_relationships_idempotent() {
        let graph = PropertyGraph::in_memory().unwrap();
        let company = graph.upsert_node(labels::COMPANY, "c", json!({})).unwrap();
        let filing = graph.upsert_node(labels::FILING, "f", json!({})).unwrap();

        let spec = RelationshipSpec {
            from_id: company,
            to_id: filing,
            rel_type: rels::FILED.to_string(),
            properties: json!({"filing_date": "2024-11-01"}),
        };
        graph.create_relationship(&spec).unwrap();
        graph.create_relationship(&spec).unwrap();

        let (_, rel_count) = graph.counts().unwrap();
        assert_eq!(rel_count, 1);
    }

    #[test]
    fn test_batch_relationships_and_neighbors() {
        let graph = PropertyGraph::in_memory().unwrap();
        let filing = graph.upsert_node(labels::FILING, "f", json!({})).unwrap();
        let specs: Vec<RelationshipSpec> = (0..7)
            .map(|i| {
                let metric = graph
                    .upsert_node(labels::FINANCIAL_METRIC, &format!("m{i}"), json!({}))
                    .unwrap();
                RelationshipSpec {
                    from_id: filing,
                    to_id: metric,
                    rel_type: rels::REPORTS_METRIC.to_string(),
                    properties: json!({"value": i}),
                }
            })
            .collect();

        let written = graph.batch_relationships(&specs).unwrap();
        assert_eq!(written, 7);
        assert_eq!(graph.neighbors(filing, Some(rels::REPORTS_METRIC)).unwrap().len(), 7);
        assert_eq!(graph.neighbors(filing, Some(rels::FILED)).unwrap().len(), 0);

        let counts = graph.relationship_type_counts(&[filing]).unwrap();
        assert_eq!(counts[0], (rels::REPORTS_METRIC.to_string(), 7));
    }

    #[test]
    fn test_set_node_property() {
        let graph = PropertyGraph::in_memory().unwrap();
        let id = graph.upsert_node(labels::COMPANY, "c", json!({"name": "X"})).unwrap();
        graph
            .set_node_property(id, "community_summary", json!({"title": "Tech"}))
            .unwrap();
        let node = graph.get_node_by_id(id).unwrap().unwrap();
        assert_eq!(node.properties["name"], "X");
        assert_eq!(node.properties["community_summary"]["title"], "Tech");
    }
}
