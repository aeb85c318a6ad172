//! Saved Map Store.
//!
//! Persists explored [`MapGraph`]s under operator-chosen names in a local
//! SQLite database. Saving under an existing name replaces the earlier map.
//!
//! # Storage layout
//!
//! A single table `saved_maps` is created (if it does not already exist):
//!
//! | column        | type    | description                                  |
//! |---------------|---------|----------------------------------------------|
//! | name          | TEXT    | Operator-chosen primary key                  |
//! | id            | TEXT    | UUID v4 of this particular save              |
//! | saved_at      | TEXT    | RFC-3339 save time (UTC)                     |
//! | intersections | INTEGER | Intersection count, for listings             |
//! | edges         | INTEGER | Driven road count, for listings              |
//! | blob          | BLOB    | [`MapGraph::to_blob`] output                 |
//!
//! # Example
//!
//! ```rust
//! use gridbot_mapping::MapGraph;
//! use gridbot_memory::MapStore;
//! use gridbot_types::{Heading, Location};
//!
//! let store = MapStore::open_in_memory().unwrap();
//! let graph = MapGraph::new(Location::new(0, 1), Heading::NORTH).unwrap();
//! store.save("corridor", &graph).unwrap();
//!
//! let restored = store.load("corridor").unwrap();
//! assert_eq!(restored.len(), 2);
//! assert_eq!(store.list().unwrap()[0].name, "corridor");
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use gridbot_mapping::MapGraph;
use gridbot_types::NavError;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from map store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Map error: {0}")]
    Map(#[from] NavError),
    #[error("No saved map named '{0}'")]
    NotFound(String),
    #[error("Map names must not be empty")]
    EmptyName,
}

// ─────────────────────────────────────────────────────────────────────────────
// SavedMap
// ─────────────────────────────────────────────────────────────────────────────

/// Listing entry for one saved map. The blob itself is only read by
/// [`MapStore::load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMap {
    pub name: String,
    pub id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub intersections: usize,
    pub edges: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// MapStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed archive of named maps.
pub struct MapStore {
    conn: Connection,
}

impl MapStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.as_ref().display(), "map store opened");
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS saved_maps (
                name          TEXT NOT NULL PRIMARY KEY,
                id            TEXT NOT NULL,
                saved_at      TEXT NOT NULL,
                intersections INTEGER NOT NULL,
                edges         INTEGER NOT NULL,
                blob          BLOB NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Serialize `graph` and store it under `name`.
    pub fn save(&self, name: &str, graph: &MapGraph) -> Result<SavedMap, StoreError> {
        let blob = graph.to_blob()?;
        self.insert(name, graph.len(), graph.edge_count(), &blob)
    }

    /// Store an already serialized graph, as published by the control loop.
    ///
    /// The blob is decoded first so a corrupt payload never reaches the
    /// database; the counts are taken from the decoded graph.
    pub fn save_blob(&self, name: &str, blob: &[u8]) -> Result<SavedMap, StoreError> {
        let graph = MapGraph::from_blob(blob)?;
        self.insert(name, graph.len(), graph.edge_count(), blob)
    }

    fn insert(
        &self,
        name: &str,
        intersections: usize,
        edges: usize,
        blob: &[u8],
    ) -> Result<SavedMap, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        let saved = SavedMap {
            name: name.to_string(),
            id: Uuid::new_v4(),
            saved_at: Utc::now(),
            intersections,
            edges,
        };
        self.conn.execute(
            "INSERT OR REPLACE INTO saved_maps
                 (name, id, saved_at, intersections, edges, blob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                saved.name,
                saved.id.to_string(),
                saved.saved_at.to_rfc3339(),
                saved.intersections as i64,
                saved.edges as i64,
                blob,
            ],
        )?;
        info!(name = %saved.name, intersections, edges, "map saved");
        Ok(saved)
    }

    /// Load and rebuild the map saved under `name`.
    pub fn load(&self, name: &str) -> Result<MapGraph, StoreError> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT blob FROM saved_maps WHERE name = ?1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?;
        let blob = blob.ok_or_else(|| StoreError::NotFound(name.trim().to_string()))?;
        let graph = MapGraph::from_blob(&blob)?;
        debug!(name, intersections = graph.len(), "map loaded");
        Ok(graph)
    }

    /// All saved maps, most recent first.
    pub fn list(&self) -> Result<Vec<SavedMap>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, id, saved_at, intersections, edges
             FROM saved_maps
             ORDER BY saved_at DESC, name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let id_str: String = row.get(1)?;
            let ts_str: String = row.get(2)?;
            let intersections: i64 = row.get(3)?;
            let edges: i64 = row.get(4)?;
            Ok((name, id_str, ts_str, intersections, edges))
        })?;

        let mut maps = Vec::new();
        for row in rows {
            let (name, id_str, ts_str, intersections, edges) = row?;
            let id = Uuid::parse_str(&id_str).map_err(|e| {
                rusqlite::Error::InvalidColumnType(1, e.to_string(), rusqlite::types::Type::Text)
            })?;
            let saved_at = ts_str.parse::<DateTime<Utc>>().map_err(|e| {
                rusqlite::Error::InvalidColumnType(2, e.to_string(), rusqlite::types::Type::Text)
            })?;
            maps.push(SavedMap {
                name,
                id,
                saved_at,
                intersections: intersections.max(0) as usize,
                edges: edges.max(0) as usize,
            });
        }
        Ok(maps)
    }

    /// Remove the map saved under `name`. Returns whether one existed.
    pub fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM saved_maps WHERE name = ?1", params![name.trim()])?;
        if removed > 0 {
            info!(name, "map deleted");
        }
        Ok(removed > 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gridbot_types::{Heading, Location, RoadState};

    /// (0,0) → (0,1) → (1,1), with a blockage east of the origin.
    fn sample_graph() -> MapGraph {
        let mut g = MapGraph::new(Location::new(0, 1), Heading::NORTH).unwrap();
        g.record_driven(Location::new(0, 1), Location::new(1, 1), Heading::EAST)
            .unwrap();
        g.record_absent(Location::ORIGIN, Heading::WEST).unwrap();
        g.block(Location::ORIGIN, Location::new(1, 0), Heading::EAST)
            .unwrap();
        g
    }

    // ── save / load ──────────────────────────────────────────────────────────

    #[test]
    fn saved_map_loads_back_identical() {
        let store = MapStore::open_in_memory().unwrap();
        let g = sample_graph();
        let saved = store.save("lab", &g).unwrap();
        assert_eq!(saved.intersections, 3);
        assert_eq!(saved.edges, 2);

        let back = store.load("lab").unwrap();
        assert_eq!(back.len(), g.len());
        assert_eq!(back.edge_count(), g.edge_count());
        let origin = back.intersection(Location::ORIGIN).unwrap();
        assert_eq!(origin.road(Heading::WEST), RoadState::None);
        assert!(origin.is_blocked(Heading::EAST));
        assert_eq!(back.snapshot(None, &[]), g.snapshot(None, &[]));
    }

    #[test]
    fn saving_again_replaces_the_map() {
        let store = MapStore::open_in_memory().unwrap();
        store.save("lab", &MapGraph::origin()).unwrap();
        let second = store.save("lab", &sample_graph()).unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, second.id);
        assert_eq!(store.load("lab").unwrap().len(), 3);
    }

    #[test]
    fn names_are_trimmed_and_must_not_be_empty() {
        let store = MapStore::open_in_memory().unwrap();
        store.save("  lab ", &sample_graph()).unwrap();
        assert!(store.load("lab").is_ok());
        assert!(matches!(
            store.save("   ", &sample_graph()),
            Err(StoreError::EmptyName)
        ));
    }

    #[test]
    fn missing_map_is_not_found() {
        let store = MapStore::open_in_memory().unwrap();
        assert!(matches!(
            store.load("nowhere"),
            Err(StoreError::NotFound(name)) if name == "nowhere"
        ));
    }

    // ── save_blob ────────────────────────────────────────────────────────────

    #[test]
    fn published_blob_is_stored_with_decoded_counts() {
        let store = MapStore::open_in_memory().unwrap();
        let blob = sample_graph().to_blob().unwrap();
        let saved = store.save_blob("from-loop", &blob).unwrap();
        assert_eq!((saved.intersections, saved.edges), (3, 2));
        assert_eq!(store.load("from-loop").unwrap().edge_count(), 2);
    }

    #[test]
    fn corrupt_blob_is_rejected_before_writing() {
        let store = MapStore::open_in_memory().unwrap();
        let err = store.save_blob("junk", b"not a map").unwrap_err();
        assert!(matches!(err, StoreError::Map(NavError::Configuration(_))));
        assert!(store.list().unwrap().is_empty());
    }

    // ── list / delete ────────────────────────────────────────────────────────

    #[test]
    fn list_reports_every_saved_map() {
        let store = MapStore::open_in_memory().unwrap();
        store.save("a", &MapGraph::origin()).unwrap();
        store.save("b", &sample_graph()).unwrap();
        let mut names: Vec<String> = store.list().unwrap().into_iter().map(|m| m.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn delete_removes_only_the_named_map() {
        let store = MapStore::open_in_memory().unwrap();
        store.save("a", &MapGraph::origin()).unwrap();
        store.save("b", &sample_graph()).unwrap();
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.load("b").is_ok());
    }

    #[test]
    fn maps_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.db");
        {
            let store = MapStore::open(&path).unwrap();
            store.save("kept", &sample_graph()).unwrap();
        }
        let store = MapStore::open(&path).unwrap();
        assert_eq!(store.load("kept").unwrap().len(), 3);
    }
}
