//! SQLite-backed route store.
//!
//! rusqlite's Connection isn't Sync, so it sits behind a Mutex. Statements are
//! short and never held across an await point.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::domain::{Bundle, Provenance, Route};
use crate::error::{Result, RoutebookError};
use crate::tools::ToolSourceConfig;

use super::RouteStore;

const ROUTE_COLUMNS: &str = r#"id, bundle_id, "trigger", steps, notes, provenance, position, created_at"#;
const BUNDLE_COLUMNS: &str = "id, project_id, description, tool_source_ids, created_at";

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path).map_err(|e| {
            RoutebookError::StoreReadFailed(format!("Failed to open SQLite database {}: {}", path.display(), e))
        })?;
        Self::init(db)
    }

    /// Private in-memory database, used by tests and one-shot CLI runs.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().map_err(read_err)?;
        Self::init(db)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS bundles (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                description TEXT NOT NULL,
                tool_source_ids TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bundles_project ON bundles(project_id);

            CREATE TABLE IF NOT EXISTS routes (
                id TEXT PRIMARY KEY,
                bundle_id TEXT NOT NULL REFERENCES bundles(id) ON DELETE CASCADE,
                "trigger" TEXT NOT NULL,
                steps TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                provenance TEXT NOT NULL,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_routes_bundle ON routes(bundle_id, position, created_at);

            CREATE TABLE IF NOT EXISTS tool_sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                headers TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| RoutebookError::StoreWriteFailed(format!("Failed to initialize database schema: {}", e)))?;

        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| RoutebookError::StoreReadFailed(format!("store lock poisoned: {}", e)))
    }

    fn insert_route_row(db: &Connection, route: &Route) -> rusqlite::Result<()> {
        let steps = serde_json::to_string(&route.steps).map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))?;
        db.execute(
            &format!("INSERT INTO routes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", ROUTE_COLUMNS),
            params![
                route.id,
                route.bundle_id,
                route.trigger,
                steps,
                route.notes,
                route.provenance.as_str(),
                route.position,
                timestamp(&route.created_at),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RouteStore for SqliteStore {
    async fn create_bundle(&self, bundle: &Bundle, routes: &[Route]) -> Result<()> {
        let source_ids = serde_json::to_string(&bundle.tool_source_ids)?;

        let mut db = self.lock()?;
        let tx = db.transaction().map_err(write_err)?;
        tx.execute(
            &format!("INSERT INTO bundles ({}) VALUES (?1, ?2, ?3, ?4, ?5)", BUNDLE_COLUMNS),
            params![
                bundle.id,
                bundle.project_id,
                bundle.description,
                source_ids,
                timestamp(&bundle.created_at),
            ],
        )
        .map_err(write_err)?;

        for route in routes {
            Self::insert_route_row(&tx, route).map_err(write_err)?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit().map_err(write_err)
    }

    async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>> {
        let db = self.lock()?;
        let raw = db
            .query_row(
                &format!("SELECT {} FROM bundles WHERE id = ?1", BUNDLE_COLUMNS),
                [id],
                RawBundle::from_row,
            )
            .optional()
            .map_err(read_err)?;
        raw.map(RawBundle::into_bundle).transpose()
    }

    async fn list_bundles(&self, project_id: &str) -> Result<Vec<Bundle>> {
        let db = self.lock()?;
        let mut stmt = db
            .prepare(&format!(
                "SELECT {} FROM bundles WHERE project_id = ?1 ORDER BY created_at, id",
                BUNDLE_COLUMNS
            ))
            .map_err(read_err)?;
        let rows = stmt.query_map([project_id], RawBundle::from_row).map_err(read_err)?;

        let mut bundles = Vec::new();
        for row in rows {
            bundles.push(row.map_err(read_err)?.into_bundle()?);
        }
        Ok(bundles)
    }

    async fn insert_route(&self, route: &Route) -> Result<()> {
        let db = self.lock()?;
        Self::insert_route_row(&db, route).map_err(write_err)
    }

    async fn get_route(&self, id: &str) -> Result<Option<Route>> {
        let db = self.lock()?;
        let raw = db
            .query_row(
                &format!("SELECT {} FROM routes WHERE id = ?1", ROUTE_COLUMNS),
                [id],
                RawRoute::from_row,
            )
            .optional()
            .map_err(read_err)?;
        raw.map(RawRoute::into_route).transpose()
    }

    async fn list_routes(&self, bundle_id: &str) -> Result<Vec<Route>> {
        let db = self.lock()?;
        let mut stmt = db
            .prepare(&format!(
                "SELECT {} FROM routes WHERE bundle_id = ?1 ORDER BY position, created_at, id",
                ROUTE_COLUMNS
            ))
            .map_err(read_err)?;
        let rows = stmt.query_map([bundle_id], RawRoute::from_row).map_err(read_err)?;

        let mut routes = Vec::new();
        for row in rows {
            routes.push(row.map_err(read_err)?.into_route()?);
        }
        Ok(routes)
    }

    async fn put_tool_source(&self, config: &ToolSourceConfig) -> Result<()> {
        let headers = serde_json::to_string(&config.headers)?;
        let db = self.lock()?;
        db.execute(
            "INSERT OR REPLACE INTO tool_sources (id, name, url, headers) VALUES (?1, ?2, ?3, ?4)",
            params![config.id, config.name, config.url, headers],
        )
        .map_err(write_err)?;
        Ok(())
    }

    async fn get_tool_sources(&self, ids: &[String]) -> Result<Vec<ToolSourceConfig>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let db = self.lock()?;
        let mut stmt = db
            .prepare(&format!(
                "SELECT id, name, url, headers FROM tool_sources WHERE id IN ({})",
                placeholders
            ))
            .map_err(read_err)?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(read_err)?;

        let mut configs = Vec::new();
        for row in rows {
            let (id, name, url, headers) = row.map_err(read_err)?;
            configs.push(ToolSourceConfig {
                id,
                name,
                url,
                headers: serde_json::from_str(&headers).map_err(corrupt)?,
            });
        }
        Ok(configs)
    }
}

struct RawBundle {
    id: String,
    project_id: String,
    description: String,
    tool_source_ids: String,
    created_at: String,
}

impl RawBundle {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            description: row.get(2)?,
            tool_source_ids: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_bundle(self) -> Result<Bundle> {
        Ok(Bundle {
            tool_source_ids: serde_json::from_str(&self.tool_source_ids).map_err(corrupt)?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            project_id: self.project_id,
            description: self.description,
        })
    }
}

struct RawRoute {
    id: String,
    bundle_id: String,
    trigger: String,
    steps: String,
    notes: String,
    provenance: String,
    position: u32,
    created_at: String,
}

impl RawRoute {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            bundle_id: row.get(1)?,
            trigger: row.get(2)?,
            steps: row.get(3)?,
            notes: row.get(4)?,
            provenance: row.get(5)?,
            position: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_route(self) -> Result<Route> {
        let provenance = Provenance::parse(&self.provenance).ok_or_else(|| {
            RoutebookError::StoreReadFailed(format!("route {} has unknown provenance '{}'", self.id, self.provenance))
        })?;
        Ok(Route {
            steps: serde_json::from_str(&self.steps).map_err(corrupt)?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            bundle_id: self.bundle_id,
            trigger: self.trigger,
            notes: self.notes,
            provenance,
            position: self.position,
        })
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RoutebookError::StoreReadFailed(format!("bad timestamp '{}': {}", raw, e)))
}

fn read_err(e: rusqlite::Error) -> RoutebookError {
    RoutebookError::StoreReadFailed(e.to_string())
}

fn write_err(e: rusqlite::Error) -> RoutebookError {
    RoutebookError::StoreWriteFailed(e.to_string())
}

fn corrupt(e: serde_json::Error) -> RoutebookError {
    RoutebookError::StoreReadFailed(format!("corrupt JSON column: {}", e))
}
