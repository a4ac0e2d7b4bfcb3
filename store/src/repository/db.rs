//! Database Connection and Setup
//!
//! Manages the SQLite connection and migrations.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{DomainError, DomainResult};

/// Shared connection handle, `None` until initialized
pub type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// Database state wrapper
#[derive(Clone)]
pub struct DbState {
    pub conn: SharedConnection,
    pub db_path: PathBuf,
}

impl DbState {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            conn: Arc::new(Mutex::new(None)),
            db_path,
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.conn.lock().await.is_some()
    }
}

/// Open (or create) the database at `db_path` and run migrations.
///
/// `:memory:` opens a private in-memory database.
pub async fn init_db(db_path: &Path) -> DomainResult<DbState> {
    let conn = if db_path == Path::new(":memory:") {
        Connection::open_in_memory()?
    } else {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| DomainError::Internal(format!("Failed to create {}: {}", dir.display(), e)))?;
        }
        Connection::open(db_path)?
    };

    run_migrations(&conn)?;
    log::info!("Database ready at {}", db_path.display());

    let state = DbState::new(db_path.to_path_buf());
    *state.conn.lock().await = Some(conn);
    Ok(state)
}

/// Current schema version, stored in `PRAGMA user_version`
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
fn run_migrations(conn: &Connection) -> DomainResult<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    // No UNIQUE(scope, position): a swap passes through a duplicate between its two writes
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scope TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            payload TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_scope ON records(scope, position);",
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    log::info!("Migrated database schema to version {}", SCHEMA_VERSION);
    Ok(())
}
