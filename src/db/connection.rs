use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::errors::RestackError;

/// SQLite-backed store for reports and scheduled jobs.
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: &Path) -> Result<Self, RestackError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| RestackError::Persistence(format!("Failed to open database {}: {}", path.display(), e)))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| RestackError::Persistence(format!("Failed to set pragmas: {}", e)))?;

        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, RestackError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RestackError::Persistence(format!("Failed to open in-memory db: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| RestackError::Persistence(format!("Failed to set pragmas: {}", e)))?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<(), RestackError> {
        self.lock()?
            .execute_batch(super::schema::CREATE_TABLES)
            .map_err(|e| RestackError::Persistence(format!("Failed to create tables: {}", e)))
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, RestackError> {
        self.conn
            .lock()
            .map_err(|_| RestackError::Persistence("database connection lock poisoned".into()))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self { conn: self.conn.clone() }
    }
}
