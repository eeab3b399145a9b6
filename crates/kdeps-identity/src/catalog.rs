use kdeps_core::CatalogEntry;
use kdeps_error::{Error, ErrorCode};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// The embedded SQL catalog backing agent/action registration.
///
/// A single `agents(id TEXT PRIMARY KEY, data TEXT NOT NULL, created_at
/// DATETIME DEFAULT CURRENT_TIMESTAMP)` table, per spec.md §6. Both the
/// in-memory (`:memory:`) and on-disk modes run identical SQL.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open (and initialize, if needed) an in-memory catalog. A missing
    /// catalog file is not an error elsewhere in this crate — this
    /// constructor always succeeds for the in-memory case because there is
    /// no file to be missing.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(catalog_err)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (creating if absent) an on-disk catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path.as_ref()).map_err(catalog_err)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS agents (\
                id TEXT PRIMARY KEY, \
                data TEXT NOT NULL, \
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP\
             )",
            [],
        )
        .map_err(catalog_err)?;
        Ok(())
    }

    /// Upsert a row: `id -> data` (JSON-encoded descriptor).
    pub fn upsert(&self, id: &str, data: &str) -> Result<(), Error> {
        let conn = self.conn.lock().expect("catalog connection poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO agents (id, data) VALUES (?1, ?2)",
            rusqlite::params![id, data],
        )
        .map_err(catalog_err)?;
        Ok(())
    }

    /// Remove a row by id. Not an error if the row does not exist.
    pub fn remove(&self, id: &str) -> Result<(), Error> {
        let conn = self.conn.lock().expect("catalog connection poisoned");
        conn.execute("DELETE FROM agents WHERE id = ?1", rusqlite::params![id])
            .map_err(catalog_err)?;
        Ok(())
    }

    /// Fetch the raw JSON descriptor for an exact id.
    pub fn get(&self, id: &str) -> Result<Option<String>, Error> {
        let conn = self.conn.lock().expect("catalog connection poisoned");
        let mut stmt = conn
            .prepare("SELECT data FROM agents WHERE id = ?1")
            .map_err(catalog_err)?;
        let mut rows = stmt.query(rusqlite::params![id]).map_err(catalog_err)?;
        match rows.next().map_err(catalog_err)? {
            Some(row) => Ok(Some(row.get(0).map_err(catalog_err)?)),
            None => Ok(None),
        }
    }

    /// All `(id, data)` rows whose id starts with `prefix`, e.g. `@demo:` to
    /// enumerate every registered version of `demo`.
    pub fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, Error> {
        let conn = self.conn.lock().expect("catalog connection poisoned");
        let like = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn
            .prepare("SELECT id, data FROM agents WHERE id LIKE ?1 ESCAPE '\\' ORDER BY id")
            .map_err(catalog_err)?;
        let rows = stmt
            .query_map(rusqlite::params![like], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(catalog_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(catalog_err)?);
        }
        Ok(out)
    }

    /// Every row in the catalog, ordered by id.
    pub fn all(&self) -> Result<Vec<(String, String)>, Error> {
        let conn = self.conn.lock().expect("catalog connection poisoned");
        let mut stmt = conn
            .prepare("SELECT id, data FROM agents ORDER BY id")
            .map_err(catalog_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(catalog_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(catalog_err)?);
        }
        Ok(out)
    }

    /// Convenience: upsert a [`CatalogEntry`], JSON-encoding it.
    pub fn upsert_entry(&self, id: &str, entry: &CatalogEntry) -> Result<(), Error> {
        let data = serde_json::to_string(entry).map_err(|e| {
            Error::new(ErrorCode::IdentityCatalogFailed, "failed to encode catalog entry")
                .with_source(e)
        })?;
        self.upsert(id, &data)
    }
}

fn catalog_err(e: rusqlite::Error) -> Error {
    Error::new(ErrorCode::IdentityCatalogFailed, e.to_string()).with_source(e)
}
