//! Persisted login state.
//!
//! The session is a handful of string values under fixed keys, kept in a
//! single SQLite key/value table next to the CLI's other local data.

use rusqlite::{Connection, OptionalExtension, Result};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

use crate::types::TokenResponse;

pub const TOKEN_KEY: &str = "token";
pub const USER_ID_KEY: &str = "user_id";
pub const USERNAME_KEY: &str = "username";
pub const IS_ADMIN_KEY: &str = "is_admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub is_admin: bool,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        Session {
            token: token.access_token,
            user_id: token.user_id,
            username: token.username,
            is_admin: token.is_admin,
        }
    }
}

pub fn create_session_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS session (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM session WHERE key = ?1")?;
    stmt.query_row([key], |row| row.get::<_, String>(0)).optional()
}

fn set_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO session (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        (key, value),
    )?;
    Ok(())
}

pub struct SessionStore {
    connection: Mutex<Connection>,
}

impl SessionStore {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_session_table(&conn)?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A stored session without a token counts as logged out.
    pub fn load(&self) -> Result<Option<Session>> {
        let conn = self.lock();
        let Some(token) = get_value(&conn, TOKEN_KEY)?.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        Ok(Some(Session {
            token,
            user_id: get_value(&conn, USER_ID_KEY)?.unwrap_or_default(),
            username: get_value(&conn, USERNAME_KEY)?.unwrap_or_default(),
            is_admin: get_value(&conn, IS_ADMIN_KEY)?.as_deref() == Some("true"),
        }))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        set_value(&tx, TOKEN_KEY, &session.token)?;
        set_value(&tx, USER_ID_KEY, &session.user_id)?;
        set_value(&tx, USERNAME_KEY, &session.username)?;
        set_value(&tx, IS_ADMIN_KEY, if session.is_admin { "true" } else { "false" })?;
        tx.commit()
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM session WHERE key IN (?1, ?2, ?3, ?4)",
            (TOKEN_KEY, USER_ID_KEY, USERNAME_KEY, IS_ADMIN_KEY),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            token: "abc.def".to_string(),
            user_id: "7".to_string(),
            username: "admin".to_string(),
            is_admin: true,
        }
    }

    #[test]
    fn test_empty_store_has_no_session() {
        let store = SessionStore::in_memory().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_load_clear() {
        let store = SessionStore::in_memory().unwrap();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));

        let mut updated = sample();
        updated.is_admin = false;
        store.save(&updated).unwrap();
        assert_eq!(store.load().unwrap().map(|s| s.is_admin), Some(false));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.db");
        let path = path.to_str().unwrap();

        let store = SessionStore::new(crate::connection::conn(path).unwrap());
        store.save(&sample()).unwrap();
        drop(store);

        let reopened = SessionStore::new(crate::connection::conn(path).unwrap());
        assert_eq!(reopened.load().unwrap(), Some(sample()));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("token").is_none());
        assert_eq!(value["username"], "admin");
    }
}
