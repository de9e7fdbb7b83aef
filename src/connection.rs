use anyhow::{Context, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

pub fn conn(session_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(session_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let conn = Connection::open(session_path)
        .with_context(|| format!("Failed to open session store {}", session_path))?;

    // Initialize the session table
    crate::session::create_session_table(&conn)?;

    Ok(conn)
}
