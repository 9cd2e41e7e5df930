use rusqlite::Connection;
use crate::db::schema::SCHEMA_V1;

pub const LATEST_SCHEMA_VERSION: i32 = 1;

/// Синхронная часть: вызывается внутри `conn.call(...)`.
pub fn setup_migrations(conn: &Connection) -> rusqlite::Result<()> {
    // Узнаём текущую версию схемы
    let ver: i32 = conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?;

    // Если 0 -> выполняем SCHEMA_V1 (CREATE TABLE IF NOT EXISTS, так что повторно безопасно)
    if ver < LATEST_SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_V1)?;
    }

    Ok(())
}
