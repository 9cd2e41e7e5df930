// src/db/mod.rs
//
// Здесь:
// 1) открываем соединение (файл или :memory:)
// 2) регистрируем hooks
// 3) собираем репозиторий контактов

pub mod contact;
pub mod handler;
pub mod migrations;
pub mod monitoring;
pub mod schema;

use std::sync::Arc;

use log::{info, trace};
use rusqlite::hooks::Action;
use tokio_rusqlite::Connection;

use crate::db::contact::{ContactError, ContactRepo};

pub const IN_MEMORY: &str = ":memory:";

/// Открывает хранилище и вешает hooks. Схему не трогает:
/// это делает `ContactRepo::initialize` под управлением сервиса.
pub async fn open_connection(path: &str) -> Result<Connection, ContactError> {
    let conn = if path == IN_MEMORY {
        Connection::open_in_memory().await.map_err(tokio_rusqlite::Error::Error)?
    } else {
        Connection::open(path).await.map_err(tokio_rusqlite::Error::Error)?
    };

    conn.call(|conn| {
        register_hooks(conn);
        Ok(())
    })
    .await?;

    info!("Contact store opened at {}", path);
    Ok(conn)
}

pub async fn open_repo(path: &str) -> Result<ContactRepo, ContactError> {
    let conn = open_connection(path).await?;
    Ok(ContactRepo::new(Arc::new(conn)))
}

// "update_hook" из rusqlite::hooks: подписка на INSERT, UPDATE, DELETE.
// commit_hook / rollback_hook — отдельные методы.
pub fn register_hooks(conn: &rusqlite::Connection) {
    conn.commit_hook(Some(|| {
        trace!("::HOOK:: Commit detected");
        // "true" превратил бы commit в rollback
        false
    }));

    conn.rollback_hook(Some(|| {
        trace!("::HOOK:: Rollback detected");
    }));

    conn.update_hook(Some(|action_code: Action, db: &str, table: &str, rowid: i64| {
        let action = match action_code {
            Action::SQLITE_DELETE => "Delete",
            Action::SQLITE_INSERT => "Insert",
            Action::SQLITE_UPDATE => "Update",
            _ => "Unknown",
        };
        trace!("::HOOK:: {action} on table '{table}' in DB '{db}', rowid: {rowid}");
    }));
}
