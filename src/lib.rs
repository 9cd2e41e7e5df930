// src/lib.rs
//
// Ядро менеджера контактов:
// - db: хранилище SQLite (tokio-rusqlite), схема, метрики
// - transport: загрузка внешних контактов по HTTP
// - service: состояние для UI, фильтры и импорт
// - ffi: C ABI для мобильного клиента

pub mod config;
pub mod db;
pub mod ffi;
pub mod service;
pub mod transport;

pub use config::Config;
pub use db::contact::{Contact, ContactError, ContactPatch, ContactRepo, NewContact};
pub use db::handler::ContactStore;
pub use service::{ContactService, ContactState, ImportOutcome};
pub use transport::{ContactSource, RemoteContact, ReqwestSource, TransportError};
