// src/db/contact.rs

use std::sync::Arc;
use chrono::Utc;
use log::{debug, error, info};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::db::migrations::setup_migrations;
use crate::db::monitoring::measure_db_operation;

/// Ошибки шлюза хранения контактов
#[derive(Debug, Error)]
pub enum ContactError {
    #[error("SQL Error: {0}")]
    Sql(#[from] tokio_rusqlite::Error),

    #[error("Invalid contact: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub favorite: bool,
}

impl Contact {
    const COLUMNS: &'static str = "id, name, phone, email, favorite";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        // phone/email/favorite в схеме допускают NULL
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            email: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            favorite: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
        })
    }
}

/// Данные для создания нового контакта (id и created_at назначает хранилище)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub favorite: Option<bool>,
}

impl NewContact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            favorite: None,
        }
    }

    /// Обрезает пробелы во всех текстовых полях, как это делает форма редактирования.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            favorite: self.favorite,
        }
    }

    pub fn validate(&self) -> Result<(), ContactError> {
        validate_name(&self.name)?;
        validate_email(&self.email)
    }
}

/// Частичное обновление: в SET попадают только заданные поля.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub favorite: Option<bool>,
}

impl ContactPatch {
    pub fn favorite(value: bool) -> Self {
        Self { favorite: Some(value), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.email.is_none() && self.favorite.is_none()
    }

    pub fn normalized(self) -> Self {
        Self {
            name: self.name.map(|s| s.trim().to_string()),
            phone: self.phone.map(|s| s.trim().to_string()),
            email: self.email.map(|s| s.trim().to_string()),
            favorite: self.favorite,
        }
    }

    pub fn validate(&self) -> Result<(), ContactError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ContactError> {
    if name.trim().is_empty() {
        return Err(ContactError::Validation("name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ContactError> {
    let email = email.trim();
    if !email.is_empty() && !email.contains('@') {
        return Err(ContactError::Validation(format!("invalid email: {email}")));
    }
    Ok(())
}

/// Контакты, которыми заполняется пустая база при первом запуске
const SAMPLE_CONTACTS: &[(&str, &str, &str)] = &[
    ("Nguyễn Văn A", "0901234567", "nguyenvana@email.com"),
    ("Trần Thị B", "0912345678", "tranthib@email.com"),
    ("Lê Văn C", "0923456789", "levanc@email.com"),
];

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Экранирует спецсимволы LIKE, чтобы запрос искал подстроку буквально.
fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Асинхронный репозиторий для таблицы contacts.
///
/// - Храним `Arc<Connection>`: одно соединение на процесс, но владелец явный.
/// - Чтение (list/search) "мягкое": ошибки логируются, возвращается пустой список.
/// - Запись (add/update/remove) "громкая": ошибка уходит вызывающему.
#[derive(Clone)]
pub struct ContactRepo {
    conn: Arc<Connection>,
}

impl ContactRepo {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Только схема, без начальных данных.
    pub async fn migrate(&self) -> Result<(), ContactError> {
        self.conn
            .call(|conn| {
                setup_migrations(conn)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Создаёт таблицу и при первом запуске заполняет её примерами.
    /// Ошибку наружу не пробрасываем: логируем и возвращаем false.
    pub async fn initialize(&self) -> bool {
        match self.try_initialize().await {
            Ok(()) => {
                info!("Contact store initialized successfully");
                true
            }
            Err(e) => {
                error!("Error initializing contact store: {}", e);
                false
            }
        }
    }

    async fn try_initialize(&self) -> Result<(), ContactError> {
        self.migrate().await?;
        if self.count().await? == 0 {
            // неудачный seed не ломает инициализацию
            match self.seed_sample_data().await {
                Ok(()) => info!("Sample contacts seeded"),
                Err(e) => error!("Error seeding sample contacts: {}", e),
            }
        }
        Ok(())
    }

    async fn seed_sample_data(&self) -> Result<(), ContactError> {
        let now = now_millis();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO contacts (name, phone, email, favorite, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
                    )?;
                    for (name, phone, email) in SAMPLE_CONTACTS {
                        stmt.execute(params![name, phone, email, now])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, ContactError> {
        let count = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(count)
    }

    /// Все контакты по имени (ASC). При ошибке — пустой список.
    pub async fn list(&self) -> Vec<Contact> {
        self.try_list().await.unwrap_or_else(|e| {
            error!("Error getting contacts: {}", e);
            Vec::new()
        })
    }

    /// То же, что `list`, но с ошибкой.
    pub async fn try_list(&self) -> Result<Vec<Contact>, ContactError> {
        measure_db_operation("list", async {
            let contacts = self
                .conn
                .call(|conn| {
                    let sql = format!("SELECT {} FROM contacts ORDER BY name ASC", Contact::COLUMNS);
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map([], Contact::from_row)?;
                    let contacts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                    Ok(contacts)
                })
                .await?;
            Ok::<_, ContactError>(contacts)
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Contact>, ContactError> {
        measure_db_operation("get", async {
            let contact = self
                .conn
                .call(move |conn| {
                    let sql = format!("SELECT {} FROM contacts WHERE id = ?1", Contact::COLUMNS);
                    let contact = conn
                        .query_row(&sql, params![id], Contact::from_row)
                        .optional()?;
                    Ok(contact)
                })
                .await?;
            Ok::<_, ContactError>(contact)
        })
        .await
    }

    /// Вставляет контакт и возвращает назначенный id.
    pub async fn add(&self, contact: NewContact) -> Result<i64, ContactError> {
        let now = now_millis();
        let id = measure_db_operation("add", async {
            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO contacts (name, phone, email, favorite, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            contact.name,
                            contact.phone,
                            contact.email,
                            contact.favorite.unwrap_or(false),
                            now
                        ],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;
            Ok::<_, ContactError>(id)
        })
        .await
        .inspect_err(|e| error!("Error adding contact: {}", e))?;

        info!("Contact added: {}", id);
        Ok(id)
    }

    /// Частичное обновление. Пустой patch — no-op, запрос не выполняется.
    pub async fn update(&self, id: i64, patch: ContactPatch) -> Result<(), ContactError> {
        if patch.is_empty() {
            debug!("Empty patch for contact {}, nothing to update", id);
            return Ok(());
        }

        let mut assignments: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(name) = patch.name {
            assignments.push("name = ?");
            values.push(Value::Text(name));
        }
        if let Some(phone) = patch.phone {
            assignments.push("phone = ?");
            values.push(Value::Text(phone));
        }
        if let Some(email) = patch.email {
            assignments.push("email = ?");
            values.push(Value::Text(email));
        }
        if let Some(favorite) = patch.favorite {
            assignments.push("favorite = ?");
            values.push(Value::Integer(i64::from(favorite)));
        }

        values.push(Value::Integer(id));
        // в SQL попадают только фиксированные фрагменты, значения — параметры
        let sql = format!("UPDATE contacts SET {} WHERE id = ?", assignments.join(", "));

        measure_db_operation("update", async {
            self.conn
                .call(move |conn| {
                    conn.execute(&sql, params_from_iter(values))?;
                    Ok(())
                })
                .await?;
            Ok::<_, ContactError>(())
        })
        .await
        .inspect_err(|e| error!("Error updating contact: {}", e))?;

        info!("Contact updated: {}", id);
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> Result<(), ContactError> {
        measure_db_operation("remove", async {
            self.conn
                .call(move |conn| {
                    conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
                    Ok(())
                })
                .await?;
            Ok::<_, ContactError>(())
        })
        .await
        .inspect_err(|e| error!("Error deleting contact: {}", e))?;

        info!("Contact deleted: {}", id);
        Ok(())
    }

    /// Поиск подстроки в имени или телефоне. При ошибке — пустой список.
    ///
    /// Запрос обрезается по краям; пустой запрос возвращает весь список.
    pub async fn search(&self, query: &str) -> Vec<Contact> {
        let query = query.trim();
        if query.is_empty() {
            return self.list().await;
        }
        let pattern = format!("%{}%", escape_like(query));
        let result = measure_db_operation("search", async {
            let contacts = self
                .conn
                .call(move |conn| {
                    let sql = format!(
                        r"SELECT {} FROM contacts
                          WHERE name LIKE ?1 ESCAPE '\' OR phone LIKE ?1 ESCAPE '\'
                          ORDER BY name ASC",
                        Contact::COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params![pattern], Contact::from_row)?;
                    let contacts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                    Ok(contacts)
                })
                .await?;
            Ok::<_, ContactError>(contacts)
        })
        .await;

        result.unwrap_or_else(|e| {
            error!("Error searching contacts: {}", e);
            Vec::new()
        })
    }

    /// Точное совпадение телефона. Пустой телефон ключом дедупликации не считается.
    pub async fn phone_exists(&self, phone: &str) -> Result<bool, ContactError> {
        if phone.is_empty() {
            return Ok(false);
        }
        let phone = phone.to_owned();
        measure_db_operation("phone_exists", async {
            let exists = self
                .conn
                .call(move |conn| {
                    let n: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM contacts WHERE phone = ?1",
                        params![phone],
                        |r| r.get(0),
                    )?;
                    Ok(n > 0)
                })
                .await?;
            Ok::<_, ContactError>(exists)
        })
        .await
    }
}
