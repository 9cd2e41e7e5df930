// src/transport.rs

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

// Типы ошибок для транспорта
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Invalid import URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Имя, если во внешней записи нет ни `name`, ни `fullName`
pub const PLACEHOLDER_NAME: &str = "Unknown";

const PHONE_FIELDS: &[&str] = &["phone", "phoneNumber"];
const NAME_FIELDS: &[&str] = &["name", "fullName"];
const EMAIL_FIELDS: &[&str] = &["email"];

/// Внешняя запись после разрешения полей.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContact {
    pub name: String,
    pub phone: String,
    pub email: String,
}

impl RemoteContact {
    /// Разбирает один элемент ответа. Кривые записи не ошибка:
    /// недостающие поля получают значения по умолчанию.
    pub fn resolve(value: &Value) -> Self {
        Self {
            phone: first_text(value, PHONE_FIELDS).unwrap_or_default(),
            name: first_text(value, NAME_FIELDS).unwrap_or_else(|| PLACEHOLDER_NAME.to_string()),
            email: first_text(value, EMAIL_FIELDS).unwrap_or_default(),
        }
    }
}

/// Первое "непустое" значение из списка полей: непустая строка или число.
fn first_text(value: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match value.get(*field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Разбор тела ответа: ожидаем JSON-массив, иначе весь импорт отменяется.
pub fn parse_records(body: Value) -> Result<Vec<RemoteContact>, TransportError> {
    match body {
        Value::Array(items) => Ok(items.iter().map(RemoteContact::resolve).collect()),
        other => Err(TransportError::Decode(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Источник внешних контактов для импорта
#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RemoteContact>, TransportError>;
}

/// HTTP-источник: один GET без ретраев, таймаута и авторизации.
pub struct ReqwestSource {
    client: reqwest::Client,
    url: Url,
}

impl ReqwestSource {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            client: reqwest::Client::new(),
            url: Url::parse(url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ContactSource for ReqwestSource {
    async fn fetch(&self) -> Result<Vec<RemoteContact>, TransportError> {
        info!("Fetching remote contacts from {}", self.url);
        let response = self.client.get(self.url.as_str()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: self.url.to_string(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let records = parse_records(body)?;
        debug!("Fetched {} remote contact records", records.len());
        Ok(records)
    }
}
