use async_trait::async_trait;

use crate::db::contact::{Contact, ContactError, ContactPatch, ContactRepo, NewContact};

/// Шлюз хранения, которым пользуется сервис.
///
/// Чтение `list`/`search` мягкое (пустой список при ошибке),
/// запись и `try_list` возвращают ошибку.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn initialize(&self) -> bool;
    async fn list(&self) -> Vec<Contact>;
    async fn try_list(&self) -> Result<Vec<Contact>, ContactError>;
    async fn add(&self, contact: NewContact) -> Result<i64, ContactError>;
    async fn update(&self, id: i64, patch: ContactPatch) -> Result<(), ContactError>;
    async fn remove(&self, id: i64) -> Result<(), ContactError>;
    async fn search(&self, query: &str) -> Vec<Contact>;
    async fn phone_exists(&self, phone: &str) -> Result<bool, ContactError>;
}

#[async_trait]
impl ContactStore for ContactRepo {
    async fn initialize(&self) -> bool {
        ContactRepo::initialize(self).await
    }

    async fn list(&self) -> Vec<Contact> {
        ContactRepo::list(self).await
    }

    async fn try_list(&self) -> Result<Vec<Contact>, ContactError> {
        ContactRepo::try_list(self).await
    }

    async fn add(&self, contact: NewContact) -> Result<i64, ContactError> {
        ContactRepo::add(self, contact).await
    }

    async fn update(&self, id: i64, patch: ContactPatch) -> Result<(), ContactError> {
        ContactRepo::update(self, id, patch).await
    }

    async fn remove(&self, id: i64) -> Result<(), ContactError> {
        ContactRepo::remove(self, id).await
    }

    async fn search(&self, query: &str) -> Vec<Contact> {
        ContactRepo::search(self, query).await
    }

    async fn phone_exists(&self, phone: &str) -> Result<bool, ContactError> {
        ContactRepo::phone_exists(self, phone).await
    }
}
