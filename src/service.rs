// src/service.rs

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::db::contact::{Contact, ContactError, ContactPatch, NewContact};
use crate::db::handler::ContactStore;
use crate::db::monitoring::record_import;
use crate::transport::{ContactSource, TransportError};

// Сообщения для UI (слот ошибки один, каждое новое перезаписывает предыдущее)
pub const MSG_INIT_FAILED: &str = "Could not open the contact store";
pub const MSG_LOAD_FAILED: &str = "Could not load contacts";
pub const MSG_ADD_FAILED: &str = "Could not add contact";
pub const MSG_UPDATE_FAILED: &str = "Could not update contact";
pub const MSG_DELETE_FAILED: &str = "Could not delete contact";
pub const MSG_FAVORITE_FAILED: &str = "Could not update favorite";
pub const MSG_IMPORT_FAILED: &str = "Could not import contacts from the server";

#[derive(Debug, Error)]
enum ImportError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] ContactError),
}

/// Наблюдаемое состояние сервиса.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactState {
    pub contacts: Vec<Contact>,
    pub search_query: String,
    pub favorites_only: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl ContactState {
    /// Производный список: не хранится, считается по требованию.
    pub fn filtered(&self) -> Vec<Contact> {
        filter_contacts(&self.contacts, &self.search_query, self.favorites_only)
    }
}

/// Подстрока (без учёта регистра) в имени или телефоне, затем фильтр избранного.
pub fn filter_contacts(contacts: &[Contact], query: &str, favorites_only: bool) -> Vec<Contact> {
    let query = query.trim().to_lowercase();
    contacts
        .iter()
        .filter(|c| {
            query.is_empty()
                || c.name.to_lowercase().contains(&query)
                || c.phone.to_lowercase().contains(&query)
        })
        .filter(|c| !favorites_only || c.favorite)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub success: bool,
    pub imported: usize,
    pub skipped: usize,
}

impl ImportOutcome {
    pub fn failed() -> Self {
        Self { success: false, imported: 0, skipped: 0 }
    }
}

/// Сбрасывает `loading` при любом выходе из импорта, включая отмену future.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<ContactState>,
}

impl<'a> LoadingGuard<'a> {
    fn start(state: &'a watch::Sender<ContactState>) -> Self {
        state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.loading = false);
    }
}

/// Фасад для UI: держит список в памяти, фильтры и импорт.
///
/// После каждой успешной записи список перечитывается целиком (write-then-reconcile),
/// поэтому состояние всегда совпадает с базой. Вызовы друг друга не блокируют:
/// `loading` — только подсказка для UI.
pub struct ContactService<S, R> {
    store: S,
    source: R,
    state: watch::Sender<ContactState>,
}

impl<S: ContactStore, R: ContactSource> ContactService<S, R> {
    pub fn new(store: S, source: R) -> Self {
        let (state, _) = watch::channel(ContactState::default());
        Self { store, source, state }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<ContactState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ContactState {
        self.state.borrow().clone()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.state.borrow().contacts.clone()
    }

    pub fn filtered_contacts(&self) -> Vec<Contact> {
        self.state.borrow().filtered()
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.state.send_modify(|s| s.search_query = query);
    }

    pub fn set_favorites_only(&self, favorites_only: bool) {
        self.state.send_modify(|s| s.favorites_only = favorites_only);
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|s| s.error = Some(message));
    }

    /// Инициализация хранилища (один раз при старте) и первая загрузка.
    pub async fn initialize(&self) -> bool {
        if !self.store.initialize().await {
            self.set_error(MSG_INIT_FAILED);
            return false;
        }
        self.load().await
    }

    /// Полная перезагрузка списка. При ошибке прежний список остаётся.
    pub async fn load(&self) -> bool {
        match self.store.try_list().await {
            Ok(contacts) => {
                self.state.send_modify(|s| s.contacts = contacts);
                true
            }
            Err(e) => {
                error!("Error loading contacts: {}", e);
                self.set_error(MSG_LOAD_FAILED);
                false
            }
        }
    }

    /// Поиск через SQL (LIKE). Для UI обычно хватает `filtered_contacts`.
    ///
    /// SQLite сравнивает без учёта регистра только ASCII: для имён с
    /// диакритикой ("Nguyễn") результат может отличаться от фильтра в памяти.
    pub async fn search(&self, query: &str) -> Vec<Contact> {
        self.store.search(query).await
    }

    async fn settle(&self, result: Result<(), ContactError>, message: &str) -> bool {
        match result {
            Ok(()) => {
                self.load().await;
                true
            }
            Err(e) => {
                error!("{}: {}", message, e);
                self.set_error(message);
                false
            }
        }
    }

    fn reject(&self, e: ContactError) -> bool {
        warn!("Rejected contact input: {}", e);
        self.set_error(e.to_string());
        false
    }

    pub async fn add(&self, contact: NewContact) -> bool {
        let contact = contact.normalized();
        if let Err(e) = contact.validate() {
            return self.reject(e);
        }
        let result = self.store.add(contact).await.map(|_| ());
        self.settle(result, MSG_ADD_FAILED).await
    }

    pub async fn update(&self, id: i64, patch: ContactPatch) -> bool {
        let patch = patch.normalized();
        if let Err(e) = patch.validate() {
            return self.reject(e);
        }
        let result = self.store.update(id, patch).await;
        self.settle(result, MSG_UPDATE_FAILED).await
    }

    pub async fn remove(&self, id: i64) -> bool {
        let result = self.store.remove(id).await;
        self.settle(result, MSG_DELETE_FAILED).await
    }

    pub async fn toggle_favorite(&self, id: i64, current: bool) -> bool {
        let result = self.store.update(id, ContactPatch::favorite(!current)).await;
        self.settle(result, MSG_FAVORITE_FAILED).await
    }

    /// Импорт с удалённого источника.
    ///
    /// Ошибка транспорта отменяет импорт целиком. Запись добавляется, только если
    /// телефон непустой и ещё не встречается в базе; остальные считаются пропущенными.
    /// Совпадающие телефоны внутри одной пачки не сверяются между собой.
    pub async fn import_from_remote(&self) -> ImportOutcome {
        let _loading = LoadingGuard::start(&self.state);

        match self.run_import().await {
            Ok((imported, skipped)) => {
                self.load().await;
                record_import(imported, skipped);
                info!("Import finished: {} imported, {} skipped", imported, skipped);
                ImportOutcome { success: true, imported, skipped }
            }
            Err(e) => {
                error!("Error importing contacts: {}", e);
                // часть пачки могла уже попасть в базу
                if matches!(e, ImportError::Store(_)) {
                    self.load().await;
                }
                self.set_error(MSG_IMPORT_FAILED);
                ImportOutcome::failed()
            }
        }
    }

    async fn run_import(&self) -> Result<(usize, usize), ImportError> {
        let records = self.source.fetch().await?;

        let mut imported = 0;
        let mut skipped = 0;
        for record in records {
            if !record.phone.is_empty() && !self.store.phone_exists(&record.phone).await? {
                self.store
                    .add(NewContact {
                        name: record.name,
                        phone: record.phone,
                        email: record.email,
                        favorite: Some(false),
                    })
                    .await?;
                imported += 1;
            } else {
                skipped += 1;
            }
        }
        Ok((imported, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::db::contact::tests::{break_store, setup_test_repo};
    use crate::db::contact::ContactRepo;
    use crate::transport::RemoteContact;

    /// Источник с заранее заданным ответом
    enum FakeSource {
        Records(Vec<Value>),
        Status(u16),
    }

    #[async_trait]
    impl ContactSource for FakeSource {
        async fn fetch(&self) -> Result<Vec<RemoteContact>, TransportError> {
            match self {
                FakeSource::Records(items) => Ok(items.iter().map(RemoteContact::resolve).collect()),
                FakeSource::Status(status) => Err(TransportError::Status {
                    status: *status,
                    url: "http://fake/contacts".to_string(),
                }),
            }
        }
    }

    /// Запоминает состояние сервиса в момент запроса
    struct ObservingSource {
        rx: Arc<Mutex<Option<watch::Receiver<ContactState>>>>,
        seen: Arc<Mutex<Option<ContactState>>>,
    }

    #[async_trait]
    impl ContactSource for ObservingSource {
        async fn fetch(&self) -> Result<Vec<RemoteContact>, TransportError> {
            let snapshot = self.rx.lock().unwrap().as_ref().map(|rx| rx.borrow().clone());
            *self.seen.lock().unwrap() = snapshot;
            Ok(vec![])
        }
    }

    async fn service_with(source: FakeSource) -> ContactService<ContactRepo, FakeSource> {
        let repo = setup_test_repo().await;
        let service = ContactService::new(repo, source);
        assert!(service.load().await);
        service
    }

    fn names(contacts: &[Contact]) -> Vec<&str> {
        contacts.iter().map(|c| c.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_initialize_loads_sample_data() {
        let conn = tokio_rusqlite::Connection::open_in_memory().await.unwrap();
        let service = ContactService::new(ContactRepo::new(Arc::new(conn)), FakeSource::Records(vec![]));
        assert!(service.initialize().await);
        assert_eq!(service.contacts().len(), 3);
        assert!(service.state().error.is_none());
    }

    #[tokio::test]
    async fn test_list_matches_store_after_mutations() {
        let service = service_with(FakeSource::Records(vec![])).await;

        assert!(service.add(NewContact::new("Zed", "9", "")).await);
        assert!(service.add(NewContact::new("Anna", "1", "")).await);
        assert!(service.add(NewContact::new("Mia", "5", "")).await);
        let mia = service.contacts().into_iter().find(|c| c.name == "Mia").unwrap();

        assert!(service.update(mia.id, ContactPatch { name: Some("Bea".into()), ..Default::default() }).await);
        let zed = service.contacts().into_iter().find(|c| c.name == "Zed").unwrap();
        assert!(service.remove(zed.id).await);

        assert_eq!(service.contacts(), service.store().list().await);
        assert_eq!(names(&service.contacts()), vec!["Anna", "Bea"]);
    }

    #[tokio::test]
    async fn test_add_round_trip_assigns_fresh_id() {
        let service = service_with(FakeSource::Records(vec![])).await;
        let existing: Vec<i64> = service.contacts().iter().map(|c| c.id).collect();

        assert!(service.add(NewContact::new("Anna", "111", "anna@example.com")).await);
        let contacts = service.contacts();
        let anna = contacts.iter().find(|c| c.name == "Anna").unwrap();
        assert_eq!((anna.phone.as_str(), anna.email.as_str(), anna.favorite), ("111", "anna@example.com", false));
        assert!(!existing.contains(&anna.id));
    }

    #[tokio::test]
    async fn test_toggle_favorite() {
        let service = service_with(FakeSource::Records(vec![])).await;
        assert!(service.add(NewContact::new("Anna", "111", "")).await);
        let id = service.contacts()[0].id;

        assert!(service.toggle_favorite(id, false).await);
        assert!(service.contacts()[0].favorite);

        assert!(service.toggle_favorite(id, true).await);
        assert!(!service.contacts()[0].favorite);
    }

    #[tokio::test]
    async fn test_update_without_fields_changes_nothing() {
        let service = service_with(FakeSource::Records(vec![])).await;
        assert!(service.add(NewContact::new("Anna", "111", "a@b.c")).await);
        let before = service.contacts();

        assert!(service.update(before[0].id, ContactPatch::default()).await);
        assert_eq!(service.contacts(), before);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_store() {
        let service = service_with(FakeSource::Records(vec![])).await;

        assert!(!service.add(NewContact::new("   ", "111", "")).await);
        assert!(service.state().error.is_some());
        assert!(service.contacts().is_empty());

        service.clear_error();
        assert!(!service.add(NewContact::new("Anna", "", "no-at-sign")).await);
        assert!(service.state().error.is_some());
    }

    #[tokio::test]
    async fn test_add_trims_input() {
        let service = service_with(FakeSource::Records(vec![])).await;
        assert!(service.add(NewContact::new("  Anna  ", " 111 ", "")).await);
        assert_eq!(service.contacts()[0].name, "Anna");
        assert_eq!(service.contacts()[0].phone, "111");
    }

    #[tokio::test]
    async fn test_write_failure_sets_error_and_keeps_state() {
        let service = service_with(FakeSource::Records(vec![])).await;
        assert!(service.add(NewContact::new("Anna", "111", "")).await);
        let before = service.contacts();

        break_store(service.store()).await;

        assert!(!service.add(NewContact::new("Ben", "222", "")).await);
        assert_eq!(service.state().error.as_deref(), Some(MSG_ADD_FAILED));
        assert_eq!(service.contacts(), before);

        assert!(!service.toggle_favorite(before[0].id, false).await);
        assert_eq!(service.state().error.as_deref(), Some(MSG_FAVORITE_FAILED));

        assert!(!service.remove(before[0].id).await);
        assert_eq!(service.state().error.as_deref(), Some(MSG_DELETE_FAILED));
        assert_eq!(service.contacts(), before);
    }

    #[tokio::test]
    async fn test_load_failure_keeps_stale_list() {
        let service = service_with(FakeSource::Records(vec![])).await;
        assert!(service.add(NewContact::new("Anna", "111", "")).await);
        let before = service.contacts();

        break_store(service.store()).await;
        assert!(!service.load().await);
        assert_eq!(service.contacts(), before);
        assert_eq!(service.state().error.as_deref(), Some(MSG_LOAD_FAILED));
    }

    #[tokio::test]
    async fn test_filtering() {
        let service = service_with(FakeSource::Records(vec![])).await;
        assert!(service.add(NewContact::new("Anna", "111", "")).await);
        assert!(service.add(NewContact { favorite: Some(true), ..NewContact::new("Ben", "222", "") }).await);

        service.set_search_query("an");
        assert_eq!(names(&service.filtered_contacts()), vec!["Anna"]);

        service.set_favorites_only(true);
        assert!(service.filtered_contacts().is_empty());

        service.set_search_query("  ");
        assert_eq!(names(&service.filtered_contacts()), vec!["Ben"]);

        service.set_favorites_only(false);
        service.set_search_query(" 22 ");
        assert_eq!(names(&service.filtered_contacts()), vec!["Ben"]);

        // полный список не трогается
        assert_eq!(service.contacts().len(), 2);
    }

    #[tokio::test]
    async fn test_sql_search_agrees_with_filter() {
        let service = service_with(FakeSource::Records(vec![])).await;
        for (name, phone) in [("Anna", "111"), ("Ben", "222"), ("Joanne", "123")] {
            assert!(service.add(NewContact::new(name, phone, "")).await);
        }
        for query in ["an", "AN", "2", "12", "x", " an", "an ", "  "] {
            service.set_search_query(query);
            assert_eq!(service.search(query).await, service.filtered_contacts(), "query {query:?}");
        }
    }

    #[tokio::test]
    async fn test_import_counts_imported_and_skipped() {
        let service = service_with(FakeSource::Records(vec![
            json!({ "name": "No Phone", "email": "np@example.com" }),
            json!({ "fullName": "Dup", "phoneNumber": "111" }),
            json!({ "name": "Fresh", "phone": "333", "email": "fresh@example.com" }),
        ]))
        .await;
        assert!(service.add(NewContact::new("Anna", "111", "")).await);

        let outcome = service.import_from_remote().await;
        assert_eq!(outcome, ImportOutcome { success: true, imported: 1, skipped: 2 });

        let contacts = service.contacts();
        assert_eq!(names(&contacts), vec!["Anna", "Fresh"]);
        let fresh = &contacts[1];
        assert_eq!((fresh.phone.as_str(), fresh.email.as_str(), fresh.favorite), ("333", "fresh@example.com", false));
        assert!(!service.state().loading);
    }

    #[tokio::test]
    async fn test_import_placeholder_name() {
        let service = service_with(FakeSource::Records(vec![json!({ "phone": "444" })])).await;
        let outcome = service.import_from_remote().await;
        assert_eq!(outcome.imported, 1);
        assert_eq!(service.contacts()[0].name, crate::transport::PLACEHOLDER_NAME);
    }

    #[tokio::test]
    async fn test_import_server_error_changes_nothing() {
        let service = service_with(FakeSource::Status(500)).await;
        assert!(service.add(NewContact::new("Anna", "111", "")).await);
        let before = service.contacts();

        let outcome = service.import_from_remote().await;
        assert_eq!(outcome, ImportOutcome::failed());
        assert_eq!(service.contacts(), before);
        assert_eq!(service.store().list().await, before);

        let state = service.state();
        assert_eq!(state.error.as_deref(), Some(MSG_IMPORT_FAILED));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_import_keeps_duplicates_within_batch() {
        let service = service_with(FakeSource::Records(vec![
            json!({ "name": "First", "phone": "555" }),
            json!({ "name": "Second", "phone": "555" }),
        ]))
        .await;

        let outcome = service.import_from_remote().await;
        assert_eq!(outcome, ImportOutcome { success: true, imported: 2, skipped: 0 });

        // повторный импорт всё пропускает
        let again = service.import_from_remote().await;
        assert_eq!(again, ImportOutcome { success: true, imported: 0, skipped: 2 });
        assert_eq!(service.contacts().len(), 2);
    }

    #[tokio::test]
    async fn test_import_clears_previous_error() {
        let service = service_with(FakeSource::Records(vec![])).await;
        assert!(!service.add(NewContact::new("", "1", "")).await);
        assert!(service.state().error.is_some());

        assert!(service.import_from_remote().await.success);
        assert!(service.state().error.is_none());
    }

    #[tokio::test]
    async fn test_import_store_failure_midway_reloads_list() {
        let service = service_with(FakeSource::Records(vec![
            json!({ "name": "First", "phone": "100" }),
            json!({ "name": "Rejected", "phone": "666" }),
        ]))
        .await;
        service
            .store()
            .connection()
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_666 BEFORE INSERT ON contacts
                     WHEN NEW.phone = '666'
                     BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();

        assert_eq!(service.import_from_remote().await, ImportOutcome::failed());
        assert_eq!(names(&service.contacts()), vec!["First"]);
        assert_eq!(service.contacts(), service.store().list().await);

        let state = service.state();
        assert_eq!(state.error.as_deref(), Some(MSG_IMPORT_FAILED));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_import_store_failure_aborts() {
        let service = service_with(FakeSource::Records(vec![json!({ "name": "X", "phone": "1" })])).await;
        break_store(service.store()).await;

        assert_eq!(service.import_from_remote().await, ImportOutcome::failed());
        assert_eq!(service.state().error.as_deref(), Some(MSG_IMPORT_FAILED));
        assert!(!service.state().loading);
    }

    #[tokio::test]
    async fn test_loading_flag_during_import() {
        let rx = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(None));
        let source = ObservingSource { rx: rx.clone(), seen: seen.clone() };
        let service = ContactService::new(setup_test_repo().await, source);
        *rx.lock().unwrap() = Some(service.subscribe());

        service.set_error("stale");
        assert!(service.import_from_remote().await.success);

        let during = seen.lock().unwrap().clone().expect("fetch was called");
        assert!(during.loading);
        assert!(during.error.is_none());
        assert!(!service.state().loading);
    }

    #[tokio::test]
    async fn test_subscribers_see_reload() {
        let service = service_with(FakeSource::Records(vec![])).await;
        let mut rx = service.subscribe();
        rx.borrow_and_update();

        assert!(service.add(NewContact::new("Anna", "111", "")).await);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().contacts.len(), 1);
    }

    #[test]
    fn test_filter_contacts_example() {
        let contacts = vec![
            Contact { id: 1, name: "Anna".into(), phone: "111".into(), email: String::new(), favorite: false },
            Contact { id: 2, name: "Ben".into(), phone: "222".into(), email: String::new(), favorite: true },
        ];
        assert_eq!(names(&filter_contacts(&contacts, "an", false)), vec!["Anna"]);
        assert!(filter_contacts(&contacts, "an", true).is_empty());
        assert_eq!(filter_contacts(&contacts, "", false), contacts);
    }
}
