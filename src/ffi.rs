// src/ffi.rs
//
// C ABI для мобильного клиента. Глобальных объектов нет: `contacts_open`
// возвращает непрозрачный handle, который клиент хранит сам и освобождает
// через `contacts_close`.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use log::{error, info};
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::config::DEFAULT_IMPORT_URL;
use crate::db::contact::{Contact, ContactPatch, ContactRepo, NewContact};
use crate::db::open_repo;
use crate::service::{ContactService, ContactState};
use crate::transport::ReqwestSource;

pub const FFI_OK: i32 = 0;
pub const FFI_FAILED: i32 = 1;
pub const FFI_BAD_INPUT: i32 = 2;

pub struct ContactsHandle {
    runtime: Runtime,
    service: ContactService<ContactRepo, ReqwestSource>,
}

#[derive(Serialize)]
struct StateJson<'a> {
    #[serde(flatten)]
    state: &'a ContactState,
    filtered: Vec<Contact>,
}

// Helper function to convert C string to Rust string
unsafe fn c_str_to_string(s: *const c_char) -> Option<String> {
    if s.is_null() {
        return None;
    }
    Some(CStr::from_ptr(s).to_string_lossy().into_owned())
}

fn to_c_string(s: String) -> *mut c_char {
    CString::new(s).map(CString::into_raw).unwrap_or(ptr::null_mut())
}

fn to_json<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_c_string(json),
        Err(e) => {
            error!("Cannot serialize response: {}", e);
            ptr::null_mut()
        }
    }
}

unsafe fn handle_ref<'a>(handle: *mut ContactsHandle) -> Option<&'a ContactsHandle> {
    if handle.is_null() {
        error!("contacts: null handle");
        return None;
    }
    Some(&*handle)
}

fn status(ok: bool) -> i32 {
    if ok { FFI_OK } else { FFI_FAILED }
}

/// Открывает хранилище, инициализирует схему и загружает список.
///
/// # Параметры
/// - `db_path`: путь к файлу .sqlite (или ":memory:")
/// - `import_url`: адрес импорта; NULL — адрес по умолчанию
///
/// Возвращает NULL при ошибке.
///
/// # Safety
/// Строки должны быть валидными C-строками (или NULL для `import_url`).
#[no_mangle]
pub unsafe extern "C" fn contacts_open(db_path: *const c_char, import_url: *const c_char) -> *mut ContactsHandle {
    // повторный вызов не должен паниковать
    let _ = env_logger::try_init();

    let Some(db_path) = c_str_to_string(db_path) else {
        error!("contacts_open: db_path is null");
        return ptr::null_mut();
    };
    let import_url = c_str_to_string(import_url).unwrap_or_else(|| DEFAULT_IMPORT_URL.to_string());

    let source = match ReqwestSource::new(&import_url) {
        Ok(source) => source,
        Err(e) => {
            error!("contacts_open: {}", e);
            return ptr::null_mut();
        }
    };

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("contacts_open: cannot start runtime: {}", e);
            return ptr::null_mut();
        }
    };

    let service = match runtime.block_on(open_repo(&db_path)) {
        Ok(repo) => ContactService::new(repo, source),
        Err(e) => {
            error!("Cannot open contact store: {}", e);
            return ptr::null_mut();
        }
    };

    if !runtime.block_on(service.initialize()) {
        return ptr::null_mut();
    }

    info!("contacts_open success");
    Box::into_raw(Box::new(ContactsHandle { runtime, service }))
}

/// # Safety
/// `handle` получен из `contacts_open` и больше не используется.
#[no_mangle]
pub unsafe extern "C" fn contacts_close(handle: *mut ContactsHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// # Safety
/// `handle` получен из `contacts_open`.
#[no_mangle]
pub unsafe extern "C" fn contacts_load(handle: *mut ContactsHandle) -> i32 {
    let Some(h) = handle_ref(handle) else { return FFI_BAD_INPUT };
    status(h.runtime.block_on(h.service.load()))
}

/// JSON-массив контактов: полный список или с учётом фильтров.
///
/// # Safety
/// `handle` получен из `contacts_open`; результат освобождается `contacts_free_string`.
#[no_mangle]
pub unsafe extern "C" fn contacts_list_json(handle: *mut ContactsHandle, filtered: bool) -> *mut c_char {
    let Some(h) = handle_ref(handle) else { return ptr::null_mut() };
    let contacts = if filtered {
        h.service.filtered_contacts()
    } else {
        h.service.contacts()
    };
    to_json(&contacts)
}

/// Всё наблюдаемое состояние плюс отфильтрованный список.
///
/// # Safety
/// См. `contacts_list_json`.
#[no_mangle]
pub unsafe extern "C" fn contacts_state_json(handle: *mut ContactsHandle) -> *mut c_char {
    let Some(h) = handle_ref(handle) else { return ptr::null_mut() };
    let state = h.service.state();
    to_json(&StateJson { filtered: state.filtered(), state: &state })
}

/// # Safety
/// `handle` получен из `contacts_open`, `json` — валидная C-строка.
#[no_mangle]
pub unsafe extern "C" fn contacts_add_json(handle: *mut ContactsHandle, json: *const c_char) -> i32 {
    let Some(h) = handle_ref(handle) else { return FFI_BAD_INPUT };
    let Some(json) = c_str_to_string(json) else { return FFI_BAD_INPUT };
    let contact: NewContact = match serde_json::from_str(&json) {
        Ok(c) => c,
        Err(e) => {
            error!("contacts_add_json: {}", e);
            return FFI_BAD_INPUT;
        }
    };
    status(h.runtime.block_on(h.service.add(contact)))
}

/// # Safety
/// См. `contacts_add_json`.
#[no_mangle]
pub unsafe extern "C" fn contacts_update_json(handle: *mut ContactsHandle, id: i64, json: *const c_char) -> i32 {
    let Some(h) = handle_ref(handle) else { return FFI_BAD_INPUT };
    let Some(json) = c_str_to_string(json) else { return FFI_BAD_INPUT };
    let patch: ContactPatch = match serde_json::from_str(&json) {
        Ok(p) => p,
        Err(e) => {
            error!("contacts_update_json: {}", e);
            return FFI_BAD_INPUT;
        }
    };
    status(h.runtime.block_on(h.service.update(id, patch)))
}

/// # Safety
/// `handle` получен из `contacts_open`.
#[no_mangle]
pub unsafe extern "C" fn contacts_delete(handle: *mut ContactsHandle, id: i64) -> i32 {
    let Some(h) = handle_ref(handle) else { return FFI_BAD_INPUT };
    status(h.runtime.block_on(h.service.remove(id)))
}

/// # Safety
/// `handle` получен из `contacts_open`.
#[no_mangle]
pub unsafe extern "C" fn contacts_toggle_favorite(handle: *mut ContactsHandle, id: i64, current: bool) -> i32 {
    let Some(h) = handle_ref(handle) else { return FFI_BAD_INPUT };
    status(h.runtime.block_on(h.service.toggle_favorite(id, current)))
}

/// # Safety
/// `handle` получен из `contacts_open`; `query` — C-строка или NULL (сброс).
#[no_mangle]
pub unsafe extern "C" fn contacts_set_search(handle: *mut ContactsHandle, query: *const c_char) {
    if let Some(h) = handle_ref(handle) {
        h.service.set_search_query(c_str_to_string(query).unwrap_or_default());
    }
}

/// # Safety
/// `handle` получен из `contacts_open`.
#[no_mangle]
pub unsafe extern "C" fn contacts_set_favorites_only(handle: *mut ContactsHandle, favorites_only: bool) {
    if let Some(h) = handle_ref(handle) {
        h.service.set_favorites_only(favorites_only);
    }
}

/// Импорт с сервера; возвращает JSON `{"success":..,"imported":..,"skipped":..}`.
///
/// # Safety
/// См. `contacts_list_json`.
#[no_mangle]
pub unsafe extern "C" fn contacts_import_json(handle: *mut ContactsHandle) -> *mut c_char {
    let Some(h) = handle_ref(handle) else { return ptr::null_mut() };
    let outcome = h.runtime.block_on(h.service.import_from_remote());
    to_json(&outcome)
}

/// Helper function to free C strings created by Rust
///
/// # Safety
/// `s` получена из этой библиотеки и освобождается один раз.
#[no_mangle]
pub unsafe extern "C" fn contacts_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
