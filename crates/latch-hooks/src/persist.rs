use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use latch_core::{Signal, SubId, signal};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::KeyValueStore;

/// Argument of a write: a replacement value, or a function of the current one.
pub enum SetValue<T> {
    Value(T),
    Update(Box<dyn FnOnce(&T) -> T>),
}

impl<T> SetValue<T> {
    pub fn update(f: impl FnOnce(&T) -> T + 'static) -> Self {
        SetValue::Update(Box::new(f))
    }

    fn resolve(self, current: &T) -> T {
        match self {
            SetValue::Value(v) => v,
            SetValue::Update(f) => f(current),
        }
    }
}

impl<T> From<T> for SetValue<T> {
    fn from(value: T) -> Self {
        SetValue::Value(value)
    }
}

/// A value mirrored into a durable store under a key.
///
/// Reads fall back to the default when the entry is missing or malformed;
/// writes always update the live value even if the store rejects them.
pub struct PersistentCell<T: 'static> {
    inner: Rc<Inner<T>>,
}

struct Inner<T: 'static> {
    store: Arc<dyn KeyValueStore>,
    key: RefCell<String>,
    default: T,
    value: Signal<T>,
}

impl<T> Clone for PersistentCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PersistentCell<T>
where
    T: Serialize + DeserializeOwned + Clone + 'static,
{
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        let initial = read_slot(store.as_ref(), &key, &default);
        Self {
            inner: Rc::new(Inner {
                store,
                key: RefCell::new(key),
                default,
                value: signal(initial),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.value.with(f)
    }

    pub fn key(&self) -> String {
        self.inner.key.borrow().clone()
    }

    pub fn set(&self, value: impl Into<SetValue<T>>) {
        self.inner.write(value.into());
    }

    /// A detached setter; becomes a no-op once every cell handle is gone.
    pub fn setter(&self) -> Setter<T> {
        Setter(Rc::downgrade(&self.inner))
    }

    /// Binds the cell to another key and reads it with the usual fallbacks.
    pub fn rebind(&self, key: impl Into<String>) {
        let key = key.into();
        if *self.inner.key.borrow() == key {
            return;
        }
        log::debug!("persist: rebinding '{}' -> '{key}'", self.inner.key.borrow());
        let value = read_slot(self.inner.store.as_ref(), &key, &self.inner.default);
        *self.inner.key.borrow_mut() = key;
        self.inner.value.set(value);
    }

    /// Deletes the stored entry and resets the live value to the default.
    pub fn remove(&self) {
        let key = self.key();
        if let Err(e) = self.inner.store.remove(&key) {
            log::warn!("persist: failed to remove '{key}': {e}");
        }
        self.inner.value.set(self.inner.default.clone());
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> SubId {
        self.inner.value.subscribe(f)
    }

    pub fn unsubscribe(&self, id: SubId) -> bool {
        self.inner.value.unsubscribe(id)
    }
}

impl<T> Inner<T>
where
    T: Serialize + DeserializeOwned + Clone + 'static,
{
    fn write(&self, value: SetValue<T>) {
        let next = self.value.with(|current| value.resolve(current));
        let key = self.key.borrow().clone();
        match serde_json::to_string(&next) {
            Ok(text) => {
                if let Err(e) = self.store.set(&key, &text) {
                    log::warn!("persist: keeping '{key}' in memory only: {e}");
                }
            }
            Err(e) => log::warn!("persist: cannot serialize value for '{key}': {e}"),
        }
        self.value.set(next);
    }
}

/// Cloneable write handle returned alongside a persisted value.
pub struct Setter<T: 'static>(Weak<Inner<T>>);

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Setter<T>
where
    T: Serialize + DeserializeOwned + Clone + 'static,
{
    pub fn set(&self, value: impl Into<SetValue<T>>) {
        match self.0.upgrade() {
            Some(inner) => inner.write(value.into()),
            None => log::debug!("persist: setter used after its cell was dropped"),
        }
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T + 'static) {
        self.set(SetValue::update(f));
    }
}

fn read_slot<T>(store: &dyn KeyValueStore, key: &str, default: &T) -> T
where
    T: Serialize + DeserializeOwned + Clone,
{
    match store.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                // left as-is; the next successful write replaces it
                log::warn!("persist: unreadable value under '{key}', using default: {e}");
                default.clone()
            }
        },
        Ok(None) => {
            match serde_json::to_string(default) {
                Ok(text) => {
                    if let Err(e) = store.set(key, &text) {
                        log::warn!("persist: could not seed '{key}': {e}");
                    }
                }
                Err(e) => log::warn!("persist: cannot serialize default for '{key}': {e}"),
            }
            default.clone()
        }
        Err(e) => {
            log::warn!("persist: store read failed for '{key}', using default: {e}");
            default.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use serde::Deserialize;

    fn memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn round_trip_through_the_store() {
        let store = memory();
        let cell = PersistentCell::new(store.clone(), "k", 0_i32);
        cell.set(42_i32);
        assert_eq!(cell.get(), 42);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("42"));

        let again = PersistentCell::new(store.clone(), "k", 0_i32);
        assert_eq!(again.get(), 42);
    }

    #[test]
    fn missing_entry_is_seeded_with_default() {
        let store = memory();
        let cell = PersistentCell::new(store.clone(), "name", "anon".to_string());
        assert_eq!(cell.get(), "anon");
        assert_eq!(store.get("name").unwrap().as_deref(), Some("\"anon\""));
    }

    #[test]
    fn malformed_entry_falls_back_without_repair() {
        let store = memory();
        store.set("broken", "{not json").unwrap();

        let cell = PersistentCell::new(store.clone(), "broken", 5_i32);
        assert_eq!(cell.get(), 5);
        assert_eq!(store.get("broken").unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn wrong_shape_falls_back_to_default() {
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        struct Prefs {
            volume: u8,
        }
        let store = memory();
        store.set("prefs", "\"loud\"").unwrap();
        let cell = PersistentCell::new(store, "prefs", Prefs { volume: 3 });
        assert_eq!(cell.get(), Prefs { volume: 3 });
    }

    #[test]
    fn updater_sees_current_value() {
        let store = memory();
        let cell = PersistentCell::new(store.clone(), "cart", vec![1u32]);
        cell.set(SetValue::update(|items: &Vec<u32>| {
            let mut next = items.clone();
            next.push(2);
            next
        }));
        let setter = cell.setter();
        setter.update(|items| items.iter().map(|i| i * 10).collect());

        assert_eq!(cell.get(), vec![10, 20]);
        assert_eq!(store.get("cart").unwrap().as_deref(), Some("[10,20]"));
    }

    #[test]
    fn subscriber_can_clamp_its_own_cell() {
        let store = memory();
        let cell = PersistentCell::new(store.clone(), "volume", 5_i32);
        let clamp = cell.setter();
        cell.subscribe(move |v| {
            if *v > 10 {
                clamp.set(10_i32);
            }
        });

        cell.set(99_i32);
        assert_eq!(cell.get(), 10);
        assert_eq!(store.get("volume").unwrap().as_deref(), Some("10"));
    }

    #[test]
    fn quota_failure_still_updates_live_value() {
        let store = Arc::new(MemoryStore::with_quota(8));
        let cell = PersistentCell::new(store.clone(), "k", 1_i32);
        cell.set(123_456_789_i32);

        assert_eq!(cell.get(), 123_456_789);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("1"));
    }

    struct DownStore;

    impl KeyValueStore for DownStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("disabled".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".into()))
        }
    }

    #[test]
    fn unavailable_store_keeps_cell_usable() {
        let cell = PersistentCell::new(Arc::new(DownStore), "k", 5_i32);
        assert_eq!(cell.get(), 5);
        cell.set(6_i32);
        assert_eq!(cell.get(), 6);
        cell.remove();
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn rebind_reads_the_new_key() {
        let store = memory();
        store.set("user:1", "\"ada\"").unwrap();
        store.set("user:2", "oops").unwrap();

        let cell = PersistentCell::new(store.clone(), "user:1", String::from("?"));
        assert_eq!(cell.get(), "ada");

        cell.rebind("user:2");
        assert_eq!(cell.key(), "user:2");
        assert_eq!(cell.get(), "?");

        cell.rebind("user:3");
        assert_eq!(cell.get(), "?");
        assert_eq!(store.get("user:3").unwrap().as_deref(), Some("\"?\""));

        cell.set(String::from("grace"));
        assert_eq!(store.get("user:3").unwrap().as_deref(), Some("\"grace\""));
        assert_eq!(store.get("user:1").unwrap().as_deref(), Some("\"ada\""));
    }

    #[test]
    fn remove_clears_entry_and_resets() {
        let store = memory();
        let cell = PersistentCell::new(store.clone(), "k", 0_i32);
        cell.set(9_i32);
        cell.remove();
        assert_eq!(cell.get(), 0);
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn independent_cells_do_not_sync() {
        let store = memory();
        let a = PersistentCell::new(store.clone(), "shared", 0_i32);
        let b = PersistentCell::new(store.clone(), "shared", 0_i32);
        a.set(1_i32);
        assert_eq!(b.get(), 0);
        b.set(2_i32);
        assert_eq!(store.get("shared").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn setter_outliving_cell_is_noop() {
        let store = memory();
        let cell = PersistentCell::new(store.clone(), "k", 0_i32);
        let setter = cell.setter();
        drop(cell);
        setter.set(3_i32);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("0"));
    }
}
