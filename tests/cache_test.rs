//! Read-through cache behavior

mod common;

use chrono::Utc;
use common::MemoryCacheStore;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use userdir_core::cache::{user_key, CacheEntry, UserCache, USER_TTL};
use userdir_core::domain::UserView;

fn view(login: &str) -> UserView {
    UserView {
        login: login.to_string(),
        name: "John".to_string(),
        surname: "Doe".to_string(),
        age: Some(30),
        email: None,
    }
}

#[tokio::test]
async fn test_miss_then_backfill_then_hit() {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = UserCache::new(store.clone());

    assert!(cache.get_user("jdoe").await.unwrap().is_none());

    // Caller fetched from the system of record and backfills
    cache.put_user(&view("jdoe")).await.unwrap();

    // Within the TTL window the hit is served from the store alone
    let hit = cache.get_user("jdoe").await.unwrap().unwrap();
    assert_eq!(hit, view("jdoe"));
}

#[tokio::test]
async fn test_entry_past_ttl_is_a_miss_and_evicted() {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = UserCache::new(store.clone());

    // An entry written 301 seconds ago with the standard 300 second TTL
    let entry = CacheEntry {
        value: view("jdoe"),
        expires_at: Utc::now() + chrono::Duration::from_std(USER_TTL).unwrap()
            - chrono::Duration::seconds(301),
    };
    store.insert_raw(&user_key("jdoe"), &serde_json::to_string(&entry).unwrap());

    assert!(cache.get_user("jdoe").await.unwrap().is_none());
    assert!(!store.contains(&user_key("jdoe")));
}

#[tokio::test]
async fn test_invalidate_removes_entry() {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = UserCache::new(store.clone());

    cache.put_user(&view("jdoe")).await.unwrap();
    assert!(store.contains(&user_key("jdoe")));

    cache.invalidate("jdoe").await.unwrap();
    assert!(cache.get_user("jdoe").await.unwrap().is_none());
}

#[tokio::test]
async fn test_warm_backfills_misses_without_clobbering_fresher_entries() {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = UserCache::new(store.clone());

    // A write put a fresher snapshot than the one a slow list fetched
    let mut newer = view("jdoe");
    newer.age = Some(31);
    cache.put_user(&newer).await.unwrap();
    cache.warm_user(&view("jdoe")).await.unwrap();
    assert_eq!(cache.get_user("jdoe").await.unwrap().unwrap().age, Some(31));

    // On a miss the warm path backfills normally
    cache.invalidate("jdoe").await.unwrap();
    cache.warm_user(&view("jdoe")).await.unwrap();
    assert_eq!(cache.get_user("jdoe").await.unwrap().unwrap().age, Some(30));
}

#[tokio::test]
async fn test_concurrent_puts_last_writer_wins() {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = UserCache::new(store.clone());

    cache.put_user(&view("jdoe")).await.unwrap();
    let mut newer = view("jdoe");
    newer.age = Some(31);
    cache.put_user(&newer).await.unwrap();

    assert_eq!(cache.get_user("jdoe").await.unwrap().unwrap().age, Some(31));
}
