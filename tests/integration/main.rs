//! Integration tests for permacache
//!
//! Exercises the public API end to end against real filesystem storage.

use permacache::{
    Cache, CacheError, CallArgs, InstanceToken, JsonSerializer, LocalFileStorage,
    MessagePackSerializer, NoCache, Storage, TomlSerializer,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use tempfile::TempDir;

fn file_cache(dir: &TempDir) -> Cache {
    Cache::with(JsonSerializer, LocalFileStorage::new(dir.path()))
}

#[test]
fn memoizes_across_wrapper_rebuilds() {
    let dir = TempDir::new().unwrap();
    let executions = Cell::new(0);

    for _ in 0..3 {
        let cache = file_cache(&dir);
        let get_data = cache.function("get_data").code("v1").build().unwrap();
        let value: String = get_data
            .call(&CallArgs::new().arg("key", &"abc").unwrap(), || {
                executions.set(executions.get() + 1);
                "abc".to_string()
            })
            .unwrap();
        assert_eq!(value, "abc");
    }

    assert_eq!(executions.get(), 1);
}

#[test]
fn three_calls_two_executions() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let get_data = cache.function("get_data").code("v1").build().unwrap();

    let observed = Cell::new("");
    let mut call = |key: &'static str| -> String {
        get_data
            .call(&CallArgs::new().arg("key", &key).unwrap(), || {
                observed.set(key);
                key.to_string()
            })
            .unwrap()
    };

    assert_eq!(call("abc"), "abc");
    assert_eq!(observed.get(), "abc");

    assert_eq!(call("fgh"), "fgh");
    assert_eq!(observed.get(), "fgh");

    // third call hits the cache, the side channel keeps its last value
    assert_eq!(call("abc"), "abc");
    assert_eq!(observed.get(), "fgh");
}

#[test]
fn structured_results_roundtrip() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Report {
        rows: Vec<u32>,
        label: String,
    }

    let dir = TempDir::new().unwrap();
    let cache = Cache::with(MessagePackSerializer, LocalFileStorage::new(dir.path()));
    let build_report = cache.function("build_report").code("v1").build().unwrap();

    let fresh: Report = build_report
        .call(&CallArgs::new(), || Report {
            rows: vec![1, 2, 3],
            label: "ok".to_string(),
        })
        .unwrap();
    let cached: Report = build_report
        .call(&CallArgs::new(), || unreachable!("must hit the cache"))
        .unwrap();

    assert_eq!(fresh, cached);
}

#[test]
fn ttl_boundary_behavior() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let get_data = cache
        .function("get_data")
        .code("v1")
        .ttl(chrono::Duration::milliseconds(200))
        .build()
        .unwrap();

    let executions = Cell::new(0);
    let mut call = |key: i64| {
        let _: i64 = get_data
            .call(&CallArgs::new().arg("key", &key).unwrap(), || {
                executions.set(executions.get() + 1);
                key
            })
            .unwrap();
    };

    call(1);
    call(1);
    call(2);
    assert_eq!(executions.get(), 2);

    std::thread::sleep(std::time::Duration::from_millis(400));

    call(1);
    call(2);
    assert_eq!(executions.get(), 4);
}

#[test]
fn eviction_bounds_disk_footprint() {
    let dir = TempDir::new().unwrap();
    let storage = LocalFileStorage::with_max_size(dir.path(), 4_000);
    let cache = Cache::with(JsonSerializer, storage.clone());
    let get_data = cache.function("get_data").code("v1").build().unwrap();

    let mut largest = 0u64;
    for i in 0..12 {
        let payload: Vec<u8> = vec![i; 500];
        largest = largest.max(payload.len() as u64 * 4); // json-encoded upper bound
        let _: Vec<u8> = get_data
            .call(&CallArgs::new().arg("key", &i).unwrap(), || payload.clone())
            .unwrap();
    }

    assert!(storage.total_size().unwrap() <= 4_000 + largest);
}

#[test]
fn per_instance_and_shared_scoping() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);

    struct DataFetcher {
        token: InstanceToken,
        computed: Cell<u32>,
    }

    impl DataFetcher {
        fn new() -> Self {
            Self {
                token: InstanceToken::new(),
                computed: Cell::new(0),
            }
        }

        fn fetch(&self, method: &permacache::CachedMethod, key: &str) -> String {
            method
                .call(
                    &self.token,
                    &CallArgs::new().arg("key", &key).unwrap(),
                    || {
                        self.computed.set(self.computed.get() + 1);
                        format!("Fetched data for key: {key}")
                    },
                )
                .unwrap()
        }
    }

    // Per-instance scoping: both instances compute independently
    let per_instance = cache
        .method("DataFetcher", "fetch")
        .code("v1")
        .build()
        .unwrap();
    let first = DataFetcher::new();
    let second = DataFetcher::new();

    let r1 = first.fetch(&per_instance, "test_key");
    let r2 = second.fetch(&per_instance, "test_key");
    assert_eq!(r1, r2);
    assert_eq!(first.computed.get(), 1);
    assert_eq!(second.computed.get(), 1);

    // Shared scoping: second instance observes the first one's entry
    let shared = cache
        .method("DataFetcher", "fetch_shared")
        .code("v1")
        .shared()
        .build()
        .unwrap();
    let third = DataFetcher::new();
    let fourth = DataFetcher::new();

    let r3 = third.fetch(&shared, "test_key");
    let r4 = fourth.fetch(&shared, "test_key");
    assert_eq!(r3, r4);
    assert_eq!(third.computed.get(), 1);
    assert_eq!(fourth.computed.get(), 0);
}

#[test]
fn no_cache_counts_every_call() {
    let no_cache = NoCache::new();
    let get_data = no_cache.function("get_data").code("v1").build().unwrap();

    let counter = Cell::new(0);
    for _ in 0..2 {
        let _: String = get_data
            .call(&CallArgs::new(), || {
                counter.set(counter.get() + 1);
                "abc".to_string()
            })
            .unwrap();
    }
    assert_eq!(counter.get(), 2);
}

#[test]
fn serializer_limits_propagate() {
    // TOML cannot encode a bare scalar result; the error reaches the
    // caller unchanged instead of being retried or masked.
    let dir = TempDir::new().unwrap();
    let cache = Cache::with(TomlSerializer, LocalFileStorage::new(dir.path()));
    let get_data = cache.function("get_data").code("v1").build().unwrap();

    let err = get_data
        .call::<i64, _>(&CallArgs::new(), || 42)
        .unwrap_err();
    assert!(matches!(err, CacheError::Serialization { .. }));
}

#[tokio::test]
async fn async_callables_memoize() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let get_data = cache.function("get_data").code("v1").build().unwrap();

    let counter = Cell::new(0);
    for _ in 0..2 {
        let value: String = get_data
            .call_async(&CallArgs::new(), || async {
                counter.set(counter.get() + 1);
                "abc".to_string()
            })
            .await
            .unwrap();
        assert_eq!(value, "abc");
    }
    assert_eq!(counter.get(), 1);
}

#[test]
fn clear_empties_the_namespace() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("cache");
    let storage = LocalFileStorage::new(&root);
    let cache = Cache::with(JsonSerializer, storage.clone());
    let get_data = cache.function("get_data").code("v1").build().unwrap();

    let _: String = get_data
        .call(&CallArgs::new(), || "abc".to_string())
        .unwrap();
    assert_eq!(storage.list().unwrap().len(), 1);

    cache.storage().clear().unwrap();
    assert!(storage.list().unwrap().is_empty());
    assert!(!root.exists());
}
