#![allow(missing_docs)]

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use evently::model::{encode_binary, LinearModel};
use evently::store::{ModelLoadError, ModelProvider, ModelStore};
use ndarray::array;
use tempfile::TempDir;

const THREADS: usize = 16;

#[test]
fn concurrent_first_requests_share_one_load() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("model.bin");
    let model = LinearModel::new(array![0.5, 0.3, 0.1], 0.0);
    fs::write(&path, encode_binary(&model)).expect("write model");

    let store = Arc::new(ModelStore::new(&path));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.model().expect("model")
            })
        })
        .collect();
    let loaded: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();

    assert_eq!(store.load_count(), 1);
    for m in &loaded {
        assert!(Arc::ptr_eq(m, &loaded[0]));
        assert_eq!(**m, model);
    }
}

#[test]
fn concurrent_failures_leave_the_store_retryable() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("model.bin");
    let store = Arc::new(ModelStore::new(&path));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.model())
        })
        .collect();
    for handle in handles {
        assert!(matches!(
            handle.join().expect("thread"),
            Err(ModelLoadError::Missing(_))
        ));
    }
    assert!(!store.is_loaded());

    let model = LinearModel::new(array![1.0, 1.0, 1.0], 1.0);
    fs::write(&path, encode_binary(&model)).expect("write model");
    assert_eq!(*store.model().expect("retry"), model);
}

#[test]
fn readers_see_whole_models_across_reloads() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("model.bin");
    let old = LinearModel::new(array![1.0, 0.0, 0.0], 0.0);
    let new = LinearModel::new(array![0.0, 2.0, 0.0], 1.0);
    fs::write(&path, encode_binary(&old)).expect("write model");

    let store = Arc::new(ModelStore::new(&path));
    store.get().expect("initial load");

    let readers: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let (old, new) = (old.clone(), new.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    let seen = store.get().expect("get");
                    assert!(*seen == old || *seen == new);
                }
            })
        })
        .collect();

    fs::write(&path, encode_binary(&new)).expect("rewrite model");
    store.reload().expect("reload");
    for reader in readers {
        reader.join().expect("reader");
    }
    assert_eq!(*store.get().expect("get"), new);
}
