use super::*;
use bytes::Bytes;

fn pattern(len: usize, seed: u8) -> Bytes {
    Bytes::from(
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect::<Vec<u8>>(),
    )
}

#[test]
fn test_store_new_content() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let stored = store.store(pattern(100, 1));

    let key = stored.key.expect("non-empty content has a key");
    assert_eq!(key.serial(), 0);
    assert_eq!(store.ref_count(&key), Some(1));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_duplicates_share_the_first_buffer() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let first = store.store(pattern(4096, 3));
    let second = store.store(pattern(4096, 3));

    assert_eq!(first.key, second.key);
    // Same allocation, not just equal bytes.
    assert_eq!(first.data.as_ptr(), second.data.as_ptr());
    assert_eq!(store.ref_count(first.key.as_ref().unwrap()), Some(2));
}

#[test]
fn test_n_stores_count_n_minus_one_duplicates() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let len = 2048;
    for _ in 0..5 {
        store.store(pattern(len, 9));
    }

    let report = store.report();
    assert_eq!(report.unique_block_count, 1);
    assert_eq!(report.duplicate_block_count, 4);
    assert_eq!(report.total_saved_memory, 4 * len);
    assert_eq!(report.total_ref_count, 5);
    assert_eq!(report.total_bytes, len);
}

#[test]
fn test_one_mebibyte_duplicate() {
    let store = ContentStore::new(HashStrategy::Sampled);
    store.store(Bytes::from(vec![0xabu8; 1024 * 1024]));
    store.store(Bytes::from(vec![0xabu8; 1024 * 1024]));

    let report = store.report();
    assert_eq!(report.duplicate_block_count, 1);
    assert_eq!(report.total_saved_memory, 1_048_576);
}

#[test]
fn test_empty_buffer_passes_through() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let stored = store.store(Bytes::new());
    assert!(stored.key.is_none());
    assert!(stored.data.is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_sampled_collision_is_not_a_duplicate() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let a = vec![5u8; 8192];
    let mut b = a.clone();
    b[2000] = 6;

    let first = store.store(Bytes::from(a));
    let second = store.store(Bytes::from(b.clone()));

    let (k1, k2) = (first.key.unwrap(), second.key.unwrap());
    assert_eq!(k1.hash(), k2.hash());
    assert_ne!(k1, k2);
    assert_eq!(k2.serial(), 1);
    assert_eq!(second.data.as_ref(), b.as_slice());

    let report = store.report();
    assert_eq!(report.unique_block_count, 2);
    assert_eq!(report.duplicate_block_count, 0);
}

#[test]
fn test_full_strategy_separates_sampled_collisions() {
    let store = ContentStore::new(HashStrategy::Full);
    let a = vec![5u8; 8192];
    let mut b = a.clone();
    b[2000] = 6;

    let k1 = store.store(Bytes::from(a)).key.unwrap();
    let k2 = store.store(Bytes::from(b)).key.unwrap();
    assert_ne!(k1.hash(), k2.hash());
    assert_eq!(k2.serial(), 0);
}

#[test]
fn test_collision_on_existing_hash_gets_new_serial() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let data = pattern(64, 2);
    let hash = content_hash(&data, HashStrategy::Sampled);

    let squatter = store.insert_colliding(&hash, pattern(64, 77));
    let stored = store.store(data.clone());

    let key = stored.key.unwrap();
    assert_eq!(key.hash(), squatter.hash());
    assert_eq!(key.serial(), 1);
    assert_eq!(stored.data, data);

    // A second store of the same bytes finds the serial-1 entry.
    let again = store.store(data).key.unwrap();
    assert_eq!(again, key);
    assert_eq!(store.ref_count(&key), Some(2));
}

#[test]
fn test_release_removes_at_zero() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let key = store.store(pattern(300, 4)).key.unwrap();
    store.store(pattern(300, 4));

    assert_eq!(store.release(&key), 0);
    assert_eq!(store.ref_count(&key), Some(1));
    assert_eq!(store.release(&key), 300);
    assert!(!store.contains(&key));

    // Releasing again is harmless.
    assert_eq!(store.release(&key), 0);
}

#[test]
fn test_release_keeps_accumulated_savings() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let key = store.store(pattern(2048, 8)).key.unwrap();
    store.store(pattern(2048, 8));

    let before = store.report();
    assert_eq!(before.duplicate_block_count, 1);
    assert_eq!(before.total_saved_memory, 2048);

    store.release(&key);
    let after = store.report();
    assert_eq!(after.total_ref_count, 1);
    assert_eq!(after.duplicate_block_count, 1);
    assert_eq!(after.total_saved_memory, 2048);

    store.release(&key);
    let emptied = store.report();
    assert_eq!(emptied.unique_block_count, 0);
    assert_eq!(emptied.duplicate_block_count, 1);
    assert_eq!(emptied.total_saved_memory, 2048);
}

#[test]
fn test_clean_unreferenced_data_sweeps_zero_counts() {
    let store = ContentStore::new(HashStrategy::Sampled);
    let dead = store.store(pattern(128, 1)).key.unwrap();
    let live = store.store(pattern(256, 2)).key.unwrap();

    store.set_ref_count(&dead, 0);
    assert_eq!(store.clean_unreferenced_data(), 128);
    assert!(!store.contains(&dead));
    assert!(store.contains(&live));
    assert_eq!(store.clean_unreferenced_data(), 0);
}
