use super::*;
use std::hash::Hasher;

// -------------------- Known vectors --------------------

#[test]
fn empty_input_is_init() {
    assert_eq!(djb_hash(b""), DJB_INIT);
    assert_eq!(djb_hash(b""), 5381);
}

#[test]
fn single_byte() {
    // (5381 * 33) ^ 'a'
    assert_eq!(djb_hash(b"a"), 177_604);
    assert_eq!(djb_hash(b"c"), 177_606);
}

#[test]
fn multi_byte() {
    assert_eq!(djb_hash(b"hello"), 178_056_679);
    assert_eq!(djb_hash(b"abc"), 193_409_669);
}

#[test]
fn bucket_and_slot_bits_of_known_key() {
    let h = djb_hash(b"hello");
    assert_eq!(h & 0xff, 231);
    assert_eq!(h >> 8, 695_533);
}

#[test]
fn long_input_wraps_without_panicking() {
    let data = vec![0xffu8; 100_000];
    let _ = djb_hash(&data);
}

// -------------------- Incremental hashing --------------------

#[test]
fn incremental_matches_one_shot() {
    let data = b"the quick brown fox jumps over the lazy dog";
    for split in 0..data.len() {
        let mut h = DjbHasher::new();
        h.update(&data[..split]);
        h.update(&data[split..]);
        assert_eq!(h.finish32(), djb_hash(data), "split at {}", split);
    }
}

#[test]
fn std_hasher_zero_extends() {
    let mut h = DjbHasher::default();
    h.write(b"hello");
    assert_eq!(h.finish(), 178_056_679u64);
}

#[test]
fn distinct_keys_usually_differ() {
    assert_ne!(djb_hash(b"key1"), djb_hash(b"key2"));
    assert_ne!(djb_hash(b"ab"), djb_hash(b"ba"));
}
