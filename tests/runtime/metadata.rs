//! Tests for metadata arrays

use h2_rpc::Metadata;

#[test]
fn test_insertion_order_preserved() {
    let mut md = Metadata::new();
    md.add("b", "2");
    md.add("a", "1");
    md.add("c", "3");
    let keys: Vec<_> = md.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["b", "a", "c"]);
}

#[test]
fn test_duplicate_keys_are_kept() {
    let mut md = Metadata::new();
    md.add("k", "first");
    md.add("k", "second");
    assert_eq!(md.len(), 2);
    assert_eq!(md.get_str("k"), Some("first"));
    let all: Vec<_> = md.get_all("k").collect();
    assert_eq!(all, vec![b"first".as_slice(), b"second".as_slice()]);
}

#[test]
fn test_keys_are_lowercased() {
    let mut md = Metadata::new();
    md.add("Content-Type", "application/grpc");
    assert_eq!(md.get_str("content-type"), Some("application/grpc"));
    assert_eq!(md.iter().next().unwrap().key, "content-type");
}

#[test]
fn test_binary_entries_detected_by_suffix() {
    let mut md = Metadata::new();
    md.add("trace-bin", vec![1u8, 2, 3]);
    md.add("trace", "text");
    assert!(md.iter().next().unwrap().is_binary());
    assert!(!md.iter().nth(1).unwrap().is_binary());
}

#[test]
fn test_get_missing_key() {
    let md = Metadata::new();
    assert_eq!(md.get("missing"), None);
    assert!(md.is_empty());
}

#[test]
fn test_from_iterator() {
    let md: Metadata = vec![
        ("A".to_string(), b"1".to_vec()),
        ("b".to_string(), b"2".to_vec()),
    ]
    .into_iter()
    .collect();
    assert_eq!(md.len(), 2);
    assert_eq!(md.get_str("a"), Some("1"));
}
