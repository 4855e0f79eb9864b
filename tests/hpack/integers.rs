//! Tests for HPACK integer coding

use h2_rpc::hpack::{decode_integer, encode_integer};

#[test]
fn test_roundtrip_all_prefixes() {
    for prefix_bits in 1..=7u8 {
        for value in [0u32, 1, 2, 30, 31, 127, 128, 255, 16_384, u32::MAX] {
            let mut encoded = Vec::new();
            encode_integer(value, prefix_bits, &mut encoded);
            let (decoded, consumed) = decode_integer(&encoded, prefix_bits).unwrap();
            assert_eq!(decoded, value, "prefix {prefix_bits}, value {value}");
            assert_eq!(consumed, encoded.len(), "decoder must consume exactly the encoded bytes");
        }
    }
}

#[test]
fn test_small_value_is_single_byte() {
    let mut encoded = Vec::new();
    encode_integer(10, 5, &mut encoded);
    assert_eq!(encoded, vec![10]);
}

#[test]
fn test_rfc7541_example_1337_with_5bit_prefix() {
    // RFC 7541 C.1.2
    let mut encoded = Vec::new();
    encode_integer(1337, 5, &mut encoded);
    assert_eq!(encoded, vec![0x1F, 0x9A, 0x0A]);
    let (value, consumed) = decode_integer(&encoded, 5).unwrap();
    assert_eq!(value, 1337);
    assert_eq!(consumed, 3);
}

#[test]
fn test_prefix_boundary_value() {
    // 2^N - 1 spills into a continuation byte of zero.
    let mut encoded = Vec::new();
    encode_integer(31, 5, &mut encoded);
    assert_eq!(encoded, vec![0x1F, 0x00]);
}

#[test]
fn test_truncated_integer_is_rejected() {
    // Prefix filled, continuation promised but absent.
    assert!(decode_integer(&[0x1F], 5).is_err());
    assert!(decode_integer(&[0x7F, 0x80], 7).is_err());
}

#[test]
fn test_overflowing_integer_is_rejected() {
    // Six continuation bytes shift past the 28-bit guard.
    let encoded = [0x7F, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
    assert!(decode_integer(&encoded, 7).is_err());
}

#[test]
fn test_empty_input_is_rejected() {
    assert!(decode_integer(&[], 7).is_err());
}
