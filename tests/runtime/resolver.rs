//! Tests for name resolution

use h2_rpc::{NameResolver, ResolvedAddress};

#[test]
fn test_static_resolve_host_and_port() {
    let resolver = NameResolver::static_resolver("127.0.0.1:50051");
    let addresses = resolver.resolve().unwrap();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].address, "127.0.0.1");
    assert_eq!(addresses[0].port, 50051);
}

#[test]
fn test_static_resolve_defaults_port() {
    let resolver = NameResolver::static_resolver("10.0.0.7");
    let addresses = resolver.resolve().unwrap();
    assert_eq!(addresses[0], ResolvedAddress::new("10.0.0.7", 50051));
}

#[test]
fn test_static_resolve_bracketed_ipv6() {
    let resolver = NameResolver::static_resolver("[::1]:4000");
    let addresses = resolver.resolve().unwrap();
    assert_eq!(addresses[0], ResolvedAddress::new("::1", 4000));
}

#[test]
fn test_static_resolve_rejects_bad_port() {
    let resolver = NameResolver::static_resolver("host:notaport");
    assert!(resolver.resolve().is_err());
}

#[test]
fn test_dns_resolve_ip_literal() {
    let resolver = NameResolver::dns("127.0.0.1:9000");
    let addresses = resolver.resolve().unwrap();
    assert!(!addresses.is_empty());
    assert_eq!(addresses[0].address, "127.0.0.1");
    assert_eq!(addresses[0].port, 9000);
}

#[test]
fn test_custom_resolver_result_taken_verbatim() {
    let resolver = NameResolver::custom("whatever", |target| {
        vec![
            ResolvedAddress::new(format!("{target}-a"), 1),
            ResolvedAddress::new(format!("{target}-b"), 2),
        ]
    });
    let addresses = resolver.resolve().unwrap();
    assert_eq!(addresses.len(), 2);
    assert_eq!(addresses[0].address, "whatever-a");
    assert_eq!(addresses[1].port, 2);
}

#[test]
fn test_reresolution_replaces_cached_list() {
    let resolver = NameResolver::static_resolver("192.168.1.1:80");
    assert!(resolver.addresses().is_empty());
    resolver.resolve().unwrap();
    assert_eq!(resolver.addresses().len(), 1);
    resolver.resolve().unwrap();
    assert_eq!(resolver.addresses().len(), 1);
}

#[test]
fn test_target_accessor() {
    let resolver = NameResolver::dns("example.com:443");
    assert_eq!(resolver.target(), "example.com:443");
    assert_eq!(NameResolver::host_of("example.com:443"), "example.com");
    assert_eq!(NameResolver::host_of("example.com"), "example.com");
}
