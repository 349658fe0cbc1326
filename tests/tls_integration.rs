//! h2c upgrade over TLS
//!
//! The upstream terminates TLS with a throwaway self-signed certificate and
//! then plays the same scripted h2c peer as the plain TCP tests.

mod common;

use common::H2Peer;
use h2csmuggler::http::tls::{TlsConfig, TlsError};
use h2csmuggler::smuggle::{Error, Exchange, ExchangeResult, ProbeConfig};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{SslAcceptor, SslMethod};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

fn self_signed() -> (X509, PKey<Private>) {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial.to_asn1_integer().unwrap()).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// TLS upstream that upgrades and answers with a fixed body
fn spawn_tls_upstream(cert: &X509, key: &PKey<Private>) -> (SocketAddr, JoinHandle<Option<String>>) {
    let mut acceptor = SslAcceptor::mozilla_intermediate(SslMethod::tls()).unwrap();
    acceptor.set_private_key(key).unwrap();
    acceptor.set_certificate(cert).unwrap();
    acceptor.check_private_key().unwrap();
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        // A client that rejects the certificate ends the script here
        let stream = acceptor.accept(tcp).ok()?;

        let mut peer = H2Peer::new(stream);
        let head = peer.accept_upgrade();
        peer.headers(&[(":status", "200"), ("server", "tls-upstream")], false);
        peer.data(b"over tls", true);
        peer.drain();
        Some(head)
    });

    (addr, handle)
}

fn write_pem(cert: &X509, name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("h2csmuggler-{}-{}.pem", name, std::process::id()));
    std::fs::write(&path, cert.to_pem().unwrap()).unwrap();
    path
}

#[test]
fn test_tls_upgrade_without_verification() {
    let (cert, key) = self_signed();
    let (addr, upstream) = spawn_tls_upstream(&cert, &key);

    let tls = TlsConfig::client()
        .servername("localhost")
        .verify_peer(false)
        .build()
        .unwrap();
    let config = ProbeConfig::builder()
        .authority(addr.to_string())
        .tls(tls)
        .build()
        .unwrap();

    match Exchange::new(config).run().unwrap() {
        ExchangeResult::Http2(response) => {
            assert_eq!(response.status().code(), 200);
            assert_eq!(response.headers().get("Server"), Some("tls-upstream"));
            assert_eq!(response.body(), b"over tls");
        }
        ExchangeResult::Http1(response) => panic!("upgrade refused: {}", response.status().code()),
    }

    let head = upstream.join().unwrap().unwrap();
    assert!(head.contains("Upgrade: h2c\r\n"));
}

#[test]
fn test_tls_upgrade_with_trusted_ca() {
    let (cert, key) = self_signed();
    let ca_file = write_pem(&cert, "trusted-ca");
    let (addr, upstream) = spawn_tls_upstream(&cert, &key);

    let tls = TlsConfig::client()
        .servername("localhost")
        .verify_peer(true)
        .ca_file(&ca_file)
        .build()
        .unwrap();
    assert!(tls.verifies_peer());

    let config = ProbeConfig::builder()
        .authority(addr.to_string())
        .tls(tls)
        .build()
        .unwrap();
    let result = Exchange::new(config).run();
    let _ = std::fs::remove_file(&ca_file);

    assert!(matches!(result, Ok(ExchangeResult::Http2(_))), "{:?}", result);
    assert!(upstream.join().unwrap().is_some());
}

#[test]
fn test_tls_untrusted_certificate_rejected() {
    let (cert, key) = self_signed();
    let (addr, upstream) = spawn_tls_upstream(&cert, &key);

    let tls = TlsConfig::client()
        .servername("localhost")
        .verify_peer(true)
        .build()
        .unwrap();
    let config = ProbeConfig::builder()
        .authority(addr.to_string())
        .tls(tls)
        .build()
        .unwrap();

    let result = Exchange::new(config).run();
    assert!(matches!(result, Err(Error::Tls(TlsError::HandshakeFailed(_)))), "{:?}", result);
    assert!(upstream.join().unwrap().is_none());
}

#[test]
fn test_tls_certificate_for_other_host_rejected() {
    let (cert, key) = self_signed();
    let ca_file = write_pem(&cert, "other-host-ca");
    let (addr, upstream) = spawn_tls_upstream(&cert, &key);

    let tls = TlsConfig::client()
        .servername("wrong.example")
        .verify_peer(true)
        .ca_file(&ca_file)
        .build()
        .unwrap();
    let config = ProbeConfig::builder()
        .authority(addr.to_string())
        .tls(tls)
        .build()
        .unwrap();

    let result = Exchange::new(config).run();
    let _ = std::fs::remove_file(&ca_file);

    assert!(matches!(result, Err(Error::Tls(TlsError::HandshakeFailed(_)))), "{:?}", result);
    assert!(upstream.join().unwrap().is_none());
}
