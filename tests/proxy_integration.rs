//! Sneaky reverse proxy tests
//!
//! A raw TCP client talks HTTP/1.1 to the proxy, which forwards the request
//! as an h2c upgrade to a scripted upstream.

mod common;

use common::spawn_upstream;
use h2csmuggler::http::{HttpRequest, HttpResponse, Status};
use h2csmuggler::smuggle::{self, ProbeConfig, SmuggleTransport, SneakyProxy, UpgradeDirector};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{mpsc, Mutex};
use std::thread;

fn start_proxy<T: smuggle::RoundTrip + 'static>(upstream: &str, transport: T) -> SocketAddr {
    let director = UpgradeDirector::new(upstream).header("X-Debug", "Upgrade Request");
    let proxy = SneakyProxy::bind("127.0.0.1:0", director, transport).unwrap();
    let addr = proxy.local_addr().unwrap();

    thread::spawn(move || proxy.serve());
    addr
}

fn send_raw(proxy: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(proxy).unwrap();
    stream.write_all(request.as_bytes()).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn test_proxy_relays_smuggled_response() {
    let (upstream_addr, upstream) = spawn_upstream(|mut peer| {
        let head = peer.accept_upgrade();
        peer.headers(
            &[(":status", "200"), ("content-type", "text/plain"), ("content-length", "999")],
            false,
        );
        peer.data(b"Hello, ", false);
        peer.data(b"World", true);
        peer.drain();
        head
    });

    let config = ProbeConfig::builder()
        .authority(upstream_addr.to_string())
        .build()
        .unwrap();
    let proxy = start_proxy(config.authority(), SmuggleTransport::new(config.clone()));

    let response = send_raw(proxy, "GET /flag HTTP/1.1\r\nHost: proxy.local\r\nAccept: */*\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
    assert!(response.contains("Content-Type: text/plain\r\n"));
    assert!(response.contains("Content-Length: 12\r\n"));
    assert!(!response.contains("999"));
    assert!(response.ends_with("\r\n\r\nHello, World"));
    assert!(!response.contains(smuggle::PARTIAL_HEADER));

    let head = upstream.join().unwrap();
    assert!(head.starts_with("GET /flag HTTP/1.1\r\n"));
    assert!(head.contains(&format!("Host: {}\r\n", config.authority())));
    assert!(head.contains("X-Forwarded-Host: proxy.local\r\n"));
    assert!(head.contains(&format!("X-Origin-Host: {}\r\n", config.authority())));
    assert!(head.contains("X-Debug: Upgrade Request\r\n"));
    assert!(head.contains("Upgrade: h2c\r\n"));
    assert!(head.contains("Accept: */*\r\n"));
}

#[test]
fn test_proxy_marks_cut_response() {
    let (upstream_addr, upstream) = spawn_upstream(|mut peer| {
        peer.accept_upgrade();
        peer.headers(&[(":status", "200")], false);
        peer.data(b"half", false);
        peer.goaway(0);
        peer.drain();
    });

    let config = ProbeConfig::builder()
        .authority(upstream_addr.to_string())
        .build()
        .unwrap();
    let authority = config.authority().to_string();
    let proxy = start_proxy(&authority, SmuggleTransport::new(config));

    let response = send_raw(proxy, "GET / HTTP/1.1\r\nHost: proxy.local\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
    assert!(response.contains(&format!(
        "{}: connection aborted: GOAWAY (last stream 1, NO_ERROR (0x0))\r\n",
        smuggle::PARTIAL_HEADER
    )));
    assert!(response.ends_with("\r\n\r\nhalf"));
    upstream.join().unwrap();
}

#[test]
fn test_proxy_passes_refused_upgrade_through() {
    let (upstream_addr, upstream) = spawn_upstream(|mut peer| {
        peer.read_request_head();
        peer.send(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 6\r\nX-Upstream: yes\r\n\r\ndenied");
        peer.drain();
    });

    let config = ProbeConfig::builder()
        .authority(upstream_addr.to_string())
        .build()
        .unwrap();
    let authority = config.authority().to_string();
    let proxy = start_proxy(&authority, SmuggleTransport::new(config));

    let response = send_raw(proxy, "GET / HTTP/1.1\r\nHost: proxy.local\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{}", response);
    assert!(response.contains("X-Upstream: yes\r\n"));
    assert!(response.ends_with("denied"));
    upstream.join().unwrap();
}

#[test]
fn test_proxy_reports_bad_gateway() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let config = ProbeConfig::builder()
        .authority(dead.to_string())
        .build()
        .unwrap();
    let authority = config.authority().to_string();
    let proxy = start_proxy(&authority, SmuggleTransport::new(config));

    let response = send_raw(proxy, "GET / HTTP/1.1\r\nHost: proxy.local\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 502 Bad Gateway\r\n"), "{}", response);
}

#[test]
fn test_proxy_forwards_request_body() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);

    let transport = move |request: HttpRequest| -> smuggle::Result<HttpResponse> {
        let body = request.body().to_vec();
        tx.lock().unwrap().send(request).unwrap();
        Ok(HttpResponse::builder().status(Status::OK).body(body).build())
    };
    let proxy = start_proxy("upstream:80", transport);

    let response = send_raw(
        proxy,
        "POST /submit HTTP/1.1\r\nHost: proxy.local\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ndata\r\n0\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 4\r\n"));
    assert!(response.ends_with("data"));

    let forwarded = rx.recv().unwrap();
    assert_eq!(forwarded.uri(), "/submit");
    assert_eq!(forwarded.headers().get("Content-Length"), Some("4"));
    assert!(!forwarded.headers().contains("Transfer-Encoding"));
    assert_eq!(forwarded.headers().get("Connection"), Some("Upgrade, HTTP2-Settings"));
}
