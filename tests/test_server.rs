mod common;

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use plainwire::http::parser::parse_http_response;
use plainwire::http::response::{Response, StatusCode};

use common::TestServer;

fn connect(server: &TestServer) -> TcpStream {
    let stream = TcpStream::connect(server.handle.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    stream
}

/// Reads until the peer pauses after sending something, closes, or 3s pass.
fn read_available(stream: &mut TcpStream) -> (Vec<u8>, bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    while Instant::now() < deadline {
        match stream.read(&mut chunk) {
            Ok(0) => return (buf, true),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if !buf.is_empty() {
                    break;
                }
            }
            Err(_) => return (buf, true),
        }
    }
    (buf, false)
}

fn exchange(stream: &mut TcpStream, request: &str) -> Response {
    stream.write_all(request.as_bytes()).unwrap();
    let (raw, _) = read_available(stream);
    parse_http_response(&raw).unwrap()
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_get_existing_file() {
    let server = TestServer::start(10_000);
    let mut stream = connect(&server);

    let response = exchange(&mut stream, "GET /index.html HTTP/1.1\r\nHost:127.0.0.1\r\n\r\n");

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body, b"<h1>hello</h1>".to_vec());
    assert_eq!(response.content_type(), Some("text/html"));
    assert!(response.header("Last-Modified").is_some());
    assert!(response.header("Date").is_some());
    assert!(response.header("Server").unwrap().starts_with("plainwire/"));
}

#[test]
fn test_connection_is_kept_alive_between_exchanges() {
    let server = TestServer::start(10_000);
    let mut stream = connect(&server);

    let first = exchange(&mut stream, "GET /index.html HTTP/1.1\r\n\r\n");
    let second = exchange(&mut stream, "GET /missing.html HTTP/1.1\r\n\r\n");

    assert_eq!(first.status, StatusCode::Ok);
    assert_eq!(second.status, StatusCode::NotFound);
    assert_eq!(server.handle.open_connections(), 1);
}

#[test]
fn test_root_redirects_to_index_using_host() {
    let server = TestServer::start(10_000);
    let mut stream = connect(&server);

    let response = exchange(&mut stream, "GET / HTTP/1.1\r\nHost:example.test:8089\r\n\r\n");

    assert_eq!(response.status, StatusCode::MovedPermanently);
    assert_eq!(
        response.headers.first("Location"),
        Some("http://example.test:8089/index.html")
    );
    assert!(response.body.is_empty());
}

#[test]
fn test_traversal_and_subdirectories_are_not_found() {
    let server = TestServer::start(10_000);
    std::fs::create_dir(server.public.path().join("sub")).unwrap();
    let mut stream = connect(&server);

    let up = exchange(&mut stream, "GET /../etc/passwd HTTP/1.1\r\n\r\n");
    let sub = exchange(&mut stream, "GET /sub HTTP/1.1\r\n\r\n");

    assert_eq!(up.status, StatusCode::NotFound);
    assert_eq!(sub.status, StatusCode::NotFound);
}

#[test]
fn test_post_to_a_file_is_not_allowed() {
    let server = TestServer::start(10_000);
    std::fs::write(server.receive.path().join("taken.txt"), "x").unwrap();
    let mut stream = connect(&server);

    let file = exchange(
        &mut stream,
        "POST /taken.txt HTTP/1.1\r\nContent-Type:text/plain\r\n\r\nhello",
    );
    let missing = exchange(
        &mut stream,
        "POST /nowhere HTTP/1.1\r\nContent-Type:text/plain\r\n\r\nhello",
    );

    assert_eq!(file.status, StatusCode::MethodNotAllowed);
    assert_eq!(missing.status, StatusCode::NotFound);
}

#[test]
fn test_post_to_missing_directory_is_not_found() {
    let server = TestServer::start(10_000);
    let mut stream = connect(&server);

    let response = exchange(
        &mut stream,
        "POST /uploads/later HTTP/1.1\r\nContent-Type:text/plain\r\n\r\nhello",
    );

    assert_eq!(response.status, StatusCode::NotFound);
    assert!(response.header("Date").is_some());
    assert!(response.header("Server").unwrap().starts_with("plainwire/"));
    assert!(response.body.is_empty());
    assert!(!server.receive.path().join("uploads").exists());
    assert_eq!(std::fs::read_dir(server.receive.path()).unwrap().count(), 0);
}

#[test]
fn test_malformed_request_closes_connection() {
    let server = TestServer::start(10_000);
    let mut stream = connect(&server);

    stream.write_all(b"BOGUS\r\n\r\n").unwrap();
    let (raw, closed) = read_available(&mut stream);

    assert!(raw.is_empty());
    assert!(closed);
    assert!(wait_for(|| server.handle.open_connections() == 0));
}

#[test]
fn test_idle_connection_is_evicted() {
    let server = TestServer::start(200);
    let mut stream = connect(&server);

    let response = exchange(&mut stream, "GET /index.html HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(server.handle.open_connections(), 1);

    assert!(wait_for(|| server.handle.open_connections() == 0));
    let (raw, closed) = read_available(&mut stream);
    assert!(raw.is_empty());
    assert!(closed);
}

#[test]
fn test_active_connection_outlives_the_timeout() {
    let server = TestServer::start(400);
    let mut stream = connect(&server);

    // Keep talking at a quarter of the timeout for well past the timeout.
    for _ in 0..8 {
        let response = exchange(&mut stream, "GET /index.html HTTP/1.1\r\n\r\n");
        assert_eq!(response.status, StatusCode::Ok);
        thread::sleep(Duration::from_millis(100));
    }
    assert_eq!(server.handle.open_connections(), 1);
}

#[test]
fn test_shutdown_stops_every_loop() {
    let server = TestServer::start(10_000);
    let addr = server.handle.local_addr();
    assert!(server.handle.is_running());

    let TestServer { handle, .. } = server;
    handle.shutdown();

    let refused = wait_for(|| TcpStream::connect(addr).is_err());
    assert!(refused);
}
