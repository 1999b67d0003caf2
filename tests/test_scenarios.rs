mod common;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use plainwire::client::{ClientError, Exchange, ExchangeOutcome, HttpClient, Payload, Target};
use plainwire::config::ClientConfig;
use plainwire::http::response::StatusCode;

use common::{TempDir, TestServer};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0xFF];

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_a_get_returns_file() {
    let server = TestServer::start(10_000);
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(server.client_config(downloads.path()));

    let outcome = client
        .exchange(Exchange::get(client.default_target("/index.html")))
        .await
        .unwrap();

    let ExchangeOutcome::Fetched { response, stored, .. } = outcome else {
        panic!("expected a 200");
    };
    assert_eq!(response.body, b"<h1>hello</h1>".to_vec());
    assert_eq!(response.content_type(), Some("text/html"));
    assert!(response.header("Last-Modified").is_some());

    let stored = stored.unwrap();
    assert_eq!(stored, downloads.path().join("index.html"));
    assert_eq!(std::fs::read(stored).unwrap(), b"<h1>hello</h1>".to_vec());
    assert_eq!(client.history().len(), 1);
    assert_eq!(client.connections().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_b_repeated_get_is_not_modified() {
    let server = TestServer::start(10_000);
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(server.client_config(downloads.path()));
    let target = client.default_target("/index.html");

    let first = client.exchange(Exchange::get(target.clone())).await.unwrap();
    assert_eq!(first.status(), StatusCode::Ok);
    assert!(client.freshness().get(&target).is_some());

    let second = client.exchange(Exchange::get(target.clone())).await.unwrap();
    assert!(matches!(second, ExchangeOutcome::NotModified { .. }));
    assert_eq!(client.history().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_c_root_redirect_is_followed_and_cached() {
    let server = TestServer::start(10_000);
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(server.client_config(downloads.path()));
    let root = client.default_target("/");
    let index = client.default_target("/index.html");

    let outcome = client.exchange(Exchange::get(root.clone())).await.unwrap();
    assert_eq!(outcome.status(), StatusCode::Ok);
    assert_eq!(outcome.target(), &index);
    assert_eq!(client.redirects().lookup(&root), Some(index.clone()));

    // The cached redirect skips the 301 and the cached date yields a 304.
    let again = client.exchange(Exchange::get(root)).await.unwrap();
    assert!(matches!(again, ExchangeOutcome::NotModified { ref target } if target == &index));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_d_text_post_is_stored_verbatim() {
    let server = TestServer::start(10_000);
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(server.client_config(downloads.path()));

    let payload = Payload::new("text/plain", "hello");
    let outcome = client
        .exchange(Exchange::post(client.default_target("/"), payload))
        .await
        .unwrap();

    let ExchangeOutcome::Fetched { response, stored, .. } = outcome else {
        panic!("expected a 200");
    };
    assert!(stored.is_none());
    let location = response.headers.first("Content-Location").unwrap();
    assert!(location.starts_with('/') && location.ends_with(".txt"));

    let file = server.receive.path().join(location.trim_start_matches('/'));
    assert_eq!(std::fs::read(file).unwrap(), b"hello".to_vec());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scenario_e_binary_post_is_decoded() {
    let server = TestServer::start(10_000);
    let downloads = TempDir::new("downloads");
    std::fs::create_dir(server.receive.path().join("images")).unwrap();
    let client = HttpClient::new(server.client_config(downloads.path()));

    let outcome = client
        .exchange(Exchange::post(
            client.default_target("/images"),
            Payload::new("image/png", PNG),
        ))
        .await
        .unwrap();

    let ExchangeOutcome::Fetched { response, .. } = outcome else {
        panic!("expected a 200");
    };
    let location = response.headers.first("Content-Location").unwrap();
    assert!(location.starts_with("/images/") && location.ends_with(".png"));

    let file = server.receive.path().join(location.trim_start_matches('/'));
    assert_eq!(std::fs::read(file).unwrap(), PNG.to_vec());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_download_is_decoded() {
    let server = TestServer::start(10_000);
    std::fs::write(server.public.path().join("logo.png"), PNG).unwrap();
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(server.client_config(downloads.path()));

    let outcome = client
        .exchange(Exchange::get(client.default_target("/logo.png")))
        .await
        .unwrap();

    let ExchangeOutcome::Fetched { response, stored, .. } = outcome else {
        panic!("expected a 200");
    };
    assert_eq!(response.content_type(), Some("image/png"));
    assert_eq!(response.body, STANDARD.encode(PNG).into_bytes());
    assert_eq!(std::fs::read(stored.unwrap()).unwrap(), PNG.to_vec());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_other_statuses_are_returned_as_is() {
    let server = TestServer::start(10_000);
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(server.client_config(downloads.path()));

    let outcome = client
        .exchange(Exchange::get(client.default_target("/nope.html")))
        .await
        .unwrap();

    assert!(matches!(outcome, ExchangeOutcome::Status { .. }));
    assert_eq!(outcome.status(), StatusCode::NotFound);
    assert!(client.history().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cached_connection_is_replaced_after_eviction() {
    let server = TestServer::start(150);
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(server.client_config(downloads.path()));
    let missing = client.default_target("/missing.html");

    let first = client.exchange(Exchange::get(missing.clone())).await.unwrap();
    assert_eq!(first.status(), StatusCode::NotFound);

    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    assert_eq!(server.handle.open_connections(), 0);

    let second = client.exchange(Exchange::get(missing)).await.unwrap();
    assert_eq!(second.status(), StatusCode::NotFound);
    assert_eq!(client.close_all(), 1);
}

/// Answers every request on every connection with a redirect back to itself.
fn spawn_redirect_loop() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    let reply = "HTTP/1.1 302 Found\r\nLocation:/again\r\n\r\n";
                    if stream.write_all(reply.as_bytes()).is_err() {
                        break;
                    }
                }
            });
        }
    });
    port
}

/// Answers the first request on the first connection, then drops that
/// connection when its second request arrives. Later connections answer
/// everything. Returns the port and the number of requests received.
fn spawn_dropping_server() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    thread::spawn(move || {
        for (index, stream) in listener.incoming().enumerate() {
            let Ok(mut stream) = stream else { break };
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                let mut served = 0;
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    if index == 0 && served == 1 {
                        break;
                    }
                    served += 1;
                    if stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n").is_err() {
                        break;
                    }
                }
            });
        }
    });
    (port, requests)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stale_connection_retry_is_limited_to_get() {
    let downloads = TempDir::new("downloads");

    let (port, requests) = spawn_dropping_server();
    let client = HttpClient::new(ClientConfig {
        default_port: port,
        receive_dir: downloads.path().to_path_buf(),
        io_timeout_ms: 3000,
        settle_ms: 30,
        ..ClientConfig::default()
    });
    let upload = || Exchange::post(client.default_target("/"), Payload::new("text/plain", "once"));

    client.exchange(upload()).await.unwrap();
    let err = client.exchange(upload()).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed | ClientError::Transport(_)));
    assert_eq!(requests.load(Ordering::SeqCst), 2);

    let (port, requests) = spawn_dropping_server();
    let client = HttpClient::new(ClientConfig {
        default_port: port,
        receive_dir: downloads.path().to_path_buf(),
        io_timeout_ms: 3000,
        settle_ms: 30,
        ..ClientConfig::default()
    });
    let page = client.default_target("/page.txt");

    client.exchange(Exchange::get(page.clone())).await.unwrap();
    let outcome = client.exchange(Exchange::get(page)).await.unwrap();
    assert_eq!(outcome.status(), StatusCode::Ok);
    assert_eq!(requests.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_loops_are_bounded() {
    let port = spawn_redirect_loop();
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(ClientConfig {
        default_port: port,
        receive_dir: downloads.path().to_path_buf(),
        settle_ms: 20,
        max_redirects: 3,
        ..ClientConfig::default()
    });

    let result = client
        .exchange(Exchange::get(Target::new("127.0.0.1", port, "/start")))
        .await;

    assert!(matches!(result, Err(ClientError::TooManyRedirects(3))));
    assert!(client.redirects().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_server_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let downloads = TempDir::new("downloads");
    let client = HttpClient::new(ClientConfig {
        receive_dir: downloads.path().to_path_buf(),
        ..ClientConfig::default()
    });

    let result = client
        .exchange(Exchange::get(Target::new("127.0.0.1", port, "/")))
        .await;

    assert!(matches!(result, Err(ClientError::Transport(_))));
}
