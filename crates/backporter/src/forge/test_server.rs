//! Canned-response HTTP server for adapter tests.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Header, Response, Server, StatusCode};

#[derive(Debug, Clone)]
pub(crate) struct Seen {
    pub method: String,
    /// Path plus query string.
    pub url: String,
    pub auth: Option<String>,
    pub body: String,
}

pub(crate) struct Route {
    pub method: &'static str,
    pub path: String,
    pub status: u16,
    pub body: String,
}

pub(crate) fn route(method: &'static str, path: &str, status: u16, body: &str) -> Route {
    Route {
        method,
        path: path.to_string(),
        status,
        body: body.to_string(),
    }
}

pub(crate) struct TestServer {
    pub base_url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
    handle: thread::JoinHandle<()>,
}

impl TestServer {
    /// Wait for the expected requests and return them in arrival order.
    pub fn finish(self) -> Vec<Seen> {
        self.handle.join().expect("server thread");
        let seen = self.seen.lock().expect("lock");
        seen.clone()
    }
}

/// Serve `expected_requests` requests, matching on method and path (query
/// ignored). Unmatched requests get a 404.
pub(crate) fn spawn(mut routes: Vec<Route>, expected_requests: usize) -> TestServer {
    let server = Server::http("127.0.0.1:0").expect("server");
    let base_url = format!("http://{}", server.server_addr());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_thread = Arc::clone(&seen);

    let handle = thread::spawn(move || {
        for _ in 0..expected_requests {
            let mut req = server.recv().expect("request");
            let url = req.url().to_string();
            let path = url.split('?').next().unwrap_or_default().to_string();
            let method = req.method().to_string();
            let auth = req
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string());
            let mut body = String::new();
            req.as_reader().read_to_string(&mut body).expect("body");
            seen_thread.lock().expect("lock").push(Seen {
                method: method.clone(),
                url,
                auth,
                body,
            });

            let (status, payload) = match routes
                .iter()
                .position(|r| r.method == method && r.path == path)
            {
                Some(idx) => {
                    let r = routes.remove(idx);
                    (r.status, r.body)
                }
                None => (404, r#"{"message":"Not Found"}"#.to_string()),
            };

            let resp = Response::from_string(payload)
                .with_status_code(StatusCode(status))
                .with_header(
                    Header::from_bytes("Content-Type", "application/json").expect("header"),
                );
            req.respond(resp).expect("respond");
        }
    });

    TestServer {
        base_url,
        seen,
        handle,
    }
}
