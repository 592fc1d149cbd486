//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of paths, honours `Range: bytes=N-` with 206 Partial
//! Content, answers 404 for anything else and records every request. The
//! number of requests waiting in `delay` at once is tracked so tests can check
//! how many transfers the client runs concurrently.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Pause before sending each response.
    pub delay: Duration,
    /// Advertise the full length but close after this many body bytes.
    pub truncate_at: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            delay: Duration::ZERO,
            truncate_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub range: Option<String>,
}

#[derive(Default)]
struct Stats {
    requests: Mutex<Vec<Recorded>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

pub struct TestServer {
    base: String,
    stats: Arc<Stats>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.stats.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.stats.requests.lock().unwrap().len()
    }

    pub fn max_active(&self) -> usize {
        self.stats.max_active.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. `files` maps request paths
/// (e.g. "/a.bin") to bodies. The server runs until the process exits.
pub fn start(files: Vec<(&str, Vec<u8>)>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(
        files
            .into_iter()
            .map(|(path, body)| (path.to_string(), body))
            .collect(),
    );
    let stats = Arc::new(Stats::default());

    let server_stats = Arc::clone(&stats);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let files = Arc::clone(&files);
            let stats = Arc::clone(&server_stats);
            thread::spawn(move || handle(stream, &files, &stats, opts));
        }
    });

    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        stats,
    }
}

fn handle(mut stream: TcpStream, files: &HashMap<String, Vec<u8>>, stats: &Stats, opts: ServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (path, range) = parse_request(request);
    stats.requests.lock().unwrap().push(Recorded {
        path: path.clone(),
        range: range.clone(),
    });

    let now = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
    stats.max_active.fetch_max(now, Ordering::SeqCst);
    thread::sleep(opts.delay);
    stats.active.fetch_sub(1, Ordering::SeqCst);

    let body = match files.get(&path) {
        Some(body) => body,
        None => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
    };

    let total = body.len();
    let start = range
        .as_deref()
        .and_then(range_start)
        .filter(|_| opts.support_ranges);

    let (status, content_range, slice) = match start {
        Some(start) if start >= total => {
            let response = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                total
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        Some(start) => (
            "206 Partial Content",
            Some(format!("bytes {}-{}/{}", start, total - 1, total)),
            &body[start..],
        ),
        None => ("200 OK", None, &body[..]),
    };

    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        slice.len()
    );
    if let Some(value) = content_range {
        head.push_str(&format!("Content-Range: {}\r\n", value));
    }
    if opts.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    head.push_str("\r\n");

    let _ = stream.write_all(head.as_bytes());
    let sent = match opts.truncate_at {
        Some(limit) => &slice[..limit.min(slice.len())],
        None => slice,
    };
    let _ = stream.write_all(sent);
    let _ = stream.flush();
}

/// Returns (path, raw Range header value).
fn parse_request(request: &str) -> (String, Option<String>) {
    let mut lines = request.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let range = lines
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .map(|(_, value)| value.trim().to_string());
    (path, range)
}

fn range_start(value: &str) -> Option<usize> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}
