//! Shared helpers for fetchpipe tests.
//!
//! [`HttpFixture`] is a small in-process HTTP/1.1 server that serves one
//! payload at every path. It understands `HEAD` and single `Range: bytes=a-b`
//! requests, keeps connections alive, and records every request it sees so
//! tests can assert on the exact chunk sequence a client issued. Behaviour
//! toggles reproduce awkward servers: no `HEAD`, no `Content-Length`, ignored
//! ranges, forced connection close, chunked bodies, fixed error statuses and
//! a server that stops answering reads.

#![deny(unsafe_code)]

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tempfile::TempDir;

/// How long a fixture built with [`HttpFixtureBuilder::stalling_reads`] holds
/// an unanswered `GET`.
pub const STALL_DURATION: Duration = Duration::from_secs(10);

/// A request observed by an [`HttpFixture`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target as sent on the request line.
    pub target: String,
    /// Raw value of the `Range` header, if any.
    pub range: Option<String>,
}

#[derive(Clone, Debug)]
struct Behaviour {
    head_supported: bool,
    head_content_length: bool,
    honor_range: bool,
    close_after_response: bool,
    chunked: bool,
    status: Option<u16>,
    stall_reads: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            head_supported: true,
            head_content_length: true,
            honor_range: true,
            close_after_response: false,
            chunked: false,
            status: None,
            stall_reads: false,
        }
    }
}

/// Builder for [`HttpFixture`].
#[derive(Debug)]
pub struct HttpFixtureBuilder {
    body: Vec<u8>,
    behaviour: Behaviour,
}

impl HttpFixtureBuilder {
    /// Answers `HEAD` with `405 Method Not Allowed`.
    #[must_use]
    pub fn without_head(mut self) -> Self {
        self.behaviour.head_supported = false;
        self
    }

    /// Omits `Content-Length` from `HEAD` responses.
    #[must_use]
    pub fn without_head_content_length(mut self) -> Self {
        self.behaviour.head_content_length = false;
        self
    }

    /// Serves the full body with `200 OK` even when a range was requested.
    #[must_use]
    pub fn ignoring_range(mut self) -> Self {
        self.behaviour.honor_range = false;
        self
    }

    /// Sends `Connection: close` and drops the connection after every response.
    #[must_use]
    pub fn closing_connections(mut self) -> Self {
        self.behaviour.close_after_response = true;
        self
    }

    /// Sends `GET` bodies with `Transfer-Encoding: chunked`.
    #[must_use]
    pub fn chunked(mut self) -> Self {
        self.behaviour.chunked = true;
        self
    }

    /// Answers every request with `status` and an empty body.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.behaviour.status = Some(status);
        self
    }

    /// Answers `HEAD` normally but never answers a `GET`.
    ///
    /// The connection is held open for [`STALL_DURATION`] and then dropped.
    #[must_use]
    pub fn stalling_reads(mut self) -> Self {
        self.behaviour.stall_reads = true;
        self
    }

    /// Binds to an ephemeral localhost port and starts serving.
    pub fn spawn(self) -> io::Result<HttpFixture> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            body: self.body,
            behaviour: self.behaviour,
            requests: Mutex::new(Vec::new()),
            connections: Mutex::new(0),
        });
        let stop = Arc::new(AtomicBool::new(false));

        let accept_shared = Arc::clone(&shared);
        let accept_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("http-fixture".to_owned())
            .spawn(move || accept_loop(&listener, &accept_shared, &accept_stop))?;

        Ok(HttpFixture {
            addr,
            shared,
            stop,
            handle: Some(handle),
        })
    }
}

struct Shared {
    body: Vec<u8>,
    behaviour: Behaviour,
    requests: Mutex<Vec<RecordedRequest>>,
    connections: Mutex<usize>,
}

/// In-process HTTP/1.1 server for transfer tests.
///
/// The server stops when the fixture is dropped.
pub struct HttpFixture {
    addr: SocketAddr,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HttpFixture {
    /// Starts configuring a fixture that serves `body`.
    #[must_use]
    pub fn builder(body: impl Into<Vec<u8>>) -> HttpFixtureBuilder {
        HttpFixtureBuilder {
            body: body.into(),
            behaviour: Behaviour::default(),
        }
    }

    /// Starts a well-behaved fixture serving `body`.
    pub fn serve(body: impl Into<Vec<u8>>) -> io::Result<Self> {
        Self::builder(body).spawn()
    }

    /// Returns the socket address the fixture listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns an `http://` URL for `path` on this fixture.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Returns every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Returns the `Range` headers of all `GET` requests, in arrival order.
    #[must_use]
    pub fn get_ranges(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == "GET")
            .filter_map(|request| request.range)
            .collect()
    }

    /// Returns the number of TCP connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.shared.connections.lock().map_or(0, |count| *count)
    }
}

impl Drop for HttpFixture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: &TcpListener, shared: &Arc<Shared>, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if let Ok(mut count) = shared.connections.lock() {
                    *count += 1;
                }
                let shared = Arc::clone(shared);
                let _ = thread::Builder::new()
                    .name("http-fixture-conn".to_owned())
                    .spawn(move || {
                        let _ = serve_connection(stream, &shared);
                    });
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(2));
            }
            Err(_) => break,
        }
    }
}

fn serve_connection(stream: TcpStream, shared: &Shared) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line)? == 0 {
            return Ok(());
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_owned();
        let target = parts.next().unwrap_or_default().to_owned();

        let mut range = None;
        let mut client_close = false;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim();
                if name.eq_ignore_ascii_case("range") {
                    range = Some(value.to_owned());
                } else if name.eq_ignore_ascii_case("connection")
                    && value.eq_ignore_ascii_case("close")
                {
                    client_close = true;
                }
            }
        }

        if let Ok(mut requests) = shared.requests.lock() {
            requests.push(RecordedRequest {
                method: method.clone(),
                target,
                range: range.clone(),
            });
        }

        if shared.behaviour.stall_reads && method == "GET" {
            thread::sleep(STALL_DURATION);
            return Ok(());
        }

        let close = shared.behaviour.close_after_response || client_close;
        respond(&mut writer, shared, &method, range.as_deref(), close)?;
        writer.flush()?;
        if close {
            return Ok(());
        }
    }
}

fn respond(
    out: &mut TcpStream,
    shared: &Shared,
    method: &str,
    range: Option<&str>,
    close: bool,
) -> io::Result<()> {
    let behaviour = &shared.behaviour;
    let body = shared.body.as_slice();
    let total = body.len();
    let connection = if close { "close" } else { "keep-alive" };

    if let Some(status) = behaviour.status {
        return write!(
            out,
            "HTTP/1.1 {status} Fixture\r\nContent-Length: 0\r\nConnection: {connection}\r\n\r\n"
        );
    }

    if method == "HEAD" {
        if !behaviour.head_supported {
            return write!(
                out,
                "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: {connection}\r\n\r\n"
            );
        }
        let length = if behaviour.head_content_length {
            format!("Content-Length: {total}\r\n")
        } else {
            String::new()
        };
        return write!(
            out,
            "HTTP/1.1 200 OK\r\n{length}Accept-Ranges: bytes\r\nConnection: {connection}\r\n\r\n"
        );
    }

    let requested = range.filter(|_| behaviour.honor_range).map(parse_range);
    let (status, extra, slice) = match requested {
        Some(Some((start, _))) if start >= total => {
            return write!(
                out,
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{total}\r\nContent-Length: 0\r\nConnection: {connection}\r\n\r\n"
            );
        }
        Some(Some((start, end))) => {
            let end = end.min(total - 1);
            (
                "206 Partial Content",
                format!("Content-Range: bytes {start}-{end}/{total}\r\n"),
                &body[start..=end],
            )
        }
        Some(None) => {
            return write!(
                out,
                "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: {connection}\r\n\r\n"
            );
        }
        None => ("200 OK", String::new(), body),
    };

    if behaviour.chunked {
        write!(
            out,
            "HTTP/1.1 {status}\r\n{extra}Transfer-Encoding: chunked\r\nConnection: {connection}\r\n\r\n"
        )?;
        if !slice.is_empty() {
            write!(out, "{:x}\r\n", slice.len())?;
            out.write_all(slice)?;
            out.write_all(b"\r\n")?;
        }
        return out.write_all(b"0\r\n\r\n");
    }

    write!(
        out,
        "HTTP/1.1 {status}\r\n{extra}Content-Length: {}\r\nConnection: {connection}\r\n\r\n",
        slice.len()
    )?;
    out.write_all(slice)
}

/// Parses `bytes=a-b` into an inclusive range.
fn parse_range(value: &str) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    (start <= end).then_some((start, end))
}

/// Writes `contents` into a fresh temporary directory.
///
/// Returns the directory guard together with the file path; the file lives as
/// long as the guard.
pub fn scratch_file(name: &str, contents: &[u8]) -> io::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(name);
    std::fs::write(&path, contents)?;
    Ok((dir, path))
}

/// Returns `len` bytes of a repeating, position-dependent pattern.
#[must_use]
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
