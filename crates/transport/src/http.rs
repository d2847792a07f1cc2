//! Minimal HTTP/1.1 client for sized, ranged reads.
//!
//! One persistent connection is kept per source. Every read is a
//! `GET` with `Range: bytes=a-b`; the response body is copied straight into
//! the caller's region. Servers that ignore the range header are tolerated by
//! skipping the prefix of the full body and dropping the connection
//! afterwards, so the next request starts on a fresh socket.
//!
//! ```text
//! size query:  HEAD ──▶ Content-Length ─────────────────────────▶ size
//!                  └──▶ (none) GET bytes=0-0 ──▶ Content-Range ──▶ size
//! read:        GET bytes=off-(off+len-1) ──▶ 206 ──▶ body into region
//!                                        └──▶ 200 ──▶ skip off, read len
//!                                        └──▶ 416 ──▶ end of data
//! ```

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, trace};

use crate::descriptor::RemoteDescriptor;
use crate::error::TransportError;

const MAX_HEADER_LINES: usize = 128;
const MAX_HEADER_LINE_LEN: u64 = 8 * 1024;
const USER_AGENT: &str = concat!("fetchpipe/", env!("CARGO_PKG_VERSION"));

/// Ranged HTTP client bound to a single resource.
#[derive(Debug)]
pub(crate) struct HttpClient {
    descriptor: RemoteDescriptor,
    connect_timeout: Option<Duration>,
    connection: Option<Connection>,
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<TcpStream>,
    responses: usize,
}

impl Connection {
    const fn is_reused(&self) -> bool {
        self.responses > 0
    }
}

/// Status line and headers of a response.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    version: String,
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn content_length(&self) -> Result<Option<u64>, TransportError> {
        self.header("content-length")
            .map(|value| {
                value.trim().parse::<u64>().map_err(|_| {
                    TransportError::MalformedResponse(format!("bad Content-Length '{value}'"))
                })
            })
            .transpose()
    }

    fn content_range(&self) -> Result<Option<ContentRange>, TransportError> {
        self.header("content-range")
            .map(|value| {
                parse_content_range(value).ok_or_else(|| {
                    TransportError::MalformedResponse(format!("bad Content-Range '{value}'"))
                })
            })
            .transpose()
    }

    fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    }

    fn keeps_alive(&self) -> bool {
        match self.header("connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version != "HTTP/1.0",
        }
    }

    const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    fn status_error(&self) -> TransportError {
        TransportError::Status {
            status: self.status,
            reason: self.reason.clone(),
        }
    }
}

/// Parsed `Content-Range: bytes first-last/total` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub(crate) span: Option<(u64, u64)>,
    pub(crate) total: Option<u64>,
}

/// Parses `bytes a-b/n`, `bytes a-b/*` and `bytes */n`.
pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;

    let span = match span.trim() {
        "*" => None,
        span => {
            let (first, last) = span.split_once('-')?;
            let first = first.trim().parse::<u64>().ok()?;
            let last = last.trim().parse::<u64>().ok()?;
            if last < first {
                return None;
            }
            Some((first, last))
        }
    };
    let total = match total.trim() {
        "*" => None,
        total => Some(total.parse::<u64>().ok()?),
    };
    if span.is_none() && total.is_none() {
        return None;
    }
    if let (Some((_, last)), Some(total)) = (span, total) {
        if last >= total {
            return None;
        }
    }
    Some(ContentRange { span, total })
}

impl HttpClient {
    pub(crate) const fn new(descriptor: RemoteDescriptor, connect_timeout: Option<Duration>) -> Self {
        Self {
            descriptor,
            connect_timeout,
            connection: None,
        }
    }

    /// Opens the connection ahead of the first request.
    pub(crate) fn connect(&mut self) -> Result<(), TransportError> {
        if self.connection.is_none() {
            self.connection = Some(self.dial()?);
        }
        Ok(())
    }

    /// Determines the resource size.
    pub(crate) fn remote_size(&mut self) -> Result<u64, TransportError> {
        let (connection, head) = self.request("HEAD", None)?;
        let from_head = if head.is_success() {
            head.content_length()?
        } else {
            None
        };
        self.release(connection, &head);

        if let Some(size) = from_head {
            debug!(target: "fetchpipe::connect", url = %self.descriptor, size, "size from HEAD");
            return Ok(size);
        }

        debug!(
            target: "fetchpipe::connect",
            url = %self.descriptor,
            status = head.status,
            "HEAD did not report a size, probing with a ranged GET"
        );

        let (mut connection, head) = self.request("GET", Some((0, 0)))?;
        match head.status {
            206 | 416 => {
                let total = head.content_range()?.and_then(|range| range.total);
                if head.is_chunked() {
                    return Err(TransportError::ChunkedBody);
                }
                discard(&mut connection, head.content_length()?.unwrap_or(0))?;
                self.release(connection, &head);
                let size = total.ok_or_else(|| self.unknown_size())?;
                debug!(target: "fetchpipe::connect", url = %self.descriptor, size, "size from Content-Range");
                Ok(size)
            }
            200 => {
                // Full body follows; leave it unread and drop the socket.
                let size = if head.is_chunked() {
                    None
                } else {
                    head.content_length()?
                };
                size.ok_or_else(|| self.unknown_size())
            }
            _ => Err(head.status_error()),
        }
    }

    /// Reads up to `buf.len()` bytes at `offset`. Returns `Ok(0)` past the end.
    pub(crate) fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let last = offset + buf.len() as u64 - 1;
        let (mut connection, head) = self.request("GET", Some((offset, last)))?;

        match head.status {
            206 => {
                if head.is_chunked() {
                    return Err(TransportError::ChunkedBody);
                }
                let length = head.content_length()?.ok_or_else(|| {
                    TransportError::MalformedResponse("206 response without Content-Length".into())
                })?;
                if let Some(range) = head.content_range()? {
                    if range.span.map(|(first, _)| first) != Some(offset) {
                        return Err(TransportError::MalformedResponse(format!(
                            "requested bytes from {offset} but server sent {:?}",
                            range.span
                        )));
                    }
                }

                let take = usize::try_from(length).map_or(buf.len(), |len| len.min(buf.len()));
                connection.reader.read_exact(&mut buf[..take])?;
                discard(&mut connection, length - take as u64)?;
                self.release(connection, &head);
                trace!(target: "fetchpipe::io", offset, bytes = take, "range received");
                Ok(take)
            }
            200 => {
                if head.is_chunked() {
                    return Err(TransportError::ChunkedBody);
                }
                debug!(
                    target: "fetchpipe::connect",
                    url = %self.descriptor,
                    offset,
                    "server ignored Range, reading from the full body"
                );
                let length = head.content_length()?;
                let mut body: Box<dyn Read + '_> = match length {
                    Some(length) => Box::new((&mut connection.reader).take(length)),
                    None => Box::new(&mut connection.reader),
                };
                let skipped = io::copy(&mut (&mut body).take(offset), &mut io::sink())?;
                if skipped < offset {
                    return Ok(0);
                }
                let filled = read_full(&mut body, buf)?;
                // Rest of the body is left unread; the connection is dropped.
                Ok(filled)
            }
            416 => {
                discard(&mut connection, head.content_length()?.unwrap_or(0))?;
                self.release(connection, &head);
                Ok(0)
            }
            _ => Err(head.status_error()),
        }
    }

    fn unknown_size(&self) -> TransportError {
        TransportError::UnknownSize(self.descriptor.to_string())
    }

    fn dial(&self) -> Result<Connection, TransportError> {
        let authority = self.descriptor.authority().to_owned();
        let connect_error = |source| TransportError::Connect {
            authority: authority.clone(),
            source,
        };

        let addrs = self
            .descriptor
            .url()
            .socket_addrs(|| Some(80))
            .map_err(connect_error)?;

        let mut last_error = None;
        for addr in addrs {
            let attempt = match self.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(connect_error)?;
                    debug!(target: "fetchpipe::connect", %addr, "connected");
                    return Ok(Connection {
                        reader: BufReader::new(stream),
                        responses: 0,
                    });
                }
                Err(error) => {
                    debug!(target: "fetchpipe::connect", %addr, %error, "connect attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(connect_error(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    /// Sends a request and reads the response head.
    ///
    /// A reused connection that turns out to be closed by the peer is replaced
    /// once before giving up.
    fn request(
        &mut self,
        method: &str,
        range: Option<(u64, u64)>,
    ) -> Result<(Connection, ResponseHead), TransportError> {
        let request = self.render_request(method, range);
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.dial()?,
        };

        let head = match exchange(&mut connection, &request) {
            Ok(head) => head,
            Err(TransportError::Io(error)) if connection.is_reused() && is_stale(&error) => {
                debug!(target: "fetchpipe::connect", %error, "kept-alive connection went away, reconnecting");
                connection = self.dial()?;
                exchange(&mut connection, &request)?
            }
            Err(error) => return Err(error),
        };

        trace!(
            target: "fetchpipe::connect",
            method,
            status = head.status,
            "response received"
        );
        Ok((connection, head))
    }

    /// Returns a connection whose body has been fully consumed to the pool.
    fn release(&mut self, mut connection: Connection, head: &ResponseHead) {
        if head.keeps_alive() {
            connection.responses += 1;
            self.connection = Some(connection);
        }
    }

    fn render_request(&self, method: &str, range: Option<(u64, u64)>) -> String {
        let mut request = format!(
            "{method} {target} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nAccept-Encoding: identity\r\nConnection: keep-alive\r\n",
            target = self.descriptor.request_target(),
            host = self.descriptor.authority(),
        );
        if let Some((first, last)) = range {
            request.push_str(&format!("Range: bytes={first}-{last}\r\n"));
        }
        request.push_str("\r\n");
        request
    }
}

fn exchange(connection: &mut Connection, request: &str) -> Result<ResponseHead, TransportError> {
    let stream = connection.reader.get_mut();
    stream.write_all(request.as_bytes())?;
    stream.flush()?;
    read_head(&mut connection.reader)
}

fn is_stale(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Reads the status line and headers.
pub(crate) fn read_head<R: BufRead>(reader: &mut R) -> Result<ResponseHead, TransportError> {
    let mut line = String::new();
    if read_bounded_line(reader, &mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before a response arrived",
        )
        .into());
    }

    let status_line = line.trim_end();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(TransportError::MalformedResponse(format!(
            "unexpected status line '{status_line}'"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            TransportError::MalformedResponse(format!("unexpected status line '{status_line}'"))
        })?;
    let reason = parts.next().unwrap_or_default().to_owned();
    let version = version.to_owned();

    let mut headers = Vec::new();
    loop {
        line.clear();
        if read_bounded_line(reader, &mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside response headers",
            )
            .into());
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if headers.len() == MAX_HEADER_LINES {
            return Err(TransportError::MalformedResponse(
                "too many header lines".into(),
            ));
        }
        let (name, value) = header.split_once(':').ok_or_else(|| {
            TransportError::MalformedResponse(format!("bad header line '{header}'"))
        })?;
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    Ok(ResponseHead {
        version,
        status,
        reason,
        headers,
    })
}

/// Reads one line of at most [`MAX_HEADER_LINE_LEN`] bytes.
fn read_bounded_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<usize, TransportError> {
    let read = (&mut *reader).take(MAX_HEADER_LINE_LEN).read_line(line)?;
    if read as u64 == MAX_HEADER_LINE_LEN && !line.ends_with('\n') {
        return Err(TransportError::MalformedResponse(format!(
            "response header line exceeds {MAX_HEADER_LINE_LEN} bytes"
        )));
    }
    Ok(read)
}

fn discard(connection: &mut Connection, len: u64) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }
    let skipped = io::copy(&mut (&mut connection.reader).take(len), &mut io::sink())?;
    if skipped < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed inside response body",
        ));
    }
    Ok(())
}

fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_support::{HttpFixture, patterned_bytes};

    fn client_for(fixture: &HttpFixture) -> HttpClient {
        let descriptor = RemoteDescriptor::parse(&fixture.url("/payload.bin")).unwrap();
        HttpClient::new(descriptor, Some(Duration::from_secs(5)))
    }

    #[test]
    fn content_range_forms() {
        assert_eq!(
            parse_content_range("bytes 0-0/10000"),
            Some(ContentRange {
                span: Some((0, 0)),
                total: Some(10000)
            })
        );
        assert_eq!(
            parse_content_range("bytes */3"),
            Some(ContentRange {
                span: None,
                total: Some(3)
            })
        );
        assert_eq!(
            parse_content_range("bytes 4-9/*"),
            Some(ContentRange {
                span: Some((4, 9)),
                total: None
            })
        );
        assert_eq!(parse_content_range("bytes */*"), None);
        assert_eq!(parse_content_range("bytes 9-4/10"), None);
        assert_eq!(parse_content_range("bytes 0-10/10"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
    }

    proptest! {
        #[test]
        fn content_range_accepts_any_valid_span(first in 0u64..1_000_000, len in 1u64..65_536, slack in 0u64..1_000) {
            let last = first + len - 1;
            let total = last + 1 + slack;
            let parsed = parse_content_range(&format!("bytes {first}-{last}/{total}")).unwrap();
            prop_assert_eq!(parsed.span, Some((first, last)));
            prop_assert_eq!(parsed.total, Some(total));
        }
    }

    #[test]
    fn read_head_parses_headers_case_insensitively() {
        let raw = b"HTTP/1.1 206 Partial Content\r\ncontent-length: 5\r\nCONTENT-RANGE: bytes 0-4/9\r\n\r\nbody";
        let head = read_head(&mut &raw[..]).unwrap();
        assert_eq!(head.status, 206);
        assert_eq!(head.reason, "Partial Content");
        assert_eq!(head.content_length().unwrap(), Some(5));
        assert_eq!(head.content_range().unwrap().unwrap().total, Some(9));
        assert!(head.keeps_alive());
    }

    #[test]
    fn read_head_rejects_garbage() {
        let raw = b"SSH-2.0-OpenSSH\r\n\r\n";
        assert!(matches!(
            read_head(&mut &raw[..]),
            Err(TransportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn read_head_rejects_overlong_header_line() {
        let mut raw = b"HTTP/1.1 200 OK\r\nX-Padding: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 64 * 1024));
        raw.extend_from_slice(b"\r\n\r\n");

        match read_head(&mut &raw[..]) {
            Err(TransportError::MalformedResponse(message)) => {
                assert!(message.contains("exceeds"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn read_head_rejects_unterminated_status_line() {
        let raw = vec![b'H'; 16 * 1024];
        assert!(matches!(
            read_head(&mut &raw[..]),
            Err(TransportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn http_10_without_keep_alive_closes() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n";
        let head = read_head(&mut &raw[..]).unwrap();
        assert!(!head.keeps_alive());
    }

    #[test]
    fn size_from_head() {
        let fixture = HttpFixture::serve(patterned_bytes(10_000)).unwrap();
        let mut client = client_for(&fixture);
        assert_eq!(client.remote_size().unwrap(), 10_000);
        assert!(fixture.get_ranges().is_empty());
    }

    #[test]
    fn size_falls_back_to_ranged_get_without_head() {
        let fixture = HttpFixture::builder(patterned_bytes(777))
            .without_head()
            .spawn()
            .unwrap();
        let mut client = client_for(&fixture);
        assert_eq!(client.remote_size().unwrap(), 777);
        assert_eq!(fixture.get_ranges(), vec!["bytes=0-0".to_owned()]);
    }

    #[test]
    fn size_falls_back_when_head_lacks_length() {
        let fixture = HttpFixture::builder(patterned_bytes(12))
            .without_head_content_length()
            .spawn()
            .unwrap();
        let mut client = client_for(&fixture);
        assert_eq!(client.remote_size().unwrap(), 12);
    }

    #[test]
    fn size_of_empty_resource_comes_from_unsatisfiable_range() {
        let fixture = HttpFixture::builder(Vec::new())
            .without_head()
            .spawn()
            .unwrap();
        let mut client = client_for(&fixture);
        assert_eq!(client.remote_size().unwrap(), 0);
    }

    #[test]
    fn missing_resource_reports_status() {
        let fixture = HttpFixture::builder(Vec::new())
            .with_status(404)
            .spawn()
            .unwrap();
        let mut client = client_for(&fixture);
        assert!(matches!(
            client.remote_size(),
            Err(TransportError::Status { status: 404, .. })
        ));
    }

    #[test]
    fn ranged_reads_reuse_one_connection() {
        let body = patterned_bytes(10_000);
        let fixture = HttpFixture::serve(body.clone()).unwrap();
        let mut client = client_for(&fixture);

        let mut buf = vec![0u8; 4096];
        assert_eq!(client.read_range(0, &mut buf).unwrap(), 4096);
        assert_eq!(&buf[..], &body[..4096]);
        assert_eq!(client.read_range(4096, &mut buf).unwrap(), 4096);
        assert_eq!(&buf[..], &body[4096..8192]);
        assert_eq!(client.read_range(8192, &mut buf[..1808]).unwrap(), 1808);
        assert_eq!(&buf[..1808], &body[8192..]);

        assert_eq!(fixture.connections(), 1);
        assert_eq!(
            fixture.get_ranges(),
            vec!["bytes=0-4095", "bytes=4096-8191", "bytes=8192-9999"]
        );
    }

    #[test]
    fn read_past_end_returns_zero() {
        let fixture = HttpFixture::serve(b"abc".to_vec()).unwrap();
        let mut client = client_for(&fixture);
        let mut buf = [0u8; 4];
        assert_eq!(client.read_range(3, &mut buf).unwrap(), 0);
    }

    #[test]
    fn ignored_range_skips_prefix_of_full_body() {
        let body = patterned_bytes(5000);
        let fixture = HttpFixture::builder(body.clone())
            .ignoring_range()
            .spawn()
            .unwrap();
        let mut client = client_for(&fixture);

        let mut buf = vec![0u8; 1000];
        assert_eq!(client.read_range(2500, &mut buf).unwrap(), 1000);
        assert_eq!(&buf[..], &body[2500..3500]);
        assert_eq!(client.read_range(4500, &mut buf).unwrap(), 500);
        assert_eq!(&buf[..500], &body[4500..]);
        assert_eq!(fixture.connections(), 2);
    }

    #[test]
    fn closed_connections_are_redialled() {
        let body = patterned_bytes(300);
        let fixture = HttpFixture::builder(body.clone())
            .closing_connections()
            .spawn()
            .unwrap();
        let mut client = client_for(&fixture);

        let mut buf = vec![0u8; 100];
        for chunk in 0..3u64 {
            assert_eq!(client.read_range(chunk * 100, &mut buf).unwrap(), 100);
            let start = usize::try_from(chunk * 100).unwrap();
            assert_eq!(&buf[..], &body[start..start + 100]);
        }
        assert_eq!(fixture.connections(), 3);
    }

    #[test]
    fn chunked_ranges_are_rejected() {
        let fixture = HttpFixture::builder(patterned_bytes(64))
            .chunked()
            .spawn()
            .unwrap();
        let mut client = client_for(&fixture);
        let mut buf = [0u8; 16];
        assert!(matches!(
            client.read_range(0, &mut buf),
            Err(TransportError::ChunkedBody)
        ));
    }

    #[test]
    fn refused_connection_reports_authority() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let descriptor = RemoteDescriptor::parse(&format!("http://{addr}/f")).unwrap();
        let mut client = HttpClient::new(descriptor, Some(Duration::from_secs(2)));
        match client.connect() {
            Err(TransportError::Connect { authority, .. }) => {
                assert_eq!(authority, addr.to_string());
            }
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
