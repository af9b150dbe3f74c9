//! The canned response: status, headers and body, parsed once at startup.
//!
//! The text format is a block of `name:value` lines, a blank line, and the body:
//!
//! ```text
//! Content-Type: application/json
//! X-Upstream: dumb-server
//!
//! {"status": "ok"}
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use compact_str::CompactString;
use fnv::FnvHashMap;
use http::StatusCode;
use memchr::memchr;

/// Served when no response file is given. The value keeps its leading space.
pub const DEFAULT_RESPONSE: &str = "Content-Type: text/plain

dumb-server default response";

/// Header name to values, in the order they were parsed. Names are kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(FnvHashMap<CompactString, Vec<CompactString>>);

impl Headers {
    /// Appends `value` to the values of `name`, never replacing earlier ones.
    pub fn add(&mut self, name: impl Into<CompactString>, value: impl Into<CompactString>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[CompactString]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CompactString])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<CompactString>,
    V: Into<CompactString>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::default();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

/// The response returned for every request. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSpec {
    status_code: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl ResponseSpec {
    pub fn new(status_code: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            headers,
            body: body.into(),
        }
    }

    /// Parses the response text from `reader`. Only I/O failures are errors.
    pub fn from_reader(status_code: StatusCode, reader: impl BufRead) -> io::Result<Self> {
        let (headers, body) = parse_response(reader)?;
        Ok(Self::new(status_code, headers, body))
    }

    pub fn from_path(status_code: StatusCode, path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(status_code, BufReader::new(file))
    }

    /// The built-in [`DEFAULT_RESPONSE`].
    pub fn default_response(status_code: StatusCode) -> Self {
        Self::from_reader(status_code, DEFAULT_RESPONSE.as_bytes())
            .expect("No reason to fail reading from memory.")
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, Headers, Bytes) {
        (self.status_code, self.headers, self.body)
    }
}

/// Adds `line` to `headers` if it has a non-empty name before its first colon.
/// Anything else is dropped.
pub fn parse_header(headers: &mut Headers, line: &str) {
    if let Some(idx) = memchr(b':', line.as_bytes()).filter(|&idx| idx > 0) {
        headers.add(&line[..idx], &line[idx + 1..]);
    }
}

/// Splits the response text into headers and body in a single pass.
///
/// The first blank line ends the headers. Every later line is part of the body and is
/// terminated with `\n`, except that a body made only of blank lines is empty.
pub fn parse_response(mut reader: impl BufRead) -> io::Result<(Headers, Bytes)> {
    let mut headers = Headers::default();
    let mut body = BytesMut::new();
    let mut in_body = false;
    // blank body lines not yet followed by any content
    let mut pending_blank = 0;
    let mut line = Vec::new();

    while read_line(&mut reader, &mut line)? {
        if !in_body {
            if line.is_empty() {
                in_body = true;
            } else {
                parse_header(&mut headers, &String::from_utf8_lossy(&line));
            }
            continue;
        }

        if line.is_empty() && body.is_empty() {
            pending_blank += 1;
            continue;
        }

        body.put_bytes(b'\n', pending_blank);
        pending_blank = 0;
        body.put_slice(&line);
        body.put_u8(b'\n');
    }

    Ok((headers, body.freeze()))
}

/// Reads the next line without its `\n` or `\r\n` ending. `false` at end of input.
fn read_line(reader: &mut impl BufRead, line: &mut Vec<u8>) -> io::Result<bool> {
    line.clear();
    if reader.read_until(b'\n', line)? == 0 {
        return Ok(false);
    }

    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(true)
}
