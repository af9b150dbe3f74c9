use http::header::{CONNECTION, CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use http::{Request, StatusCode, Version};
use httparse::{ParserConfig, Status};
use memchr::memmem;

const MAX_HEADERS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("request head is larger than {limit} bytes")]
    HeadTooLarge { limit: usize },
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),
    #[error("invalid content-length")]
    InvalidContentLength,
}

impl RequestError {
    /// The status sent back before the connection is closed.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::HeadTooLarge { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// How the request body following the head is delimited.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
}

#[derive(Debug)]
pub struct RequestHead {
    pub request: Request<()>,
    pub framing: BodyFraming,
    pub keep_alive: bool,
    /// The client holds the body back until it hears from us.
    pub expect_continue: bool,
    /// Bytes of `buf` taken by the head, body excluded.
    pub head_len: usize,
}

/// Parses the request line and headers at the start of `buf`.
///
/// `Ok(None)` means the head isn't complete yet and more bytes should be read.
pub fn parse_head(buf: &[u8], max_header_bytes: usize) -> Result<Option<RequestHead>, RequestError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let head_len = match ParserConfig::default().parse_request(&mut req, buf)? {
        Status::Complete(len) if len <= max_header_bytes => len,
        Status::Partial if buf.len() <= max_header_bytes => return Ok(None),
        _ => {
            return Err(RequestError::HeadTooLarge {
                limit: max_header_bytes,
            })
        }
    };

    let (Some(method), Some(path), Some(version)) = (req.method, req.path, req.version) else {
        return Err(httparse::Error::Token.into());
    };
    let version = match version {
        0 => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut builder = Request::builder().method(method).uri(path).version(version);
    for header in req.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let request = builder.body(())?;

    let framing = body_framing(&request)?;
    let keep_alive = keep_alive(&request);
    let expect_continue = request
        .headers()
        .get_all(EXPECT)
        .iter()
        .flat_map(|value| tokens(value.as_bytes()))
        .any(|expectation| unicase::eq_ascii(expectation, "100-continue"));

    Ok(Some(RequestHead {
        request,
        framing,
        keep_alive,
        expect_continue,
        head_len,
    }))
}

/// Whether a blank line ending the head shows up in `buf`, looking only at bytes from
/// `from` on (plus the few before it a line ending can straddle).
pub fn has_head_end(buf: &[u8], from: usize) -> bool {
    let window = &buf[from.saturating_sub(3).min(buf.len())..];
    memmem::find(window, b"\n\r\n").is_some() || memmem::find(window, b"\n\n").is_some()
}

fn body_framing(request: &Request<()>) -> Result<BodyFraming, RequestError> {
    let chunked = request
        .headers()
        .get_all(TRANSFER_ENCODING)
        .iter()
        .flat_map(|value| tokens(value.as_bytes()))
        .any(|coding| unicase::eq_ascii(coding, "chunked"));
    if chunked {
        return Ok(BodyFraming::Chunked);
    }

    let mut length = None;
    for value in request.headers().get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .ok_or(RequestError::InvalidContentLength)?;

        if length.is_some_and(|length| length != parsed) {
            return Err(RequestError::InvalidContentLength);
        }
        length = Some(parsed);
    }

    Ok(match length {
        None | Some(0) => BodyFraming::Empty,
        Some(length) => BodyFraming::Length(length),
    })
}

/// HTTP/1.1 stays open unless told to close, HTTP/1.0 closes unless told otherwise.
fn keep_alive(request: &Request<()>) -> bool {
    let mut keep_alive = request.version() == Version::HTTP_11;

    for option in request
        .headers()
        .get_all(CONNECTION)
        .iter()
        .flat_map(|value| tokens(value.as_bytes()))
    {
        if unicase::eq_ascii(option, "close") {
            return false;
        }
        if unicase::eq_ascii(option, "keep-alive") {
            keep_alive = true;
        }
    }

    keep_alive
}

/// Comma-separated header tokens, trimmed. Non-UTF-8 tokens are skipped.
fn tokens(value: &[u8]) -> impl Iterator<Item = &str> {
    value
        .split(|&b| b == b',')
        .filter_map(|token| std::str::from_utf8(token).ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
