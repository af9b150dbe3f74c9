use std::fmt::Write;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE};
use http::{Response, StatusCode};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Serializes `response` as HTTP/1.1.
///
/// `Date` and `Content-Length` are filled in unless the response already carries them.
/// 1xx, 204 and 304 responses never get a body, and neither do answers to HEAD.
/// `Connection` is always ours: any configured one is left out, see [`closes_connection`].
pub fn encode(
    response: &Response<Bytes>,
    head_only: bool,
    keep_alive: bool,
    date: &str,
) -> Bytes {
    let status_code = response.status();
    let status_message = status_code.canonical_reason().unwrap_or("");
    let body = response.body();
    let with_body = body_allowed(status_code);

    let mut buf = BytesMut::with_capacity(128 + body.len());
    write!(buf, "HTTP/1.1 {} {status_message}\r\n", status_code.as_u16())
        .expect("No reason to fail.");

    for (name, value) in response.headers() {
        if name == CONNECTION {
            continue;
        }
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes().trim_ascii());
        buf.put_slice(b"\r\n");
    }

    if !response.headers().contains_key(DATE) {
        write!(buf, "Date: {date}\r\n").expect("No reason to fail.");
    }

    let sends_length = !status_code.is_informational() && status_code != StatusCode::NO_CONTENT;
    if sends_length && with_body && !response.headers().contains_key(CONTENT_LENGTH) {
        write!(buf, "Content-Length: {}\r\n", body.len()).expect("No reason to fail.");
    }

    if !keep_alive {
        buf.put_slice(b"Connection: close\r\n");
    }
    buf.put_slice(b"\r\n");

    if with_body && !head_only {
        buf.put_slice(body);
    }

    buf.freeze()
}

/// Whether the response itself asks for `Connection: close`.
pub fn closes_connection(response: &Response<Bytes>) -> bool {
    response
        .headers()
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|option| unicase::eq_ascii(option.trim(), "close"))
}

fn body_allowed(status_code: StatusCode) -> bool {
    !(status_code.is_informational()
        || status_code == StatusCode::NO_CONTENT
        || status_code == StatusCode::NOT_MODIFIED)
}

/// Plain text answer for requests that couldn't be parsed.
pub fn error_response(status_code: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(status_code.to_string()));
    *response.status_mut() = status_code;
    response.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Formats `at` as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    at.to_offset(UtcOffset::UTC)
        .format(format)
        .expect("No reason to fail.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const DATE: &str = "Sun, 06 Nov 1994 08:49:37 GMT";

    fn response(
        status_code: StatusCode,
        headers: &[(&'static str, &'static str)],
        body: &'static str,
    ) -> Response<Bytes> {
        let mut builder = Response::builder().status(status_code);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::from_static(body.as_bytes())).unwrap()
    }

    fn encode_str(response: &Response<Bytes>, head_only: bool, keep_alive: bool) -> String {
        String::from_utf8(encode(response, head_only, keep_alive, DATE).to_vec()).unwrap()
    }

    #[test]
    fn success_full_response() {
        let response = response(StatusCode::OK, &[("Content-Type", "application/json")], "{}");

        assert_eq!(
            encode_str(&response, false, true),
            "HTTP/1.1 200 OK\r\n\
             content-type: application/json\r\n\
             Date: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
             Content-Length: 2\r\n\
             \r\n\
             {}"
        );
    }

    #[test]
    fn repeated_headers_each_get_a_line() {
        let response = response(
            StatusCode::OK,
            &[("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")],
            "",
        );
        let encoded = encode_str(&response, false, true);

        assert!(encoded.contains("set-cookie: a=1\r\nset-cookie: b=2\r\n"));
        assert!(encoded.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn header_values_are_trimmed() {
        let response = response(StatusCode::OK, &[("Content-Type", " text/plain")], "");
        assert!(encode_str(&response, false, true).contains("content-type: text/plain\r\n"));
    }

    #[test]
    fn head_keeps_length_but_drops_body() {
        let response = response(StatusCode::OK, &[], "hello");
        let encoded = encode_str(&response, true, true);

        assert!(encoded.contains("Content-Length: 5\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn no_body_for_no_content() {
        let response = response(StatusCode::NO_CONTENT, &[], "{}");
        let encoded = encode_str(&response, false, true);

        assert!(encoded.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!encoded.contains("Content-Length"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn no_body_for_not_modified() {
        let response = response(StatusCode::NOT_MODIFIED, &[], "{}");
        assert!(encode_str(&response, false, true).ends_with("\r\n\r\n"));
    }

    #[test]
    fn configured_length_and_date_win() {
        let response = response(
            StatusCode::OK,
            &[("content-length", "2"), ("date", "yesterday")],
            "{}",
        );
        let encoded = encode_str(&response, false, true);

        assert_eq!(encoded.matches("ontent-").count(), 1);
        assert!(encoded.contains("date: yesterday\r\n"));
        assert!(!encoded.contains(DATE));
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let response = response(StatusCode::from_u16(599).unwrap(), &[], "");
        assert!(encode_str(&response, false, true).starts_with("HTTP/1.1 599 \r\n"));
    }

    #[test]
    fn closing_connection_is_announced() {
        let response = response(StatusCode::OK, &[], "");
        assert!(encode_str(&response, false, false).contains("Connection: close\r\n"));
        assert!(!encode_str(&response, false, true).contains("Connection"));
    }

    #[test]
    fn configured_connection_is_not_echoed() {
        let response = response(StatusCode::OK, &[("Connection", "keep-alive")], "");
        let closing = encode_str(&response, false, false);

        assert_eq!(closing.matches("onnection").count(), 1);
        assert!(closing.contains("Connection: close\r\n"));
        assert!(!encode_str(&response, false, true).contains("onnection"));
        assert!(!closes_connection(&response));
    }

    #[test]
    fn configured_close_is_detected() {
        let response = response(StatusCode::OK, &[("Connection", "Upgrade, Close")], "");
        assert!(closes_connection(&response));
    }

    #[test]
    fn error_response_is_plain_text() {
        let response = error_response(StatusCode::BAD_REQUEST);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "400 Bad Request");
    }

    #[test]
    fn imf_fixdate() {
        assert_eq!(http_date(datetime!(1994-11-06 8:49:37 UTC)), DATE);
        assert_eq!(
            http_date(datetime!(2024-02-29 23:00:05 -3)),
            "Fri, 01 Mar 2024 02:00:05 GMT"
        );
    }
}
