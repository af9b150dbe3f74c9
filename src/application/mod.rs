use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Request, Response, StatusCode};

use crate::domain::response_spec::ResponseSpec;

/// Answers every request with the same response, whatever the request holds.
///
/// Built once from a [`ResponseSpec`] and shared between connections; nothing in here
/// changes after [`FixedResponder::new`].
#[derive(Debug, Clone)]
pub struct FixedResponder {
    status_code: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl FixedResponder {
    /// Converts the parsed headers into wire headers. Names or values HTTP can't carry
    /// are dropped with a warning.
    pub fn new(spec: ResponseSpec) -> Self {
        let (status_code, spec_headers, body) = spec.into_parts();
        let mut headers = HeaderMap::with_capacity(spec_headers.len());

        for (name, values) in spec_headers.iter() {
            let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                tracing::warn!(header = name, "dropping response header with an invalid name");
                continue;
            };

            for value in values {
                match HeaderValue::from_bytes(value.as_bytes()) {
                    Ok(value) => {
                        headers.append(header_name.clone(), value);
                    }
                    Err(_) => tracing::warn!(
                        header = name,
                        value = value.as_str(),
                        "dropping response header with an invalid value"
                    ),
                }
            }
        }

        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builds the canned response. The request is never looked at.
    pub fn respond<B>(&self, _request: &Request<B>) -> Response<Bytes> {
        let mut response = Response::new(Bytes::new());

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }

        *response.status_mut() = self.status_code;

        if !self.body.is_empty() {
            *response.body_mut() = self.body.clone();
        }

        response
    }
}
