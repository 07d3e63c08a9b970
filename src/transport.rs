// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! HTTP transport: request dispatch and header hygiene shared by every
//! CalDAV operation.

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, EXPECT, LOCATION, USER_AGENT};
use http::{response::Parts, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::Connect;
use hyper_util::client::legacy::Client;

use crate::auth::Auth;
use crate::error::RequestError;

/// Media type used for every outgoing request body carrying iCalendar data.
pub const CALENDAR_CONTENT_TYPE: &str = "text/calendar; charset=\"utf-8\"";
/// Media type used for WebDAV XML request/response bodies.
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=\"utf-8\"";

const USER_AGENT_VALUE: &str = concat!("caldav-engine/", env!("CARGO_PKG_VERSION"));

/// Upper bound on redirects followed by one [`WebDavTransport::request`]
/// call, guarding against a redirect loop between misconfigured servers.
const MAX_REDIRECTS: u8 = 5;

/// Dispatches requests against a single CalDAV server.
///
/// Generic over the connector so that callers provide their own TLS stack
/// (e.g. `hyper-rustls`); this type only ever talks to the `base_url` it was
/// built with.
#[derive(Debug, Clone)]
pub struct WebDavTransport<C>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    pub base_url: Uri,
    auth: Auth,
    http_client: Client<C, Full<Bytes>>,
}

impl<C> WebDavTransport<C>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    #[must_use]
    pub fn new(base_url: Uri, auth: Auth, connector: C) -> WebDavTransport<C> {
        WebDavTransport {
            base_url,
            auth,
            http_client: Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector),
        }
    }

    /// Issues a request with an empty body.
    ///
    /// # Errors
    ///
    /// If building the request fails, authentication cannot be applied, the
    /// underlying HTTP request fails, or the response body cannot be read.
    pub async fn request_empty(
        &self,
        method: Method,
        uri: Uri,
        headers: &[(HeaderName, HeaderValue)],
    ) -> Result<(Parts, Bytes), RequestError> {
        self.request(method, uri, headers, Bytes::new()).await
    }

    /// Issues a request with the given body bytes.
    ///
    /// # Errors
    ///
    /// If building the request fails, authentication cannot be applied, the
    /// underlying HTTP request fails, or the response body cannot be read.
    pub async fn request(
        &self,
        method: Method,
        uri: Uri,
        headers: &[(HeaderName, HeaderValue)],
        body: Bytes,
    ) -> Result<(Parts, Bytes), RequestError> {
        let mut target = uri;
        for _ in 0..=MAX_REDIRECTS {
            let (parts, bytes) = self
                .dispatch(method.clone(), target.clone(), headers, body.clone())
                .await?;
            if !parts.status.is_redirection() {
                return Ok((parts, bytes));
            }
            let Some(location) = parts.headers.get(LOCATION) else {
                return Ok((parts, bytes));
            };
            let Some(next) = redirect_target(&target, location) else {
                return Ok((parts, bytes));
            };
            target = next;
        }
        Err(RequestError::TooManyRedirects)
    }

    /// Issues exactly one request, with no redirect handling.
    async fn dispatch(
        &self,
        method: Method,
        uri: Uri,
        headers: &[(HeaderName, HeaderValue)],
        body: Bytes,
    ) -> Result<(Parts, Bytes), RequestError> {
        let mut builder = Request::builder().method(method).uri(uri);
        builder
            .headers_mut()
            .expect("request builder has no prior error")
            .insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        // Suppresses "Expect: 100-continue" on every request, the same way
        // the original source sends a literal empty `Expect:` line on every
        // curl call site. `hyper` never auto-chunks a `Full` body, so there
        // is no equivalent "Transfer-Encoding:" to suppress here; manually
        // setting that header would just fight the value `hyper` computes
        // from the body's known length.
        builder
            .headers_mut()
            .expect("request builder has no prior error")
            .insert(EXPECT, HeaderValue::from_static(""));
        for (name, value) in headers {
            builder
                .headers_mut()
                .expect("request builder has no prior error")
                .insert(name, value.clone());
        }

        let request = builder.body(Full::new(body))?;
        let request = self.auth.apply(request)?;

        let response = self.http_client.request(request).await?;
        let (parts, incoming) = response.into_parts();
        let collected = incoming.collect().await?;
        Ok((parts, collected.to_bytes()))
    }
}

/// Resolves a `Location` header value against the URI it was returned for,
/// producing an absolute target whether the header was absolute or
/// relative (most servers only send a path).
fn redirect_target(base: &Uri, location: &HeaderValue) -> Option<Uri> {
    let location = location.to_str().ok()?;
    if let Ok(uri) = location.parse::<Uri>() {
        if uri.scheme().is_some() {
            return Some(uri);
        }
    }
    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(location.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// Builds a `Content-Type` header for iCalendar bodies.
#[must_use]
pub fn calendar_content_type() -> HeaderValue {
    HeaderValue::from_static(CALENDAR_CONTENT_TYPE)
}

/// Builds a `Content-Type` header for WebDAV XML bodies.
#[must_use]
pub fn xml_content_type() -> HeaderValue {
    HeaderValue::from_static(XML_CONTENT_TYPE)
}

/// Folds the (possibly repeated) values of a response header into one
/// comma-separated string, matching how most HTTP libraries expose
/// duplicate headers internally (one list, not a single "last one wins"
/// slot).
///
/// `http::HeaderMap::get` only ever returns the first value for a repeated
/// header; this walks all values explicitly, joining them with `", "` as
/// RFC 9110 §5.3 permits for header fields whose grammar is a
/// comma-separated list.
#[must_use]
pub fn join_header(parts: &Parts, name: &HeaderName) -> Option<String> {
    let mut values = parts.headers.get_all(name).iter().peekable();
    values.peek()?;
    let mut joined = String::new();
    for value in values {
        if !joined.is_empty() {
            joined.push_str(", ");
        }
        joined.push_str(value.to_str().ok()?);
    }
    Some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ALLOW;
    use http::Response;

    fn parts_with_headers(headers: &[(HeaderName, &str)]) -> Parts {
        let mut builder = Response::builder();
        for (name, value) in headers {
            builder = builder.header(name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_join_header_single_value() {
        let parts = parts_with_headers(&[(ALLOW, "GET")]);
        assert_eq!(join_header(&parts, &ALLOW), Some("GET".to_string()));
    }

    #[test]
    fn test_join_header_multiple_values() {
        let parts = parts_with_headers(&[(ALLOW, "GET"), (ALLOW, "PUT"), (ALLOW, "LOCK")]);
        assert_eq!(join_header(&parts, &ALLOW), Some("GET, PUT, LOCK".to_string()));
    }

    #[test]
    fn test_join_header_missing() {
        let parts = parts_with_headers(&[]);
        assert_eq!(join_header(&parts, &ALLOW), None);
    }

    #[test]
    fn test_redirect_target_resolves_relative_location() {
        let base: Uri = "https://cal.example.com/dav/old/".parse().unwrap();
        let location = HeaderValue::from_static("/dav/new/");
        let resolved = redirect_target(&base, &location).unwrap();
        assert_eq!(resolved, "https://cal.example.com/dav/new/");
    }

    #[test]
    fn test_redirect_target_keeps_absolute_location() {
        let base: Uri = "https://cal.example.com/dav/old/".parse().unwrap();
        let location = HeaderValue::from_static("https://other.example.com/dav/");
        let resolved = redirect_target(&base, &location).unwrap();
        assert_eq!(resolved, "https://other.example.com/dav/");
    }
}
