// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! WebDAV `LOCK`/`UNLOCK` around mutating operations.
//!
//! Locking here is advisory and best-effort in the same way it is in the
//! library this engine is modelled on: a failure to acquire a lock on a
//! server that doesn't support `LOCK` at all is not an error, and releasing
//! a lock is never allowed to turn a successful write into a failure.

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode, Uri};
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::Connect;
use log::debug;

use crate::error::LockError;
use crate::transport::WebDavTransport;

static LOCK_BODY: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\" ?>",
    "<D:lockinfo xmlns:D=\"DAV:\">",
    "  <D:lockscope><D:exclusive/></D:lockscope>",
    "  <D:locktype><D:write/></D:locktype>",
    "</D:lockinfo>"
);

/// An acquired WebDAV lock token, to be attached to follow-up requests via
/// an `If: (<token>)` header and eventually released with [`unlock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

impl LockToken {
    /// Renders the `If` header value for a request conditioned on this
    /// lock.
    #[must_use]
    pub fn if_header_value(&self) -> HeaderValue {
        let value = format!("(<{}>)", self.0);
        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("(<>)"))
    }
}

/// The outcome of attempting to acquire a lock before a mutating operation.
#[derive(Debug)]
pub enum LockOutcome {
    /// The server does not advertise `LOCK` support, or the caller has
    /// disabled locking; proceed without an `If` header.
    NotApplicable,
    /// A lock was acquired; attach its token to the follow-up request and
    /// release it with [`unlock`] once done.
    Acquired(LockToken),
    /// The server advertises `LOCK` but responded `501 Not Implemented`;
    /// proceed without an `If` header, same as [`LockOutcome::NotApplicable`].
    NotImplementedByServer,
}

/// Attempts to lock `uri`, following this engine's locking decision table:
///
/// - If locking is disabled, or the server does not advertise `LOCK`
///   support, returns [`LockOutcome::NotApplicable`] without a request.
/// - On `200 OK`, returns [`LockOutcome::Acquired`] with the `Lock-Token`
///   header value.
/// - On `501 Not Implemented`, returns [`LockOutcome::NotImplementedByServer`]
///   so the caller proceeds unconditioned.
/// - On `423 Locked`, returns [`LockError::Locked`]: the caller must abort.
/// - On any other non-success status, returns [`LockError::Conflict`].
///
/// # Errors
///
/// See above.
pub async fn lock<C>(
    transport: &WebDavTransport<C>,
    uri: Uri,
    use_locking: bool,
    server_supports_lock: bool,
) -> Result<LockOutcome, LockError>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    if !use_locking || !server_supports_lock {
        return Ok(LockOutcome::NotApplicable);
    }

    let headers = [
        (
            CONTENT_TYPE,
            HeaderValue::from_static("application/xml; charset=\"utf-8\""),
        ),
        (
            HeaderName::from_static("timeout"),
            HeaderValue::from_static("Second-300"),
        ),
    ];
    let method = Method::from_bytes(b"LOCK").expect("LOCK is a valid method token");
    let (parts, _body) = transport
        .request(method, uri, &headers, Bytes::from_static(LOCK_BODY.as_bytes()))
        .await?;

    match parts.status {
        StatusCode::OK => {
            let token = parts
                .headers
                .get("lock-token")
                .and_then(|v| v.to_str().ok())
                .ok_or(LockError::MissingToken)?
                .to_string();
            Ok(LockOutcome::Acquired(LockToken(token)))
        }
        StatusCode::NOT_IMPLEMENTED => Ok(LockOutcome::NotImplementedByServer),
        StatusCode::LOCKED => Err(LockError::Locked),
        other => Err(LockError::Conflict(other)),
    }
}

/// Releases a previously acquired lock.
///
/// This is always best-effort: the caller's mutating operation has already
/// succeeded or failed on its own terms by the time this runs, and a failed
/// `UNLOCK` should never retroactively fail it. Transport failures and
/// non-204 statuses are logged at `debug!` and swallowed.
pub async fn unlock<C>(transport: &WebDavTransport<C>, uri: Uri, token: &LockToken)
where
    C: Connect + Clone + Sync + Send + 'static,
{
    let headers = [(
        HeaderName::from_static("lock-token"),
        HeaderValue::from_str(&format!("<{}>", token.0))
            .unwrap_or_else(|_| HeaderValue::from_static("<>")),
    )];
    let method = Method::from_bytes(b"UNLOCK").expect("UNLOCK is a valid method token");
    match transport.request_empty(method, uri, &headers).await {
        Ok((parts, _body)) if parts.status == StatusCode::NO_CONTENT => {}
        Ok((parts, _body)) => {
            debug!("UNLOCK returned unexpected status {}", parts.status);
        }
        Err(err) => {
            debug!("UNLOCK request failed, ignoring: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if_header_value() {
        let token = LockToken("opaquelocktoken:abc-123".to_string());
        assert_eq!(token.if_header_value(), "(<opaquelocktoken:abc-123>)");
    }
}
