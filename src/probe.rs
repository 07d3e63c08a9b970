// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Server capability probing via `OPTIONS`.

use http::{HeaderName, Method, Uri};
use hyper_util::client::legacy::connect::Connect;
use log::debug;

use crate::error::{CaldavError, CheckSupportError};
use crate::transport::WebDavTransport;

/// The `calendar-access` token a CalDAV-compliant collection must advertise
/// in its `DAV` header, per RFC 4791 §5.1.
pub const CALENDAR_ACCESS: &str = "calendar-access";

/// The methods and the `calendar-access` compliance class a server
/// advertised for a resource, as returned by an `OPTIONS` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Methods listed in the `Allow` header, verbatim (e.g. `"GET"`,
    /// `"LOCK"`).
    pub allowed_methods: Vec<String>,
    /// Compliance classes listed in the `DAV` header, verbatim.
    pub dav_classes: Vec<String>,
}

impl ServerOptions {
    #[must_use]
    pub fn supports_method(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    #[must_use]
    pub fn supports_class(&self, class: &str) -> bool {
        self.dav_classes.iter().any(|c| c == class)
    }
}

/// Issues `OPTIONS` against `uri` and returns the advertised methods and DAV
/// compliance classes.
///
/// This is the "options" operation in the spec this engine implements: the
/// caller-visible `CALDAV_ACTION::OPTIONS`-equivalent probe, split here from
/// [`check_support`] since most callers only need one or the other.
///
/// # Errors
///
/// If the request fails at the transport level, or the server responds with
/// a non-success status.
pub async fn server_options<C>(
    transport: &WebDavTransport<C>,
    uri: Uri,
) -> Result<ServerOptions, CaldavError>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    let (parts, _body) = transport
        .request_empty(Method::OPTIONS, uri, &[])
        .await
        .map_err(CaldavError::Request)?;
    if !parts.status.is_success() {
        return Err(CaldavError::BadStatusCode(parts.status));
    }

    let allow = crate::transport::join_header(&parts, &http::header::ALLOW);
    let dav = crate::transport::join_header(&parts, &HeaderName::from_static("dav"));

    let allowed_methods = allow
        .as_deref()
        .map(split_comma_list)
        .unwrap_or_default();
    let dav_classes = dav.as_deref().map(split_comma_list).unwrap_or_default();

    Ok(ServerOptions {
        allowed_methods,
        dav_classes,
    })
}

/// Checks that a resource advertises the `calendar-access` compliance
/// class.
///
/// Equivalent to `caldav_enabled_resource`: failure here means the URI does
/// not point at a CalDAV-capable collection at all, as opposed to merely
/// being unreachable.
///
/// # Errors
///
/// - [`CheckSupportError::MissingHeader`] if the response has no `DAV`
///   header.
/// - [`CheckSupportError::BadStatusCode`] if the request did not succeed.
/// - [`CheckSupportError::Request`] on transport failure.
pub async fn check_support<C>(
    transport: &WebDavTransport<C>,
    uri: Uri,
) -> Result<bool, CheckSupportError>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    let (parts, _body) = transport.request_empty(Method::OPTIONS, uri, &[]).await?;
    if !parts.status.is_success() {
        return Err(CheckSupportError::BadStatusCode(parts.status));
    }

    let header = parts
        .headers
        .get("DAV")
        .ok_or(CheckSupportError::MissingHeader)?
        .to_str()?;

    debug!("DAV header: '{header}'");
    Ok(split_comma_list(header)
        .iter()
        .any(|token| token == CALENDAR_ACCESS))
}

/// Mirrors `caldav_lock_support`: a collection supports locking if and only
/// if it lists `LOCK` in its `Allow` header. Per RFC 4791, `UNLOCK` must
/// then also be present, but this only checks `LOCK` since that is the only
/// one callers branch on.
#[must_use]
pub fn supports_locking(options: &ServerOptions) -> bool {
    options.supports_method("LOCK")
}

fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_comma_list() {
        assert_eq!(
            split_comma_list("1, 2, access-control, calendar-access"),
            vec!["1", "2", "access-control", "calendar-access"]
        );
    }

    #[test]
    fn test_split_comma_list_ignores_empty_segments() {
        assert_eq!(split_comma_list("GET, , PUT"), vec!["GET", "PUT"]);
    }

    #[test]
    fn test_server_options_supports_method_is_case_insensitive() {
        let options = ServerOptions {
            allowed_methods: vec!["lock".to_string(), "GET".to_string()],
            dav_classes: vec!["calendar-access".to_string()],
        };
        assert!(options.supports_method("LOCK"));
        assert!(options.supports_method("get"));
        assert!(!options.supports_method("PROPFIND"));
    }

    #[test]
    fn test_supports_locking() {
        let with_lock = ServerOptions {
            allowed_methods: vec!["LOCK".to_string(), "UNLOCK".to_string()],
            dav_classes: vec![],
        };
        let without_lock = ServerOptions {
            allowed_methods: vec!["GET".to_string()],
            dav_classes: vec![],
        };
        assert!(supports_locking(&with_lock));
        assert!(!supports_locking(&without_lock));
    }

    #[test]
    fn test_server_options_supports_class() {
        let options = ServerOptions {
            allowed_methods: vec![],
            dav_classes: vec!["calendar-access".to_string(), "1".to_string()],
        };
        assert!(options.supports_class("calendar-access"));
        assert!(!options.supports_class("access-control"));
    }
}
