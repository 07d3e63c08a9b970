// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Resource identity: the `{ETag, uri}`/`{Location}` pair a write leaves
//! behind, and resolving it by `UID` when the caller didn't keep it.

use http::{Method, Uri};
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::Connect;

use crate::error::{CaldavError, IdentityError};
use crate::ical::extract_uid;
use crate::transport::{xml_content_type, WebDavTransport};
use crate::xml::{response_pairs, sanitize_etag};

/// Identifies the resource a write landed at.
///
/// Mirrors the original library's two-variant `Id` type: servers either
/// return an `ETag` directly (the strong form, since it also certifies the
/// resource's current state) or only a `Location` header, in which case the
/// ETag - if any - must be fetched separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Id {
    Etag { uri: String, etag: String },
    Location { location: String, etag: Option<String> },
}

impl Id {
    /// Extracts an [`Id`] from a PUT/POST response's headers, preferring
    /// `ETag` over `Location` exactly as the add/modify operations this
    /// engine is modelled on do.
    #[must_use]
    pub fn from_headers(parts: &http::response::Parts, uri: &str) -> Option<Id> {
        if let Some(etag) = parts.headers.get(http::header::ETAG) {
            let etag = etag.to_str().ok()?;
            return Some(Id::Etag {
                uri: uri.to_string(),
                etag: sanitize_etag(etag).into_owned(),
            });
        }
        let location = parts.headers.get(http::header::LOCATION)?.to_str().ok()?;
        Some(Id::Location {
            location: location.to_string(),
            etag: None,
        })
    }
}

/// Body of a `calendar-query` REPORT that matches objects by UID, scoped to
/// `VEVENT`/`VTODO`/`VJOURNAL` components.
fn uid_query_body(uid: &str) -> String {
    let escaped = crate::xml::escape_text(uid);
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\
<C:calendar-query xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">\
<D:prop><D:getetag/></D:prop>\
<C:filter><C:comp-filter name=\"VCALENDAR\">\
<C:comp-filter name=\"VEVENT\"><C:prop-filter name=\"UID\">\
<C:text-match>{escaped}</C:text-match></C:prop-filter></C:comp-filter>\
</C:comp-filter></C:filter></C:calendar-query>"
    )
}

/// Resolves the `{href, etag}` identity of the single object whose `UID`
/// matches the one embedded in `calendar_data`, by issuing a `calendar-query`
/// REPORT against `collection_uri`.
///
/// # Errors
///
/// - [`IdentityError::MissingUid`] if `calendar_data` has no `UID` property.
/// - [`IdentityError::NotFound`] if the REPORT matched zero objects.
/// - [`IdentityError::MultipleMatches`] if it matched more than one; callers
///   should fall back to an [`Id`]-bearing call instead of guessing.
/// - [`IdentityError::Caldav`] for transport or XML-shape failures.
pub async fn resolve_by_uid<C>(
    transport: &WebDavTransport<C>,
    collection_uri: Uri,
    calendar_data: &str,
) -> Result<(String, Option<String>), IdentityError>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    let uid = extract_uid(calendar_data).ok_or(IdentityError::MissingUid)?;
    let body = uid_query_body(uid);

    let headers = [
        (http::header::CONTENT_TYPE, xml_content_type()),
        (
            http::header::HeaderName::from_static("depth"),
            http::HeaderValue::from_static("1"),
        ),
    ];
    let method = Method::from_bytes(b"REPORT").expect("REPORT is a valid method token");
    let (parts, body_bytes) = transport
        .request(method, collection_uri, &headers, Bytes::from(body))
        .await
        .map_err(CaldavError::Request)?;
    if !parts.status.is_success() {
        return Err(IdentityError::Caldav(CaldavError::BadStatusCode(
            parts.status,
        )));
    }

    let text = std::str::from_utf8(&body_bytes).map_err(CaldavError::NotUtf8)?;
    let doc = roxmltree::Document::parse(text).map_err(CaldavError::Xml)?;

    // response_pairs already skips any response with a failing own status,
    // so one bad match here doesn't hide the real one.
    let mut matches = response_pairs(doc.root_element());
    // Ignore the `DAV:getetag` property absence on unrelated entries; every
    // match here came from our own UID filter, so any non-matching response
    // shouldn't appear, but tolerate servers that echo the collection itself.
    matches.retain(|pair| !pair.href.is_empty());

    match matches.len() {
        0 => Err(IdentityError::NotFound),
        1 => {
            let pair = matches.into_iter().next().expect("length checked above");
            Ok((pair.href, pair.etag))
        }
        _ => Err(IdentityError::MultipleMatches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_headers_prefers_etag() {
        let response = http::Response::builder()
            .header(http::header::ETAG, "\"abc\"")
            .header(http::header::LOCATION, "/cal/new.ics")
            .body(())
            .unwrap();
        let (parts, _) = response.into_parts();
        let id = Id::from_headers(&parts, "/cal/new.ics").unwrap();
        assert_eq!(
            id,
            Id::Etag {
                uri: "/cal/new.ics".to_string(),
                etag: "abc".to_string(),
            }
        );
    }

    #[test]
    fn test_id_from_headers_falls_back_to_location() {
        let response = http::Response::builder()
            .header(http::header::LOCATION, "/cal/new.ics")
            .body(())
            .unwrap();
        let (parts, _) = response.into_parts();
        let id = Id::from_headers(&parts, "/cal/new.ics").unwrap();
        assert_eq!(
            id,
            Id::Location {
                location: "/cal/new.ics".to_string(),
                etag: None,
            }
        );
    }

    #[test]
    fn test_id_from_headers_missing_both() {
        let response = http::Response::builder().body(()).unwrap();
        let (parts, _) = response.into_parts();
        assert!(Id::from_headers(&parts, "/cal/new.ics").is_none());
    }

    #[test]
    fn test_uid_query_body_embeds_uid() {
        let body = uid_query_body("abc-123@example.com");
        assert!(body.contains("abc-123@example.com"));
        assert!(body.contains("calendar-query"));
    }
}
