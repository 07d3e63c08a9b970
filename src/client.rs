// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Per-action orchestration (C7) and the public client surface (C8).
//!
//! Every mutating call follows the same sequence: probe once, resolve
//! identity if needed, acquire a lock if supported, perform the mutating
//! verb with the right precondition headers, release the lock, and map the
//! status to [`CaldavResponse`].

use chrono::{DateTime, Utc};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, IF_MATCH, IF_NONE_MATCH};
use http::{response::Parts, Method, StatusCode, Uri};
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::Connect;
use log::{debug, warn};

use crate::auth::Auth;
use crate::error::{CaldavError, CaldavResponse};
use crate::ical;
use crate::identity::{self, Id};
use crate::lock::{self, LockOutcome};
use crate::probe::{self, ServerOptions};
use crate::settings::RuntimeOptions;
use crate::transport::{calendar_content_type, xml_content_type, WebDavTransport};
use crate::xml::{check_multistatus, extract_components, quote_etag, response_pairs, ResponsePair};

fn depth_header() -> HeaderName {
    HeaderName::from_static("depth")
}

fn if_header() -> HeaderName {
    HeaderName::from_static("if")
}

/// A client bound to a single CalDAV collection.
///
/// Generic over the connector, so callers choose their own TLS stack; see
/// the crate-level docs.
#[derive(Debug, Clone)]
pub struct CalDavClient<C>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    transport: WebDavTransport<C>,
    collection: Uri,
    options: RuntimeOptions,
}

impl<C> CalDavClient<C>
where
    C: Connect + Clone + Sync + Send + 'static,
{
    #[must_use]
    pub fn new(collection: Uri, auth: Auth, connector: C, options: RuntimeOptions) -> CalDavClient<C> {
        CalDavClient {
            transport: WebDavTransport::new(collection.clone(), auth, connector),
            collection,
            options,
        }
    }

    /// Builds a client from a parsed `[scheme://][user[:pwd]@]host[:port]/path`
    /// URL, deriving [`Auth::Basic`] from its credentials (or [`Auth::None`]
    /// if it carried none).
    ///
    /// # Errors
    ///
    /// If `url.to_uri()` fails to produce a valid request URI.
    pub fn from_url(
        url: &crate::settings::CalDavUrl,
        connector: C,
        options: RuntimeOptions,
    ) -> Result<CalDavClient<C>, http::Error> {
        let collection = url.to_uri()?;
        let auth = match &url.username {
            Some(username) => Auth::Basic {
                username: username.clone(),
                password: url.password.clone(),
            },
            None => Auth::None,
        };
        Ok(CalDavClient::new(collection, auth, connector, options))
    }

    /// Checks that this client's collection advertises `calendar-access`.
    ///
    /// # Errors
    ///
    /// On transport failure or a non-success `OPTIONS` response.
    pub async fn probe(&self) -> Result<bool, CaldavError> {
        probe::check_support(&self.transport, self.collection.clone())
            .await
            .map_err(|err| match err {
                crate::error::CheckSupportError::BadStatusCode(status) => {
                    CaldavError::BadStatusCode(status)
                }
                other => CaldavError::InvalidResponse(Box::new(other)),
            })
    }

    /// Returns the methods and DAV compliance classes this collection
    /// advertises.
    ///
    /// # Errors
    ///
    /// On transport failure or a non-success `OPTIONS` response.
    pub async fn server_options(&self) -> Result<ServerOptions, CaldavError> {
        probe::server_options(&self.transport, self.collection.clone()).await
    }

    /// Probes the collection and returns its capabilities, failing with
    /// [`CaldavError::NotCaldav`] if it doesn't advertise `calendar-access`.
    ///
    /// Every public operation but the standalone [`Self::probe`] calls this
    /// first, folding the compliance check into the same `OPTIONS` round
    /// trip `server_options` already makes.
    ///
    /// # Errors
    ///
    /// On transport failure, a non-success `OPTIONS` response, or a
    /// resource that isn't a CalDAV collection.
    async fn ensure_caldav(&self) -> Result<ServerOptions, CaldavError> {
        let capabilities = self.server_options().await?;
        if !capabilities.supports_class(probe::CALENDAR_ACCESS) {
            return Err(CaldavError::NotCaldav);
        }
        Ok(capabilities)
    }

    fn resource_uri(&self, slug: &str) -> Result<Uri, http::Error> {
        let base = self.collection.to_string();
        let joined = if base.ends_with('/') {
            format!("{base}{slug}")
        } else {
            format!("{base}/{slug}")
        };
        Uri::try_from(joined)
    }

    /// Runs the lock → mutate → unlock sequence shared by `add`, `modify`
    /// and `delete`.
    async fn guarded_write(
        &self,
        target: Uri,
        capabilities: &ServerOptions,
        method: Method,
        mut headers: Vec<(HeaderName, HeaderValue)>,
        body: Bytes,
    ) -> Result<(CaldavResponse, Parts, Bytes), CaldavError> {
        let outcome = lock::lock(
            &self.transport,
            target.clone(),
            self.options.use_locking,
            probe::supports_locking(capabilities),
        )
        .await
        .map_err(|err| match err {
            crate::error::LockError::Locked => CaldavError::BadStatusCode(StatusCode::LOCKED),
            crate::error::LockError::Conflict(status) => CaldavError::BadStatusCode(status),
            other => CaldavError::InvalidResponse(Box::new(other)),
        })?;

        if let LockOutcome::Acquired(token) = &outcome {
            debug!("acquired lock token for {target}");
            headers.push((if_header(), token.if_header_value()));
        } else if let LockOutcome::NotImplementedByServer = &outcome {
            debug!("server does not implement LOCK; proceeding without one");
        }

        let result = self
            .transport
            .request(method, target.clone(), &headers, body)
            .await;

        if let LockOutcome::Acquired(token) = &outcome {
            lock::unlock(&self.transport, target, token).await;
        }

        let (parts, body) = result.map_err(CaldavError::Request)?;
        let response = CaldavResponse::from_status(parts.status);
        Ok((response, parts, body))
    }

    /// Adds a new calendar object resource, synthesising a slug and `UID` as
    /// needed.
    ///
    /// On success, returns the identity the server assigned: an `ETag` if
    /// the response carried one, otherwise a `Location`, optionally enriched
    /// with an ETag discovered by a follow-up GET-range REPORT scoped to the
    /// object's own `DTSTART`/`DTEND`.
    ///
    /// # Errors
    ///
    /// On transport failure, lock failure, or a status this operation does
    /// not accept.
    pub async fn add(&self, payload: &str) -> Result<(CaldavResponse, Option<Id>), CaldavError> {
        let capabilities = self.ensure_caldav().await?;
        let payload = ical::ensure_uid(payload);
        let slug = format!("libcaldav-{}.ics", ical::slug_for(payload.as_bytes()));
        let target = self
            .resource_uri(&slug)
            .map_err(|e| CaldavError::InvalidResponse(Box::new(e)))?;

        let headers = vec![
            (CONTENT_TYPE, calendar_content_type()),
            (IF_NONE_MATCH, HeaderValue::from_static("*")),
        ];

        let (response, parts, _body) = self
            .guarded_write(
                target.clone(),
                &capabilities,
                Method::PUT,
                headers,
                Bytes::from(payload.clone()),
            )
            .await?;

        if !matches!(response, CaldavResponse::Ok) {
            return Ok((response, None));
        }

        let mut id = Id::from_headers(&parts, &target.to_string());
        if let Some(Id::Location { location, etag }) = &id {
            if etag.is_none() {
                match self.fetch_etag_for_new_object(&payload).await {
                    Ok(Some(found)) => {
                        id = Some(Id::Location {
                            location: location.clone(),
                            etag: Some(found),
                        });
                    }
                    Ok(None) => {}
                    Err(err) => {
                        debug!("follow-up ETag lookup after ADD failed, ignoring: {err}");
                    }
                }
            }
        }

        Ok((response, id))
    }

    async fn fetch_etag_for_new_object(&self, payload: &str) -> Result<Option<String>, CaldavError> {
        let Some(dtstart) = ical::extract_property(payload, "DTSTART") else {
            return Ok(None);
        };
        let dtend = ical::extract_property(payload, "DTEND").unwrap_or(dtstart);
        let (_body, pairs) = self.report_by_range(dtstart, dtend).await?;
        Ok(pairs.into_iter().next().and_then(|pair| pair.etag))
    }

    /// Modifies an existing calendar object resource.
    ///
    /// If `id` is `None`, the object's identity is first resolved from its
    /// `UID` via [`crate::identity::resolve_by_uid`].
    ///
    /// # Errors
    ///
    /// On transport failure, lock failure, identity resolution failure, or a
    /// status this operation does not accept.
    pub async fn modify(
        &self,
        id: Option<&Id>,
        payload: &str,
    ) -> Result<(CaldavResponse, Option<Id>), CaldavError> {
        let capabilities = self.ensure_caldav().await?;
        let (target, if_match) = self.resolve_write_target(id, payload).await?;

        let headers = vec![(CONTENT_TYPE, calendar_content_type()), (IF_MATCH, if_match)];

        let (response, parts, _body) = self
            .guarded_write(
                target.clone(),
                &capabilities,
                Method::PUT,
                headers,
                Bytes::from(payload.to_string()),
            )
            .await?;

        if !matches!(response, CaldavResponse::Ok) {
            return Ok((response, id.cloned()));
        }

        let new_id = Id::from_headers(&parts, &target.to_string()).or_else(|| id.cloned());
        Ok((response, new_id))
    }

    /// Deletes an existing calendar object resource.
    ///
    /// # Errors
    ///
    /// On transport failure, lock failure, identity resolution failure, or a
    /// status this operation does not accept.
    pub async fn delete(
        &self,
        id: Option<&Id>,
        payload: &str,
    ) -> Result<CaldavResponse, CaldavError> {
        let capabilities = self.ensure_caldav().await?;
        let (target, if_match) = self.resolve_write_target(id, payload).await?;

        let headers = vec![(IF_MATCH, if_match)];
        let (response, _parts, _body) = self
            .guarded_write(target, &capabilities, Method::DELETE, headers, Bytes::new())
            .await?;

        Ok(response)
    }

    /// Resolves `{target_uri, If-Match value}` for a MODIFY/DELETE call,
    /// either directly from a caller-supplied [`Id`] or by resolving the
    /// `UID` embedded in `payload` via a `Depth: 1` `calendar-query` REPORT.
    async fn resolve_write_target(
        &self,
        id: Option<&Id>,
        payload: &str,
    ) -> Result<(Uri, HeaderValue), CaldavError> {
        match id {
            Some(Id::Etag { uri, etag }) => {
                let target = Uri::try_from(uri.as_str())
                    .map_err(|e| CaldavError::InvalidResponse(Box::new(e)))?;
                let value = etag_header_value(Some(etag));
                Ok((target, value))
            }
            Some(Id::Location { location, etag }) => {
                let target = Uri::try_from(location.as_str())
                    .map_err(|e| CaldavError::InvalidResponse(Box::new(e)))?;
                Ok((target, etag_header_value(etag.as_deref())))
            }
            None => {
                let (href, etag) =
                    identity::resolve_by_uid(&self.transport, self.collection.clone(), payload)
                        .await
                        .map_err(|err| match err {
                            crate::error::IdentityError::Caldav(inner) => inner,
                            other => CaldavError::InvalidResponse(Box::new(other)),
                        })?;
                let target = Uri::try_from(href.as_str())
                    .map_err(|e| CaldavError::InvalidResponse(Box::new(e)))?;
                Ok((target, etag_header_value(etag.as_deref())))
            }
        }
    }

    async fn report_by_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<(String, Vec<ResponsePair>), CaldavError> {
        let body = time_range_query_body(start, end);
        let headers = vec![
            (CONTENT_TYPE, xml_content_type()),
            (depth_header(), HeaderValue::from_static("1")),
        ];
        let method = Method::from_bytes(b"REPORT").expect("REPORT is a valid method token");
        let (parts, body_bytes) = self
            .transport
            .request(method, self.collection.clone(), &headers, Bytes::from(body))
            .await
            .map_err(CaldavError::Request)?;

        if !parts.status.is_success() {
            return Err(CaldavError::BadStatusCode(parts.status));
        }

        let text = std::str::from_utf8(&body_bytes).map_err(CaldavError::NotUtf8)?;
        let doc = roxmltree::Document::parse(text).map_err(CaldavError::Xml)?;
        let pairs = response_pairs(doc.root_element());
        let (events, timezone) = extract_components(doc.root_element(), "VEVENT");
        let wrapped = if events.is_empty() {
            String::new()
        } else {
            let refs: Vec<&str> = events.iter().map(String::as_str).collect();
            ical::wrap_components(&refs, timezone.as_deref())
        };
        Ok((wrapped, pairs))
    }

    /// Fetches every calendar object resource whose `DTSTART`/`DTEND` falls
    /// inside `[start, end]`.
    ///
    /// Returns `Ok(None)` when the server matched nothing (an empty
    /// multistatus), rather than an empty string, so callers can
    /// distinguish "no events" from "one empty VEVENT".
    ///
    /// # Errors
    ///
    /// On transport failure or a non-207 response.
    pub async fn get_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<String>, CaldavError> {
        self.ensure_caldav().await?;
        let start = ical::format_utc_stamp(&start);
        let end = ical::format_utc_stamp(&end);
        let (wrapped, _pairs) = self.report_by_range(&start, &end).await?;
        Ok(if wrapped.is_empty() { None } else { Some(wrapped) })
    }

    /// Fetches every calendar object resource in the collection, with no
    /// time-range filter.
    ///
    /// # Errors
    ///
    /// On transport failure or a non-207 response.
    pub async fn get_all(&self) -> Result<Option<String>, CaldavError> {
        self.ensure_caldav().await?;
        let headers = vec![
            (CONTENT_TYPE, xml_content_type()),
            (depth_header(), HeaderValue::from_static("1")),
        ];
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\
<C:calendar-query xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">\
<D:prop><D:getetag/><C:calendar-data/></D:prop>\
<C:filter><C:comp-filter name=\"VCALENDAR\"><C:comp-filter name=\"VEVENT\"/></C:comp-filter></C:filter>\
</C:calendar-query>";
        let method = Method::from_bytes(b"REPORT").expect("REPORT is a valid method token");
        let (parts, body_bytes) = self
            .transport
            .request(
                method,
                self.collection.clone(),
                &headers,
                Bytes::from_static(body.as_bytes()),
            )
            .await
            .map_err(CaldavError::Request)?;

        if !parts.status.is_success() {
            return Err(CaldavError::BadStatusCode(parts.status));
        }

        let text = std::str::from_utf8(&body_bytes).map_err(CaldavError::NotUtf8)?;
        let doc = roxmltree::Document::parse(text).map_err(CaldavError::Xml)?;
        let (events, timezone) = extract_components(doc.root_element(), "VEVENT");
        if events.is_empty() {
            return Ok(None);
        }
        let refs: Vec<&str> = events.iter().map(String::as_str).collect();
        Ok(Some(ical::wrap_components(&refs, timezone.as_deref())))
    }

    /// Issues a `free-busy-query` REPORT over `[start, end]`.
    ///
    /// Tolerates servers that respond `200 OK` with a raw `BEGIN:VCALENDAR`
    /// body instead of a conformant `207` multistatus.
    ///
    /// # Errors
    ///
    /// On transport failure or a status that is neither 207 nor 200.
    pub async fn freebusy(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<String>, CaldavError> {
        self.ensure_caldav().await?;
        let start = ical::format_utc_stamp(&start);
        let end = ical::format_utc_stamp(&end);
        let body = free_busy_query_body(&start, &end);
        let headers = vec![
            (CONTENT_TYPE, xml_content_type()),
            (depth_header(), HeaderValue::from_static("1")),
        ];
        let method = Method::from_bytes(b"REPORT").expect("REPORT is a valid method token");
        let (parts, body_bytes) = self
            .transport
            .request(method, self.collection.clone(), &headers, Bytes::from(body))
            .await
            .map_err(CaldavError::Request)?;

        match parts.status {
            StatusCode::OK => {
                let text = String::from_utf8_lossy(&body_bytes).into_owned();
                if text.trim_start().starts_with("BEGIN:VCALENDAR") {
                    warn!("freebusy server returned raw VCALENDAR over HTTP 200 instead of 207");
                    return Ok(Some(text));
                }
                let doc = roxmltree::Document::parse(&text).map_err(CaldavError::Xml)?;
                let (components, _tz) = extract_components(doc.root_element(), "VFREEBUSY");
                let refs: Vec<&str> = components.iter().map(String::as_str).collect();
                Ok(Some(ical::wrap_components(&refs, None)))
            }
            StatusCode::MULTI_STATUS => {
                let text = std::str::from_utf8(&body_bytes).map_err(CaldavError::NotUtf8)?;
                let doc = roxmltree::Document::parse(text).map_err(CaldavError::Xml)?;
                let (components, _tz) = extract_components(doc.root_element(), "VFREEBUSY");
                if components.is_empty() {
                    return Ok(None);
                }
                let refs: Vec<&str> = components.iter().map(String::as_str).collect();
                Ok(Some(ical::wrap_components(&refs, None)))
            }
            other => Err(CaldavError::BadStatusCode(other)),
        }
    }

    /// Fetches the collection's `DAV:displayname`.
    ///
    /// Returns an empty string if the property is absent, matching the
    /// original `caldav_get_displayname` behaviour.
    ///
    /// # Errors
    ///
    /// On transport failure or a non-207 response.
    pub async fn display_name(&self) -> Result<String, CaldavError> {
        self.ensure_caldav().await?;
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\
<D:propfind xmlns:D=\"DAV:\"><D:prop><D:displayname/></D:prop></D:propfind>";
        let headers = vec![
            (CONTENT_TYPE, xml_content_type()),
            (depth_header(), HeaderValue::from_static("0")),
        ];
        let method = Method::from_bytes(b"PROPFIND").expect("PROPFIND is a valid method token");
        let (parts, body_bytes) = self
            .transport
            .request(
                method,
                self.collection.clone(),
                &headers,
                Bytes::from_static(body.as_bytes()),
            )
            .await
            .map_err(CaldavError::Request)?;

        if !parts.status.is_success() {
            return Err(CaldavError::BadStatusCode(parts.status));
        }

        let text = std::str::from_utf8(&body_bytes).map_err(CaldavError::NotUtf8)?;
        let doc = roxmltree::Document::parse(text).map_err(CaldavError::Xml)?;
        // Only looks inside responses that didn't themselves fail, the same
        // per-item tolerance response_pairs/extract_components apply.
        Ok(doc
            .root_element()
            .descendants()
            .filter(|n| n.tag_name() == crate::names::RESPONSE)
            .filter(|response| check_multistatus(*response).is_ok())
            .find_map(|response| {
                response
                    .descendants()
                    .find(|n| n.tag_name() == crate::names::DISPLAY_NAME)
                    .and_then(|n| n.text())
            })
            .unwrap_or_default()
            .to_string())
    }
}

fn etag_header_value(etag: Option<&str>) -> HeaderValue {
    match etag {
        Some(etag) if !etag.is_empty() => HeaderValue::from_str(&quote_etag(etag))
            .unwrap_or_else(|_| HeaderValue::from_static("\"*\"")),
        _ => HeaderValue::from_static("\"*\""),
    }
}

fn time_range_query_body(start: &str, end: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\
<C:calendar-query xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">\
<D:prop><D:getetag/><C:calendar-data/></D:prop>\
<C:filter><C:comp-filter name=\"VCALENDAR\"><C:comp-filter name=\"VEVENT\">\
<C:time-range start=\"{start}\" end=\"{end}\"/></C:comp-filter></C:comp-filter></C:filter>\
</C:calendar-query>"
    )
}

fn free_busy_query_body(start: &str, end: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\
<C:free-busy-query xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">\
<C:time-range start=\"{start}\" end=\"{end}\"/>\
</C:free-busy-query>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_query_body_embeds_bounds() {
        let body = time_range_query_body("20240101T000000Z", "20240102T000000Z");
        assert!(body.contains("start=\"20240101T000000Z\""));
        assert!(body.contains("end=\"20240102T000000Z\""));
    }

    #[test]
    fn test_free_busy_query_body_embeds_bounds() {
        let body = free_busy_query_body("20240101T000000Z", "20240102T000000Z");
        assert!(body.contains("free-busy-query"));
        assert!(body.contains("20240101T000000Z"));
    }

    #[test]
    fn test_etag_header_value_blind_overwrite_on_empty() {
        assert_eq!(etag_header_value(Some("")), "\"*\"");
        assert_eq!(etag_header_value(None), "\"*\"");
    }

    #[test]
    fn test_etag_header_value_quotes_present_etag() {
        assert_eq!(etag_header_value(Some("abc123")), "\"abc123\"");
    }
}
