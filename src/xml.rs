// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Namespace-aware extraction from WebDAV multi-status XML.
//!
//! Uses a conformant XML parser ([`roxmltree`]) rather than the
//! substring-searching approach of the library this engine is modelled on —
//! but the tolerance for quirky servers (arbitrary namespace prefixes,
//! `VTIMEZONE` appearing more than once) is preserved exactly, since real
//! CalDAV servers still do those things.

use std::borrow::Cow;
use std::str::FromStr;

use http::status::InvalidStatusCode;
use http::StatusCode;
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};
use roxmltree::Node;

use crate::error::CaldavError;
use crate::names;
use crate::PropertyName;

/// Characters that are escaped for hrefs.
pub const DISALLOWED_FOR_HREF: &AsciiSet = &NON_ALPHANUMERIC.remove(b'/').remove(b'.');

/// An `{href, etag}` pair, as extracted from one `DAV:response` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePair {
    pub href: String,
    pub etag: Option<String>,
}

/// Checks all `DAV:status` elements under `root`.
///
/// # Errors
///
/// - If a `status` node is missing its text.
/// - If the text does not parse as a status line.
/// - If any status is non-success.
pub fn check_multistatus(root: Node) -> Result<(), CaldavError> {
    let statuses = root
        .descendants()
        .filter(|node| node.tag_name() == names::STATUS);
    for status in statuses {
        let status = status
            .text()
            .ok_or(CaldavError::InvalidResponse(
                "missing text inside 'DAV:status'".into(),
            ))?;
        let code = parse_statusline(status).map_err(|e| CaldavError::InvalidResponse(e.into()))?;
        if !code.is_success() {
            return Err(CaldavError::BadStatusCode(code));
        }
    }
    Ok(())
}

/// Parses a status line such as `HTTP/1.1 200 OK` into a [`StatusCode`].
///
/// # Errors
///
/// If the input does not contain a recognisable status code.
pub fn parse_statusline(status_line: impl AsRef<str>) -> Result<StatusCode, InvalidStatusCode> {
    let mut iter = status_line.as_ref().splitn(3, ' ');
    iter.next();
    let code = iter.next().unwrap_or("");
    StatusCode::from_str(code)
}

/// Returns the ordered list of `{href, etag}` pairs, one per `DAV:response`.
///
/// This is namespace-insensitive: it matches on the expanded `(namespace,
/// local-name)` pair regardless of which prefix the document happens to
/// bind to `DAV:` (see spec's "namespace insensitivity" property). A
/// `response` carrying its own failing `status` is skipped rather than
/// aborting the whole list, mirroring `multi_get_parse`'s per-item
/// tolerance: one bad item in a multistatus body must not discard every
/// other successfully-returned one.
#[must_use]
pub fn response_pairs(root: Node) -> Vec<ResponsePair> {
    root.descendants()
        .filter(|node| node.tag_name() == names::RESPONSE)
        .filter(|response| check_multistatus(*response).is_ok())
        .map(|response| {
            let href = get_unquoted_href(&response)
                .map(Cow::into_owned)
                .unwrap_or_default();
            let etag = response
                .descendants()
                .find(|node| node.tag_name() == names::GETETAG)
                .and_then(|node| node.text())
                .map(|raw| sanitize_etag(raw).into_owned());
            ResponsePair { href, etag }
        })
        .collect()
}

/// Removes one surrounding pair of double quotes from an ETag, if present.
///
/// The unquoted form is this library's canonical internal representation;
/// [`quote_etag`] re-adds the quotes for outgoing `If-Match` headers.
#[must_use]
pub fn sanitize_etag(raw: &str) -> Cow<'_, str> {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        Cow::Borrowed(&trimmed[1..trimmed.len() - 1])
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Wraps an ETag in double quotes for use in an `If-Match` header, unless it
/// is already quoted.
#[must_use]
pub fn quote_etag(etag: &str) -> Cow<'_, str> {
    if etag.starts_with('"') && etag.ends_with('"') && etag.len() >= 2 {
        Cow::Borrowed(etag)
    } else {
        Cow::Owned(format!("\"{etag}\""))
    }
}

/// Finds the `href` child of `node` and returns its unescaped text value.
pub(crate) fn get_unquoted_href<'a>(node: &Node<'a, 'a>) -> Result<Cow<'a, str>, CaldavError> {
    let text = node
        .descendants()
        .find(|n| n.tag_name() == names::HREF)
        .ok_or(CaldavError::InvalidResponse(
            "missing href in response".into(),
        ))?
        .text()
        .ok_or(CaldavError::InvalidResponse("missing text in href".into()))?;
    percent_decode_str(text)
        .decode_utf8()
        .map_err(|e| CaldavError::InvalidResponse(e.into()))
}

/// URL-encodes an href.
///
/// The input parameter MUST NOT already be URL-encoded.
#[must_use]
pub fn quote_href(href: &[u8]) -> Cow<'_, str> {
    Cow::from(percent_encode(href, DISALLOWED_FOR_HREF))
}

/// Reads the text of `property` under `node`, restoring `\r\n` line endings.
///
/// XML parsers normalise `"\r\n"` to `"\n"` while parsing (per the XML spec's
/// line-ending handling); iCalendar data requires `\r\n`, so this undoes that
/// normalisation.
///
/// # See also
///
/// - <https://www.rfc-editor.org/rfc/rfc4791#section-9.6>
/// - <https://www.w3.org/TR/xml/#sec-line-ends>
pub fn get_newline_corrected_text(
    node: &Node,
    property: &PropertyName<'_, '_>,
) -> Result<String, CaldavError> {
    let raw = node
        .descendants()
        .find(|n| n.tag_name() == *property)
        .ok_or(CaldavError::InvalidResponse(
            format!("missing {} in response", property.name()).into(),
        ))?
        .text()
        .ok_or(CaldavError::InvalidResponse(
            "missing text in property".into(),
        ))?;
    Ok(restore_crlf(raw))
}

/// Restores `\r\n` line endings that an XML parser collapsed to `\n`.
#[must_use]
pub fn restore_crlf(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut last_end = 0;
    for (start, part) in raw.match_indices('\n') {
        result.push_str(&raw[last_end..start]);
        result.push_str("\r\n");
        last_end = start + part.len();
    }
    result.push_str(&raw[last_end..]);
    result
}

/// Extracts every `BEGIN:{component} … END:{component}` block found inside
/// any `calendar-data` element under `root`, in document order, plus the
/// first `VTIMEZONE` block encountered across all of them (if any).
///
/// This is a fail-soft text scan rather than an iCalendar parser, matching
/// the tolerance real servers require: some wrap multiple components in one
/// `calendar-data` element, some repeat `VTIMEZONE` per event. Only the
/// first `VTIMEZONE` is kept; see [`crate::ical::wrap_components`].
///
/// Like [`response_pairs`], a `DAV:response` carrying its own failing
/// `status` is skipped rather than aborting the whole scan — the same
/// per-item tolerance `multi_get_parse` gives a larger multistatus body.
#[must_use]
pub fn extract_components(root: Node, component: &str) -> (Vec<String>, Option<String>) {
    let mut components = Vec::new();
    let mut timezone = None;

    let responses: Vec<Node> = root
        .descendants()
        .filter(|n| n.tag_name() == names::RESPONSE)
        .filter(|response| check_multistatus(*response).is_ok())
        .collect();
    let scope: Vec<Node> = if responses.is_empty() {
        vec![root]
    } else {
        responses
    };

    for response in scope {
        for node in response.descendants().filter(|n| n.tag_name() == names::CALENDAR_DATA) {
            let Some(raw) = node.text() else { continue };
            let text = restore_crlf(raw);

            if timezone.is_none() {
                if let Some(block) = find_first_block(&text, "VTIMEZONE") {
                    timezone = Some(block);
                }
            }

            if component != "VTIMEZONE" {
                components.extend(find_all_blocks(&text, component));
            } else if let Some(block) = find_first_block(&text, component) {
                components.push(block);
            }
        }
    }

    (components, timezone)
}

fn find_all_blocks(text: &str, component: &str) -> Vec<String> {
    let begin = format!("BEGIN:{component}");
    let end = format!("END:{component}");
    let mut blocks = Vec::new();
    let mut search_from = 0;
    while let Some(start) = text[search_from..].find(&begin) {
        let abs_start = search_from + start;
        let Some(end_rel) = text[abs_start..].find(&end) else {
            break;
        };
        let abs_end = abs_start + end_rel + end.len();
        blocks.push(text[abs_start..abs_end].to_string());
        search_from = abs_end;
    }
    blocks
}

fn find_first_block(text: &str, component: &str) -> Option<String> {
    find_all_blocks(text, component).into_iter().next()
}

/// Renders an empty self-closing XML element for a property name, used in
/// `<prop>` request bodies.
#[must_use]
pub fn render_xml(name: &PropertyName) -> String {
    if let Some(ns) = name.namespace() {
        format!("<{0} xmlns=\"{1}\"/>", name.name(), ns)
    } else {
        format!("<{0}/>", name.name())
    }
}

/// Escapes `<`, `>` and `&`. Not usable for other contexts of XML encoding
/// (e.g. attribute values, which also need to escape quotes).
#[must_use]
pub fn escape_text(raw: &str) -> Cow<str> {
    let bytes = raw.as_bytes();
    let mut escaped = None;
    let mut iter = bytes.iter();
    let mut pos = 0;
    while let Some(i) = iter.position(|&b| matches!(b, b'<' | b'>' | b'&')) {
        let escaped = escaped.get_or_insert_with(|| Vec::with_capacity(raw.len()));
        let new_pos = pos + i;
        escaped.extend_from_slice(&bytes[pos..new_pos]);
        match bytes[new_pos] {
            b'<' => escaped.extend_from_slice(b"&lt;"),
            b'>' => escaped.extend_from_slice(b"&gt;"),
            b'&' => escaped.extend_from_slice(b"&amp;"),
            _ => unreachable!("only '<', '>' and '&' are matched above"),
        }
        pos = new_pos + 1;
    }

    if let Some(mut escaped) = escaped {
        if let Some(tail) = bytes.get(pos..) {
            escaped.extend_from_slice(tail);
        }
        Cow::Owned(String::from_utf8(escaped).expect("input was valid utf-8 and only ascii bytes were substituted"))
    } else {
        Cow::Borrowed(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_etag() {
        assert_eq!(sanitize_etag("\"abc123\""), "abc123");
        assert_eq!(sanitize_etag("abc123"), "abc123");
        assert_eq!(sanitize_etag(""), "");
    }

    #[test]
    fn test_quote_etag_round_trip() {
        for raw in ["abc123", "with\"inner\"quote-ish"] {
            let quoted = quote_etag(raw);
            assert_eq!(sanitize_etag(&quoted), raw);
        }
    }

    #[test]
    fn test_quote_etag_is_idempotent() {
        assert_eq!(quote_etag("\"abc\""), "\"abc\"");
    }

    #[test]
    fn test_escape_text() {
        match escape_text("HELLO THERE") {
            Cow::Borrowed(s) => assert_eq!(s, "HELLO THERE"),
            Cow::Owned(_) => panic!("expected Borrowed, got Owned"),
        }
        match escape_text("HELLO <") {
            Cow::Borrowed(_) => panic!("expected Owned, got Borrowed"),
            Cow::Owned(s) => assert_eq!(s, "HELLO &lt;"),
        }
    }

    #[test]
    fn test_restore_crlf() {
        assert_eq!(restore_crlf("a\nb\nc"), "a\r\nb\r\nc");
        assert_eq!(restore_crlf("a\r\nb"), "a\r\r\nb");
        assert_eq!(restore_crlf("no newlines"), "no newlines");
    }

    #[test]
    fn test_response_pairs_namespace_insensitive() {
        let canonical = r#"<multistatus xmlns="DAV:">
            <response><href>/a.ics</href><propstat><prop><getetag>"1"</getetag></prop></propstat></response>
        </multistatus>"#;
        let prefixed = r#"<ns0:multistatus xmlns:ns0="DAV:">
            <ns0:response><ns0:href>/a.ics</ns0:href><ns0:propstat><ns0:prop><ns0:getetag>"1"</ns0:getetag></ns0:prop></ns0:propstat></ns0:response>
        </ns0:multistatus>"#;

        let doc1 = roxmltree::Document::parse(canonical).unwrap();
        let doc2 = roxmltree::Document::parse(prefixed).unwrap();

        assert_eq!(
            response_pairs(doc1.root_element()),
            response_pairs(doc2.root_element())
        );
    }

    #[test]
    fn test_extract_components_concatenates_and_promotes_first_timezone() {
        let raw = r#"<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
            <response><href>/a.ics</href><propstat><prop>
                <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VTIMEZONE
TZID:Europe/Berlin
END:VTIMEZONE
BEGIN:VEVENT
UID:a
END:VEVENT
END:VCALENDAR</C:calendar-data>
            </prop></propstat></response>
            <response><href>/b.ics</href><propstat><prop>
                <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VTIMEZONE
TZID:Should-Not-Win
END:VTIMEZONE
BEGIN:VEVENT
UID:b
END:VEVENT
END:VCALENDAR</C:calendar-data>
            </prop></propstat></response>
        </multistatus>"#;
        let doc = roxmltree::Document::parse(raw).unwrap();
        let (events, timezone) = extract_components(doc.root_element(), "VEVENT");
        assert_eq!(events.len(), 2);
        assert!(events[0].contains("UID:a"));
        assert!(events[1].contains("UID:b"));
        assert!(timezone.unwrap().contains("Europe/Berlin"));
    }

    #[test]
    fn test_extract_components_no_calendar_data() {
        let doc = roxmltree::Document::parse("<multistatus xmlns=\"DAV:\"/>").unwrap();
        let (events, timezone) = extract_components(doc.root_element(), "VEVENT");
        assert!(events.is_empty());
        assert!(timezone.is_none());
    }

    #[test]
    fn test_response_pairs_skips_failed_items_but_keeps_the_rest() {
        let raw = r#"<multistatus xmlns="DAV:">
            <response><href>/a.ics</href><status>HTTP/1.1 404 Not Found</status></response>
            <response><href>/b.ics</href><propstat><prop><getetag>"1"</getetag></prop></propstat></response>
        </multistatus>"#;
        let doc = roxmltree::Document::parse(raw).unwrap();
        let pairs = response_pairs(doc.root_element());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].href, "/b.ics");
    }

    #[test]
    fn test_extract_components_skips_failed_items_but_keeps_the_rest() {
        let raw = r#"<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
            <response><href>/a.ics</href><status>HTTP/1.1 404 Not Found</status></response>
            <response><href>/b.ics</href><propstat><prop>
                <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:b
END:VEVENT
END:VCALENDAR</C:calendar-data>
            </prop></propstat></response>
        </multistatus>"#;
        let doc = roxmltree::Document::parse(raw).unwrap();
        let (events, _timezone) = extract_components(doc.root_element(), "VEVENT");
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("UID:b"));
    }

    #[test]
    fn test_check_multistatus_detects_failure() {
        let raw = r#"<multistatus xmlns="DAV:">
            <response><href>/a.ics</href><status>HTTP/1.1 404 Not Found</status></response>
        </multistatus>"#;
        let doc = roxmltree::Document::parse(raw).unwrap();
        let err = check_multistatus(doc.root_element()).unwrap_err();
        assert!(matches!(err, CaldavError::BadStatusCode(StatusCode::NOT_FOUND)));
    }
}
