// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Minimal iCalendar (RFC 5545) helpers.
//!
//! This module does not parse iCalendar into a structured object model: the
//! engine treats calendar data as an opaque, line-oriented blob that it reads
//! just enough of to find a `UID`, inject one if missing, and extract
//! `DTSTART`/`DTEND`. Recurrence expansion and component-level editing are
//! out of scope; see `SPEC_FULL.md`.

use chrono::{DateTime, NaiveDateTime, Utc};
use md5::{Digest, Md5};

/// Domain used for UIDs synthesised by [`ensure_uid`], matching the literal
/// wire format from `original_source/trunk/src/caldav-utils.c`'s
/// `verify_uid` and spec.md §8 scenario 3
/// (`UID:libcaldav-<32-hex>@tempuri.org`).
const UID_DOMAIN: &str = "tempuri.org";

/// Returns `true` if `data` contains a `UID:` property at the start of a
/// line, inside any component.
#[must_use]
pub fn has_uid(data: &str) -> bool {
    data.lines().any(|line| line.starts_with("UID:"))
}

/// Computes a stable MD5-based slug for use as a filename or synthesised UID
/// component, seeded from `seed` (typically the calendar data itself, so
/// that re-running this on the same input is deterministic).
#[must_use]
pub fn slug_for(seed: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(seed);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Ensures `data` has a `UID` property, inserting one derived from
/// [`slug_for`] before the first `END:VEVENT`/`END:VTODO`/`END:VJOURNAL`
/// line if none is present.
///
/// Mirrors the fallback this engine is modelled on: user agents that omit a
/// `UID` should not be rejected outright, since the identity-by-UID
/// operations in [`crate::identity`] depend on every object having one.
#[must_use]
pub fn ensure_uid(data: &str) -> String {
    if has_uid(data) {
        return data.to_string();
    }

    let uid = format!("UID:libcaldav-{}@{UID_DOMAIN}", slug_for(data.as_bytes()));
    let mut result = String::with_capacity(data.len() + uid.len() + 2);
    let mut inserted = false;
    for line in data.lines() {
        if !inserted
            && (line.starts_with("END:VEVENT")
                || line.starts_with("END:VTODO")
                || line.starts_with("END:VJOURNAL"))
        {
            result.push_str(&uid);
            result.push_str("\r\n");
            inserted = true;
        }
        result.push_str(line);
        result.push_str("\r\n");
    }
    result
}

/// Extracts the value of `UID:` from `data`, if present.
#[must_use]
pub fn extract_uid(data: &str) -> Option<&str> {
    data.lines()
        .find_map(|line| line.strip_prefix("UID:"))
        .map(str::trim)
}

/// Parses a `DTSTART`/`DTEND`-style wire timestamp (`YYYYMMDDTHHMMSSZ`) as
/// UTC.
///
/// Only the `Z`-suffixed floating/UTC form is supported; this engine does
/// not carry a time-zone database to resolve `TZID` parameters, so local
/// (non-`Z`) timestamps are rejected rather than silently misinterpreted.
///
/// # Errors
///
/// If `value` does not match `YYYYMMDDTHHMMSSZ`.
pub fn parse_utc_stamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")?;
    Ok(naive.and_utc())
}

/// Formats a UTC timestamp in the `YYYYMMDDTHHMMSSZ` wire format.
#[must_use]
pub fn format_utc_stamp(value: &DateTime<Utc>) -> String {
    value.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Extracts the first value of `property` (e.g. `"DTSTART"`) from `data`,
/// ignoring any parameters (text between the property name and the first
/// unescaped `:`).
#[must_use]
pub fn extract_property<'a>(data: &'a str, property: &str) -> Option<&'a str> {
    data.lines().find_map(|line| {
        let stripped = line.strip_prefix(property)?;
        let value = if let Some(value) = stripped.strip_prefix(':') {
            value
        } else {
            let colon = stripped.find(':')?;
            &stripped[colon + 1..]
        };
        Some(value.trim())
    })
}

/// Concatenates one or more component blocks (e.g. `VEVENT`, `VFREEBUSY`)
/// into a single synthetic `VCALENDAR`, attaching at most one `VTIMEZONE`
/// (the first one seen, since every component sharing a `TZID` should agree
/// on its definition).
#[must_use]
pub fn wrap_components(components: &[&str], timezone: Option<&str>) -> String {
    let mut out = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//caldav-engine//EN\r\n");
    if let Some(tz) = timezone {
        out.push_str(tz.trim());
        out.push_str("\r\n");
    }
    for component in components {
        out.push_str(component.trim());
        out.push_str("\r\n");
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT_NO_UID: &str = "BEGIN:VEVENT\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\n";
    const EVENT_WITH_UID: &str =
        "BEGIN:VEVENT\r\nUID:existing-uid@example.com\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\n";

    #[test]
    fn test_has_uid() {
        assert!(!has_uid(EVENT_NO_UID));
        assert!(has_uid(EVENT_WITH_UID));
    }

    #[test]
    fn test_ensure_uid_is_idempotent_when_present() {
        assert_eq!(ensure_uid(EVENT_WITH_UID), EVENT_WITH_UID);
    }

    #[test]
    fn test_ensure_uid_injects_before_end() {
        let patched = ensure_uid(EVENT_NO_UID);
        assert!(has_uid(&patched));
        assert!(patched.contains("UID:libcaldav-"));
        assert!(patched.contains("@tempuri.org"));
        let uid_pos = patched.find("UID:").unwrap();
        let end_pos = patched.find("END:VEVENT").unwrap();
        assert!(uid_pos < end_pos);
    }

    #[test]
    fn test_ensure_uid_deterministic() {
        assert_eq!(ensure_uid(EVENT_NO_UID), ensure_uid(EVENT_NO_UID));
    }

    #[test]
    fn test_extract_uid() {
        assert_eq!(extract_uid(EVENT_WITH_UID), Some("existing-uid@example.com"));
        assert_eq!(extract_uid(EVENT_NO_UID), None);
    }

    #[test]
    fn test_parse_and_format_utc_stamp_round_trip() {
        let parsed = parse_utc_stamp("20240101T100000Z").unwrap();
        assert_eq!(format_utc_stamp(&parsed), "20240101T100000Z");
    }

    #[test]
    fn test_parse_utc_stamp_rejects_non_utc() {
        assert!(parse_utc_stamp("20240101T100000").is_err());
    }

    #[test]
    fn test_extract_property_ignores_parameters() {
        let data = "DTSTART;TZID=Europe/Berlin:20240101T100000\r\n";
        assert_eq!(extract_property(data, "DTSTART"), Some("20240101T100000"));
    }

    #[test]
    fn test_extract_property_plain() {
        assert_eq!(
            extract_property(EVENT_NO_UID, "DTSTART"),
            Some("20240101T100000Z")
        );
    }

    #[test]
    fn test_wrap_components_keeps_first_timezone_only() {
        let wrapped = wrap_components(
            &["BEGIN:VEVENT\r\nUID:a\r\nEND:VEVENT"],
            Some("BEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\nEND:VTIMEZONE"),
        );
        assert_eq!(wrapped.matches("BEGIN:VTIMEZONE").count(), 1);
        assert!(wrapped.starts_with("BEGIN:VCALENDAR"));
        assert!(wrapped.ends_with("END:VCALENDAR\r\n"));
    }
}
