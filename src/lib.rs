#![deny(clippy::unwrap_used)]
// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! A CalDAV (RFC 4791) request engine.
//!
//! This crate implements the state machine that, for each high-level
//! calendar operation (add, modify, delete, fetch, freebusy, ...), composes
//! the correct sequence of HTTP verbs, enforces at-most-one-writer semantics
//! through WebDAV `LOCK`/`UNLOCK` and `ETag` preconditions, and extracts
//! iCalendar objects out of multi-status XML replies.
//!
//! [`CalDavClient`] is the main entry point. It is generic over the
//! connector used by the underlying [`hyper_util`] client, so callers choose
//! their own TLS stack (e.g. `hyper-rustls` or `hyper-tls`).
//!
//! # Hrefs
//!
//! All `href` strings returned by the server are unquoted by this library
//! before being returned to callers — you should assume every `href` has
//! already been URL-decoded for you. Conversely, functions that accept an
//! `href` parameter expect it to **not** be URL-encoded; this library quotes
//! it internally.
//!
//! # Scope
//!
//! This crate is deliberately narrow: it does not expand recurring events,
//! does not carry a time-zone database (it echoes `VTIMEZONE` verbatim), and
//! does not implement CardDAV. See `SPEC_FULL.md` in the repository for the
//! full rationale.

pub mod auth;
pub mod client;
pub mod error;
pub mod ical;
pub mod identity;
pub mod lock;
pub mod names;
pub mod probe;
pub mod settings;
pub mod transport;
pub mod xml;

pub use client::CalDavClient;
pub use identity::Id;
pub use settings::{CalDavUrl, RuntimeOptions};

/// A WebDAV property with a `namespace` and `name`.
///
/// This is currently an alias of [`roxmltree::ExpandedName`].
pub type PropertyName<'ns, 'name> = roxmltree::ExpandedName<'ns, 'name>;
