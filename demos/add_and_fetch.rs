// Copyright 2023-2024 Hugo Osvaldo Barrera
//
// SPDX-License-Identifier: EUPL-1.2

//! Adds a single event to a collection, then reads it back over the same
//! time range.
//!
//! Usage:
//!
//!     cargo run --example=add_and_fetch https://example.com/dav/calendars/home/ user@example.com MYPASSWORD

use caldav_engine::auth::Auth;
use caldav_engine::settings::RuntimeOptions;
use caldav_engine::CalDavClient;
use http::Uri;
use hyper_rustls::HttpsConnectorBuilder;

const EVENT: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//caldav-engine//demo//EN\r\n\
BEGIN:VEVENT\r\n\
DTSTART:20260101T090000Z\r\n\
DTEND:20260101T100000Z\r\n\
SUMMARY:Demo event\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut arguments = std::env::args();
    arguments.next().expect("binary has been called with a name");
    let collection: Uri = arguments
        .next()
        .expect("$1 is defined")
        .parse()
        .expect("$1 is a valid URL");
    let username = arguments.next().expect("$2 is a valid username");
    let password = arguments.next().expect("$3 is a valid password").into();

    let https = HttpsConnectorBuilder::new()
        .with_native_roots()
        .expect("native TLS roots should be available")
        .https_or_http()
        .enable_http1()
        .build();
    let auth = Auth::Basic {
        username,
        password: Some(password),
    };

    let client = CalDavClient::new(collection, auth, https, RuntimeOptions::default());

    if !client.probe().await.expect("probe should succeed") {
        eprintln!("server did not advertise calendar-access; aborting");
        return;
    }

    let (response, id) = client.add(EVENT).await.expect("add should succeed");
    println!("add returned {response:?}, id: {id:?}");

    let start = chrono::Utc::now() - chrono::Duration::days(1);
    let end = chrono::Utc::now() + chrono::Duration::days(365);
    match client.get_range(start, end).await.expect("get_range should succeed") {
        Some(text) => println!("fetched back:\n{text}"),
        None => println!("nothing found in range"),
    }
}
