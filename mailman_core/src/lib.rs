//! This crate implements an iCalendar feed of upcoming mail delivery days for Norwegian postal codes.
//!
//! The delivery days are read from an API whose address is published on
//! <https://www.posten.no/levering-av-post>. The address and its access token rotate without
//! notice, so they are rediscovered from that page whenever a calendar has to be rebuilt.
//! Built calendars are cached per postal code until the next local midnight.

pub use ical;

pub mod cache;
pub mod calendar_builder;
pub mod clock;
pub mod config;
pub mod date_sequence;
pub mod discovery;
pub mod error;
pub mod postal_code;
pub mod schedule_fetcher;
pub mod service;
