//! Broadcast scheduling and dispatch core.
//!
//! Converts stored send intents into individually tracked delivery
//! attempts against the WhatsApp gateway: broadcasts are expanded into
//! one scheduled message per contact, and a periodic dispatch cycle
//! claims due messages, renders their bodies, sends them, and records
//! each attempt.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
