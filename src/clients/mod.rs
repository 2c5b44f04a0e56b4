//! Thin clients for the hub's external domain services.
//!
//! The conversational core treats these as opaque: each is a small trait
//! plus one concrete implementation, nothing more.

pub mod device;
pub mod scenario;
pub mod torrent;
