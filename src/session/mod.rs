//! Session management: connections, rooms and routing

pub mod service;

pub use service::{ConnectionContext, SessionError, SessionService};
