//! Request-time access-control gate for the management dashboard.
//!
//! Every inbound request is classified into a zone, resolved against the
//! identity backend, and mapped through an ordered rule table to exactly
//! one decision: pass through, redirect, reject, or tear the session down
//! and redirect. The decision engine itself is pure and lives in
//! [`engine`]; [`gate::AccessGate`] wires it into an actix application.

pub mod config;
pub mod context;
pub mod engine;
pub mod gate;
pub mod identity;
pub mod logs;
pub mod response;
pub mod server;
pub mod session;
pub mod zone;
