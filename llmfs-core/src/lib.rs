//! llmfs Core - conversational sessions exposed as a synthetic file tree.
//!
//! This crate provides:
//! - [`SessionStore`]: registry of independent conversations
//! - [`Session`]: one conversation's history, settings and lifecycle
//! - [`vfs`]: the file/directory projection of the store
//! - [`MetricsCollector`]: aggregate backend usage
//!
//! ## Layout
//!
//! ```text
//! /new            read: create a session, returns its id
//! /<id>/ask       write: prompt, read: last response
//! /<id>/context   read: history as JSON
//! /<id>/ctl       write: reset | close
//! /<id>/model, temperature, system, thinking, prefill
//! /system         global system prompt
//! /metrics        usage report
//! ```

pub mod metrics;
pub mod session;
pub mod store;
pub mod vfs;

pub use metrics::MetricsCollector;
pub use session::{Lifecycle, Session, SessionSettings};
pub use store::SessionStore;
pub use vfs::{Dir, File, Namespace, Node, NodeKind, Stat};
