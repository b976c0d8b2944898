//! The depsweep backend process.
//!
//! One actor task owns all mutable state ([`state::BackendState`]) and
//! consumes [`actor::Msg`] messages: registry poll results, metadata and
//! archive fetch completions, pull-request completions, and operator
//! commands from the websocket console. Network I/O runs in detached tasks
//! that post their results back as messages; nothing shares memory across
//! task boundaries.

pub mod actor;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod console;
pub mod record;
pub mod scheduler;
pub mod state;
