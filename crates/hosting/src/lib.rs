//! GitHub client and the fork → branch → commit → pull-request sequence.
//!
//! The server crate only talks to the [`HostingClient`] trait; orchestrator
//! tests run against an in-memory fake. The HTTP implementation carries the
//! operator-supplied token on every request and never logs it.

mod client;
mod http;
mod orchestrate;

pub use client::{ForkIdentity, HostingClient, RepoInfo};
pub use http::HttpHosting;
pub use orchestrate::{open_unused_dependencies_pull_request, PrFailure, PullRequestInput};
