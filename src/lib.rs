//! A readiness-driven DNS query engine.
//!
//! This crate sends DNS queries to name servers and collects their
//! responses without tying up a thread per query. Queries are run by a
//! small pool of event loop threads sharing a single readiness
//! multiplexer. Each query tries UDP first and falls back to TCP if the
//! response is truncated or something goes wrong, is bounded by its own
//! deadline, and can be cancelled at any time.
//!
//! # Modules
//!
//! * [base] contains the wire format types used to compose requests and
//!   inspect responses,
//! * [engine] contains the query engine itself.
//!
//! In addition, there is a module behind a feature flag:
//!
#![cfg_attr(feature = "resolv", doc = "* [resolv]:")]
#![cfg_attr(not(feature = "resolv"), doc = "* resolv:")]
//!   A synchronous stub resolver on top of the engine, configured through
//!   the system’s `/etc/resolv.conf`.
//!
//! # Reference of Feature Flags
//!
//! * `resolv`: Enables the stub resolver. This feature is enabled by
//!   default.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod base;
pub mod engine;

#[cfg(feature = "resolv")]
#[cfg_attr(docsrs, doc(cfg(feature = "resolv")))]
pub mod resolv;
