//! A synchronous stub resolver.
//!
//! This module provides a [`StubResolver`] that answers questions by
//! asking the recursive name servers listed in the system’s resolver
//! configuration. It builds on the [query engine][crate::engine] and
//! blocks the calling thread while the engine does the actual work.
//!
//! The configuration is read from `/etc/resolv.conf` by default. See
//! [`ResolvConf`] for the options understood.

pub use self::conf::{ResolvConf, ResolvOptions};
pub use self::stub::StubResolver;

pub mod conf;
pub mod stub;
