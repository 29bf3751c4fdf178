//! Library surface of the drill daemon, exposed for integration tests.

pub mod auth;
pub mod http;
