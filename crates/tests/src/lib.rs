//! Integration suite for Solstice.
//!
//! Exercises the dispatch engine end to end against in-process mock providers
//! (deterministic, no sockets) and the HTTP surface via `tower::oneshot`.
//! Transport-level behavior (real HTTP 500s, body parsing) is covered with
//! mockito upstreams.

pub mod mock_provider;

#[cfg(test)]
mod http_api_tests;
#[cfg(test)]
mod scenario_tests;
