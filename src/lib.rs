//! pvz-loadtest: synthetic HTTP load for the PVZ pickup-point management API.
//!
//! The [`loadtest`] module holds the engine. The `pvz-loadtest` binary wraps
//! it in a `run` / `init` CLI.

pub mod loadtest;
