//! Conversational orchestration engine for chat platforms.
//!
//! Normalizes multi-modal chat history into model turns, drives a
//! tool-calling exchange with model fallback, and paces replies through a
//! per-conversation admission guard.

// No unsafe, no undocumented public items, no silent style drift.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![deny(unused_must_use)]
#![forbid(unsafe_op_in_unsafe_fn)]
// Clippy discipline: panics and stray prints are build errors outside tests
// and the console adapter.
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

/// Orchestration core: pipeline, history, tools, cache, guard.
pub mod agent;
/// Phone calling-code to country mapping.
pub mod country;
/// Capability traits and their HTTP client implementations.
pub mod providers;
/// Thin JSON-file persistence (consent, reminders, usage stats).
pub mod store;
/// Entry helpers to start the agent from the console binary.
pub mod start_parley_agent;
