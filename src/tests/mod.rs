//! Cross-module tests.
//!
//! Scenarios drive a request through parsing, planning, evaluation and
//! projection together; properties check invariants over generated filters
//! and documents.

mod properties;
mod scenarios;
