//! Cross-crate test suite for Rigshare.
//!
//! Integration tests live under `tests/`: the worked settlement scenarios,
//! reentrant payout sinks, property tests over random operation sequences,
//! and an end-to-end run through a persisted node.

pub mod helpers;
