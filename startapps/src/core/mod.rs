//! Deterministic, pure logic shared by the app driver.
//!
//! Core modules must be free of I/O side effects. They decode input data,
//! describe app modules, and compute cache keys and protocol checks on
//! in-memory values.

pub mod answer_record;
pub mod app_ref;
pub mod canonical_key;
pub mod module;
pub mod protocol;
