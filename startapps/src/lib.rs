//! Batch driver that starts compliance apps from a YAML data file.
//!
//! A data file names an app and supplies answers to its questions. The driver
//! loads the app, binds the answers onto a fresh task tree (starting further
//! apps where module questions call for them), and writes every output
//! document the tree renders. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (answer decoding, app references,
//!   module rules, cache keys, protocol checks). No I/O.
//! - **[`io`]**: Collaborators behind traits (store, app sources, validator,
//!   renderer) plus config loading and file output.
//!
//! Orchestration modules ([`instantiate`], [`bind`], [`outputs`], [`run`])
//! combine the two around a [`run_context::RunContext`].

pub mod bind;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod instantiate;
pub mod io;
pub mod logging;
pub mod outputs;
pub mod run;
pub mod run_context;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
