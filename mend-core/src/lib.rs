//! 🩹 mend core library.
//!
//! `mend-core` holds shared configuration, CLI definitions, error types and the typestate
//! tokens used by the workflow crate and the `mend` binary.

pub mod cli;
pub mod config;
pub mod config_states;
pub mod errors;
pub mod logging;
