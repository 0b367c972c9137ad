#![forbid(unsafe_code)]

//! Core types for the domsig XML Signature engine.
//!
//! Holds the shared error type, the algorithm identifier constants and the
//! namespace and element names used by every other crate in the workspace.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
