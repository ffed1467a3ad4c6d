//! Core infrastructure for srcfacts.
//!
//! This crate provides the language-agnostic engine:
//! - srcML element façade (`markup`)
//! - Statement/expression arena and its navigation (`model`)
//! - Tag-driven parser dispatch shared by every language (`parse`)
//! - Merge and unmerge of per-file scope trees (`merge`, `unmerge`)
//! - Name, call and type resolution (`resolve`)
//! - Structural equality used by tests and tooling (`equality`)
//! - Persistence of scope trees (`store`)
//! - Advisory locking of the shared aggregate (`lock`)
//! - Parallel parsing under an external concurrency policy (`concurrency`)
//! - Layered configuration, error types and JSON output types

pub mod concurrency;
pub mod config;
pub mod equality;
pub mod error;
pub mod lock;
pub mod markup;
pub mod merge;
pub mod model;
pub mod output;
pub mod parse;
pub mod resolve;
pub mod store;
pub mod unmerge;

#[cfg(test)]
pub(crate) mod test_support;
