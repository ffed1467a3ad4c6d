//! srcfacts: an incremental, multi-language symbolic model of a codebase.
//!
//! Per-file srcML units are parsed into scope trees, merged into one
//! aggregate, removed again file by file, and queried for name bindings
//! and call edges.

// Core infrastructure - re-exported from srcfacts-core
pub use srcfacts_core::concurrency;
pub use srcfacts_core::config;
pub use srcfacts_core::equality;
pub use srcfacts_core::error;
pub use srcfacts_core::lock;
pub use srcfacts_core::markup;
pub use srcfacts_core::merge;
pub use srcfacts_core::model;
pub use srcfacts_core::output;
pub use srcfacts_core::parse;
pub use srcfacts_core::resolve;
pub use srcfacts_core::store;
pub use srcfacts_core::unmerge;

// Language rules
pub use srcfacts_cpp::CppRules;
pub use srcfacts_csharp::CSharpRules;
pub use srcfacts_java::JavaRules;

// Front door
pub mod cli;
