//! Deterministic, tier-respecting prerequisite tree builder.
//!
//! Layers, innermost first: `domain` (construction, repair, validation),
//! `application` (documents and services), `infrastructure` (I/O, wiring)
//! and `cli`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod tree_traits;
pub mod util;
