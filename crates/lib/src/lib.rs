//! cairn-lib: buildpack detection for the Cairn lifecycle
//!
//! Given an order of buildpack groups, this crate finds the first group
//! whose modules pass detection and whose build plan resolves:
//! - `module`: group elements, descriptors and the on-disk module store
//! - `detect`: candidate expansion, probe scheduling and plan resolution
//! - `execute`: running `bin/detect` probes in a controlled environment
//! - `files`: `order.toml`, `analyzed.toml`, `group.toml` and `plan.toml`

pub mod api;
pub mod detect;
pub mod execute;
pub mod files;
pub mod log;
pub mod module;
pub mod plan;
pub mod platform;
pub mod util;
