//! End-to-end detection against real module directories.

mod common;
mod detect_tests;
