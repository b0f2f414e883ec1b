pub mod paths;
pub mod target;

pub use target::{OsDistro, RunImageTarget, TargetMetadata, satisfies};
