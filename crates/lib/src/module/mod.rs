//! Buildpack and extension identities, descriptors, and the store that
//! resolves one from the other.

pub mod store;
pub mod types;

pub use store::{DirStore, FsDirStore, ModuleDescriptor, ModuleInfo, StoreError};
pub use types::{Group, GroupElement, Kind, Order};
