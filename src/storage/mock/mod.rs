//! Mock storage implementations for testing.
//!
//! Also backs the `memory` storage type for standalone runs.

mod log_store;
mod registry_store;

pub use log_store::MockLogStore;
pub use registry_store::MockRegistryStore;

#[cfg(test)]
mod tests;
