//! Keel operator - installs the Keel CRDs and runs one convergence
//! controller per managed kind

pub mod controller_runner;
pub mod registry;

pub use controller_runner::{build_controller, ControllerFuture, RunSettings};
pub use registry::{all_crds, lookup, select, KindEntry, ALL_KINDS};
