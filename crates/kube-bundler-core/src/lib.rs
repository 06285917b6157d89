//! Kube Bundler core - manifest composition and deployment bundle assembly
//!
//! This crate turns a blueprint plus runtime parameters into Kubernetes
//! manifests, an environment descriptor listing every co-deployed solution,
//! and zip bundles carrying both alongside the solution's passthrough files.

pub mod blueprint;
pub mod bundle;
pub mod env;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod params;
pub mod writer;

pub mod prelude {
    //! Common imports for bundle producers
    pub use crate::bundle::{read_entry, BundleAssembler, ENVIRONMENT_ENTRY, MANIFEST_ENTRY};
    pub use crate::env::EnvironmentAggregator;
    pub use crate::error::BundleError;
    pub use crate::loader::{FsResourceLoader, MemoryResourceLoader, ResourceLoader};
    pub use crate::manifest::ManifestComposer;
    pub use crate::params::{ParameterSet, RevisionId, SolutionId, SolutionRevisionMap};
    pub use crate::writer::{BundleWriter, ZipBundleWriter};
}

// Re-export key types at crate root
pub use bundle::BundleAssembler;
pub use env::EnvironmentAggregator;
pub use error::BundleError;
pub use manifest::ManifestComposer;
pub use params::{ParameterSet, SolutionRevisionMap};
