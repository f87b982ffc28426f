//! Manifest generation, content filtering, and service package assembly.
//!
//! # Packaging pipeline
//!
//! ```text
//! cspack package
//!   1. Validate   ── ServiceProject::validate() (nothing written on failure)
//!   2. Manifests  ── ManifestGenerator::generate()
//!   3. Roles      ── ContentFilter::walk() → one inner container per role
//!   4. Package    ── outer container: manifests + roles + index parts
//!   5. Write      ── stage all four files as temp siblings, rename the
//!                    three manifests into place, then cloud_package.cspkg
//! ```
//!
//! # Content filtering
//!
//! Any directory named `logs` (or another configured name), at any depth
//! of a role tree, is dropped together with its whole subtree. Files with
//! that name are kept.
//!
//! # Part count
//!
//! A package always holds `roles + PACKAGE_FIXED_PART_COUNT` parts.

pub mod container;
pub mod filter;
pub mod manifest;
pub mod package;
mod xml;

pub use container::{ContainerBuilder, ContainerError, ContainerReader};
pub use filter::{ContentFilter, EntryKind};
pub use manifest::{Environment, ManifestGenerator, ManifestSet};
pub use package::{
    BuiltPackage, Diagnostics, PACKAGE_FIXED_PART_COUNT, PackageAssembler, PackageOutput,
    PackagingError, create_package, write_manifests,
};

pub use cspack_core::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a packaging operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad project data; raised before anything is written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// I/O or serialization failure; any previous artifact is untouched.
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Config(cspack_core::Error),
}

impl From<cspack_core::Error> for Error {
    fn from(err: cspack_core::Error) -> Self {
        match err {
            cspack_core::Error::Validation(v) => Self::Validation(v),
            other => Self::Config(other),
        }
    }
}
