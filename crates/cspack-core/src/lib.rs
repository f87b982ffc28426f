//! Core types and configuration for cspack.
//!
//! This crate defines the `cspack.toml` schema ([`CspackConfig`]), the
//! service data model ([`ServiceProject`], [`RoleDefinition`]), name
//! validation, and shared error types.

pub mod config;
pub mod error;
pub mod project;

pub use config::{
    CONFIG_FILE_NAME, CspackConfig, DiagnosticsConfig, PackageConfig, RoleConfig, ServiceConfig,
};
pub use error::{Error, Result, ValidationError};
pub use project::{RoleDefinition, RoleKind, ServiceProject};
