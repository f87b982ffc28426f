//! Service data model.
//!
//! A [`ServiceProject`] is the read-only input to packaging: a service name,
//! a root directory, and the ordered list of roles. Nothing in the
//! packaging pipeline mutates it.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Longest role or service name the manifest schema accepts.
pub const MAX_NAME_LEN: usize = 63;

/// VM size used when a role does not configure one.
pub const DEFAULT_VM_SIZE: &str = "ExtraSmall";

/// HTTP port web roles listen on unless configured otherwise.
pub const DEFAULT_WEB_PORT: u16 = 80;

/// Kind of a role within a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// Serves HTTP traffic through an input endpoint.
    Web,
    /// Background processing, no public endpoint.
    Worker,
}

impl RoleKind {
    /// Element name used for this kind in the service definition.
    pub fn element_name(self) -> &'static str {
        match self {
            Self::Web => "WebRole",
            Self::Worker => "WorkerRole",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Web => f.write_str("web"),
            Self::Worker => f.write_str("worker"),
        }
    }
}

/// One independently deployable unit of a service.
///
/// # Examples
///
/// ```
/// use cspack_core::{RoleDefinition, RoleKind};
///
/// let role = RoleDefinition::new("WebRole1", RoleKind::Web, 2, "svc/WebRole1");
/// assert_eq!(role.endpoint_port(), Some(80));
/// assert_eq!(role.vm_size, "ExtraSmall");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinition {
    pub name: String,
    pub kind: RoleKind,
    /// Number of instances to run. Must be positive.
    pub instances: u32,
    /// Root of the role's file tree.
    pub root: PathBuf,
    pub vm_size: String,
    /// Endpoint port override. Only meaningful for web roles.
    pub port: Option<u16>,
}

impl RoleDefinition {
    pub fn new(
        name: impl Into<String>,
        kind: RoleKind,
        instances: u32,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            instances,
            root: root.into(),
            vm_size: DEFAULT_VM_SIZE.to_owned(),
            port: None,
        }
    }

    /// Port of the HTTP input endpoint, or `None` for worker roles.
    pub fn endpoint_port(&self) -> Option<u16> {
        match self.kind {
            RoleKind::Web => Some(self.port.unwrap_or(DEFAULT_WEB_PORT)),
            RoleKind::Worker => None,
        }
    }
}

/// A cloud service ready to be packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProject {
    /// Service root directory.
    pub root: PathBuf,
    pub name: String,
    /// Roles in declaration order. Order shows up in the generated
    /// documents but does not affect the package structure.
    pub roles: Vec<RoleDefinition>,
    /// Storage account that cloud diagnostics report to.
    pub diagnostics_account: Option<String>,
}

impl ServiceProject {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            roles: Vec::new(),
            diagnostics_account: None,
        }
    }

    /// Append a role, builder style.
    pub fn with_role(mut self, role: RoleDefinition) -> Self {
        self.roles.push(role);
        self
    }

    /// Check names, instance counts and role uniqueness.
    ///
    /// Role names are compared ASCII case-insensitively: two roles that
    /// differ only in case would map onto the same container part.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, in declaration order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_service_name(&self.name)?;

        let mut seen: HashMap<String, &str> = HashMap::with_capacity(self.roles.len());
        for (index, role) in self.roles.iter().enumerate() {
            if role.name.is_empty() {
                return Err(ValidationError::EmptyRoleName { index });
            }
            validate_role_name(&role.name)?;

            if role.instances == 0 {
                return Err(ValidationError::ZeroInstances {
                    role: role.name.clone(),
                });
            }
            if role.kind == RoleKind::Worker && role.port.is_some() {
                return Err(ValidationError::WorkerEndpoint {
                    role: role.name.clone(),
                });
            }

            if let Some(existing) = seen.insert(role.name.to_ascii_lowercase(), &role.name) {
                return Err(ValidationError::DuplicateRole {
                    name: role.name.clone(),
                    existing: existing.to_owned(),
                });
            }
        }

        tracing::debug!(service = %self.name, roles = self.roles.len(), "project validated");
        Ok(())
    }
}

/// Validate a service name against the manifest schema rules.
pub fn validate_service_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyServiceName);
    }
    check_name(name).map_err(|reason| ValidationError::InvalidServiceName {
        name: name.to_owned(),
        reason,
    })
}

/// Validate a role name against the manifest schema rules.
///
/// An empty name is reported as invalid here; [`ServiceProject::validate`]
/// reports it with the role's position instead.
pub fn validate_role_name(name: &str) -> Result<(), ValidationError> {
    check_name(name).map_err(|reason| ValidationError::InvalidRoleName {
        name: name.to_owned(),
        reason,
    })
}

fn check_name(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("must not be empty"),
        Some(c) if !c.is_ascii_alphabetic() => return Err("must start with an ASCII letter"),
        Some(_) => {}
    }
    if name.len() > MAX_NAME_LEN {
        return Err("must be at most 63 characters");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return Err("may only contain ASCII letters, digits, '_', '-' and '.'");
    }
    Ok(())
}
