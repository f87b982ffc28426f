use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::project::{RoleDefinition, RoleKind, ServiceProject};

/// Name of the configuration file at the service root.
pub const CONFIG_FILE_NAME: &str = "cspack.toml";

/// cspack.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CspackConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub package: PackageConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, rendered into every manifest document
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Artifact file name, relative to the service root
    #[serde(default = "default_output")]
    pub output: String,
    /// Directory names excluded from role content at any depth
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Storage account the cloud configuration sends diagnostics to.
    /// When None, the cloud configuration keeps a placeholder account.
    pub storage_account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    pub kind: RoleKind,
    /// Instance count
    #[serde(default = "default_instances")]
    pub instances: u32,
    /// Role directory relative to the service root (defaults to the role name)
    pub path: Option<String>,
    /// VM size
    #[serde(default = "default_vm_size")]
    pub vm_size: String,
    /// Endpoint port for web roles
    pub port: Option<u16>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

impl CspackConfig {
    /// Load cspack.toml from the given service root.
    ///
    /// Unlike most tools there is no usable default here: the service
    /// name has to come from somewhere.
    pub fn load(root: &Path) -> crate::Result<Self> {
        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(crate::Error::ConfigMissing { path: config_path });
        }
        let content =
            std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                path: config_path.clone(),
                source: e,
            })?;
        toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
            path: config_path,
            source: e,
        })
    }

    /// Resolve the configuration into a [`ServiceProject`] rooted at `root`.
    ///
    /// Role roots are resolved relative to `root`. No validation happens
    /// here; packaging validates before it touches the filesystem.
    pub fn to_project(&self, root: &Path) -> ServiceProject {
        let roles = self
            .roles
            .iter()
            .map(|r| {
                let dir = r.path.as_deref().unwrap_or(&r.name);
                RoleDefinition {
                    name: r.name.clone(),
                    kind: r.kind,
                    instances: r.instances,
                    root: root.join(dir),
                    vm_size: r.vm_size.clone(),
                    port: r.port,
                }
            })
            .collect();

        ServiceProject {
            root: root.to_path_buf(),
            name: self.service.name.clone(),
            roles,
            diagnostics_account: self.diagnostics.storage_account.clone(),
        }
    }
}

fn default_output() -> String {
    "cloud_package.cspkg".to_owned()
}

fn default_exclude_dirs() -> Vec<String> {
    vec!["logs".to_owned()]
}

fn default_instances() -> u32 {
    1
}

fn default_vm_size() -> String {
    crate::project::DEFAULT_VM_SIZE.to_owned()
}
