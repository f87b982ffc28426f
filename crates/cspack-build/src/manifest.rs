use cspack_core::{RoleDefinition, ServiceProject, ValidationError};

use crate::xml::escape;

pub const SERVICE_DEFINITION_FILE: &str = "ServiceDefinition.csdef";
pub const CLOUD_CONFIGURATION_FILE: &str = "ServiceConfiguration.Cloud.cscfg";
pub const LOCAL_CONFIGURATION_FILE: &str = "ServiceConfiguration.Local.cscfg";

const DEFINITION_NS: &str = "http://schemas.microsoft.com/ServiceHosting/2008/10/ServiceDefinition";
const CONFIGURATION_NS: &str =
    "http://schemas.microsoft.com/ServiceHosting/2008/10/ServiceConfiguration";
const DIAGNOSTICS_CONNECTION_SETTING: &str =
    "Microsoft.WindowsAzure.Plugins.Diagnostics.ConnectionString";
const DIAGNOSTICS_REMOTE_SETTING: &str = "Microsoft.WindowsAzure.Plugins.Diagnostics.RemoteEnabled";
const PLACEHOLDER_ACCOUNT: &str = "[DIAGNOSTICS_STORAGE_ACCOUNT]";

/// Target environment of a service configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Cloud,
    Local,
}

impl Environment {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Cloud => CLOUD_CONFIGURATION_FILE,
            Self::Local => LOCAL_CONFIGURATION_FILE,
        }
    }

    fn diagnostics_connection_string(self, account: Option<&str>) -> String {
        match self {
            Self::Cloud => format!(
                "DefaultEndpointsProtocol=https;AccountName={}",
                account.unwrap_or(PLACEHOLDER_ACCOUNT)
            ),
            Self::Local => "UseDevelopmentStorage=true".to_owned(),
        }
    }

    fn remote_diagnostics(self) -> bool {
        matches!(self, Self::Cloud)
    }
}

/// The three documents that describe a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSet {
    pub definition: String,
    pub cloud: String,
    pub local: String,
}

impl ManifestSet {
    /// `(file name, content)` pairs, definition first.
    pub fn documents(&self) -> [(&'static str, &str); 3] {
        [
            (SERVICE_DEFINITION_FILE, &self.definition),
            (CLOUD_CONFIGURATION_FILE, &self.cloud),
            (LOCAL_CONFIGURATION_FILE, &self.local),
        ]
    }
}

/// Renders the service definition and configuration documents.
pub struct ManifestGenerator<'a> {
    project: &'a ServiceProject,
}

impl<'a> ManifestGenerator<'a> {
    pub fn new(project: &'a ServiceProject) -> Self {
        Self { project }
    }

    /// Validate the project and render all three documents.
    pub fn generate(&self) -> Result<ManifestSet, ValidationError> {
        self.project.validate()?;

        Ok(ManifestSet {
            definition: self.render_definition(),
            cloud: self.render_configuration(Environment::Cloud),
            local: self.render_configuration(Environment::Local),
        })
    }

    pub fn render_definition(&self) -> String {
        let roles: String = self.project.roles.iter().map(render_role_definition).collect();

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<ServiceDefinition name="{name}" xmlns="{ns}">
{roles}</ServiceDefinition>
"#,
            name = escape(&self.project.name),
            ns = DEFINITION_NS,
            roles = roles,
        )
    }

    pub fn render_configuration(&self, env: Environment) -> String {
        let account = self.project.diagnostics_account.as_deref();
        let connection = env.diagnostics_connection_string(account);
        let roles: String = self
            .project
            .roles
            .iter()
            .map(|role| {
                format!(
                    r#"  <Role name="{name}">
    <Instances count="{count}" />
    <ConfigurationSettings>
      <Setting name="{conn_setting}" value="{connection}" />
      <Setting name="{remote_setting}" value="{remote}" />
    </ConfigurationSettings>
  </Role>
"#,
                    name = escape(&role.name),
                    count = role.instances,
                    conn_setting = DIAGNOSTICS_CONNECTION_SETTING,
                    connection = escape(&connection),
                    remote_setting = DIAGNOSTICS_REMOTE_SETTING,
                    remote = env.remote_diagnostics(),
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<ServiceConfiguration serviceName="{name}" osFamily="2" osVersion="*" xmlns="{ns}">
{roles}</ServiceConfiguration>
"#,
            name = escape(&self.project.name),
            ns = CONFIGURATION_NS,
            roles = roles,
        )
    }
}

fn render_role_definition(role: &RoleDefinition) -> String {
    let endpoints = match role.endpoint_port() {
        Some(port) => format!(
            r#"    <Sites>
      <Site name="Web">
        <Bindings>
          <Binding name="Endpoint1" endpointName="Endpoint1" />
        </Bindings>
      </Site>
    </Sites>
    <Endpoints>
      <InputEndpoint name="Endpoint1" protocol="http" port="{port}" />
    </Endpoints>
"#
        ),
        None => String::new(),
    };

    format!(
        r#"  <{element} name="{name}" vmsize="{vm_size}">
{endpoints}    <Imports>
      <Import moduleName="Diagnostics" />
    </Imports>
  </{element}>
"#,
        element = role.kind.element_name(),
        name = escape(&role.name),
        vm_size = escape(&role.vm_size),
        endpoints = endpoints,
    )
}
