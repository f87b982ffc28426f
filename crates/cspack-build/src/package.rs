//! Nested service package assembly.
//!
//! ```text
//! cloud_package.cspkg
//!   ServiceDefinition.csdef
//!   ServiceConfiguration.Cloud.cscfg
//!   ServiceConfiguration.Local.cscfg
//!   roles/<RoleName>.cssx      one per role, itself a container
//!   PackageManifest.xml
//!   [Content_Types].xml
//! ```

use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

use cspack_core::{CspackConfig, RoleDefinition, ServiceProject};
use sha2::{Digest, Sha256};

use crate::container::{CONTAINER_CONTENT_TYPE, ContainerBuilder, ContainerError};
use crate::filter::{ContentFilter, WalkError};
use crate::manifest::{ManifestGenerator, ManifestSet};
use crate::{Error, xml};

/// Parts every service package holds besides the role containers: the
/// three manifest documents, the package manifest and the content-type
/// index. Consumers check `part_count == roles + PACKAGE_FIXED_PART_COUNT`.
pub const PACKAGE_FIXED_PART_COUNT: usize = 5;

pub const PACKAGE_MANIFEST_URI: &str = "PackageManifest.xml";

const PACKAGE_FORMAT_VERSION: u32 = 1;

/// URI of a role's container inside the service package.
pub fn role_part_uri(role_name: &str) -> String {
    format!("roles/{role_name}.cssx")
}

/// Informational text produced while packaging.
///
/// `out` carries progress and counts, `err` carries warnings. Neither is
/// an error: failures are reported through [`Error`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub out: Option<String>,
    pub err: Option<String>,
}

impl Diagnostics {
    fn info(&mut self, line: impl AsRef<str>) {
        push_line(&mut self.out, line.as_ref());
    }

    fn warn(&mut self, line: impl AsRef<str>) {
        push_line(&mut self.err, line.as_ref());
    }
}

fn push_line(buf: &mut Option<String>, line: &str) {
    let buf = buf.get_or_insert_with(String::new);
    buf.push_str(line);
    buf.push('\n');
}

/// A role's serialized container and what went into it.
#[derive(Debug, Clone)]
pub struct RolePackage {
    pub name: String,
    pub uri: String,
    pub files: usize,
    pub excluded_dirs: usize,
    pub bytes: Vec<u8>,
}

/// A fully assembled, not yet written, service package.
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    pub bytes: Vec<u8>,
    pub manifests: ManifestSet,
    /// Part URIs of the outer container, in serialization order.
    pub part_uris: Vec<String>,
    pub diagnostics: Diagnostics,
}

impl BuiltPackage {
    pub fn part_count(&self) -> usize {
        self.part_uris.len()
    }
}

/// Paths written by [`PackageAssembler::write_to`].
#[derive(Debug, Clone)]
pub struct PackageOutput {
    pub artifact: PathBuf,
    pub manifests: Vec<PathBuf>,
    pub part_count: usize,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("output directory {path} does not exist")]
    OutputDirMissing { path: PathBuf },

    #[error("root of role '{role}' not found at {path}")]
    RoleRootMissing { role: String, path: PathBuf },

    #[error("failed to read tree of role '{role}' at {path}")]
    ReadRoleTree {
        role: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read file {path} of role '{role}'")]
    ReadFile {
        role: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("path {path} of role '{role}' is not valid UTF-8")]
    NonUtf8Path { role: String, path: PathBuf },

    #[error("failed to build container for {context}")]
    Container {
        context: String,
        source: ContainerError,
    },

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Builds the service package for one project.
///
/// The project and filter are borrowed for the lifetime of the assembler;
/// nothing is cached between runs.
pub struct PackageAssembler<'a> {
    project: &'a ServiceProject,
    filter: &'a ContentFilter,
}

impl<'a> PackageAssembler<'a> {
    pub fn new(project: &'a ServiceProject, filter: &'a ContentFilter) -> Self {
        Self { project, filter }
    }

    /// Assemble the package in memory.
    ///
    /// Reads the role trees but writes nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for bad project data, before any role is read
    /// - [`Error::Packaging`] when a role tree cannot be read or a container
    ///   cannot be serialized
    pub fn assemble(&self) -> Result<BuiltPackage, Error> {
        let manifests = ManifestGenerator::new(self.project).generate()?;
        let mut diagnostics = Diagnostics::default();

        let roles = self
            .project
            .roles
            .iter()
            .map(|role| self.build_role(role, &mut diagnostics))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outer = ContainerBuilder::new();
        let outer_err = |source| PackagingError::Container {
            context: format!("service '{}'", self.project.name),
            source,
        };
        for (file, doc) in manifests.documents() {
            outer
                .add_file(file, doc.as_bytes().to_vec())
                .map_err(outer_err)?;
        }
        let package_manifest = self.render_package_manifest(&manifests, &roles);
        outer
            .add_file(PACKAGE_MANIFEST_URI, package_manifest.into_bytes())
            .map_err(outer_err)?;
        for role in roles {
            outer
                .add_part(role.uri, CONTAINER_CONTENT_TYPE, role.bytes)
                .map_err(outer_err)?;
        }

        let part_uris = outer.part_uris();
        let bytes = outer.finish().map_err(outer_err)?;

        diagnostics.info(format!(
            "Packaged service '{}': {} roles, {} parts, {} bytes",
            self.project.name,
            self.project.roles.len(),
            part_uris.len(),
            bytes.len()
        ));
        tracing::info!(
            service = %self.project.name,
            roles = self.project.roles.len(),
            parts = part_uris.len(),
            "service package assembled"
        );

        Ok(BuiltPackage {
            bytes,
            manifests,
            part_uris,
            diagnostics,
        })
    }

    /// Assemble and write the package to `output`, with the manifest
    /// documents written next to it.
    ///
    /// All four files are staged as temporary siblings first. The manifests
    /// are renamed into place before the artifact, so the artifact is only
    /// replaced once everything else has been written.
    pub fn write_to(&self, output: &Path) -> Result<PackageOutput, Error> {
        self.project.validate()?;
        let dir = parent_dir(output);
        if !dir.is_dir() {
            return Err(PackagingError::OutputDirMissing {
                path: dir.to_path_buf(),
            }
            .into());
        }

        let built = self.assemble()?;
        let artifact = Staged::new(output, &built.bytes)?;
        let staged = stage_manifests(&built.manifests, dir)?;

        let mut manifests = Vec::with_capacity(staged.len());
        for file in staged {
            manifests.push(file.commit()?);
        }
        artifact.commit()?;
        tracing::info!(path = %output.display(), "wrote service package");

        Ok(PackageOutput {
            artifact: output.to_path_buf(),
            manifests,
            part_count: built.part_count(),
            diagnostics: built.diagnostics,
        })
    }

    fn build_role(
        &self,
        role: &RoleDefinition,
        diagnostics: &mut Diagnostics,
    ) -> Result<RolePackage, PackagingError> {
        if !role.root.is_dir() {
            return Err(PackagingError::RoleRootMissing {
                role: role.name.clone(),
                path: role.root.clone(),
            });
        }
        tracing::debug!(role = %role.name, root = %role.root.display(), "packaging role");

        let mut container = ContainerBuilder::new();
        let stats = self
            .filter
            .walk(&role.root, |relative: &Path, absolute: &Path| -> Result<(), PackagingError> {
                let uri = part_uri(relative).ok_or_else(|| PackagingError::NonUtf8Path {
                    role: role.name.clone(),
                    path: absolute.to_path_buf(),
                })?;
                let data = std::fs::read(absolute).map_err(|e| PackagingError::ReadFile {
                    role: role.name.clone(),
                    path: absolute.to_path_buf(),
                    source: e,
                })?;
                container
                    .add_file(uri, data)
                    .map_err(|source| PackagingError::Container {
                        context: format!("role '{}'", role.name),
                        source,
                    })
            })
            .map_err(|e| match e {
                WalkError::Read(err) => PackagingError::ReadRoleTree {
                    role: role.name.clone(),
                    path: err.path().unwrap_or(&role.root).to_path_buf(),
                    source: err.into(),
                },
                WalkError::Visit(err) => err,
            })?;

        if stats.root_excluded {
            diagnostics.warn(format!(
                "role '{}': root directory {} is excluded from packaging; the role container is empty",
                role.name,
                role.root.display()
            ));
        } else if stats.files == 0 {
            diagnostics.warn(format!("role '{}' contains no files to package", role.name));
        }
        for link in &stats.skipped_links {
            diagnostics.warn(format!(
                "role '{}': skipped symbolic link {}",
                role.name,
                link.display()
            ));
        }
        diagnostics.info(format!(
            "Packaged role '{}' ({}, {} instances): {} files, {} excluded directories",
            role.name, role.kind, role.instances, stats.files, stats.excluded_dirs
        ));

        let bytes = container
            .finish()
            .map_err(|source| PackagingError::Container {
                context: format!("role '{}'", role.name),
                source,
            })?;

        Ok(RolePackage {
            name: role.name.clone(),
            uri: role_part_uri(&role.name),
            files: stats.files,
            excluded_dirs: stats.excluded_dirs,
            bytes,
        })
    }

    fn render_package_manifest(&self, manifests: &ManifestSet, roles: &[RolePackage]) -> String {
        let mut out = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <PackageManifest serviceName=\"{}\" formatVersion=\"{}\">\n  <Documents>\n",
            xml::escape(&self.project.name),
            PACKAGE_FORMAT_VERSION,
        );
        for (file, doc) in manifests.documents() {
            out.push_str(&format!(
                "    <Document uri=\"{}\" size=\"{}\" sha256=\"{}\" />\n",
                file,
                doc.len(),
                sha256_hex(doc.as_bytes()),
            ));
        }
        out.push_str("  </Documents>\n  <Roles>\n");
        for (role, package) in self.project.roles.iter().zip(roles) {
            out.push_str(&format!(
                "    <Role name=\"{}\" kind=\"{}\" instances=\"{}\" uri=\"{}\" files=\"{}\" size=\"{}\" sha256=\"{}\" />\n",
                xml::escape(&role.name),
                role.kind,
                role.instances,
                xml::escape(&package.uri),
                package.files,
                package.bytes.len(),
                sha256_hex(&package.bytes),
            ));
        }
        out.push_str("  </Roles>\n</PackageManifest>\n");
        out
    }
}

/// Package the service rooted at `root` as described by its `cspack.toml`.
///
/// Writes the package and the three manifest documents into `root` and
/// returns the informational text produced on the way.
pub fn create_package(root: &Path) -> Result<Diagnostics, Error> {
    let config = CspackConfig::load(root)?;
    let project = config.to_project(root);
    let filter = ContentFilter::new(config.package.exclude_dirs.iter().cloned());
    let output = root.join(&config.package.output);

    let written = PackageAssembler::new(&project, &filter).write_to(&output)?;
    Ok(written.diagnostics)
}

/// Render and write only the manifest documents of the service at `root`.
pub fn write_manifests(root: &Path) -> Result<Vec<PathBuf>, Error> {
    let config = CspackConfig::load(root)?;
    let project = config.to_project(root);
    let manifests = ManifestGenerator::new(&project).generate()?;
    let staged = stage_manifests(&manifests, root)?;
    let written = staged
        .into_iter()
        .map(Staged::commit)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(written)
}

fn stage_manifests(manifests: &ManifestSet, dir: &Path) -> Result<Vec<Staged>, PackagingError> {
    manifests
        .documents()
        .into_iter()
        .map(|(file, doc)| Staged::new(&dir.join(file), doc.as_bytes()))
        .collect()
}

/// File contents written to a temporary sibling of their final path,
/// waiting to be renamed over it. Dropping it removes the temporary file.
struct Staged {
    tmp: tempfile::NamedTempFile,
    path: PathBuf,
}

impl Staged {
    fn new(path: &Path, bytes: &[u8]) -> Result<Self, PackagingError> {
        let write_err = |source| PackagingError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".cspack-")
            .suffix(".tmp")
            .tempfile_in(parent_dir(path))
            .map_err(write_err)?;
        tmp.write_all(bytes).map_err(write_err)?;
        if let Some(permissions) = target_permissions(path).map_err(write_err)? {
            tmp.as_file().set_permissions(permissions).map_err(write_err)?;
        }
        tmp.as_file().sync_all().map_err(write_err)?;

        Ok(Self {
            tmp,
            path: path.to_path_buf(),
        })
    }

    /// Rename the staged file over its final path.
    fn commit(self) -> Result<PathBuf, PackagingError> {
        let Self { tmp, path } = self;
        match tmp.persist(&path) {
            Ok(_) => Ok(path),
            Err(e) => Err(PackagingError::Write {
                path,
                source: e.error,
            }),
        }
    }
}

/// Permissions a replaced file should carry: those of the file being
/// replaced, or `0644` for a new one. Temporary files start out owner-only.
fn target_permissions(path: &Path) -> std::io::Result<Option<std::fs::Permissions>> {
    if path.is_file() {
        return Ok(Some(std::fs::metadata(path)?.permissions()));
    }
    Ok(new_file_permissions())
}

#[cfg(unix)]
fn new_file_permissions() -> Option<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<std::fs::Permissions> {
    None
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// `/`-joined URI for a path relative to a role root, or `None` if the
/// path is not valid UTF-8.
fn part_uri(relative: &Path) -> Option<String> {
    let segments = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
