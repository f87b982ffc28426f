//! Part-addressable container, stored as a zip archive.
//!
//! The same builder produces both the per-role containers and the outer
//! service package; a role container is just a part of the outer one.
//! Every finished container carries a `[Content_Types].xml` part that maps
//! each part URI to its content type.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::xml;

/// URI of the content-type index written into every container.
pub const CONTENT_TYPES_URI: &str = "[Content_Types].xml";

/// Content type of a nested container part.
pub const CONTAINER_CONTENT_TYPE: &str = "application/vnd.cspack.container+zip";

const CONTENT_TYPES_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.content-types+xml";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A single entry of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub uri: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Builds a container in memory.
///
/// Part URIs are relative, `/`-separated, and unique ignoring ASCII case.
/// Parts are serialized in URI order with a fixed timestamp, so the same
/// set of parts always produces the same bytes.
///
/// # Examples
///
/// ```
/// use cspack_build::container::{ContainerBuilder, ContainerReader};
///
/// let mut builder = ContainerBuilder::new();
/// builder.add_file("bin/server.js", b"console.log(1)".to_vec()).unwrap();
/// let bytes = builder.finish().unwrap();
///
/// let reader = ContainerReader::open(bytes).unwrap();
/// assert_eq!(reader.part_uris(), vec!["bin/server.js", "[Content_Types].xml"]);
/// ```
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    parts: BTreeMap<String, Part>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a part with an explicit content type.
    pub fn add_part(
        &mut self,
        uri: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), ContainerError> {
        let uri = uri.into();
        validate_uri(&uri)?;

        let key = uri.to_ascii_lowercase();
        if let Some(existing) = self.parts.get(&key) {
            return Err(ContainerError::DuplicatePart {
                uri,
                existing: existing.uri.clone(),
            });
        }
        self.parts.insert(
            key,
            Part {
                uri,
                content_type: content_type.into(),
                data,
            },
        );
        Ok(())
    }

    /// Add a part whose content type is derived from its extension.
    pub fn add_file(&mut self, uri: impl Into<String>, data: Vec<u8>) -> Result<(), ContainerError> {
        let uri = uri.into();
        let content_type = content_type_for(&uri);
        self.add_part(uri, content_type, data)
    }

    /// Number of parts added so far.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of parts the finished container will hold, content-type
    /// index included.
    pub fn part_count(&self) -> usize {
        self.parts.len() + 1
    }

    /// URIs of the finished container, in serialization order.
    pub fn part_uris(&self) -> Vec<String> {
        self.parts
            .values()
            .map(|p| p.uri.clone())
            .chain(std::iter::once(CONTENT_TYPES_URI.to_owned()))
            .collect()
    }

    /// Serialize into zip bytes.
    pub fn finish(self) -> Result<Vec<u8>, ContainerError> {
        let content_types = render_content_types(self.parts.values());
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for part in self.parts.values() {
            zip.start_file(part.uri.as_str(), options_for(&part.content_type))?;
            zip.write_all(&part.data)?;
        }
        zip.start_file(CONTENT_TYPES_URI, options_for(CONTENT_TYPES_CONTENT_TYPE))?;
        zip.write_all(content_types.as_bytes())?;

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Read-only view of a finished container.
pub struct ContainerReader {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

/// Size information for one part of an opened container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub uri: String,
    pub size: u64,
    pub compressed_size: u64,
}

impl ContainerReader {
    pub fn open(bytes: Vec<u8>) -> Result<Self, ContainerError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive })
    }

    pub fn from_path(path: &Path) -> Result<Self, ContainerError> {
        let bytes = std::fs::read(path)?;
        Self::open(bytes)
    }

    pub fn part_count(&self) -> usize {
        self.archive.len()
    }

    pub fn part_uris(&self) -> Vec<String> {
        (0..self.archive.len())
            .filter_map(|i| self.archive.name_for_index(i))
            .map(str::to_owned)
            .collect()
    }

    pub fn has_part(&self, uri: &str) -> bool {
        self.archive.index_for_name(uri).is_some()
    }

    /// Per-part sizes, in archive order.
    pub fn parts(&mut self) -> Result<Vec<PartInfo>, ContainerError> {
        let mut out = Vec::with_capacity(self.archive.len());
        for i in 0..self.archive.len() {
            let file = self.archive.by_index(i)?;
            out.push(PartInfo {
                uri: file.name().to_owned(),
                size: file.size(),
                compressed_size: file.compressed_size(),
            });
        }
        Ok(out)
    }

    pub fn read_part(&mut self, uri: &str) -> Result<Vec<u8>, ContainerError> {
        let mut file = match self.archive.by_name(uri) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ContainerError::MissingPart {
                    uri: uri.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Content type for a part, chosen by file extension.
pub fn content_type_for(uri: &str) -> &'static str {
    let ext = uri
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("csdef" | "cscfg" | "xml" | "config") => "application/xml",
        Some("cssx" | "cspkg" | "zip") => CONTAINER_CONTENT_TYPE,
        Some("js" | "mjs" | "cjs") => "application/javascript",
        Some("json") => "application/json",
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("txt" | "md" | "log") => "text/plain",
        Some("cmd" | "bat" | "ps1" | "sh") => "text/plain",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("dll" | "exe") => "application/x-msdownload",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

fn options_for(content_type: &str) -> SimpleFileOptions {
    // Nested containers are already compressed.
    let method = if content_type == CONTAINER_CONTENT_TYPE {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    };
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
}

fn render_content_types<'a>(parts: impl Iterator<Item = &'a Part>) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\n",
    );
    for part in parts {
        out.push_str(&format!(
            "  <Override PartName=\"/{}\" ContentType=\"{}\" />\n",
            xml::escape(&part.uri),
            xml::escape(&part.content_type),
        ));
    }
    out.push_str("</Types>\n");
    out
}

fn validate_uri(uri: &str) -> Result<(), ContainerError> {
    let invalid = |reason| ContainerError::InvalidUri {
        uri: uri.to_owned(),
        reason,
    };

    if uri.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if uri.starts_with('/') {
        return Err(invalid("must be relative"));
    }
    if uri.contains('\\') {
        return Err(invalid("must use '/' separators"));
    }
    if uri
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("must not contain empty, '.' or '..' segments"));
    }
    if uri.eq_ignore_ascii_case(CONTENT_TYPES_URI) {
        return Err(ContainerError::ReservedPart {
            uri: uri.to_owned(),
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("duplicate part {uri:?} (conflicts with {existing:?})")]
    DuplicatePart { uri: String, existing: String },

    #[error("part URI {uri:?} is reserved for the container format")]
    ReservedPart { uri: String },

    #[error("invalid part URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    #[error("container has no part {uri:?}")]
    MissingPart { uri: String },

    #[error("container I/O failed")]
    Io(#[from] std::io::Error),

    #[error("container archive error")]
    Zip(#[from] zip::result::ZipError),
}
