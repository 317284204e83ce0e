//! Package reading and mesh-part discovery

use super::{MODEL_EXTENSION, MODEL_PATH, MODEL_REL_TYPE, RELS_PATH};
use crate::error::{Error, Result};
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use std::io::Read;
use tracing::debug;
use urlencoding::decode;
use zip::ZipArchive;
use zip::result::ZipError;

/// An opened 3MF package
///
/// Wraps the ZIP archive and keeps it open for the duration of one
/// conversion run; dropping the package closes the archive.
pub struct Package<R: Read> {
    pub(super) archive: ZipArchive<R>,
}

impl<R: Read + std::io::Seek> Package<R> {
    /// Open a 3MF package from a reader
    ///
    /// Fails with [`Error::NotAPackage`] when the reader does not contain
    /// a ZIP archive. Structural problems inside individual members
    /// surface later, when those members are read.
    pub fn open(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader)
            .map_err(|e| Error::not_a_package(format!("cannot open ZIP archive: {e}")))?;
        debug!(members = archive.len(), "opened package");
        Ok(Self { archive })
    }

    /// Read a member's bytes
    pub fn member(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => Error::MemberNotFound(name.to_string()),
            other => Error::corrupt_archive(format!("cannot access member '{name}': {other}")),
        })?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| Error::corrupt_archive(format!("cannot read member '{name}': {e}")))?;
        Ok(content)
    }

    /// Read a member as UTF-8 text
    pub fn member_str(&mut self, name: &str) -> Result<String> {
        let bytes = self.member(name)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::corrupt_archive(format!("member '{name}' is not UTF-8: {e}")))
    }

    /// Check whether a member exists
    pub fn has_member(&mut self, name: &str) -> bool {
        self.archive.by_name(name).is_ok()
    }

    /// Number of members in the package
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Whether the package has no members at all
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// All member names, in archive order
    pub fn member_names(&mut self) -> Vec<String> {
        (0..self.archive.len())
            .filter_map(|i| {
                self.archive
                    .by_index_raw(i)
                    .ok()
                    .map(|f| f.name().to_string())
            })
            .collect()
    }

    /// Every mesh-description part in the package
    ///
    /// The part named by the package relationships comes first, followed
    /// by every other `.model` member in archive order. Bambu Studio
    /// keeps per-object geometry in `3D/Objects/*.model` parts referenced
    /// from the root document, so all of them have to be examined.
    ///
    /// Fails with [`Error::MemberNotFound`] when the package contains no
    /// mesh-description part at all.
    pub fn model_parts(&mut self) -> Result<Vec<String>> {
        let mut parts: Vec<String> = Vec::new();

        if self.has_member(RELS_PATH) {
            let rels = self.member_str(RELS_PATH)?;
            if let Some(root) = find_model_relationship(&rels)? {
                if self.has_member(&root) {
                    parts.push(root);
                } else {
                    debug!(target = %root, "model relationship points to a missing member");
                }
            }
        } else {
            debug!("package has no {RELS_PATH}, falling back to extension scan");
        }

        for name in self.member_names() {
            if name.ends_with(MODEL_EXTENSION) && !parts.contains(&name) {
                parts.push(name);
            }
        }

        if parts.is_empty() {
            return Err(Error::MemberNotFound(MODEL_PATH.to_string()));
        }
        Ok(parts)
    }
}

/// Find the 3D model relationship target in a `.rels` document
///
/// Targets are percent-encoded OPC part names with a leading slash; the
/// returned name is decoded and slash-stripped, matching ZIP member
/// naming.
fn find_model_relationship(rels: &str) -> Result<Option<String>> {
    let mut reader = XmlReader::from_str(rels);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                let name = e.name();
                let name_str = std::str::from_utf8(name.as_ref()).map_err(|e| {
                    Error::corrupt_archive(format!("invalid relationship XML: {e}"))
                })?;

                if name_str.ends_with("Relationship") {
                    let mut target = None;
                    let mut rel_type = None;

                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| {
                            Error::corrupt_archive(format!("invalid relationship attribute: {e}"))
                        })?;
                        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|e| {
                            Error::corrupt_archive(format!("invalid relationship XML: {e}"))
                        })?;
                        let value = std::str::from_utf8(&attr.value).map_err(|e| {
                            Error::corrupt_archive(format!("invalid relationship XML: {e}"))
                        })?;

                        match key {
                            "Target" => target = Some(value.to_string()),
                            "Type" => rel_type = Some(value.to_string()),
                            _ => {}
                        }
                    }

                    if let (Some(target), Some(rel_type)) = (target, rel_type) {
                        if rel_type == MODEL_REL_TYPE {
                            return Ok(Some(normalize_part_name(&target)));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::corrupt_archive(format!(
                    "cannot parse {RELS_PATH}: {e}"
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

/// Convert an OPC part name to its ZIP member name
///
/// Percent-decodes the target and drops the leading slash. Targets that
/// are not valid percent-encoding are used as-is; real-world files
/// sometimes carry raw UTF-8 here.
fn normalize_part_name(target: &str) -> String {
    let decoded = match decode(target) {
        Ok(d) => d.into_owned(),
        Err(_) => target.to_string(),
    };
    match decoded.strip_prefix('/') {
        Some(stripped) => stripped.to_string(),
        None => decoded,
    }
}
