//! Package writing with byte-preserving member copy

use super::Package;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Write a package to `writer`, substituting the given members
///
/// Members whose names appear in `replacements` are written with the
/// replacement bytes; every other member is raw-copied, preserving its
/// exact compressed stream and local header. Member order follows the
/// original archive; nothing is dropped or duplicated. Replacement names
/// that match no original member are logged and ignored.
///
/// `dest` names the conversion output for error context only; `writer`
/// is typically a temporary file that later gets persisted there.
pub fn write_package<R, W>(
    package: &mut Package<R>,
    writer: W,
    replacements: &HashMap<String, Vec<u8>>,
    dest: &Path,
) -> Result<W>
where
    R: io::Read + io::Seek,
    W: io::Write + io::Seek,
{
    use std::io::Write;

    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default();
    let mut replaced = 0usize;

    for index in 0..package.archive.len() {
        let file = package
            .archive
            .by_index_raw(index)
            .map_err(|e| Error::corrupt_archive(format!("cannot access member {index}: {e}")))?;
        let name = file.name().to_string();

        if let Some(bytes) = replacements.get(&name) {
            drop(file);
            zip.start_file(name.as_str(), options)
                .map_err(|e| output_error(dest, &name, e.to_string()))?;
            zip.write_all(bytes)
                .map_err(|e| output_error(dest, &name, e.to_string()))?;
            debug!(member = %name, bytes = bytes.len(), "wrote replacement member");
            replaced += 1;
        } else {
            zip.raw_copy_file(file)
                .map_err(|e| output_error(dest, &name, e.to_string()))?;
        }
    }

    for name in replacements.keys() {
        if !package.has_member(name) {
            warn!(member = %name, "replacement matches no package member, skipping");
        }
    }
    debug!(replaced, total = package.archive.len(), "assembled output package");

    zip.finish()
        .map_err(|e| Error::output_write(dest, io::Error::other(e.to_string())))
}

fn output_error(dest: &Path, member: &str, reason: String) -> Error {
    Error::output_write(
        dest,
        io::Error::other(format!("while writing member '{member}': {reason}")),
    )
}
