//! Error types for paint conversion
//!
//! Every failure aborts the conversion before any output file is created
//! or replaced; there is no best-effort mode. Errors carry the archive
//! member and triangle location where one exists, and each variant embeds
//! a stable error code for categorization.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O, archive and package errors
//! - **E2xxx**: model document and paint encoding errors
//! - **E3xxx**: extruder mapping errors
//!
//! ## Common Error Codes
//!
//! - `E1001`: input is not a 3MF/ZIP package
//! - `E1002`: package archive is corrupt
//! - `E1003`: required member missing from the package
//! - `E1004`: output file could not be written
//! - `E2001`: model document is malformed
//! - `E2002`: paint attribute failed to decode
//! - `E2003`: rewritten document could not be serialized
//! - `E3001`: paint references an undeclared extruder

use std::io;
use thiserror::Error;

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting a painted 3MF package
#[derive(Error, Debug)]
pub enum Error {
    /// The input could not be opened as a 3MF package
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - Input path does not exist or is not readable
    /// - File is not a ZIP archive (wrong signature)
    /// - File is a bare `.model` XML document, not a packaged project
    ///
    /// **Suggestions**:
    /// - Export the project from Bambu Studio / OrcaSlicer as `.3mf`
    /// - Verify the file was not truncated during transfer
    #[error("[E1001] Not a 3MF package: {0}")]
    NotAPackage(String),

    /// The package archive is damaged
    ///
    /// **Error Code**: E1002
    ///
    /// **Common Causes**:
    /// - Truncated archive
    /// - Corrupted member stream or central directory
    /// - Unsupported compression method
    ///
    /// **Suggestions**:
    /// - Re-export or re-download the file
    /// - Check whether other tools can open the archive
    #[error("[E1002] Corrupt archive: {0}")]
    CorruptArchive(String),

    /// A required member is missing from the package
    ///
    /// **Error Code**: E1003
    ///
    /// **Common Causes**:
    /// - Incomplete 3MF package
    /// - Missing 3D model part or OPC relationships
    ///
    /// **Suggestions**:
    /// - Ensure the archive contains `_rels/.rels` and a `.model` part
    #[error("[E1003] Missing required member: {0}")]
    MemberNotFound(String),

    /// The output file could not be written
    ///
    /// **Error Code**: E1004
    ///
    /// **Common Causes**:
    /// - Output directory does not exist or is not writable
    /// - Disk full
    /// - Destination locked by another process
    #[error("[E1004] Failed to write output '{path}': {source}")]
    OutputWrite {
        /// Destination path of the conversion output
        path: String,
        /// Underlying I/O failure
        source: io::Error,
    },

    /// A model document inside the package is malformed
    ///
    /// **Error Code**: E2001
    ///
    /// **Common Causes**:
    /// - Invalid XML syntax in a `.model` member
    /// - Non-UTF-8 content
    /// - Missing required attributes (e.g. `<object>` without `id`)
    ///
    /// **Suggestions**:
    /// - Verify the file opens in the slicer that produced it
    /// - Check the member named in the message
    #[error("[E2001] Malformed model document '{member}': {reason}")]
    MalformedModel {
        /// Archive member containing the document
        member: String,
        /// What was wrong with it
        reason: String,
    },

    /// A per-triangle paint attribute failed to decode
    ///
    /// **Error Code**: E2002
    ///
    /// **Common Causes**:
    /// - Non-hexadecimal characters in the attribute value
    /// - Truncated segmentation code
    /// - Nonzero padding bits after the encoded tree
    /// - A filament state outside the supported range
    ///
    /// **Suggestions**:
    /// - Re-save the project in the source slicer to regenerate paint data
    /// - Report the file if it was produced by a current slicer release
    #[error(
        "[E2002] Malformed paint attribute in '{member}', object {object}, \
         triangle {triangle}: {reason}"
    )]
    MalformedPaintAttribute {
        /// Archive member containing the triangle
        member: String,
        /// Object id the triangle belongs to
        object: u32,
        /// Triangle ordinal within the object's mesh (0-based)
        triangle: usize,
        /// What was wrong with the attribute value
        reason: String,
    },

    /// A rewritten document could not be serialized
    ///
    /// **Error Code**: E2003
    ///
    /// This indicates a programming-contract violation in the rewrite
    /// stage, not a recoverable input problem.
    #[error("[E2003] Serialization failure: {0}")]
    Serialization(String),

    /// Paint references an extruder with no mapping entry
    ///
    /// **Error Code**: E3001
    ///
    /// **Common Causes**:
    /// - Triangle painted with a filament not declared in the project
    ///   settings
    /// - An explicit extruder mapping that omits an index in use
    ///
    /// **Suggestions**:
    /// - Check the filament list in the source project
    /// - Extend the mapping to cover every painted index
    #[error(
        "[E3001] Unmapped extruder {extruder} in '{member}', object {object}, \
         triangle {triangle}"
    )]
    UnmappedExtruder {
        /// Archive member containing the triangle
        member: String,
        /// Object id the triangle belongs to
        object: u32,
        /// Triangle ordinal within the object's mesh (0-based)
        triangle: usize,
        /// Source extruder index with no mapping entry (1-based)
        extruder: u8,
    },
}

impl Error {
    /// Create a NotAPackage error from an open failure
    pub fn not_a_package(reason: impl Into<String>) -> Self {
        Error::NotAPackage(reason.into())
    }

    /// Create a CorruptArchive error from a member access failure
    pub fn corrupt_archive(reason: impl Into<String>) -> Self {
        Error::CorruptArchive(reason.into())
    }

    /// Create a MalformedModel error with member context
    pub fn malformed_model(member: &str, reason: impl Into<String>) -> Self {
        Error::MalformedModel {
            member: member.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a MalformedPaintAttribute error with full location context
    pub fn malformed_paint(
        member: &str,
        object: u32,
        triangle: usize,
        reason: impl Into<String>,
    ) -> Self {
        Error::MalformedPaintAttribute {
            member: member.to_string(),
            object,
            triangle,
            reason: reason.into(),
        }
    }

    /// Create an UnmappedExtruder error with full location context
    pub fn unmapped_extruder(member: &str, object: u32, triangle: usize, extruder: u8) -> Self {
        Error::UnmappedExtruder {
            member: member.to_string(),
            object,
            triangle,
            extruder,
        }
    }

    /// Create an OutputWrite error for the given destination
    pub fn output_write(path: &std::path::Path, source: io::Error) -> Self {
        Error::OutputWrite {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let not_pkg = Error::not_a_package("invalid Zip archive");
        assert!(not_pkg.to_string().contains("[E1001]"));

        let corrupt = Error::corrupt_archive("unexpected EOF");
        assert!(corrupt.to_string().contains("[E1002]"));

        let missing = Error::MemberNotFound("3D/3dmodel.model".to_string());
        assert!(missing.to_string().contains("[E1003]"));
        assert!(missing.to_string().contains("3D/3dmodel.model"));

        let ser = Error::Serialization("writer closed".to_string());
        assert!(ser.to_string().contains("[E2003]"));
    }

    #[test]
    fn test_malformed_paint_carries_location() {
        let err = Error::malformed_paint("3D/Objects/object_1.model", 7, 42, "trailing bits");
        let msg = err.to_string();
        assert!(msg.contains("[E2002]"));
        assert!(msg.contains("3D/Objects/object_1.model"));
        assert!(msg.contains("object 7"));
        assert!(msg.contains("triangle 42"));
        assert!(msg.contains("trailing bits"));
    }

    #[test]
    fn test_unmapped_extruder_carries_location() {
        let err = Error::unmapped_extruder("3D/3dmodel.model", 1, 3, 5);
        let msg = err.to_string();
        assert!(msg.contains("[E3001]"));
        assert!(msg.contains("extruder 5"));
        assert!(msg.contains("object 1"));
        assert!(msg.contains("triangle 3"));
    }

    #[test]
    fn test_output_write_carries_path() {
        let err = Error::output_write(
            std::path::Path::new("/tmp/out.3mf"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("[E1004]"));
        assert!(msg.contains("/tmp/out.3mf"));
        assert!(msg.contains("denied"));
    }
}
