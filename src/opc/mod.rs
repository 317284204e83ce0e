//! OPC (Open Packaging Conventions) handling for 3MF packages
//!
//! 3MF files are ZIP archives following the OPC standard. This module
//! reads package members, discovers the mesh-description parts, and
//! writes a converted package back out while keeping every untouched
//! member byte-identical (raw copy, no recompression).

mod reader;
mod writer;

pub use reader::Package;
pub use writer::write_package;

/// Main 3D model part path within a 3MF archive
pub const MODEL_PATH: &str = "3D/3dmodel.model";

/// Content types part path
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

/// Package relationships part path
pub const RELS_PATH: &str = "_rels/.rels";

/// 3D model relationship type
pub const MODEL_REL_TYPE: &str = "http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel";

/// Bambu Studio / OrcaSlicer project configuration part (JSON)
pub const PROJECT_SETTINGS_PATH: &str = "Metadata/project_settings.config";

/// Extension shared by every mesh-description part
pub const MODEL_EXTENSION: &str = ".model";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/3D/3dmodel.model" Id="rel-1" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#;

    fn build_zip(members: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, bytes) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap()
    }

    #[test]
    fn test_open_rejects_non_zip() {
        let cursor = Cursor::new(b"this is not a zip archive".to_vec());
        let result = Package::open(cursor);
        assert!(matches!(result, Err(crate::Error::NotAPackage(_))));
    }

    #[test]
    fn test_member_not_found() {
        let cursor = build_zip(&[("_rels/.rels", RELS_XML.as_bytes())]);
        let mut package = Package::open(cursor).unwrap();
        let result = package.member("3D/3dmodel.model");
        assert!(matches!(result, Err(crate::Error::MemberNotFound(_))));
    }

    #[test]
    fn test_model_parts_root_and_objects() {
        let cursor = build_zip(&[
            ("_rels/.rels", RELS_XML.as_bytes()),
            ("3D/3dmodel.model", b"<model/>"),
            ("3D/Objects/object_1.model", b"<model/>"),
            ("Metadata/plate_1.png", b"\x89PNG"),
        ]);
        let mut package = Package::open(cursor).unwrap();
        let parts = package.model_parts().unwrap();
        assert_eq!(
            parts,
            vec![
                "3D/3dmodel.model".to_string(),
                "3D/Objects/object_1.model".to_string()
            ]
        );
    }

    #[test]
    fn test_model_parts_percent_encoded_target() {
        // Per OPC, non-ASCII part names are percent-encoded in the XML
        // Target while the ZIP entry itself carries UTF-8.
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/3D/test%C3%86file.model" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#;
        let cursor = build_zip(&[
            ("_rels/.rels", rels.as_bytes()),
            ("3D/testÆfile.model", b"<model/>"),
        ]);
        let mut package = Package::open(cursor).unwrap();
        let parts = package.model_parts().unwrap();
        assert_eq!(parts, vec!["3D/testÆfile.model".to_string()]);
    }

    #[test]
    fn test_model_parts_missing_everywhere() {
        let cursor = build_zip(&[("Metadata/notes.txt", b"hello")]);
        let mut package = Package::open(cursor).unwrap();
        let result = package.model_parts();
        assert!(matches!(result, Err(crate::Error::MemberNotFound(_))));
    }

    #[test]
    fn test_write_package_replaces_and_preserves() {
        let cursor = build_zip(&[
            ("_rels/.rels", RELS_XML.as_bytes()),
            ("3D/3dmodel.model", b"<model>old</model>"),
            ("Metadata/plate_1.png", b"\x89PNG-fake-bytes"),
        ]);
        let mut package = Package::open(cursor).unwrap();

        let mut replacements = HashMap::new();
        replacements.insert(
            "3D/3dmodel.model".to_string(),
            b"<model>new</model>".to_vec(),
        );
        let out = write_package(
            &mut package,
            Cursor::new(Vec::new()),
            &replacements,
            std::path::Path::new("out.3mf"),
        )
        .unwrap();

        let mut result = Package::open(Cursor::new(out.into_inner())).unwrap();
        assert_eq!(result.member("3D/3dmodel.model").unwrap(), b"<model>new</model>");
        assert_eq!(result.member("_rels/.rels").unwrap(), RELS_XML.as_bytes());
        assert_eq!(
            result.member("Metadata/plate_1.png").unwrap(),
            b"\x89PNG-fake-bytes"
        );
        // Member order survives the rewrite.
        assert_eq!(
            result.member_names(),
            vec![
                "_rels/.rels".to_string(),
                "3D/3dmodel.model".to_string(),
                "Metadata/plate_1.png".to_string()
            ]
        );
    }

    #[test]
    fn test_write_package_ignores_unknown_replacement() {
        let cursor = build_zip(&[("_rels/.rels", RELS_XML.as_bytes())]);
        let mut package = Package::open(cursor).unwrap();

        let mut replacements = HashMap::new();
        replacements.insert("3D/ghost.model".to_string(), b"<model/>".to_vec());
        let out = write_package(
            &mut package,
            Cursor::new(Vec::new()),
            &replacements,
            std::path::Path::new("out.3mf"),
        )
        .unwrap();

        let mut result = Package::open(Cursor::new(out.into_inner())).unwrap();
        assert_eq!(result.member_names(), vec!["_rels/.rels".to_string()]);
    }
}
