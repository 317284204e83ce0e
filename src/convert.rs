//! End-to-end package conversion
//!
//! Ties the stages together: open the archive, build the extruder map
//! from the project settings, extract and translate the paint on every
//! model document, rewrite the changed documents and reassemble the
//! package. Any failure aborts before the destination path is touched;
//! the output is staged in a temporary file and persisted only after
//! the whole package has been written.

use crate::error::{Error, Result};
use crate::extruder::ExtruderMap;
use crate::opc::{PROJECT_SETTINGS_PATH, Package, write_package};
use crate::paint::{DocumentPaint, FacetPaintDecoder, PaintChannel, extract_paint};
use crate::rewrite::{EditMap, TriangleEdit, rewrite_model};
use crate::segmentation::encode_code;
use crate::translate::{TranslateError, TranslateOptions, translate};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tuning knobs for a conversion run
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Subdivision behaviour of the segmentation translator
    pub translate: TranslateOptions,
}

/// What a conversion run did, for logging and CLI summaries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Model documents found in the package
    pub documents_scanned: usize,
    /// Model documents that received at least one edit
    pub documents_rewritten: usize,
    /// Triangles that carried at least one source paint attribute
    pub triangles_painted: usize,
    /// Target codes written, indexed by [`PaintChannel`] declaration order
    pub codes_written: [usize; 3],
    /// Source attributes that decoded to fully unpainted and were dropped
    pub attributes_removed: usize,
}

impl ConversionReport {
    /// Target codes written for one channel
    pub fn codes_for(&self, channel: PaintChannel) -> usize {
        self.codes_written[channel as usize]
    }

    /// Target codes written across all channels
    pub fn total_codes(&self) -> usize {
        self.codes_written.iter().sum()
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} painted triangle(s) in {} of {} model document(s); \
             codes written: {} color, {} seam, {} support",
            self.triangles_painted,
            self.documents_rewritten,
            self.documents_scanned,
            self.codes_for(PaintChannel::Color),
            self.codes_for(PaintChannel::Seam),
            self.codes_for(PaintChannel::Support),
        )?;
        if self.attributes_removed > 0 {
            write!(f, "; {} stale attribute(s) removed", self.attributes_removed)?;
        }
        Ok(())
    }
}

/// Convert a package with default options
///
/// See [`convert_file_with_options`].
pub fn convert_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<ConversionReport> {
    convert_file_with_options(input, output, &ConvertOptions::default())
}

/// Convert a Bambu Studio package into PrusaSlicer paint encoding
///
/// Reads the archive at `input`, translates the paint attributes on
/// every model document and writes the converted package to `output`.
/// Members without paint edits keep their exact compressed bytes, so a
/// package without source paint round-trips unchanged. The output file
/// only appears once the whole package has been assembled; on error the
/// destination is left as it was.
pub fn convert_file_with_options(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &ConvertOptions,
) -> Result<ConversionReport> {
    let input = input.as_ref();
    let output = output.as_ref();
    info!(input = %input.display(), output = %output.display(), "converting package");

    let file = File::open(input)
        .map_err(|e| Error::not_a_package(format!("cannot open '{}': {e}", input.display())))?;
    let mut package = Package::open(BufReader::new(file))?;

    let color_map = if package.has_member(PROJECT_SETTINGS_PATH) {
        let json = package.member_str(PROJECT_SETTINGS_PATH)?;
        ExtruderMap::from_project_settings(&json)
    } else {
        debug!("package has no project settings, extruder indices pass through");
        ExtruderMap::unbounded()
    };

    let parts = package.model_parts()?;
    let decoder = FacetPaintDecoder;
    let mut report = ConversionReport::default();
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();

    for part in &parts {
        report.documents_scanned += 1;
        let xml = package.member_str(part)?;
        let doc = extract_paint(part, &xml, &decoder)?;
        let edits = build_edits(part, &doc, &color_map, &options.translate, &mut report)?;
        if let Some(rewritten) = rewrite_model(part, &xml, &edits)? {
            report.documents_rewritten += 1;
            replacements.insert(part.clone(), rewritten.into_bytes());
        }
    }

    let out_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = tempfile::Builder::new()
        .prefix(".bambu2prusa.")
        .tempfile_in(out_dir)
        .map_err(|e| Error::output_write(output, e))?;
    let staged = write_package(&mut package, staged, &replacements, output)?;
    drop(package);
    staged
        .persist(output)
        .map_err(|e| Error::output_write(output, e.error))?;

    info!(%report, "conversion complete");
    Ok(report)
}

/// Derive the default output path for an input package
///
/// `model.3mf` becomes `model-prusa.3mf`; names without the `.3mf`
/// extension get the full `-prusa.3mf` suffix appended.
pub fn default_output_path(input: &Path) -> PathBuf {
    let name = match input.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => String::from("output"),
    };
    let new_name = if name.to_ascii_lowercase().ends_with(".3mf") {
        let split = name.len() - 4;
        format!("{}-prusa{}", &name[..split], &name[split..])
    } else {
        format!("{name}-prusa.3mf")
    };
    input.with_file_name(new_name)
}

/// Translate every painted triangle of one document into an edit map
fn build_edits(
    member: &str,
    doc: &DocumentPaint,
    color_map: &ExtruderMap,
    options: &TranslateOptions,
    report: &mut ConversionReport,
) -> Result<EditMap> {
    let passthrough = ExtruderMap::unbounded();
    let mut edits = EditMap::with_capacity(doc.triangles.len());

    for tri in &doc.triangles {
        report.triangles_painted += 1;
        let mut channels = Vec::with_capacity(tri.sources.len());
        for source in &tri.sources {
            // Seam and support states are enforcer and blocker markers,
            // not extruder indices, and never go through the map.
            let map = if source.channel.remaps_extruders() {
                color_map
            } else {
                &passthrough
            };
            let node = translate(&source.assignment, map, options).map_err(|err| match err {
                TranslateError::Unmapped(extruder) => {
                    Error::unmapped_extruder(member, tri.object, tri.ordinal, extruder)
                }
            })?;
            let code = match &node {
                Some(node) => {
                    let code = encode_code(node).map_err(|err| {
                        Error::Serialization(format!(
                            "cannot encode segmentation for object {} triangle {}: {err}",
                            tri.object, tri.ordinal
                        ))
                    })?;
                    report.codes_written[source.channel as usize] += 1;
                    Some(code)
                }
                None => {
                    report.attributes_removed += 1;
                    None
                }
            };
            channels.push((source.channel, code));
        }
        edits.insert((tri.object, tri.ordinal), TriangleEdit { channels });
    }
    Ok(edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::{PaintAssignment, PaintedRegion, SourcePaint, TrianglePaint};
    use crate::segmentation::UNIT_TRIANGLE;

    const MEMBER: &str = "3D/3dmodel.model";

    fn whole_triangle(extruder: u8) -> PaintAssignment {
        PaintAssignment {
            regions: vec![PaintedRegion {
                corners: UNIT_TRIANGLE,
                extruder,
            }],
        }
    }

    fn painted_doc(channel: PaintChannel, assignment: PaintAssignment) -> DocumentPaint {
        DocumentPaint {
            triangles: vec![TrianglePaint {
                object: 1,
                ordinal: 3,
                sources: vec![SourcePaint {
                    channel,
                    assignment,
                }],
            }],
        }
    }

    #[test]
    fn test_default_output_path_inserts_suffix() {
        assert_eq!(
            default_output_path(Path::new("model.3mf")),
            PathBuf::from("model-prusa.3mf")
        );
        assert_eq!(
            default_output_path(Path::new("/tmp/brick.3mf")),
            PathBuf::from("/tmp/brick-prusa.3mf")
        );
    }

    #[test]
    fn test_default_output_path_keeps_extension_case() {
        assert_eq!(
            default_output_path(Path::new("MODEL.3MF")),
            PathBuf::from("MODEL-prusa.3MF")
        );
    }

    #[test]
    fn test_default_output_path_appends_for_other_names() {
        assert_eq!(
            default_output_path(Path::new("archive.zip")),
            PathBuf::from("archive.zip-prusa.3mf")
        );
        assert_eq!(
            default_output_path(Path::new("plain")),
            PathBuf::from("plain-prusa.3mf")
        );
    }

    #[test]
    fn test_build_edits_writes_code_and_counts() {
        let doc = painted_doc(PaintChannel::Color, whole_triangle(2));
        let map = ExtruderMap::from_pairs([(2, 1)]);
        let mut report = ConversionReport::default();

        let edits =
            build_edits(MEMBER, &doc, &map, &TranslateOptions::default(), &mut report).unwrap();

        let edit = &edits[&(1, 3)];
        assert_eq!(
            edit.channels,
            vec![(PaintChannel::Color, Some("4".to_string()))]
        );
        assert_eq!(report.triangles_painted, 1);
        assert_eq!(report.codes_written, [1, 0, 0]);
        assert_eq!(report.attributes_removed, 0);
    }

    #[test]
    fn test_build_edits_removal_only() {
        let doc = painted_doc(PaintChannel::Color, PaintAssignment::default());
        let mut report = ConversionReport::default();

        let edits = build_edits(
            MEMBER,
            &doc,
            &ExtruderMap::unbounded(),
            &TranslateOptions::default(),
            &mut report,
        )
        .unwrap();

        assert_eq!(edits[&(1, 3)].channels, vec![(PaintChannel::Color, None)]);
        assert_eq!(report.codes_written, [0, 0, 0]);
        assert_eq!(report.attributes_removed, 1);
    }

    #[test]
    fn test_build_edits_unmapped_extruder_carries_location() {
        let doc = painted_doc(PaintChannel::Color, whole_triangle(2));
        let mut report = ConversionReport::default();

        let err = build_edits(
            MEMBER,
            &doc,
            &ExtruderMap::identity(1),
            &TranslateOptions::default(),
            &mut report,
        )
        .unwrap_err();

        match err {
            Error::UnmappedExtruder {
                member,
                object,
                triangle,
                extruder,
            } => {
                assert_eq!(member, MEMBER);
                assert_eq!(object, 1);
                assert_eq!(triangle, 3);
                assert_eq!(extruder, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_seam_channel_bypasses_extruder_map() {
        let doc = painted_doc(PaintChannel::Seam, whole_triangle(2));
        let mut report = ConversionReport::default();

        // An extruder map with a single filament must not reject seam
        // state 2, which is a blocker marker rather than an extruder.
        let edits = build_edits(
            MEMBER,
            &doc,
            &ExtruderMap::identity(1),
            &TranslateOptions::default(),
            &mut report,
        )
        .unwrap();

        assert_eq!(
            edits[&(1, 3)].channels,
            vec![(PaintChannel::Seam, Some("8".to_string()))]
        );
        assert_eq!(report.codes_written, [0, 1, 0]);
    }

    #[test]
    fn test_report_display_summarizes_counts() {
        let report = ConversionReport {
            documents_scanned: 3,
            documents_rewritten: 2,
            triangles_painted: 12,
            codes_written: [10, 2, 0],
            attributes_removed: 1,
        };
        let text = report.to_string();
        assert!(text.contains("12 painted triangle(s)"));
        assert!(text.contains("2 of 3 model document(s)"));
        assert!(text.contains("10 color, 2 seam, 0 support"));
        assert!(text.contains("1 stale attribute(s) removed"));
        assert_eq!(report.total_codes(), 12);
    }
}
