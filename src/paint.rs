//! Source paint extraction from mesh-description documents
//!
//! Bambu Studio and OrcaSlicer store painting results as per-triangle
//! attributes: `paint_color` for multi-material assignments, `paint_seam`
//! and `paint_supports` for seam and support enforcers/blockers. This
//! module scans a model document for those attributes and decodes them
//! into flat painted regions in the triangle's barycentric frame, keyed
//! by object id and triangle ordinal.
//!
//! Decoding sits behind [`PaintDecoder`] so a different source encoding
//! can be dropped in; [`FacetPaintDecoder`] understands the bit-packed
//! format described in [`crate::segmentation`].

use crate::error::{Error, Result};
use crate::segmentation::{self, CodeError, Corners, SegNode, UNIT_TRIANGLE};
use quick_xml::Reader as XmlReader;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use tracing::debug;

/// XML namespace PrusaSlicer uses for its 3MF extensions
pub const SLIC3RPE_NS: &str = "http://schemas.slic3r.org/3mf/2017/06";

/// One paint channel carried on `<triangle>` elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaintChannel {
    /// Multi-material filament painting
    Color,
    /// Seam position enforcers and blockers
    Seam,
    /// Support enforcers and blockers
    Support,
}

impl PaintChannel {
    /// All channels, in the order they are looked up on a triangle
    pub const ALL: [PaintChannel; 3] =
        [PaintChannel::Color, PaintChannel::Seam, PaintChannel::Support];

    /// Attribute name in the source (Bambu/Orca) encoding
    pub fn source_attr(&self) -> &'static str {
        match self {
            PaintChannel::Color => "paint_color",
            PaintChannel::Seam => "paint_seam",
            PaintChannel::Support => "paint_supports",
        }
    }

    /// Attribute name in the target (PrusaSlicer) encoding
    pub fn target_attr(&self) -> &'static str {
        match self {
            PaintChannel::Color => "slic3rpe:mmu_segmentation",
            PaintChannel::Seam => "slic3rpe:custom_seam",
            PaintChannel::Support => "slic3rpe:custom_supports",
        }
    }

    /// Whether leaf states on this channel are filament indices
    ///
    /// Seam and support states are enforcer/blocker markers and pass
    /// through unmapped.
    pub fn remaps_extruders(&self) -> bool {
        matches!(self, PaintChannel::Color)
    }
}

/// A painted leaf region of one triangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintedRegion {
    /// Region corners in the triangle's barycentric frame
    pub corners: Corners,
    /// State the region is painted with (1-based; never 0)
    pub extruder: u8,
}

/// All painted regions decoded from one attribute value
///
/// An empty region list means the attribute was present but encodes a
/// fully unpainted triangle; the attribute still has to be removed from
/// the output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaintAssignment {
    /// Painted regions in decode order; unpainted space is implicit
    pub regions: Vec<PaintedRegion>,
}

impl PaintAssignment {
    /// Whether the code painted nothing at all
    pub fn is_unpainted(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Decodes one source paint attribute value into painted regions
pub trait PaintDecoder {
    /// Decode a raw attribute value
    fn decode(&self, raw: &str) -> std::result::Result<PaintAssignment, CodeError>;
}

/// Decoder for the bit-packed facet attribute format
#[derive(Debug, Default, Clone, Copy)]
pub struct FacetPaintDecoder;

impl PaintDecoder for FacetPaintDecoder {
    fn decode(&self, raw: &str) -> std::result::Result<PaintAssignment, CodeError> {
        let tree = segmentation::parse_code(raw)?;
        let mut regions = Vec::new();
        flatten(&tree, &UNIT_TRIANGLE, &mut regions);
        Ok(PaintAssignment { regions })
    }
}

fn flatten(node: &SegNode, corners: &Corners, out: &mut Vec<PaintedRegion>) {
    match node {
        SegNode::Leaf(0) => {}
        SegNode::Leaf(state) => out.push(PaintedRegion {
            corners: *corners,
            extruder: *state,
        }),
        SegNode::Split {
            special_side,
            children,
        } => {
            let cells =
                segmentation::split_corners(corners, (children.len() - 1) as u8, *special_side);
            for (child, cell) in children.iter().zip(cells.iter()) {
                flatten(child, cell, out);
            }
        }
    }
}

/// One decoded source attribute on one triangle
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePaint {
    /// Which channel the attribute belongs to
    pub channel: PaintChannel,
    /// The decoded assignment
    pub assignment: PaintAssignment,
}

/// All source paint found on one triangle
#[derive(Debug, Clone, PartialEq)]
pub struct TrianglePaint {
    /// Object id the triangle belongs to
    pub object: u32,
    /// Triangle ordinal within the object's mesh (0-based)
    pub ordinal: usize,
    /// Decoded source attributes, at most one per channel
    pub sources: Vec<SourcePaint>,
}

/// Extraction result for one model document
#[derive(Debug, Clone, Default)]
pub struct DocumentPaint {
    /// Triangles carrying at least one source paint attribute
    pub triangles: Vec<TrianglePaint>,
}

/// Scan a model document for source paint attributes
///
/// Triangle ordinals count `<triangle>` elements per object in document
/// order, the same order the rewrite pass sees. A decode failure aborts
/// with [`Error::MalformedPaintAttribute`] carrying the exact location;
/// partial extraction is never returned.
pub fn extract_paint<D: PaintDecoder + ?Sized>(
    member: &str,
    xml: &str,
    decoder: &D,
) -> Result<DocumentPaint> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut out = DocumentPaint::default();
    let mut current_object: Option<u32> = None;
    let mut ordinal: usize = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"object" => {
                    current_object = Some(parse_object_id(member, e)?);
                    ordinal = 0;
                }
                b"triangle" => {
                    let object = current_object.ok_or_else(|| {
                        Error::malformed_model(member, "<triangle> outside of <object>")
                    })?;
                    let sources = collect_sources(member, object, ordinal, e, decoder)?;
                    if !sources.is_empty() {
                        out.triangles.push(TrianglePaint {
                            object,
                            ordinal,
                            sources,
                        });
                    }
                    ordinal += 1;
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"object" {
                    current_object = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::malformed_model(
                    member,
                    format!("XML error at offset {}: {e}", reader.buffer_position()),
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    debug!(member, painted = out.triangles.len(), "extracted source paint");
    Ok(out)
}

fn parse_object_id(member: &str, e: &BytesStart) -> Result<u32> {
    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| Error::malformed_model(member, format!("attribute error: {e}")))?;
        if attr.key.as_ref() == b"id" {
            let value = std::str::from_utf8(&attr.value)
                .map_err(|e| Error::malformed_model(member, format!("invalid object id: {e}")))?;
            return value.trim().parse::<u32>().map_err(|e| {
                Error::malformed_model(member, format!("invalid object id '{value}': {e}"))
            });
        }
    }
    Err(Error::malformed_model(
        member,
        "<object> is missing required attribute 'id'",
    ))
}

fn collect_sources<D: PaintDecoder + ?Sized>(
    member: &str,
    object: u32,
    ordinal: usize,
    e: &BytesStart,
    decoder: &D,
) -> Result<Vec<SourcePaint>> {
    let mut sources = Vec::new();
    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| Error::malformed_model(member, format!("attribute error: {e}")))?;
        for channel in PaintChannel::ALL {
            if attr.key.as_ref() == channel.source_attr().as_bytes() {
                let raw = std::str::from_utf8(&attr.value).map_err(|e| {
                    Error::malformed_paint(member, object, ordinal, format!("not UTF-8: {e}"))
                })?;
                let assignment = decoder
                    .decode(raw)
                    .map_err(|e| Error::malformed_paint(member, object, ordinal, e.to_string()))?;
                sources.push(SourcePaint {
                    channel,
                    assignment,
                });
            }
        }
    }
    Ok(sources)
}
