//! # bambu2prusa
//!
//! Convert the per-triangle paint annotations in a 3MF package from the
//! Bambu Studio / OrcaSlicer encoding to the PrusaSlicer encoding.
//!
//! 3MF files are ZIP-based containers following the Open Packaging
//! Conventions (OPC) standard. Bambu Studio stores multi-material paint
//! in `paint_color`, `paint_seam` and `paint_supports` attributes on
//! `<triangle>` elements; PrusaSlicer reads the same bit-packed
//! subdivision format from `slic3rpe:mmu_segmentation`,
//! `slic3rpe:custom_seam` and `slic3rpe:custom_supports`. The attribute
//! names, the extruder numbering and the XML namespace differ, so a
//! painted Bambu file opens in PrusaSlicer with all paint silently
//! dropped. This crate moves the paint across.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - Byte-preserving rewrite: only painted `<triangle>` elements and, when
//!   needed, the `<model>` namespace declaration change; every other
//!   package member keeps its exact compressed bytes
//! - Extruder remapping driven by the package's own project settings
//! - Seam and support paint translated alongside color paint
//! - Split Bambu packages (one model document per object) handled
//!
//! ## Example
//!
//! ```no_run
//! use bambu2prusa::convert_file;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = convert_file("painted.3mf", "painted-prusa.3mf")?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod extruder;
pub mod opc;
pub mod paint;
pub mod rewrite;
pub mod segmentation;
pub mod translate;

pub use convert::{
    ConversionReport, ConvertOptions, convert_file, convert_file_with_options, default_output_path,
};
pub use error::{Error, Result};
pub use extruder::ExtruderMap;
pub use paint::{FacetPaintDecoder, PaintChannel, PaintDecoder};
pub use translate::TranslateOptions;
