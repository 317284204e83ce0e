//! Example: Inspecting paint annotations in a Bambu Studio 3MF
//!
//! This example demonstrates how to:
//! 1. Open a 3MF package and locate its model documents
//! 2. Scan triangles for Bambu-style paint attributes
//! 3. Decode segmentation codes into painted regions
//! 4. Summarize which filaments are used and how much area they cover
//!
//! This is useful for previewing what a conversion will do to a project
//! file before running it.

use bambu2prusa::opc::{PROJECT_SETTINGS_PATH, Package};
use bambu2prusa::paint::{FacetPaintDecoder, PaintAssignment, PaintChannel, extract_paint};
use bambu2prusa::segmentation::area2;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::process;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <3mf-file>", args[0]);
        eprintln!();
        eprintln!("Summarizes Bambu Studio paint annotations in a 3MF file");
        process::exit(1);
    }

    let filename = &args[1];

    println!("=== Paint Annotation Inspection ===");
    println!("File: {}", filename);
    println!();

    // Open the package and find its model documents
    let file = File::open(filename)?;
    let mut package = Package::open(file)?;

    println!("Package Information:");
    println!("  Members: {}", package.len());

    let parts = package.model_parts()?;
    println!("  Model documents: {}", parts.len());
    for part in &parts {
        println!("    {}", part);
    }
    println!();

    // Filament table from the project settings, when present
    if let Some(filaments) = read_filaments(&mut package) {
        println!("Filaments ({}):", filaments.len());
        for (idx, (color, material)) in filaments.iter().enumerate() {
            if material.is_empty() {
                println!("  [{}] {}", idx + 1, color);
            } else {
                println!("  [{}] {} ({})", idx + 1, color, material);
            }
        }
        println!();
    }

    let decoder = FacetPaintDecoder;

    for part in &parts {
        println!("─────────────────────────────────────");
        println!("Model document: {}", part);

        let xml = package.member_str(part)?;
        let doc = extract_paint(part, &xml, &decoder)?;

        if doc.triangles.is_empty() {
            println!("  No paint annotations");
            println!();
            continue;
        }

        println!("  Painted triangles: {}", doc.triangles.len());

        // Tally paint per channel
        let mut tallies: HashMap<PaintChannel, ChannelTally> = HashMap::new();
        for triangle in &doc.triangles {
            for source in &triangle.sources {
                tallies
                    .entry(source.channel)
                    .or_default()
                    .record(&source.assignment);
            }
        }

        for channel in PaintChannel::ALL {
            let Some(tally) = tallies.get(&channel) else {
                continue;
            };

            println!();
            println!("  {} ({}):", channel_label(channel), channel.source_attr());
            println!("    Triangles: {}", tally.triangles);
            println!("    Painted regions: {}", tally.regions);
            if tally.unpainted > 0 {
                println!(
                    "    Blank attributes (removed on conversion): {}",
                    tally.unpainted
                );
            }

            let painted = tally.triangles - tally.unpainted;
            let mut states: Vec<_> = tally.by_state.iter().collect();
            states.sort_by_key(|(state, _)| **state);
            for (state, usage) in states {
                let coverage = usage.area / painted as f64 * 100.0;
                println!(
                    "    {}: {} regions, {:.1}% of painted-triangle area",
                    state_label(channel, *state),
                    usage.regions,
                    coverage
                );
            }
        }

        // Show where the first few annotations live
        println!();
        println!("  Sample (first 5 painted triangles):");
        for triangle in doc.triangles.iter().take(5) {
            let channels: Vec<&str> = triangle
                .sources
                .iter()
                .map(|s| s.channel.source_attr())
                .collect();
            println!(
                "    object {} triangle {}: {}",
                triangle.object,
                triangle.ordinal,
                channels.join(", ")
            );
        }
        if doc.triangles.len() > 5 {
            println!("    ... and {} more", doc.triangles.len() - 5);
        }
        println!();
    }

    // Summary
    println!("─────────────────────────────────────");
    println!("Conversion Preview:");
    println!();
    println!("Running bambu2prusa on this file rewrites the attributes as:");
    for channel in PaintChannel::ALL {
        println!("  {} -> {}", channel.source_attr(), channel.target_attr());
    }
    println!();
    println!("Color states are remapped through the filament table; seam and");
    println!("support markers pass through unchanged.");

    Ok(())
}

/// Filament colors and material names from the project settings member
fn read_filaments(package: &mut Package<File>) -> Option<Vec<(String, String)>> {
    if !package.has_member(PROJECT_SETTINGS_PATH) {
        return None;
    }
    let json = package.member_str(PROJECT_SETTINGS_PATH).ok()?;
    let value: Value = serde_json::from_str(&json).ok()?;

    let colors = value.get("filament_colour")?.as_array()?;
    let types: &[Value] = match value.get("filament_type").and_then(Value::as_array) {
        Some(list) => list,
        None => &[],
    };

    let mut filaments = Vec::new();
    for (idx, color) in colors.iter().enumerate() {
        let color = color.as_str().unwrap_or("?").to_string();
        let material = types
            .get(idx)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        filaments.push((color, material));
    }
    Some(filaments)
}

/// Per-channel running totals over one model document
#[derive(Default)]
struct ChannelTally {
    triangles: usize,
    unpainted: usize,
    regions: usize,
    by_state: HashMap<u8, StateUse>,
}

#[derive(Default, Clone, Copy)]
struct StateUse {
    regions: usize,
    area: f64,
}

impl ChannelTally {
    fn record(&mut self, assignment: &PaintAssignment) {
        self.triangles += 1;
        if assignment.is_unpainted() {
            self.unpainted += 1;
        }
        for region in &assignment.regions {
            self.regions += 1;
            let usage = self.by_state.entry(region.extruder).or_default();
            usage.regions += 1;
            // area2 of the unit triangle is 1, so twice-areas of regions
            // in the barycentric frame are coverage fractions directly
            usage.area += area2(&region.corners).abs();
        }
    }
}

fn channel_label(channel: PaintChannel) -> &'static str {
    match channel {
        PaintChannel::Color => "Multi-material color",
        PaintChannel::Seam => "Seam paint",
        PaintChannel::Support => "Support paint",
    }
}

fn state_label(channel: PaintChannel, state: u8) -> String {
    if channel.remaps_extruders() {
        return format!("Filament {}", state);
    }
    match state {
        1 => "Enforcer".to_string(),
        2 => "Blocker".to_string(),
        other => format!("State {}", other),
    }
}
