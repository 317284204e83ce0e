//! Surgical rewrite of model documents
//!
//! The conversion must not disturb anything it does not own: vertex
//! data, metadata, production extension attributes, comments and the
//! exact byte form of all of it stay as they were. The rewrite therefore
//! streams reader events straight to a writer and rebuilds only two
//! kinds of elements:
//!
//! - `<triangle>` elements with a pending edit lose their source paint
//!   attributes and gain the translated target attributes,
//! - the `<model>` element gains the `slic3rpe` namespace declaration
//!   when target attributes are written and it is not already bound.
//!
//! Rebuilt elements use canonical quoting; untouched events keep their
//! original bytes, including attribute order and escaping.

use crate::error::{Error, Result};
use crate::paint::{PaintChannel, SLIC3RPE_NS};
use quick_xml::Reader as XmlReader;
use quick_xml::Writer as XmlWriter;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::debug;

/// Pending attribute changes for one triangle
///
/// One entry per channel that had a source attribute: `Some(code)`
/// replaces it with a target attribute, `None` just removes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleEdit {
    /// Channel edits in source attribute order
    pub channels: Vec<(PaintChannel, Option<String>)>,
}

/// Edits keyed by object id and triangle ordinal
pub type EditMap = HashMap<(u32, usize), TriangleEdit>;

/// Apply triangle edits to a model document
///
/// Returns `Ok(None)` when there is nothing to change, so callers can
/// leave the original member untouched. Ordinals are counted exactly
/// like extraction counts them; an edit that matches no triangle means
/// the caller built the map against a different document and is a
/// contract violation.
pub fn rewrite_model(member: &str, xml: &str, edits: &EditMap) -> Result<Option<String>> {
    if edits.is_empty() {
        return Ok(None);
    }
    let needs_namespace = edits
        .values()
        .any(|e| e.channels.iter().any(|(_, code)| code.is_some()));

    let mut reader = XmlReader::from_str(xml);
    let mut writer = XmlWriter::new(Cursor::new(Vec::with_capacity(xml.len())));
    let mut buf = Vec::new();

    let mut current_object: Option<u32> = None;
    let mut ordinal: usize = 0;
    let mut applied: usize = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"model" {
                    if needs_namespace && !has_slic3rpe_binding(member, &e)? {
                        let mut rebuilt = e.to_owned();
                        rebuilt.push_attribute(("xmlns:slic3rpe", SLIC3RPE_NS));
                        write(&mut writer, Event::Start(rebuilt))?;
                    } else {
                        write(&mut writer, Event::Start(e))?;
                    }
                } else if e.local_name().as_ref() == b"object" {
                    current_object = parse_id(member, &e)?;
                    ordinal = 0;
                    write(&mut writer, Event::Start(e))?;
                } else if e.local_name().as_ref() == b"triangle" {
                    let key = current_object.map(|object| (object, ordinal));
                    ordinal += 1;
                    let elem = triangle_element(member, e, key, edits, &mut applied)?;
                    write(&mut writer, Event::Start(elem))?;
                } else {
                    write(&mut writer, Event::Start(e))?;
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"triangle" {
                    let key = current_object.map(|object| (object, ordinal));
                    ordinal += 1;
                    let elem = triangle_element(member, e, key, edits, &mut applied)?;
                    write(&mut writer, Event::Empty(elem))?;
                } else {
                    write(&mut writer, Event::Empty(e))?;
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"object" {
                    current_object = None;
                }
                write(&mut writer, Event::End(e))?;
            }
            Ok(Event::Eof) => break,
            Ok(event) => write(&mut writer, event)?,
            Err(e) => {
                return Err(Error::malformed_model(
                    member,
                    format!("XML error at offset {}: {e}", reader.buffer_position()),
                ));
            }
        }
        buf.clear();
    }

    if applied != edits.len() {
        return Err(Error::Serialization(format!(
            "{} of {} triangle edits found no matching triangle in '{member}'",
            edits.len() - applied,
            edits.len()
        )));
    }

    debug!(member, edits = applied, "rewrote model document");
    let bytes = writer.into_inner().into_inner();
    let out = String::from_utf8(bytes)
        .map_err(|e| Error::Serialization(format!("rewritten document is not UTF-8: {e}")))?;
    Ok(Some(out))
}

fn write<W: std::io::Write>(writer: &mut XmlWriter<W>, event: Event) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Serialization(format!("failed to write XML event: {e}")))
}

fn triangle_element<'a>(
    member: &str,
    e: BytesStart<'a>,
    key: Option<(u32, usize)>,
    edits: &EditMap,
    applied: &mut usize,
) -> Result<BytesStart<'a>> {
    match key.and_then(|k| edits.get(&k)) {
        Some(edit) => {
            *applied += 1;
            Ok(rebuild_triangle(member, &e, edit)?)
        }
        None => Ok(e),
    }
}

/// Rebuild a `<triangle>` element with its paint attributes swapped
///
/// Source attributes are always dropped; target attributes are dropped
/// only for channels this edit owns, then re-added from the edit. All
/// other attributes pass through with their original bytes.
fn rebuild_triangle(
    member: &str,
    e: &BytesStart,
    edit: &TriangleEdit,
) -> Result<BytesStart<'static>> {
    let mut rebuilt = e.to_owned();
    rebuilt.clear_attributes();

    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| Error::malformed_model(member, format!("attribute error: {e}")))?;
        let key = attr.key.as_ref();

        let is_source = PaintChannel::ALL
            .iter()
            .any(|c| key == c.source_attr().as_bytes());
        let is_owned_target = edit
            .channels
            .iter()
            .any(|(c, _)| key == c.target_attr().as_bytes());
        if is_source || is_owned_target {
            continue;
        }
        rebuilt.push_attribute(attr);
    }

    for (channel, code) in &edit.channels {
        if let Some(code) = code {
            rebuilt.push_attribute((channel.target_attr(), code.as_str()));
        }
    }
    Ok(rebuilt)
}

fn has_slic3rpe_binding(member: &str, e: &BytesStart) -> Result<bool> {
    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| Error::malformed_model(member, format!("attribute error: {e}")))?;
        if attr.key.as_ref() == b"xmlns:slic3rpe" {
            return Ok(true);
        }
    }
    Ok(false)
}

fn parse_id(member: &str, e: &BytesStart) -> Result<Option<u32>> {
    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| Error::malformed_model(member, format!("attribute error: {e}")))?;
        if attr.key.as_ref() == b"id" {
            let value = std::str::from_utf8(&attr.value)
                .map_err(|e| Error::malformed_model(member, format!("invalid object id: {e}")))?;
            let id = value.trim().parse::<u32>().map_err(|e| {
                Error::malformed_model(member, format!("invalid object id '{value}': {e}"))
            })?;
            return Ok(Some(id));
        }
    }
    Ok(None)
}
