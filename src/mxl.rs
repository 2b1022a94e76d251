//! MXL file handler — reads compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - META-INF/container.xml  — declares the root MusicXML file path
//!   - <rootfile>.xml          — the actual MusicXML content (e.g., score.xml)
//!   - (optional) other files  — images, sounds, etc.

use std::io::{Cursor, Read, Seek};

use log::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::model::Score;
use crate::parser;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Read and parse a .mxl file from raw bytes.
pub fn parse_mxl(data: &[u8]) -> Result<Score> {
    let xml = extract_musicxml_from_mxl(data)?;
    parser::parse_musicxml(&xml)
}

/// Extract the MusicXML content string from .mxl bytes.
pub fn extract_musicxml_from_mxl(data: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let root_file_path = find_root_file(&mut archive)?;
    debug!("MXL root file: {root_file_path}");

    let mut root_file = archive.by_name(&root_file_path)?;
    let xml = read_entry(&mut root_file)?;
    Ok(xml)
}

/// Find the root MusicXML file: the first `<rootfile full-path>` of
/// container.xml, or else the first XML entry outside META-INF/.
fn find_root_file<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let container_bytes = match archive.by_name(CONTAINER_PATH) {
        Ok(mut container) => Some(read_bytes(&mut container)?),
        Err(_) => None,
    }; // mutable borrow of archive is released here

    if let Some(bytes) = container_bytes {
        let unreadable = |e: &dyn std::fmt::Display| {
            Error::MissingRootFile(format!("unreadable {CONTAINER_PATH}: {e}"))
        };
        let xml = std::str::from_utf8(&bytes).map_err(|e| unreadable(&e))?;
        let doc = roxmltree::Document::parse(xml).map_err(|e| unreadable(&e))?;
        return doc
            .descendants()
            .filter(|n| n.has_tag_name("rootfile"))
            .find_map(|n| n.attribute("full-path"))
            .map(String::from)
            .ok_or_else(|| Error::MissingRootFile(format!("no rootfile in {CONTAINER_PATH}")));
    }

    let names: Vec<String> = archive.file_names().map(String::from).collect();
    names
        .iter()
        .find(|name| {
            !name.starts_with("META-INF/") && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        })
        .cloned()
        .ok_or_else(|| Error::MissingRootFile(format!("files: {names:?}")))
}

fn read_bytes<R: Read>(entry: &mut R) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| Error::Archive(e.into()))?;
    Ok(bytes)
}

/// Read an archive entry as MusicXML text; undecodable bytes are reported
/// the same way as for uncompressed files.
fn read_entry<R: Read>(entry: &mut R) -> Result<String> {
    String::from_utf8(read_bytes(entry)?).map_err(|e| Error::InvalidUtf8(e.utf8_error()))
}
