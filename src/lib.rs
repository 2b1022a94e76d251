//! musicxml — reads MusicXML `score-partwise` documents into a typed score model.
//!
//! Supports both uncompressed MusicXML (.musicxml) and compressed MXL (.mxl) files.
//! The reader is one-directional: XML in, [`Score`] out.
//!
//! # Example
//! ```no_run
//! use musicxml::parse_file;
//!
//! let score = parse_file("path/to/score.musicxml").unwrap();
//! println!("Title: {}", score.movement_title);
//! println!("Parts: {}", score.parts.len());
//! println!("Measures: {}", score.measure_count());
//! ```

pub mod error;
pub mod model;
pub mod mxl;
pub mod parser;

use std::path::Path;

pub use error::{Error, Result};
pub use model::*;
pub use mxl::parse_mxl;
pub use parser::{map_document, parse_musicxml, parse_musicxml_with_options, ReadOptions};

/// Parse a MusicXML file from a file path.
/// Automatically detects format based on file extension:
/// - `.musicxml` or `.xml` → uncompressed MusicXML
/// - `.mxl` → compressed MXL (ZIP archive)
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Score> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_bytes(&data, path.extension().and_then(|e| e.to_str()))
}

/// Parse MusicXML from raw bytes with an optional format hint.
/// If `extension` is None, tries to auto-detect the format.
pub fn parse_bytes(data: &[u8], extension: Option<&str>) -> Result<Score> {
    match extension {
        Some("mxl") => parse_mxl(data),
        Some("musicxml") | Some("xml") => parse_musicxml(std::str::from_utf8(data)?),
        _ => {
            // Auto-detect: markup is text MusicXML, anything else is tried as MXL
            if let Ok(xml) = std::str::from_utf8(data) {
                if xml.trim_start_matches('\u{feff}').trim_start().starts_with('<') {
                    return parse_musicxml(xml);
                }
            }
            parse_mxl(data)
        }
    }
}

/// Convert a parsed score to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn score_to_json(score: &Score) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(score)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Parse a MusicXML or MXL file and return the score as a JSON C string.
/// The caller must free the returned string with `musicxml_free_string`.
/// Returns null if the path is invalid or the file cannot be read.
///
/// # Safety
/// `path` must be a valid null-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn musicxml_file_to_json(path: *const c_char) -> *mut c_char {
    if path.is_null() {
        return std::ptr::null_mut();
    }
    let c_str = unsafe { CStr::from_ptr(path) };
    let path_str = match c_str.to_str() {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };

    let json = match parse_file(path_str) {
        Ok(score) => score_to_json(&score),
        Err(e) => {
            log::warn!("musicxml_file_to_json({path_str}): {e}");
            return std::ptr::null_mut();
        }
    };

    match json {
        Ok(json) => CString::new(json).map_or(std::ptr::null_mut(), CString::into_raw),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by musicxml functions.
///
/// # Safety
/// `ptr` must be a string previously returned by a musicxml function, or null.
#[no_mangle]
pub unsafe extern "C" fn musicxml_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <movement-title>Etude</movement-title>
  <part-list><score-part id="P1"><part-name>Flute</part-name></score-part></part-list>
  <part id="P1"><measure number="1"/></part>
</score-partwise>"#;

    #[test]
    fn bytes_auto_detect_text() {
        let score = parse_bytes(MINIMAL.as_bytes(), None).unwrap();
        assert_eq!(score.movement_title, "Etude");
        assert_eq!(score.measure_count(), 1);
    }

    #[test]
    fn bytes_auto_detect_text_after_bom() {
        let data = format!("\u{feff}{MINIMAL}");
        let detected = parse_bytes(data.as_bytes(), None).unwrap();
        let hinted = parse_bytes(data.as_bytes(), Some("xml")).unwrap();

        assert_eq!(detected.movement_title, "Etude");
        assert_eq!(detected, hinted);
    }

    #[test]
    fn bytes_with_xml_hint_require_utf8() {
        let err = parse_bytes(&[0x3c, 0xff, 0xfe], Some("xml")).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = parse_file("/nonexistent/dir/score.musicxml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn malformed_xml_is_reported() {
        let err = parse_bytes(b"<score-partwise><part-list>", Some("musicxml")).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn json_round_trips_through_serde() {
        let score = parse_musicxml(MINIMAL).unwrap();
        let json = score_to_json(&score).unwrap();
        assert!(json.contains("\"movement_title\": \"Etude\""));
        let back: Score = serde_json::from_str(&json).unwrap();
        assert_eq!(back, score);
    }

    #[test]
    fn ffi_returns_json_and_frees() {
        let mut file = tempfile::Builder::new()
            .suffix(".musicxml")
            .tempfile()
            .unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let path = CString::new(file.path().to_str().unwrap()).unwrap();

        unsafe {
            let ptr = musicxml_file_to_json(path.as_ptr());
            assert!(!ptr.is_null());
            let json = CStr::from_ptr(ptr).to_str().unwrap().to_string();
            assert!(json.contains("Flute"));
            musicxml_free_string(ptr);

            assert!(musicxml_file_to_json(std::ptr::null()).is_null());
        }
    }
}
