//! Data model for representing a parsed MusicXML score.
//!
//! Every value here is owned by the tree it belongs to. Optional source
//! elements that the reader must distinguish from "present with defaults"
//! are `Option`s; everything else carries a plain default.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A complete musical score parsed from a `score-partwise` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// `<movement-title>`, empty when absent
    pub movement_title: String,
    /// Header metadata; `None` when the document has no `<identification>`
    pub identification: Option<Identification>,
    /// Parts in part-list order
    pub parts: Vec<Part>,
}

/// Header metadata from `<identification>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    /// Text of `<creator type="composer">`
    pub composer: String,
    /// Text of `<rights>`
    pub rights: String,
    pub encoding: Encoding,
}

/// Tooling provenance from `<encoding>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    /// One line per `<software>` element, each terminated by a newline
    pub software: String,
    /// One line per `<encoding-description>` element, each terminated by a newline
    pub description: String,
    pub encoding_date: Option<NaiveDate>,
}

/// A musical part (one instrument or voice).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Part identifier (e.g., "P1"), also the key joining `<score-part>` to `<part>`
    pub id: String,
    /// Part name (e.g., "Voice")
    pub name: String,
    /// Ordered list of measures
    pub measures: Vec<Measure>,
}

/// A single measure (bar) of music.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Width in tenths; 0 when missing or unparsable
    pub width: f64,
    /// Attributes (divisions, key, time, clef), only when the measure has `<attributes>`
    pub attributes: Option<MeasureAttributes>,
    /// Notes, harmonies, backups and forwards in document order
    pub elements: Vec<MeasureElement>,
}

/// Musical attributes in force from the start of a measure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureAttributes {
    /// Divisions per quarter note
    pub divisions: i32,
    pub key: Option<Key>,
    pub time: Time,
    pub clef: Clef,
}

/// Key signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Number of sharps (positive) or flats (negative)
    pub fifths: i32,
    /// Mode (e.g., "major", "minor")
    pub mode: String,
}

/// Time signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    /// Numerator (e.g., 3 in 3/4)
    pub beats: i32,
    /// Denominator text as written (e.g., "4" in 3/4)
    pub beat_type: String,
    pub symbol: TimeSymbol,
}

/// How the time signature is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSymbol {
    #[default]
    Normal,
    Common,
    Cut,
    SingleNumber,
}

/// Clef definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clef {
    /// Staff line the clef sits on
    pub line: i32,
    /// Clef sign: "G" (treble), "F" (bass), "C" (alto/tenor)
    pub sign: String,
}

/// One item of measure content. Order inside a measure is the musical
/// timeline: notes advance the cursor, backup/forward move it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeasureElement {
    Note(Note),
    Harmony(Harmony),
    Backup(Backup),
    Forward(Forward),
}

/// Tag of a [`MeasureElement`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasureElementType {
    Note,
    Harmony,
    Backup,
    Forward,
}

/// A single note or rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Note type: "whole", "half", "quarter", "eighth", "16th", ...
    pub note_type: String,
    /// Voice number (for multi-voice writing)
    pub voice: i32,
    /// Duration in divisions
    pub duration: i32,
    /// `None` for rests and unpitched notes
    pub pitch: Option<Pitch>,
    pub lyric: Lyric,
    pub notations: Option<Notations>,
    /// Staff number (1-based; for multi-staff parts like piano)
    pub staff: i32,
    /// Sounds together with the previous note (`<chord/>`)
    pub is_chord_tone: bool,
    /// `<rest/>` is present
    pub is_rest: bool,
}

/// Pitch of a note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pitch {
    /// Note name: A, B, C, D, E, F, G
    pub step: char,
    /// Chromatic alteration in semitones: -1 = flat, 1 = sharp
    pub alter: i32,
    /// Octave number (middle C = C4)
    pub octave: i32,
}

/// A sung syllable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyric {
    pub syllabic: Syllabic,
    pub text: String,
}

/// Position of a syllable within its word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Syllabic {
    #[default]
    None,
    Begin,
    Single,
    End,
    Middle,
}

/// Note-level markup from `<notations>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notations {
    pub technical: Option<Technical>,
    /// Tablature payload from the GP7 processing instruction
    pub root: Option<Root>,
    /// Raw inner markup of `<articulations>`
    pub articulations: String,
    /// Raw inner markup of `<dynamics>`
    pub dynamics: String,
}

/// Fretted-instrument technique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technical {
    pub fret: i32,
    /// Instrument string number
    pub string: i32,
}

/// Guitar Pro tablature extension carried in a `<?GP7 ...?>` instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    /// `type` attribute of `<brush>` (e.g., "up", "down")
    pub brush: String,
}

/// A chord symbol (harmony).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Harmony {
    /// Root note name: A–G
    pub root_step: String,
    /// Root alteration: -1 = flat, 1 = sharp
    pub root_alter: i32,
    /// Chord quality: "major", "minor", "dominant", "major-seventh", ...
    pub kind: String,
}

/// Moves the time cursor back by `duration` divisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub duration: i32,
}

/// Moves the time cursor forward by `duration` divisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forward {
    pub duration: i32,
}

impl Score {
    /// Create a new empty score.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of measures in the first part.
    pub fn measure_count(&self) -> usize {
        self.parts.first().map_or(0, |p| p.measures.len())
    }

    /// Look up a part by its id.
    pub fn part(&self, id: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == id)
    }
}

impl Measure {
    /// The notes of this measure, in order, skipping other content.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.elements.iter().filter_map(|e| match e {
            MeasureElement::Note(note) => Some(note),
            _ => None,
        })
    }
}

impl MeasureElement {
    pub fn element_type(&self) -> MeasureElementType {
        match self {
            MeasureElement::Note(_) => MeasureElementType::Note,
            MeasureElement::Harmony(_) => MeasureElementType::Harmony,
            MeasureElement::Backup(_) => MeasureElementType::Backup,
            MeasureElement::Forward(_) => MeasureElementType::Forward,
        }
    }
}

impl Pitch {
    /// Convert pitch to MIDI note number.
    /// Middle C (C4) = 60.
    pub fn to_midi(&self) -> i32 {
        let step_semitone = match self.step.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => 0,
        };
        (self.octave + 1) * 12 + step_semitone + self.alter
    }
}
