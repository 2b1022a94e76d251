//! MusicXML parser — maps a `score-partwise` tree into the Score data model.
//!
//! Missing elements fall back to defaults and never fail. Once a numeric or
//! date element is present, its text must convert, otherwise the whole
//! mapping aborts with [`Error::Conversion`]. Measure width is the one
//! lenient number: anything unparsable reads as 0.

use std::cell::OnceCell;

use chrono::NaiveDate;
use log::{debug, warn};
use roxmltree::{Document, Node};

use crate::error::{Error, Result};
use crate::model::*;

/// Processing-instruction target used by Guitar Pro for tablature data.
const GP7_TARGET: &str = "GP7";

/// Options for building the XML tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// MusicXML files include a DOCTYPE declaration, so this is on by default.
    /// External entities are never fetched either way.
    pub allow_dtd: bool,
    /// Upper bound on the number of nodes in the tree.
    pub nodes_limit: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            allow_dtd: true,
            nodes_limit: u32::MAX,
        }
    }
}

/// Parse a MusicXML XML string into a Score.
pub fn parse_musicxml(xml: &str) -> Result<Score> {
    parse_musicxml_with_options(xml, &ReadOptions::default())
}

/// Parse a MusicXML XML string into a Score with explicit tree options.
pub fn parse_musicxml_with_options(xml: &str, options: &ReadOptions) -> Result<Score> {
    let parsing = roxmltree::ParsingOptions {
        allow_dtd: options.allow_dtd,
        nodes_limit: options.nodes_limit,
    };
    let doc = Document::parse_with_options(xml, parsing)?;
    map_document(&doc)
}

/// Map an already parsed document into a Score.
pub fn map_document(doc: &Document) -> Result<Score> {
    let root = doc.root_element();
    let mut score = Score::new();

    if !root.has_tag_name("score-partwise") {
        warn!(
            "Root element <{}> is not <score-partwise>; nothing to map",
            root.tag_name().name()
        );
        return Ok(score);
    }

    if let Some(title) = find_child(&root, "movement-title") {
        score.movement_title = inner_text(&title);
    }

    score.identification = find_child(&root, "identification")
        .map(|node| parse_identification(&node))
        .transpose()?;

    // The tablature instruction is looked up document-wide, not per note.
    let tablature = Tablature::new(doc);

    if let Some(part_list) = find_child(&root, "part-list") {
        for score_part in children_named(&part_list, "score-part") {
            score.parts.push(parse_part(doc, &score_part, &tablature)?);
        }
    }

    debug!("Mapped score with {} parts", score.parts.len());
    Ok(score)
}

// ─── Identification ──────────────────────────────────────────────────

fn parse_identification(node: &Node) -> Result<Identification> {
    let composer = children_named(node, "creator")
        .find(|c| c.attribute("type") == Some("composer"))
        .map(|c| inner_text(&c))
        .unwrap_or_default();
    let rights = child_text(node, "rights").unwrap_or_default();
    let encoding = match find_child(node, "encoding") {
        Some(enc) => parse_encoding(&enc)?,
        None => Encoding::default(),
    };

    Ok(Identification {
        composer,
        rights,
        encoding,
    })
}

fn parse_encoding(node: &Node) -> Result<Encoding> {
    Ok(Encoding {
        software: joined_lines(node, "software"),
        description: joined_lines(node, "encoding-description"),
        encoding_date: find_child(node, "encoding-date")
            .map(|d| parse_date(&d, "encoding-date"))
            .transpose()?,
    })
}

/// Text of every `name` child, one line each, newline-terminated.
fn joined_lines(node: &Node, name: &'static str) -> String {
    children_named(node, name).fold(String::new(), |mut lines, line| {
        lines.push_str(&inner_text(&line));
        lines.push('\n');
        lines
    })
}

// ─── Part (measures) ─────────────────────────────────────────────────

fn parse_part(doc: &Document, score_part: &Node, tablature: &Tablature) -> Result<Part> {
    let id = score_part.attribute("id").unwrap_or("").to_string();
    let name = child_text(score_part, "part-name").unwrap_or_default();

    // <score-part> only declares the part; its content lives in whichever
    // <part> elements carry the same id.
    let measures = doc
        .descendants()
        .filter(|n| n.has_tag_name("part") && n.attribute("id") == Some(id.as_str()))
        .flat_map(|part| children_named(&part, "measure"))
        .map(|measure| parse_measure(&measure, tablature))
        .collect::<Result<Vec<_>>>()?;

    debug!("Part '{}' ({}): {} measures", id, name, measures.len());

    Ok(Part { id, name, measures })
}

// ─── Measure ─────────────────────────────────────────────────────────

fn parse_measure(node: &Node, tablature: &Tablature) -> Result<Measure> {
    let width = node
        .attribute("width")
        .and_then(parse_decimal)
        .unwrap_or(0.0);

    let attributes = find_child(node, "attributes")
        .map(|attrs| parse_attributes(&attrs))
        .transpose()?;

    let mut elements = Vec::new();
    for child in node.children().filter(|n| n.is_element()) {
        let element = match child.tag_name().name() {
            "note" => MeasureElement::Note(parse_note(&child, tablature)?),
            "harmony" => MeasureElement::Harmony(parse_harmony(&child)?),
            "backup" => MeasureElement::Backup(Backup {
                duration: child_i32(&child, "duration")?.unwrap_or_default(),
            }),
            "forward" => MeasureElement::Forward(Forward {
                duration: child_i32(&child, "duration")?.unwrap_or_default(),
            }),
            _ => continue,
        };
        elements.push(element);
    }

    Ok(Measure {
        width,
        attributes,
        elements,
    })
}

// ─── Attributes ──────────────────────────────────────────────────────

fn parse_attributes(node: &Node) -> Result<MeasureAttributes> {
    Ok(MeasureAttributes {
        divisions: child_i32(node, "divisions")?.unwrap_or_default(),
        key: find_child(node, "key")
            .map(|key| parse_key(&key))
            .transpose()?,
        time: parse_time(node)?,
        clef: parse_clef(node)?,
    })
}

fn parse_key(node: &Node) -> Result<Key> {
    Ok(Key {
        fifths: child_i32(node, "fifths")?.unwrap_or_default(),
        mode: child_text(node, "mode").unwrap_or_default(),
    })
}

/// Time signature of an `<attributes>` node; all defaults without `<time>`.
fn parse_time(attributes: &Node) -> Result<Time> {
    let Some(node) = find_child(attributes, "time") else {
        return Ok(Time::default());
    };

    Ok(Time {
        beats: child_i32(&node, "beats")?.unwrap_or_default(),
        beat_type: child_text(&node, "beat-type").unwrap_or_default(),
        symbol: time_symbol(node.attribute("symbol")),
    })
}

fn time_symbol(value: Option<&str>) -> TimeSymbol {
    match value {
        Some("common") => TimeSymbol::Common,
        Some("cut") => TimeSymbol::Cut,
        Some("single-number") => TimeSymbol::SingleNumber,
        _ => TimeSymbol::Normal,
    }
}

/// Clef of an `<attributes>` node; zero-valued without `<clef>`.
fn parse_clef(attributes: &Node) -> Result<Clef> {
    let Some(node) = find_child(attributes, "clef") else {
        return Ok(Clef::default());
    };

    Ok(Clef {
        line: child_i32(&node, "line")?.unwrap_or_default(),
        sign: child_text(&node, "sign").unwrap_or_default(),
    })
}

// ─── Note ────────────────────────────────────────────────────────────

fn parse_note(node: &Node, tablature: &Tablature) -> Result<Note> {
    Ok(Note {
        note_type: child_text(node, "type").unwrap_or_default(),
        voice: child_i32(node, "voice")?.unwrap_or_default(),
        duration: child_i32(node, "duration")?.unwrap_or_default(),
        pitch: find_child(node, "pitch")
            .map(|pitch| parse_pitch(&pitch))
            .transpose()?,
        lyric: find_child(node, "lyric")
            .map(|lyric| parse_lyric(&lyric))
            .unwrap_or_default(),
        notations: find_child(node, "notations")
            .map(|notations| parse_notations(&notations, tablature))
            .transpose()?,
        staff: child_i32(node, "staff")?.unwrap_or_default(),
        // <chord/> and <rest/> are empty markers; presence is the value.
        is_chord_tone: find_child(node, "chord").is_some(),
        is_rest: find_child(node, "rest").is_some(),
    })
}

fn parse_pitch(node: &Node) -> Result<Pitch> {
    let step = match find_child(node, "step") {
        Some(step) => {
            let text = inner_text(&step);
            text.chars()
                .next()
                .ok_or_else(|| Error::conversion("step", &text, "pitch step is empty"))?
        }
        None => char::default(),
    };

    Ok(Pitch {
        step,
        alter: child_i32(node, "alter")?.unwrap_or_default(),
        octave: child_i32(node, "octave")?.unwrap_or_default(),
    })
}

fn parse_lyric(node: &Node) -> Lyric {
    Lyric {
        syllabic: syllabic(child_text(node, "syllabic").as_deref().unwrap_or("")),
        text: child_text(node, "text").unwrap_or_default(),
    }
}

fn syllabic(value: &str) -> Syllabic {
    match value {
        "begin" => Syllabic::Begin,
        "single" => Syllabic::Single,
        "end" => Syllabic::End,
        "middle" => Syllabic::Middle,
        _ => Syllabic::None,
    }
}

// ─── Notations ───────────────────────────────────────────────────────

fn parse_notations(node: &Node, tablature: &Tablature) -> Result<Notations> {
    Ok(Notations {
        technical: find_child(node, "technical")
            .map(|technical| parse_technical(&technical))
            .transpose()?,
        root: tablature.root().cloned(),
        articulations: find_child(node, "articulations")
            .map(|a| inner_xml(&a))
            .unwrap_or_default(),
        dynamics: find_child(node, "dynamics")
            .map(|d| inner_xml(&d))
            .unwrap_or_default(),
    })
}

fn parse_technical(node: &Node) -> Result<Technical> {
    Ok(Technical {
        fret: child_i32(node, "fret")?.unwrap_or_default(),
        string: child_i32(node, "string")?.unwrap_or_default(),
    })
}

/// The document's `<?GP7 ...?>` payload, mapped on first use and shared
/// by every note that has notations.
struct Tablature<'a, 'input> {
    doc: &'a Document<'input>,
    root: OnceCell<Option<Root>>,
}

impl<'a, 'input> Tablature<'a, 'input> {
    fn new(doc: &'a Document<'input>) -> Self {
        Self {
            doc,
            root: OnceCell::new(),
        }
    }

    fn root(&self) -> Option<&Root> {
        self.root.get_or_init(|| find_tablature(self.doc)).as_ref()
    }
}

/// Locate the first `<?GP7 ...?>` instruction in the document and map its payload.
fn find_tablature(doc: &Document) -> Option<Root> {
    let payload = doc
        .descendants()
        .find_map(|n| n.pi().filter(|pi| pi.target == GP7_TARGET))?
        .value?;
    parse_tablature(payload)
}

/// The GP7 payload is a standalone XML document of the form
/// `<root><brush type="..."/></root>`. A payload that does not parse is
/// treated as if the instruction were missing.
fn parse_tablature(payload: &str) -> Option<Root> {
    let doc = match Document::parse(payload) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Ignoring unparsable {GP7_TARGET} payload: {e}");
            return None;
        }
    };

    let root = doc.root_element();
    if !root.has_tag_name("root") {
        return None;
    }

    let brush = find_child(&root, "brush")
        .and_then(|brush| brush.attribute("type"))
        .unwrap_or("")
        .to_string();
    Some(Root { brush })
}

// ─── Harmony ─────────────────────────────────────────────────────────

fn parse_harmony(node: &Node) -> Result<Harmony> {
    let mut harmony = Harmony::default();

    if let Some(root) = find_child(node, "root") {
        harmony.root_step = child_text(&root, "root-step").unwrap_or_default();
        harmony.root_alter = child_i32(&root, "root-alter")?.unwrap_or_default();
    }
    harmony.kind = child_text(node, "kind").unwrap_or_default();

    Ok(harmony)
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn find_child<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn children_named<'a, 'input: 'a>(
    node: &Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| n.has_tag_name(name))
}

/// All descendant text of a node, trimmed.
fn inner_text(node: &Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.trim().to_string()
}

fn child_text(node: &Node, name: &str) -> Option<String> {
    find_child(node, name).map(|n| inner_text(&n))
}

/// Source markup between a node's start and end tags, trimmed.
///
/// Children expanded from DTD entities have ranges inside the DOCTYPE, not
/// inside the node, so those are written back out instead of sliced.
fn inner_xml(node: &Node) -> String {
    let input = node.document().input_text();
    let bounds = node.range();
    let mut markup = String::new();

    for child in node.children() {
        let range = child.range();
        let source = if range.start >= bounds.start && range.end <= bounds.end {
            input.get(range)
        } else {
            None
        };
        match source {
            Some(text) => markup.push_str(text),
            None => write_node(&child, &mut markup),
        }
    }

    markup.trim().to_string()
}

fn write_node(node: &Node, out: &mut String) {
    if let Some(text) = node.text().filter(|_| node.is_text()) {
        out.push_str(&escape(text, false));
    } else if let Some(comment) = node.text().filter(|_| node.is_comment()) {
        out.push_str(&format!("<!--{comment}-->"));
    } else if let Some(pi) = node.pi() {
        match pi.value {
            Some(value) => out.push_str(&format!("<?{} {value}?>", pi.target)),
            None => out.push_str(&format!("<?{}?>", pi.target)),
        }
    } else if node.is_element() {
        let name = node.tag_name().name();
        out.push('<');
        out.push_str(name);
        for attr in node.attributes() {
            out.push_str(&format!(" {}=\"{}\"", attr.name(), escape(attr.value(), true)));
        }
        if node.has_children() {
            out.push('>');
            for child in node.children() {
                write_node(&child, out);
            }
            out.push_str(&format!("</{name}>"));
        } else {
            out.push_str("/>");
        }
    }
}

fn escape(text: &str, in_attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if in_attribute => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Strict integer conversion of an optional child element.
fn child_i32(node: &Node, name: &'static str) -> Result<Option<i32>> {
    find_child(node, name)
        .map(|n| parse_i32(&n, name))
        .transpose()
}

fn parse_i32(node: &Node, element: &'static str) -> Result<i32> {
    let text = inner_text(node);
    text.parse().map_err(|e| Error::conversion(element, &text, e))
}

fn parse_date(node: &Node, element: &'static str) -> Result<NaiveDate> {
    let text = inner_text(node);
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| Error::conversion(element, &text, e))
}

/// Lenient decimal: digits with an optional decimal point, nothing else.
fn parse_decimal(text: &str) -> Option<f64> {
    if !text.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_doc(xml: &str) -> Document<'_> {
        Document::parse(xml).unwrap()
    }

    #[test]
    fn decimal_accepts_only_plain_numbers() {
        assert_eq!(parse_decimal("198"), Some(198.0));
        assert_eq!(parse_decimal("212.5"), Some(212.5));
        assert_eq!(parse_decimal(".5"), Some(0.5));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("."), None);
        assert_eq!(parse_decimal("-3"), None);
        assert_eq!(parse_decimal("1e3"), None);
        assert_eq!(parse_decimal(" 12"), None);
        assert_eq!(parse_decimal("1.2.3"), None);
        assert_eq!(parse_decimal("wide"), None);
    }

    #[test]
    fn time_symbol_literals() {
        assert_eq!(time_symbol(Some("common")), TimeSymbol::Common);
        assert_eq!(time_symbol(Some("cut")), TimeSymbol::Cut);
        assert_eq!(time_symbol(Some("single-number")), TimeSymbol::SingleNumber);
        assert_eq!(time_symbol(Some("normal")), TimeSymbol::Normal);
        assert_eq!(time_symbol(Some("Common")), TimeSymbol::Normal);
        assert_eq!(time_symbol(None), TimeSymbol::Normal);
    }

    #[test]
    fn syllabic_literals() {
        assert_eq!(syllabic("begin"), Syllabic::Begin);
        assert_eq!(syllabic("single"), Syllabic::Single);
        assert_eq!(syllabic("end"), Syllabic::End);
        assert_eq!(syllabic("middle"), Syllabic::Middle);
        assert_eq!(syllabic(""), Syllabic::None);
        assert_eq!(syllabic("BEGIN"), Syllabic::None);
        assert_eq!(syllabic("garbage"), Syllabic::None);
    }

    #[test]
    fn inner_text_joins_descendants() {
        let doc = parse_doc("<rights>  Copyright <b>©</b> 2002 </rights>");
        assert_eq!(inner_text(&doc.root_element()), "Copyright © 2002");
    }

    #[test]
    fn inner_xml_keeps_markup() {
        let doc = parse_doc(
            "<articulations>\n  <accent placement=\"above\"/>\n  <staccato/>\n</articulations>",
        );
        assert_eq!(
            inner_xml(&doc.root_element()),
            "<accent placement=\"above\"/>\n  <staccato/>"
        );

        let empty = parse_doc("<dynamics/>");
        assert_eq!(inner_xml(&empty.root_element()), "");
    }

    #[test]
    fn inner_xml_writes_out_entity_children() {
        let xml = r#"<!DOCTYPE dynamics [
  <!ENTITY poco '<other-dynamics type="text">poco</other-dynamics>'>
]>
<dynamics><p/>&poco;</dynamics>"#;
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = Document::parse_with_options(xml, options).unwrap();
        assert_eq!(
            inner_xml(&doc.root_element()),
            r#"<p/><other-dynamics type="text">poco</other-dynamics>"#
        );
    }

    #[test]
    fn escape_markup_characters() {
        assert_eq!(escape(r#"a<b & "c">"#, false), r#"a&lt;b &amp; "c"&gt;"#);
        assert_eq!(escape(r#"say "hi""#, true), "say &quot;hi&quot;");
    }

    #[test]
    fn joined_lines_terminates_each_entry() {
        let doc = parse_doc(
            "<encoding><software>A</software><other>x</other><software>B</software></encoding>",
        );
        assert_eq!(joined_lines(&doc.root_element(), "software"), "A\nB\n");
        assert_eq!(joined_lines(&doc.root_element(), "encoding-description"), "");
    }

    #[test]
    fn tablature_payload() {
        assert_eq!(
            parse_tablature(r#"<root><brush type="up"/></root>"#),
            Some(Root { brush: "up".to_string() })
        );
        assert_eq!(
            parse_tablature("<root><brush/></root>"),
            Some(Root::default())
        );
        assert_eq!(parse_tablature("<root/>"), Some(Root::default()));
        assert_eq!(parse_tablature("<other><brush type=\"up\"/></other>"), None);
        assert_eq!(parse_tablature("<root><brush type=\"up\">"), None);
        assert_eq!(parse_tablature("not xml at all"), None);
    }

    #[test]
    fn tablature_is_mapped_on_first_use() {
        let doc = parse_doc(
            r#"<score-partwise><?GP7 <root><brush type="up"/></root>?></score-partwise>"#,
        );
        let tablature = Tablature::new(&doc);
        assert!(tablature.root.get().is_none());

        assert_eq!(tablature.root().map(|r| r.brush.as_str()), Some("up"));
        assert!(tablature.root.get().is_some());
    }

    #[test]
    fn unused_tablature_is_never_mapped() {
        let doc = parse_doc(
            r#"<score-partwise><part-list><score-part id="P1"/></part-list>
<?GP7 <root><brush type="up">?>
<part id="P1"><measure><note><pitch><step>E</step><octave>2</octave></pitch></note></measure></part>
</score-partwise>"#,
        );
        let tablature = Tablature::new(&doc);
        let part_list = find_child(&doc.root_element(), "part-list").unwrap();
        let score_part = find_child(&part_list, "score-part").unwrap();

        let part = parse_part(&doc, &score_part, &tablature).unwrap();
        assert_eq!(part.measures[0].notes().count(), 1);
        assert!(tablature.root.get().is_none());
    }

    #[test]
    fn strict_integer_reports_element() {
        let doc = parse_doc("<attributes><divisions>eight</divisions></attributes>");
        let err = child_i32(&doc.root_element(), "divisions").unwrap_err();
        match err {
            Error::Conversion { element, value, .. } => {
                assert_eq!(element, "divisions");
                assert_eq!(value, "eight");
            }
            other => panic!("Expected conversion error, got {other:?}"),
        }
    }

    #[test]
    fn strict_integer_tolerates_padding() {
        let doc = parse_doc("<note><voice>\n  2\n</voice></note>");
        assert_eq!(child_i32(&doc.root_element(), "voice").unwrap(), Some(2));
        assert_eq!(child_i32(&doc.root_element(), "staff").unwrap(), None);
    }

    #[test]
    fn encoding_date_is_strict() {
        let ok = parse_doc("<encoding><encoding-date>2011-08-08</encoding-date></encoding>");
        assert_eq!(
            parse_encoding(&ok.root_element()).unwrap().encoding_date,
            NaiveDate::from_ymd_opt(2011, 8, 8)
        );

        let bad = parse_doc("<encoding><encoding-date>last tuesday</encoding-date></encoding>");
        assert!(parse_encoding(&bad.root_element()).unwrap_err().is_conversion());
    }

    #[test]
    fn empty_step_is_a_conversion_error() {
        let doc = parse_doc("<pitch><step/><octave>4</octave></pitch>");
        assert!(parse_pitch(&doc.root_element()).unwrap_err().is_conversion());
    }

    #[test]
    fn other_root_elements_map_to_empty_score() {
        let score = parse_musicxml(
            r#"<score-timewise><movement-title>X</movement-title></score-timewise>"#,
        )
        .unwrap();
        assert_eq!(score, Score::default());
    }

    #[test]
    fn nodes_limit_is_enforced() {
        let xml = "<score-partwise><part-list/><part id=\"P1\"/></score-partwise>";
        let options = ReadOptions {
            nodes_limit: 2,
            ..ReadOptions::default()
        };
        let err = parse_musicxml_with_options(xml, &options).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }
}
