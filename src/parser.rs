//! Score parser — converts the raw node tree into the structured
//! [`ParsedScore`] model.
//!
//! Parsing is tolerant: unexpected shapes are recorded as warnings and the
//! offending node is skipped, never aborting the document. The only fatal
//! condition (a missing `<score-partwise>` container) is handled upstream
//! by the reader.

use crate::model::*;
use crate::reader::{Literal, RawChild, RawNode, RawScore};

/// Classifies a skipped node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserWarningKind {
    /// The top level of a score should hold 'part-list' and 'part'
    /// elements; bare values only belong in nested nodes.
    UnexpectedTopLevelValueNode,
    /// A bare value where a measure child element was expected.
    UnexpectedMeasureLevelValueNode,
    /// A measure child other than note, backup, forward, or attributes.
    UnexpectedMeasureChildNode,
    /// A `<part id="..">` whose id matches nothing in the part-list.
    UnexpectedPartId,
}

/// A non-fatal parse anomaly: the node at `node_index` (within its parent's
/// child sequence) was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserWarning {
    pub node_index: usize,
    pub kind: ParserWarningKind,
}

/// A parsed score together with the warnings accumulated while parsing it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub score: ParsedScore,
    pub warnings: Vec<ParserWarning>,
}

/// Parse the children of `<score-partwise>` into a [`ParsedScore`].
pub fn parse_raw_score(raw: &RawScore) -> ParsedOutput {
    let mut parts: Vec<Part> = Vec::new();
    let mut warnings = Vec::new();

    for (node_index, child) in raw.iter().enumerate() {
        let node = match child {
            RawChild::Node(n) => n,
            RawChild::Value(_) => {
                warnings.push(ParserWarning {
                    node_index,
                    kind: ParserWarningKind::UnexpectedTopLevelValueNode,
                });
                continue;
            }
        };

        match node.tag_name.as_str() {
            "part-list" => parts = parse_part_list(node),
            "part" => {
                let id = node.attribute("id").map(literal_string).unwrap_or_default();
                let measures = parse_part_node(node, &mut warnings);

                // Part matching by id is exact-string.
                match parts.iter_mut().find(|p| p.id == id) {
                    Some(part) => part.measures = measures,
                    None => {
                        warnings.push(ParserWarning {
                            node_index,
                            kind: ParserWarningKind::UnexpectedPartId,
                        });
                    }
                }
            }
            other => {
                // Header material (work, identification, credit, ...) is not
                // needed for playback.
                log::debug!("skipping top-level <{other}> node");
            }
        }
    }

    ParsedOutput {
        score: ParsedScore { parts },
        warnings,
    }
}

// ─── Part list ───────────────────────────────────────────────────────

fn parse_part_list(node: &RawNode) -> Vec<Part> {
    let mut parts = Vec::new();

    for score_part in node.nodes().filter(|n| n.tag_name == "score-part") {
        let id = score_part
            .attribute("id")
            .map(literal_string)
            .unwrap_or_default();

        let name = score_part
            .find("part-name")
            .and_then(|n| n.value())
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();

        parts.push(Part {
            id,
            name,
            measures: Vec::new(),
        });
    }

    parts
}

// ─── Part (measures) ─────────────────────────────────────────────────

fn parse_part_node(node: &RawNode, warnings: &mut Vec<ParserWarning>) -> Vec<Measure> {
    node.nodes()
        .filter(|n| n.tag_name == "measure")
        .map(|n| parse_measure(n, warnings))
        .collect()
}

fn parse_measure(node: &RawNode, warnings: &mut Vec<ParserWarning>) -> Measure {
    let number = node
        .attribute("number")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as i32;

    let mut children = Vec::new();

    for (node_index, child) in node.children.iter().enumerate() {
        let child_node = match child {
            RawChild::Node(n) => n,
            RawChild::Value(_) => {
                warnings.push(ParserWarning {
                    node_index,
                    kind: ParserWarningKind::UnexpectedMeasureLevelValueNode,
                });
                continue;
            }
        };

        match child_node.tag_name.as_str() {
            "note" => children.push(MeasureChild::Note(parse_note(child_node))),
            "backup" => children.push(MeasureChild::Backup {
                duration: child_duration(child_node),
            }),
            "forward" => children.push(MeasureChild::Forward {
                duration: child_duration(child_node),
            }),
            "attributes" => {
                children.push(MeasureChild::Attributes(parse_attributes(child_node)))
            }
            _ => {
                warnings.push(ParserWarning {
                    node_index,
                    kind: ParserWarningKind::UnexpectedMeasureChildNode,
                });
            }
        }
    }

    Measure { number, children }
}

// ─── Note ────────────────────────────────────────────────────────────

fn parse_note(node: &RawNode) -> ParsedNote {
    let mut note = ParsedNote::default();

    for child in node.nodes() {
        match child.tag_name.as_str() {
            "pitch" => note.pitch = parse_pitch(child),
            "duration" => note.duration = child.value().and_then(|v| v.as_f64()).unwrap_or(0.0),
            "voice" => note.voice = child.value().and_then(|v| v.as_f64()).map(|n| n as i32),
            "staff" => note.staff = child.value().and_then(|v| v.as_f64()).map(|n| n as i32),
            // Presence flags: the bare element means true.
            "chord" => note.chord = true,
            "rest" => note.rest = true,
            "cue" => note.cue = true,
            "grace" => note.grace = true,
            "time-modification" => {
                note.time_modification = Some(TimeModification {
                    actual_notes: child_value(child, "actual-notes").unwrap_or(1.0),
                    normal_notes: child_value(child, "normal-notes").unwrap_or(1.0),
                })
            }
            // Only tie markers are read from <notations> in this version;
            // slurs, articulations, and ornaments are dropped.
            "notations" => {
                for entry in child.nodes().filter(|n| n.tag_name == "tied") {
                    if let Some(kind) = entry
                        .attribute("type")
                        .and_then(|v| v.as_str())
                        .and_then(tie_kind)
                    {
                        note.ties.push(kind);
                    }
                }
            }
            _ => {}
        }
    }

    note
}

fn parse_pitch(node: &RawNode) -> Option<Pitch> {
    let step = node
        .find("step")
        .and_then(|n| n.value())
        .and_then(|v| v.as_str())
        .and_then(|s| s.chars().next())
        .and_then(Step::from_char)?;

    Some(Pitch {
        step,
        alter: child_value(node, "alter"),
        octave: child_value(node, "octave").unwrap_or(4.0) as i32,
    })
}

fn tie_kind(s: &str) -> Option<TieKind> {
    match s {
        "start" => Some(TieKind::Start),
        "stop" => Some(TieKind::Stop),
        "continue" => Some(TieKind::Continue),
        _ => None,
    }
}

// ─── Attributes ──────────────────────────────────────────────────────

fn parse_attributes(node: &RawNode) -> MeasureAttributes {
    let time = node.find("time").map(|t| TimeSignature {
        beats: child_value(t, "beats").unwrap_or(4.0),
        beat_type: child_value(t, "beat-type").unwrap_or(4.0),
    });

    let clef_sign = node
        .find("clef")
        .and_then(|c| c.find("sign"))
        .and_then(|s| s.value())
        .and_then(|v| v.as_str())
        .map(str::to_string);

    MeasureAttributes {
        divisions: child_value(node, "divisions"),
        time,
        clef_sign,
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn child_duration(node: &RawNode) -> f64 {
    child_value(node, "duration").unwrap_or(0.0)
}

fn child_value(node: &RawNode, tag: &str) -> Option<f64> {
    node.find(tag).and_then(|n| n.value()).and_then(|v| v.as_f64())
}

/// Render a coerced literal back to the exact-match string used for part
/// ids (numeric ids like `1` compare against `<part id="1">`).
fn literal_string(lit: &Literal) -> String {
    match lit {
        Literal::Text(s) => s.clone(),
        Literal::Number(n) => {
            if n.fract() == 0.0 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Literal::Bool(b) => format!("{b}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_str;
    use pretty_assertions::assert_eq;

    #[test]
    fn warns_on_unknown_measure_child() {
        let raw = read_str(
            "<score-partwise>\
               <part-list><score-part id=\"P1\"><part-name>Music</part-name></score-part></part-list>\
               <part id=\"P1\">\
                 <measure number=\"1\"><direction/><note><rest/><duration>4</duration></note></measure>\
               </part>\
             </score-partwise>",
        )
        .unwrap();

        let out = parse_raw_score(&raw);
        assert_eq!(
            out.warnings,
            vec![ParserWarning {
                node_index: 0,
                kind: ParserWarningKind::UnexpectedMeasureChildNode
            }]
        );
        assert_eq!(out.score.parts[0].measures[0].children.len(), 1);
    }

    #[test]
    fn warns_on_unmatched_part_id() {
        let raw = read_str(
            "<score-partwise>\
               <part-list><score-part id=\"P1\"><part-name>Music</part-name></score-part></part-list>\
               <part id=\"P2\"><measure number=\"1\"/></part>\
             </score-partwise>",
        )
        .unwrap();

        let out = parse_raw_score(&raw);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind, ParserWarningKind::UnexpectedPartId);
        // The mismatched part's measures are dropped, not fatal.
        assert!(out.score.parts[0].measures.is_empty());
    }

    #[test]
    fn part_names_are_trimmed_and_lowercased() {
        let raw = read_str(
            "<score-partwise>\
               <part-list><score-part id=\"P1\"><part-name> Piano </part-name></score-part></part-list>\
             </score-partwise>",
        )
        .unwrap();

        let out = parse_raw_score(&raw);
        assert_eq!(out.score.parts[0].name, "piano");
    }

    #[test]
    fn reads_ties_and_time_modification() {
        let raw = read_str(
            "<score-partwise>\
               <part-list><score-part id=\"P1\"><part-name>Music</part-name></score-part></part-list>\
               <part id=\"P1\">\
                 <measure number=\"1\">\
                   <note>\
                     <pitch><step>G</step><alter>-1</alter><octave>3</octave></pitch>\
                     <duration>2</duration>\
                     <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>\
                     <notations><tied type=\"start\"/><slur type=\"start\"/></notations>\
                   </note>\
                 </measure>\
               </part>\
             </score-partwise>",
        )
        .unwrap();

        let out = parse_raw_score(&raw);
        let note = match &out.score.parts[0].measures[0].children[0] {
            MeasureChild::Note(n) => n,
            other => panic!("expected note, got {other:?}"),
        };

        assert_eq!(note.ties, vec![TieKind::Start]);
        assert_eq!(
            note.time_modification,
            Some(TimeModification {
                actual_notes: 3.0,
                normal_notes: 2.0
            })
        );
        let pitch = note.pitch.as_ref().unwrap();
        assert_eq!(pitch.step, Step::G);
        assert_eq!(pitch.alter, Some(-1.0));
        assert_eq!(pitch.octave, 3);
    }
}
