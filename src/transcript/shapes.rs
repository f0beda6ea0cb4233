//! The two known transcript layouts, tried in a fixed order.
//!
//! Flat: `activiteit` containers hold `spreker` elements, which hold `alinea`
//! paragraphs directly.
//!
//! Nested: speech turns (`woordvoerder`, `interrumpant`) wrap a `spreker`
//! descriptor and a `tekst` container of `alinea` paragraphs, whose
//! `alineaitem` children carry the text (inline markup included).
//!
//! In both, `alinea`/`tekst` blocks that sit outside any speaker become
//! procedural segments.

use super::normalize::{normalize_timestamp, RawSegment};
use crate::error::ParseError;
use crate::model::Speaker;
use crate::parser::Element;

const ACTIVITY: &str = "activiteit";
const SPEAKER: &str = "spreker";
const PARAGRAPH: &str = "alinea";
const PARAGRAPH_ITEM: &str = "alineaitem";
const TEXT_BLOCK: &str = "tekst";
const TURNS: &[&str] = &["woordvoerder", "interrumpant"];
const MARK_BEGIN: &str = "markeertijdbegin";
const MARK_END: &str = "markeertijdeind";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Flat,
    Nested,
}

impl Shape {
    pub const PRIORITY: [Shape; 2] = [Shape::Flat, Shape::Nested];

    /// `None` when the layout does not apply to this document.
    pub fn extract(self, root: &Element) -> Option<Vec<RawSegment>> {
        match self {
            Shape::Flat => extract_flat(root),
            Shape::Nested => extract_nested(root),
        }
    }
}

/// Raw segments in document order from the first layout that applies.
///
/// A document that has the containers of a layout but no text yields an
/// empty list; one with neither layout's containers is unrecognized.
pub fn extract_segments(root: &Element) -> Result<(Option<Shape>, Vec<RawSegment>), ParseError> {
    if let Some(found) = Shape::PRIORITY
        .iter()
        .find_map(|shape| shape.extract(root).map(|segments| (Some(*shape), segments)))
    {
        return Ok(found);
    }
    let has_containers = root.is(ACTIVITY)
        || is_turn(root)
        || root.descendants().any(|e| e.is(ACTIVITY) || is_turn(e));
    if has_containers {
        Ok((None, Vec::new()))
    } else {
        Err(ParseError::UnrecognizedLayout)
    }
}

/// Speaker identity: first name + surname, else report name, else display
/// name, else `Unknown`. Party and role are passed through as found.
pub fn resolve_speaker(descriptor: &Element) -> Speaker {
    let full_name = match (descriptor.find_text("voornaam"), descriptor.find_text("achternaam")) {
        (Some(first), Some(last)) => match descriptor.find_text("tussenvoegsel") {
            Some(infix) => Some(format!("{} {} {}", first, infix, last)),
            None => Some(format!("{} {}", first, last)),
        },
        _ => None,
    };
    let name = full_name
        .or_else(|| descriptor.find_text("verslagnaam"))
        .or_else(|| descriptor.find_text("weergavenaam"));

    match name {
        Some(name) => Speaker {
            name,
            party: descriptor.find_text("fractie"),
            role: descriptor.find_text("functie"),
        },
        None => Speaker {
            party: descriptor.find_text("fractie"),
            role: descriptor.find_text("functie"),
            ..Speaker::unknown()
        },
    }
}

fn is_turn(e: &Element) -> bool {
    TURNS.iter().any(|t| e.is(t))
}

fn join_blocks<'a>(blocks: impl Iterator<Item = &'a Element>, text_of: fn(&Element) -> String) -> String {
    blocks
        .map(text_of)
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn timestamp(scope: &Element, name: &str) -> Option<String> {
    normalize_timestamp(scope.find_text(name).as_deref())
}

fn procedural(text: String) -> RawSegment {
    RawSegment {
        speaker: Speaker::procedural(),
        text,
        start_timestamp: None,
        end_timestamp: None,
    }
}

// ── Flat ──

fn extract_flat(root: &Element) -> Option<Vec<RawSegment>> {
    let mut out = Vec::new();
    if root.is(ACTIVITY) {
        walk_activity(root, &mut out);
    } else {
        visit_outermost_activities(root, &mut out);
    }
    // Procedural text alone does not make the layout apply.
    let attributed = out
        .iter()
        .any(|s| s.speaker != Speaker::procedural() && !s.text.trim().is_empty());
    attributed.then_some(out)
}

fn visit_outermost_activities(el: &Element, out: &mut Vec<RawSegment>) {
    for child in el.elements() {
        if child.is(ACTIVITY) {
            walk_activity(child, out);
        } else {
            visit_outermost_activities(child, out);
        }
    }
}

fn walk_activity(el: &Element, out: &mut Vec<RawSegment>) {
    for child in el.elements() {
        if child.is(SPEAKER) {
            out.push(RawSegment {
                speaker: resolve_speaker(child),
                text: join_blocks(child.find_all(PARAGRAPH), |p| p.deep_text()),
                start_timestamp: timestamp(child, MARK_BEGIN),
                end_timestamp: timestamp(child, MARK_END),
            });
        } else if child.is(PARAGRAPH) {
            out.push(procedural(child.deep_text()));
        } else if !is_turn(child) {
            walk_activity(child, out);
        }
    }
}

// ── Nested ──

fn extract_nested(root: &Element) -> Option<Vec<RawSegment>> {
    let mut out = Vec::new();
    let mut turns = 0usize;
    visit_nested(root, &mut out, &mut turns);
    (turns > 0).then_some(out)
}

fn visit_nested(el: &Element, out: &mut Vec<RawSegment>, turns: &mut usize) {
    if is_turn(el) {
        *turns += 1;
        out.push(turn_segment(el));
        // Interruptions nested inside this turn come after it.
        for child in el.elements().filter(|c| !c.is(SPEAKER) && !c.is(TEXT_BLOCK)) {
            visit_nested(child, out, turns);
        }
    } else if el.is(TEXT_BLOCK) {
        out.push(procedural(text_block(el)));
    } else {
        for child in el.elements() {
            visit_nested(child, out, turns);
        }
    }
}

fn turn_segment(turn: &Element) -> RawSegment {
    let speaker = turn
        .child(SPEAKER)
        .map(resolve_speaker)
        .unwrap_or_else(Speaker::unknown);
    let text = join_blocks(turn.elements().filter(|c| c.is(TEXT_BLOCK)), text_block);
    RawSegment {
        speaker,
        text,
        start_timestamp: own_timestamp(turn, MARK_BEGIN),
        end_timestamp: own_timestamp(turn, MARK_END),
    }
}

/// A `tekst` block's paragraphs; each paragraph is its items' full text, or
/// its own text when it has no items.
fn text_block(block: &Element) -> String {
    join_blocks(block.find_all(PARAGRAPH), |p| {
        if p.find(PARAGRAPH_ITEM).is_some() {
            join_blocks(p.find_all(PARAGRAPH_ITEM), |i| i.deep_text())
        } else {
            p.deep_text()
        }
    })
}

/// Timestamp belonging to this turn, not to a turn nested inside it.
fn own_timestamp(turn: &Element, name: &str) -> Option<String> {
    fn search<'a>(el: &'a Element, name: &str) -> Option<&'a Element> {
        for child in el.elements() {
            if child.is(name) {
                return Some(child);
            }
            if is_turn(child) {
                continue;
            }
            if let Some(found) = search(child, name) {
                return Some(found);
            }
        }
        None
    }
    let raw = search(turn, name)?.deep_text();
    normalize_timestamp(Some(&raw))
}
