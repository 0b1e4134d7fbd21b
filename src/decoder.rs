//! Structured reply decoder
//!
//! Models are prompted to answer as `topic:<T>: body:<B>: emotion:<E>:`, but
//! the output drifts: markers change case, fields go missing, values carry
//! their own colons. `decode` recovers what it can and always yields a body.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

#[cfg(test)]
mod proptests;

/// Emotion classification attached to an assistant reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Emotion {
    Green,
    Blue,
    Red,
}

impl Emotion {
    pub const ALL: [Emotion; 3] = [Emotion::Green, Emotion::Blue, Emotion::Red];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Green => "GREEN",
            Emotion::Blue => "BLUE",
            Emotion::Red => "RED",
        }
    }

    /// Match an already-normalized (uppercase, letters-only) token
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "GREEN" => Some(Emotion::Green),
            "BLUE" => Some(Emotion::Blue),
            "RED" => Some(Emotion::Red),
            _ => None,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields recovered from one raw reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedReply {
    pub topic: Option<String>,
    pub body: String,
    pub emotion: Option<Emotion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Topic,
    Body,
    Emotion,
}

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(topic|body|emotion):").expect("marker regex is valid"));

static QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*question:\s*").expect("question regex is valid"));

/// A located marker; `value_start` is the byte just past its colon
#[derive(Debug, Clone, Copy)]
struct Marker {
    field: Field,
    value_start: usize,
}

/// Decode a raw model reply. Total: every input yields at least a body.
pub fn decode(raw: &str) -> DecodedReply {
    let markers = locate_markers(raw);

    let topic = field_value(raw, &markers, Field::Topic)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let emotion = markers
        .get(Field::Emotion)
        .and_then(|m| raw.get(m.value_start..))
        .and_then(emotion_from_token)
        .or_else(|| emotion_from_scan(raw));

    let body = match field_value(raw, &markers, Field::Body) {
        Some(value) => strip_question_label(value.trim()),
        None => strip_question_label(raw.trim()),
    };
    let body = if body.is_empty() || body == raw || body == raw.trim() {
        strip_question_label(raw.trim())
    } else {
        body
    };

    DecodedReply {
        topic,
        body,
        emotion,
    }
}

/// Every marker occurrence found in the text
struct Markers {
    /// First occurrence of each field, in text order
    first: Vec<Marker>,
    /// Start offsets of all occurrences, repeats included
    starts: Vec<usize>,
}

impl Markers {
    fn get(&self, field: Field) -> Option<&Marker> {
        self.first.iter().find(|m| m.field == field)
    }
}

fn locate_markers(raw: &str) -> Markers {
    let mut first: Vec<Marker> = Vec::with_capacity(3);
    let mut starts = Vec::new();
    for caps in MARKER_RE.captures_iter(raw) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let field = match name.as_str().to_ascii_lowercase().as_str() {
            "topic" => Field::Topic,
            "body" => Field::Body,
            _ => Field::Emotion,
        };
        starts.push(whole.start());
        if first.iter().any(|m| m.field == field) {
            continue;
        }
        first.push(Marker {
            field,
            value_start: whole.end(),
        });
    }
    Markers { first, starts }
}

/// Raw value of a field: from past its marker up to the next later marker,
/// cut at the last colon when the span holds any.
fn field_value<'a>(raw: &'a str, markers: &Markers, field: Field) -> Option<&'a str> {
    let marker = markers.get(field)?;
    let end = markers
        .starts
        .iter()
        .copied()
        .filter(|&start| start >= marker.value_start)
        .min()
        .unwrap_or(raw.len());
    let span = raw.get(marker.value_start..end)?;
    Some(match span.rfind(':') {
        Some(last_colon) => span.get(..last_colon).unwrap_or(span),
        None => span,
    })
}

/// First whitespace/colon-delimited token, normalized and matched
fn emotion_from_token(after_marker: &str) -> Option<Emotion> {
    let token = after_marker
        .split(|c: char| c.is_whitespace() || c == ':')
        .find(|t| !t.is_empty())?;
    let normalized: String = token
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    Emotion::from_token(&normalized)
}

/// Fallback: exactly one emotion word anywhere in the text. Two or more is
/// ambiguous and leaves the emotion unset.
fn emotion_from_scan(raw: &str) -> Option<Emotion> {
    let lowered = raw.to_lowercase();
    let mut present = Emotion::ALL
        .into_iter()
        .filter(|e| lowered.contains(&e.as_str().to_ascii_lowercase()));
    match (present.next(), present.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn strip_question_label(text: &str) -> String {
    QUESTION_RE.replace(text, "").trim_end().to_string()
}
