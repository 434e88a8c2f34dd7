//! Response-shape decoding.
//!
//! Providers do not agree on where the generated text lives. Each known
//! shape has its own decoder; they are tried in [`DECODERS`] order and the
//! first match wins. When none matches, the sentinel text is returned and a
//! prefix of the raw body is logged.

use draftsmith_shared::NO_CONTENT_SENTINEL;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Characters of an unrecognised response kept in the log.
const RAW_PREVIEW_CHARS: usize = 500;

/// Which response shape produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `candidates[0].content.parts[0].text`
    Candidates,
    /// Top-level `text` or `generated_text`.
    FlatText,
    /// `choices[0].message.content`
    ChatCompletion,
    /// Nothing recognisable; text is the sentinel.
    Unrecognized,
}

/// Text extracted from a generator response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
    pub shape: ResponseShape,
}

impl GeneratedText {
    /// True when no decoder matched.
    pub fn is_sentinel(&self) -> bool {
        self.shape == ResponseShape::Unrecognized
    }
}

#[derive(Debug)]
struct ShapeMismatch(&'static str);

type Decoder = fn(&Value) -> Result<String, ShapeMismatch>;

const DECODERS: [(ResponseShape, Decoder); 3] = [
    (ResponseShape::Candidates, decode_candidates),
    (ResponseShape::FlatText, decode_flat_text),
    (ResponseShape::ChatCompletion, decode_chat_completion),
];

/// Extract generated text from a raw response body. Never fails.
pub fn decode_response(raw: &Value) -> GeneratedText {
    for (shape, decoder) in DECODERS {
        match decoder(raw) {
            Ok(text) => return GeneratedText { text, shape },
            Err(ShapeMismatch(reason)) => debug!(?shape, reason, "decoder did not match"),
        }
    }

    let preview: String = raw.to_string().chars().take(RAW_PREVIEW_CHARS).collect();
    warn!(raw = %preview, "unrecognised generator response shape");

    GeneratedText {
        text: NO_CONTENT_SENTINEL.to_string(),
        shape: ResponseShape::Unrecognized,
    }
}

fn non_empty(value: Option<&Value>, reason: &'static str) -> Result<String, ShapeMismatch> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(ShapeMismatch(reason))
}

fn decode_candidates(raw: &Value) -> Result<String, ShapeMismatch> {
    non_empty(
        raw.pointer("/candidates/0/content/parts/0/text"),
        "no candidates[0].content.parts[0].text",
    )
}

fn decode_flat_text(raw: &Value) -> Result<String, ShapeMismatch> {
    non_empty(raw.get("text"), "no text")
        .or_else(|_| non_empty(raw.get("generated_text"), "no text or generated_text"))
}

fn decode_chat_completion(raw: &Value) -> Result<String, ShapeMismatch> {
    non_empty(
        raw.pointer("/choices/0/message/content"),
        "no choices[0].message.content",
    )
}
