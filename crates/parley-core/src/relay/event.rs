//! Outbound event framing.
//!
//! Every relay event becomes one line-delimited frame:
//!
//! ```text
//! data: {"type":"content","content":"<text fragment>"}\n\n
//! data: {"type":"reasoning","content":"<text fragment>"}\n\n
//! ```
//!
//! There is no terminal frame; the end of the turn is the end of the
//! connection.

use serde::Deserialize;

const FRAME_PREFIX: &str = "data: ";
const FRAME_SUFFIX: &str = "\n\n";

/// One outbound event of a relayed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A fragment of the visible answer.
    Content(String),
    /// A fragment of the reasoning trace.
    Reasoning(String),
}

impl RelayEvent {
    /// Wire tag of the event's channel.
    pub fn channel(&self) -> &'static str {
        match self {
            RelayEvent::Content(_) => "content",
            RelayEvent::Reasoning(_) => "reasoning",
        }
    }

    /// The text fragment carried by the event.
    pub fn text(&self) -> &str {
        match self {
            RelayEvent::Content(text) | RelayEvent::Reasoning(text) => text,
        }
    }

    /// Encode the event as one wire frame.
    ///
    /// The fragment is written as a JSON string literal, so newlines, quotes
    /// and braces in model output are escaped rather than spliced into the
    /// frame. The same event always yields the same bytes.
    pub fn encode(&self) -> Vec<u8> {
        let content = serde_json::Value::String(self.text().to_owned());
        format!(
            r#"{FRAME_PREFIX}{{"type":"{}","content":{content}}}{FRAME_SUFFIX}"#,
            self.channel()
        )
        .into_bytes()
    }

    /// Decode a single frame produced by [`RelayEvent::encode`].
    ///
    /// Accepts the frame with or without its trailing blank line. Returns
    /// `None` for anything that is not a well-formed content or reasoning frame.
    pub fn decode(frame: &str) -> Option<RelayEvent> {
        let payload = frame.trim_end_matches('\n').strip_prefix(FRAME_PREFIX)?;
        let wire: WireFrame = serde_json::from_str(payload).ok()?;
        match wire.kind.as_str() {
            "content" => Some(RelayEvent::Content(wire.content)),
            "reasoning" => Some(RelayEvent::Reasoning(wire.content)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: String,
    content: String,
}

/// Split a raw event-stream body into its decoded events.
///
/// Malformed frames are skipped.
pub fn decode_frames(body: &str) -> Vec<RelayEvent> {
    body.split(FRAME_SUFFIX)
        .filter(|frame| !frame.is_empty())
        .filter_map(RelayEvent::decode)
        .collect()
}
