//! Signaling message types for the client-facing WebSocket protocol.
//!
//! The relay understands only a handful of JSON control messages.  Everything
//! else a client sends (SDP offers and answers, ICE candidates, binary blobs)
//! is opaque and forwarded to the paired peer byte for byte.
//!
//! # Message flow
//!
//! ```text
//! Client → Relay:  text/binary frame → Frame → InboundFrame::{Control, Opaque}
//! Relay  → Client: ServerResponse    → {"response": "..."} text frame
//! Close frame:     reason text       → CloseRequest
//! ```
//!
//! # Control shape
//!
//! A text frame is a control message only if it is a JSON object whose
//! `"type"` and `"id"` fields are both strings and whose `"type"` names a
//! known control verb:
//!
//! ```json
//! {"type":"REQUEST_TO_CONNECT","id":"device-1"}
//! ```
//!
//! Anything that does not fit (not JSON, missing fields, wrong field types,
//! unknown verbs) falls back to [`InboundFrame::Opaque`] instead of failing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::identity::ClientId;

/// Control verb asking to be paired with a waiting peer.
pub const REQUEST_TO_CONNECT: &str = "REQUEST_TO_CONNECT";
/// Control verb a client sends when its peer session is finished.
pub const DONE: &str = "DONE";
/// Control verb a client uses when announcing an imminent socket close.
pub const WS_CLOSE: &str = "WS_CLOSE";

/// Reason logged when a close frame carries no usable reason.
pub const REASON_NOT_GIVEN: &str = "Reason not given";

// ── Frames ────────────────────────────────────────────────────────────────────

/// A data frame as it travels through the relay.
///
/// Text stays text and binary stays binary so the receiving peer sees exactly
/// the framing the sender used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `"text"` or `"binary"`, for log lines that must not include payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
        }
    }
}

// ── Inbound classification ────────────────────────────────────────────────────

/// A recognised control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Queue me, or pair me with someone who is already waiting.
    RequestToConnect { id: ClientId },
    /// The peer session is over.  Acknowledged in the log only.
    Done { id: ClientId },
    /// The client is about to close its socket.  Acknowledged in the log only.
    WsClose { id: ClientId },
}

impl ControlMessage {
    /// Short verb name used in log lines.
    pub fn verb(&self) -> &'static str {
        match self {
            ControlMessage::RequestToConnect { .. } => REQUEST_TO_CONNECT,
            ControlMessage::Done { .. } => DONE,
            ControlMessage::WsClose { .. } => WS_CLOSE,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        match self {
            ControlMessage::RequestToConnect { id }
            | ControlMessage::Done { id }
            | ControlMessage::WsClose { id } => id,
        }
    }
}

/// Decodes `text` as `T` only when it is a JSON object.
///
/// serde's derived struct impls also accept a JSON array in field order,
/// which would let `["REQUEST_TO_CONNECT","A"]` pass as a control message.
fn parse_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    let object: Map<String, Value> = serde_json::from_str(text).ok()?;
    serde_json::from_value(Value::Object(object)).ok()
}

/// The wire shape every control message shares.  Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct ControlShape {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

/// An inbound frame after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Control(ControlMessage),
    Opaque(Frame),
}

impl InboundFrame {
    /// Classifies a raw frame.  Never fails: anything that is not a
    /// well-formed control message is returned as [`InboundFrame::Opaque`].
    pub fn classify(frame: Frame) -> InboundFrame {
        let Frame::Text(text) = &frame else {
            return InboundFrame::Opaque(frame);
        };

        let Some(shape) = parse_object::<ControlShape>(text) else {
            return InboundFrame::Opaque(frame);
        };

        let id = ClientId::from(shape.id);
        match shape.kind.as_str() {
            REQUEST_TO_CONNECT => InboundFrame::Control(ControlMessage::RequestToConnect { id }),
            DONE => InboundFrame::Control(ControlMessage::Done { id }),
            WS_CLOSE => InboundFrame::Control(ControlMessage::WsClose { id }),
            _ => InboundFrame::Opaque(frame),
        }
    }
}

// ── Server responses ──────────────────────────────────────────────────────────

/// Status the relay sends back after a `REQUEST_TO_CONNECT`.
///
/// Serialized inside an envelope: `{"response":"SEND_OFFER"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerResponse {
    /// No peer available; the client is now in the waiting pool.
    #[serde(rename = "CONNECTED_TO_WS")]
    Waiting,
    /// A peer was found; the client is the caller and must send the offer.
    #[serde(rename = "SEND_OFFER")]
    SendOffer,
    /// The request could not be honoured (self-pairing, already paired).
    #[serde(rename = "REQUEST_REJECTED")]
    Rejected,
}

/// `{"response": ...}` wrapper around a [`ServerResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub response: ServerResponse,
}

impl ServerResponse {
    /// Encodes the response as the text frame sent to the client.
    pub fn to_frame(self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(&ResponseEnvelope { response: self }).map(Frame::Text)
    }
}

// ── Close requests ────────────────────────────────────────────────────────────

/// Optional JSON payload a client puts in the reason of its close frame.
///
/// ```json
/// {"type":"WS_CLOSE","closeRequestReason":"user left","id":"device-1"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CloseRequest {
    #[serde(rename = "closeRequestReason", default)]
    pub close_request_reason: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl CloseRequest {
    /// Parses a close-frame reason.  Returns `None` for anything that is not
    /// a JSON object, so callers can fall back to the connection scan.
    pub fn parse(payload: &str) -> Option<CloseRequest> {
        parse_object(payload)
    }

    /// The client id carried by the request, if any.
    pub fn client_id(&self) -> Option<ClientId> {
        self.id.clone().map(ClientId::from)
    }

    /// The human-readable reason, or [`REASON_NOT_GIVEN`].
    pub fn reason(&self) -> &str {
        self.close_request_reason.as_deref().unwrap_or(REASON_NOT_GIVEN)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Frame {
        Frame::Text(s.to_string())
    }

    #[test]
    fn test_classify_request_to_connect() {
        let frame = text(r#"{"type":"REQUEST_TO_CONNECT","id":"A"}"#);
        assert_eq!(
            InboundFrame::classify(frame),
            InboundFrame::Control(ControlMessage::RequestToConnect { id: "A".into() })
        );
    }

    #[test]
    fn test_classify_ignores_extra_fields() {
        let frame = text(r#"{"type":"REQUEST_TO_CONNECT","id":"A","closeRequestReason":null}"#);
        assert!(matches!(
            InboundFrame::classify(frame),
            InboundFrame::Control(ControlMessage::RequestToConnect { .. })
        ));
    }

    #[test]
    fn test_classify_done_and_ws_close() {
        assert!(matches!(
            InboundFrame::classify(text(r#"{"type":"DONE","id":"A"}"#)),
            InboundFrame::Control(ControlMessage::Done { .. })
        ));
        assert!(matches!(
            InboundFrame::classify(text(r#"{"type":"WS_CLOSE","id":"A"}"#)),
            InboundFrame::Control(ControlMessage::WsClose { .. })
        ));
    }

    #[test]
    fn test_classify_sdp_offer_is_opaque() {
        // The reference client's offers carry a "type" but no "id".
        let frame = text(r#"{"type":"OFFER","description":"v=0..."}"#);
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
    }

    #[test]
    fn test_classify_missing_id_is_opaque() {
        let frame = text(r#"{"type":"REQUEST_TO_CONNECT"}"#);
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
    }

    #[test]
    fn test_classify_non_string_id_is_opaque() {
        let frame = text(r#"{"type":"REQUEST_TO_CONNECT","id":42}"#);
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
    }

    #[test]
    fn test_classify_unknown_verb_is_opaque() {
        let frame = text(r#"{"type":"ANSWER","id":"A"}"#);
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
    }

    #[test]
    fn test_classify_plain_text_is_opaque() {
        let frame = text("offer-sdp-blob");
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
    }

    #[test]
    fn test_classify_binary_is_always_opaque() {
        // Even a binary frame that happens to contain a control message.
        let frame = Frame::Binary(br#"{"type":"REQUEST_TO_CONNECT","id":"A"}"#.to_vec());
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
    }

    #[test]
    fn test_response_frames_match_wire_format() {
        assert_eq!(
            ServerResponse::Waiting.to_frame().unwrap(),
            text(r#"{"response":"CONNECTED_TO_WS"}"#)
        );
        assert_eq!(
            ServerResponse::SendOffer.to_frame().unwrap(),
            text(r#"{"response":"SEND_OFFER"}"#)
        );
        assert_eq!(
            ServerResponse::Rejected.to_frame().unwrap(),
            text(r#"{"response":"REQUEST_REJECTED"}"#)
        );
    }

    #[test]
    fn test_response_envelope_deserializes() {
        let env: ResponseEnvelope = serde_json::from_str(r#"{"response":"SEND_OFFER"}"#).unwrap();
        assert_eq!(env.response, ServerResponse::SendOffer);
    }

    #[test]
    fn test_waiting_and_rejected_are_distinguishable() {
        assert_ne!(
            ServerResponse::Waiting.to_frame().unwrap(),
            ServerResponse::Rejected.to_frame().unwrap()
        );
    }

    #[test]
    fn test_close_request_with_reason_and_id() {
        let req = CloseRequest::parse(r#"{"closeRequestReason":"bye","id":"A"}"#).unwrap();
        assert_eq!(req.reason(), "bye");
        assert_eq!(req.client_id(), Some(ClientId::from("A")));
    }

    #[test]
    fn test_close_request_without_reason_uses_default() {
        let req = CloseRequest::parse(r#"{"id":"A"}"#).unwrap();
        assert_eq!(req.reason(), REASON_NOT_GIVEN);
    }

    #[test]
    fn test_close_request_garbage_is_none() {
        assert!(CloseRequest::parse("").is_none());
        assert!(CloseRequest::parse("going away").is_none());
    }

    #[test]
    fn test_classify_json_array_is_opaque() {
        // Same values as a control message, but positional.
        let frame = text(r#"["REQUEST_TO_CONNECT","A"]"#);
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));

        let frame = text(r#"["DONE","x"]"#);
        assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
    }

    #[test]
    fn test_classify_json_scalars_are_opaque() {
        for raw in ["null", "42", r#""REQUEST_TO_CONNECT""#] {
            let frame = text(raw);
            assert_eq!(InboundFrame::classify(frame.clone()), InboundFrame::Opaque(frame));
        }
    }

    #[test]
    fn test_close_request_json_array_is_none() {
        assert!(CloseRequest::parse(r#"["bye","A"]"#).is_none());
        assert!(CloseRequest::parse("null").is_none());
    }

    #[test]
    fn test_frame_kind_and_len() {
        assert_eq!(text("abc").kind(), "text");
        assert_eq!(text("abc").len(), 3);
        assert_eq!(Frame::Binary(vec![1, 2]).kind(), "binary");
        assert!(Frame::Binary(Vec::new()).is_empty());
    }
}
