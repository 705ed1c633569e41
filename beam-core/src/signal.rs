//! Rendezvous messages: JSON text with a kebab-case `type` discriminator.
//!
//! Negotiation payloads (`offer`, `answer`, `candidate`) are never
//! interpreted; they are kept as raw JSON and forwarded byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::code::RoomCode;
use crate::session::Role;

/// Pre-transfer advisory sent through the relay. The authoritative metadata
/// travels over the direct channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAdvisory {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
}

/// Client -> relay.
#[derive(Debug)]
pub enum ClientMessage {
    CreateRoom,
    JoinRoom { code: RoomCode },
    Offer(Box<RawValue>),
    Answer(Box<RawValue>),
    IceCandidate(Box<RawValue>),
    /// Advisory plus the exact text received, which is what gets relayed.
    FileMeta { advisory: FileAdvisory, raw: String },
    SessionEnded,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom => "create-room",
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::IceCandidate(_) => "ice-candidate",
            ClientMessage::FileMeta { .. } => "file-meta",
            ClientMessage::SessionEnded => "session-ended",
        }
    }
}

/// Relay -> client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    RoomCreated { code: RoomCode },
    RoomJoined { code: RoomCode },
    PeerJoined {},
    Offer { offer: Box<RawValue> },
    Answer { answer: Box<RawValue> },
    IceCandidate { candidate: Box<RawValue> },
    SessionEnded { message: String },
    PeerDisconnected { message: String, role: Role },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Invalid message format")]
    Malformed(#[source] serde_json::Error),
    #[error("Binary messages are not supported")]
    Binary,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Browsers may send the code as typed text or as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum CodeField {
    Text(String),
    Number(u64),
}

#[derive(Deserialize)]
struct JoinBody {
    code: CodeField,
}

#[derive(Deserialize)]
struct OfferBody {
    offer: Box<RawValue>,
}

#[derive(Deserialize)]
struct AnswerBody {
    answer: Box<RawValue>,
}

#[derive(Deserialize)]
struct CandidateBody {
    candidate: Box<RawValue>,
}

fn body<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, SignalError> {
    serde_json::from_str(text).map_err(SignalError::Malformed)
}

/// Parse one client message. `Ok(None)` for a well-formed message of an
/// unknown type, which callers ignore.
pub fn parse_client_message(text: &str) -> Result<Option<ClientMessage>, SignalError> {
    let envelope: Envelope = body(text)?;
    let msg = match envelope.kind.as_str() {
        "create-room" => ClientMessage::CreateRoom,
        "join-room" => {
            let JoinBody { code } = body(text)?;
            let code = match code {
                CodeField::Text(s) => RoomCode::new(s.trim()),
                CodeField::Number(n) => RoomCode::new(n.to_string()),
            };
            ClientMessage::JoinRoom { code }
        }
        "offer" => ClientMessage::Offer(body::<OfferBody>(text)?.offer),
        "answer" => ClientMessage::Answer(body::<AnswerBody>(text)?.answer),
        "ice-candidate" => ClientMessage::IceCandidate(body::<CandidateBody>(text)?.candidate),
        "file-meta" => ClientMessage::FileMeta {
            advisory: body(text)?,
            raw: text.to_owned(),
        },
        "session-ended" => ClientMessage::SessionEnded,
        _ => return Ok(None),
    };
    Ok(Some(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn parse_room_requests() {
        let msg = parse_client_message(r#"{"type":"create-room"}"#).unwrap().unwrap();
        assert!(matches!(msg, ClientMessage::CreateRoom));

        let msg = parse_client_message(r#"{"type":"join-room","code":"4821"}"#)
            .unwrap()
            .unwrap();
        match msg {
            ClientMessage::JoinRoom { code } => assert_eq!(code.as_str(), "4821"),
            other => panic!("expected JoinRoom, got {other:?}"),
        }

        let msg = parse_client_message(r#"{"type":"join-room","code":4821}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(msg, ClientMessage::JoinRoom { code } if code.as_str() == "4821"));
    }

    #[test]
    fn offer_payload_is_kept_verbatim() {
        let text = r#"{"type":"offer","offer":{"sdp":"v=0\r\n","type":"offer",  "z":1}}"#;
        match parse_client_message(text).unwrap().unwrap() {
            ClientMessage::Offer(raw) => {
                assert_eq!(raw.get(), r#"{"sdp":"v=0\r\n","type":"offer",  "z":1}"#)
            }
            other => panic!("expected Offer, got {other:?}"),
        }
    }

    #[test]
    fn file_meta_keeps_raw_text() {
        let text = r#"{"type":"file-meta","fileName":"a.txt","fileSize":40,"fileType":"text/plain"}"#;
        match parse_client_message(text).unwrap().unwrap() {
            ClientMessage::FileMeta { advisory, raw } => {
                assert_eq!(advisory.file_name, "a.txt");
                assert_eq!(advisory.file_size, 40);
                assert_eq!(raw, text);
            }
            other => panic!("expected FileMeta, got {other:?}"),
        }
    }

    #[test]
    fn malformed_and_unknown() {
        assert!(matches!(
            parse_client_message("not json"),
            Err(SignalError::Malformed(_))
        ));
        assert!(matches!(
            parse_client_message(r#"{"code":"4821"}"#),
            Err(SignalError::Malformed(_))
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"join-room"}"#),
            Err(SignalError::Malformed(_))
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"offer"}"#),
            Err(SignalError::Malformed(_))
        ));
        assert!(parse_client_message(r#"{"type":"chat","text":"hi"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn server_messages_are_tagged() {
        let text = ServerMessage::RoomCreated {
            code: RoomCode::new("4821"),
        }
        .to_text()
        .unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v, json!({"type": "room-created", "code": "4821"}));

        let text = ServerMessage::PeerJoined {}.to_text().unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v, json!({"type": "peer-joined"}));

        let text = ServerMessage::PeerDisconnected {
            message: "Peer disconnected".into(),
            role: Role::Responder,
        }
        .to_text()
        .unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "peer-disconnected");
        assert_eq!(v["role"], "responder");
    }

    #[test]
    fn relayed_candidate_is_byte_identical() {
        let payload = r#"{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host","sdpMid":"0"}"#;
        let raw = RawValue::from_string(payload.to_owned()).unwrap();
        let text = ServerMessage::IceCandidate { candidate: raw }.to_text().unwrap();
        assert_eq!(text, format!(r#"{{"type":"ice-candidate","candidate":{payload}}}"#));
    }
}
