//! Signaling frame grammar and transport interface
//!
//! Signaling frames are UTF-8 text with `|`-separated fields. The client
//! sends `AUTH`, `DESC`, `CAND` and `READY`; the server answers with the
//! same grammar plus the `AUTH|OK` acceptance and the final `CONNECTED`.
//! Frames that do not parse are dropped by the session (benign version
//! skew tolerates unknown traffic), so the parser returns `Option` rather
//! than an error for unrecognized shapes.

use crate::peer::{IceCandidate, SessionDescription};
use thiserror::Error;

/// Signaling transport errors
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("signaling transport is closed")]
    Closed,

    #[error("signaling send failed: {0}")]
    Send(String),
}

/// Completions delivered from the signaling transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// The transport finished connecting and frames may be sent.
    Opened,
    /// A complete text frame arrived.
    Frame(String),
    /// The transport closed (either side, or failure).
    Closed,
}

/// Driver interface over the out-of-scope signaling transport.
///
/// The transport is a bidirectional, ordered, text-framed channel; events
/// are pull-based in arrival order, like [`crate::peer::PeerConnection`].
pub trait SignalingTransport {
    /// Send one text frame.
    fn send(&mut self, frame: &str) -> Result<(), SignalingError>;

    /// Next pending completion, in arrival order.
    fn poll_event(&mut self) -> Option<SignalingEvent>;

    /// Close the transport. Idempotent.
    fn close(&mut self);
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame<'a> {
    Auth { token_base64: &'a str },
    Description(&'a SessionDescription),
    Candidate(&'a IceCandidate),
    Ready,
}

impl ClientFrame<'_> {
    /// Wire form of the frame.
    pub fn encode(&self) -> String {
        match self {
            ClientFrame::Auth { token_base64 } => format!("AUTH|{token_base64}"),
            ClientFrame::Description(description) => {
                format!("DESC|{}|{}", description.kind, description.sdp)
            }
            ClientFrame::Candidate(candidate) => {
                format!("CAND|{}|{}", candidate.mid, candidate.candidate)
            }
            ClientFrame::Ready => "READY".to_owned(),
        }
    }
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Authentication accepted: assigned session id and the peer clock.
    AuthOk { session_id: u64, server_time: u64 },
    /// Any non-OK authentication response.
    AuthDenied { reason: String },
    Description(SessionDescription),
    Candidate(IceCandidate),
    Ready,
    Connected,
}

impl ServerFrame {
    /// Parse a server frame; `None` for anything outside the grammar.
    ///
    /// A malformed `AUTH|OK` (bad numerics, missing fields) parses as a
    /// denial: the handshake cannot proceed and must surface a result
    /// instead of stalling.
    pub fn parse(frame: &str) -> Option<ServerFrame> {
        let (tag, rest) = match frame.split_once('|') {
            Some((tag, rest)) => (tag, Some(rest)),
            None => (frame, None),
        };

        match (tag, rest) {
            ("AUTH", Some(rest)) => Some(parse_auth(rest)),
            ("DESC", Some(rest)) => {
                let (kind, sdp) = rest.split_once('|')?;
                Some(ServerFrame::Description(SessionDescription {
                    kind: kind.to_owned(),
                    sdp: sdp.to_owned(),
                }))
            }
            ("CAND", Some(rest)) => {
                let (mid, candidate) = rest.split_once('|')?;
                Some(ServerFrame::Candidate(IceCandidate {
                    mid: mid.to_owned(),
                    candidate: candidate.to_owned(),
                }))
            }
            ("READY", None) => Some(ServerFrame::Ready),
            ("CONNECTED", None) => Some(ServerFrame::Connected),
            _ => None,
        }
    }
}

fn parse_auth(rest: &str) -> ServerFrame {
    let mut fields = rest.split('|');
    let verdict = fields.next().unwrap_or_default();
    if verdict != "OK" {
        return ServerFrame::AuthDenied {
            reason: verdict.to_owned(),
        };
    }

    let id = fields.next().and_then(|field| field.parse::<u64>().ok());
    let time = fields.next().and_then(|field| field.parse::<u64>().ok());
    match (id, time) {
        (Some(session_id), Some(server_time)) => ServerFrame::AuthOk {
            session_id,
            server_time,
        },
        _ => ServerFrame::AuthDenied {
            reason: "OK".to_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_encoding() {
        assert_eq!(
            ClientFrame::Auth { token_base64: "abc=" }.encode(),
            "AUTH|abc="
        );
        let description = SessionDescription {
            kind: "answer".into(),
            sdp: "v=0\r\no=-".into(),
        };
        assert_eq!(
            ClientFrame::Description(&description).encode(),
            "DESC|answer|v=0\r\no=-"
        );
        let candidate = IceCandidate {
            mid: "0".into(),
            candidate: "candidate:1 1 udp".into(),
        };
        assert_eq!(
            ClientFrame::Candidate(&candidate).encode(),
            "CAND|0|candidate:1 1 udp"
        );
        assert_eq!(ClientFrame::Ready.encode(), "READY");
    }

    #[test]
    fn test_parse_auth_ok() {
        assert_eq!(
            ServerFrame::parse("AUTH|OK|42|1000000000"),
            Some(ServerFrame::AuthOk {
                session_id: 42,
                server_time: 1_000_000_000
            })
        );
    }

    #[test]
    fn test_parse_auth_denial() {
        assert_eq!(
            ServerFrame::parse("AUTH|EXPIRED"),
            Some(ServerFrame::AuthDenied {
                reason: "EXPIRED".into()
            })
        );
    }

    #[test]
    fn test_malformed_auth_ok_is_denial() {
        assert!(matches!(
            ServerFrame::parse("AUTH|OK|notanumber|1"),
            Some(ServerFrame::AuthDenied { .. })
        ));
        assert!(matches!(
            ServerFrame::parse("AUTH|OK|42"),
            Some(ServerFrame::AuthDenied { .. })
        ));
    }

    #[test]
    fn test_parse_description_keeps_separators_in_sdp() {
        let parsed = ServerFrame::parse("DESC|offer|v=0\r\na=x|y");
        assert_eq!(
            parsed,
            Some(ServerFrame::Description(SessionDescription {
                kind: "offer".into(),
                sdp: "v=0\r\na=x|y".into(),
            }))
        );
    }

    #[test]
    fn test_parse_terminal_frames() {
        assert_eq!(ServerFrame::parse("READY"), Some(ServerFrame::Ready));
        assert_eq!(ServerFrame::parse("CONNECTED"), Some(ServerFrame::Connected));
    }

    #[test]
    fn test_unknown_shapes_dropped() {
        assert_eq!(ServerFrame::parse(""), None);
        assert_eq!(ServerFrame::parse("NOPE|x"), None);
        assert_eq!(ServerFrame::parse("DESC|missing-sdp"), None);
        assert_eq!(ServerFrame::parse("READY|extra"), None);
    }
}
