//! Scripted stub transports for driving sessions without a network
//!
//! The stubs react to what the session sends the way a minimal server
//! would: an AUTH triggers the scripted verdict plus the SDP offer, a READY
//! triggers the server READY and CONNECTED, and the peer stub opens every
//! channel once the answer has been produced. Tests pick a [`Behavior`]
//! per endpoint and inspect the recorded traffic afterwards.

use bytes::Bytes;
use peerlink_client::peer::{
    DataChannelId, DataChannelInit, IceCandidate, PeerConnection, PeerError, PeerEvent,
    SessionDescription,
};
use peerlink_client::signaling::{SignalingError, SignalingEvent, SignalingTransport};
use peerlink_client::socket::{ClientError, Connector};
use peerlink_protocol::payload::Payload;
use peerlink_protocol::system::SystemMessage;
use peerlink_protocol::token::{KEY_SIZE, NONCE_SIZE, PRIVATE_DATA_SIZE, TOKEN_SIZE};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;

/// How a scripted endpoint treats the connecting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Accept the handshake and drive it to CONNECTED.
    Accept {
        session_id: u64,
        server_time: u64,
    },
    /// Accept the AUTH but announce CONNECTED immediately, before any
    /// offer or channel can open, then go quiet.
    PrematureConnected {
        session_id: u64,
        server_time: u64,
    },
    /// Reject the AUTH.
    Deny,
    /// Never answer anything, leaving the client to its timeout.
    Silent,
    /// Close signaling as soon as it opens.
    CloseOnOpen,
}

/// Traffic recorded by one endpoint's stubs.
#[derive(Default)]
pub struct EndpointLog {
    /// Frames the client sent over signaling.
    pub signaling_sent: Vec<String>,
    /// Payloads the client sent per data channel.
    pub channel_sent: Vec<(DataChannelId, Vec<u8>)>,
    /// Labels the client created channels with.
    pub channels_created: Vec<String>,
}

pub type SharedLog = Rc<RefCell<EndpointLog>>;

/// Scripted signaling transport.
pub struct StubSignaling {
    behavior: Behavior,
    log: SharedLog,
    pending: VecDeque<SignalingEvent>,
    closed: bool,
}

impl StubSignaling {
    pub fn new(behavior: Behavior, log: SharedLog) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(SignalingEvent::Opened);
        if behavior == Behavior::CloseOnOpen {
            pending.push_back(SignalingEvent::Closed);
        }
        StubSignaling {
            behavior,
            log,
            pending,
            closed: false,
        }
    }
}

impl SignalingTransport for StubSignaling {
    fn send(&mut self, frame: &str) -> Result<(), SignalingError> {
        if self.closed {
            return Err(SignalingError::Closed);
        }
        self.log.borrow_mut().signaling_sent.push(frame.to_owned());

        if let Some(rest) = frame.strip_prefix("AUTH|") {
            assert!(!rest.is_empty(), "AUTH frame without token");
            match self.behavior {
                Behavior::Accept {
                    session_id,
                    server_time,
                } => {
                    self.pending.push_back(SignalingEvent::Frame(format!(
                        "AUTH|OK|{session_id}|{server_time}"
                    )));
                    self.pending.push_back(SignalingEvent::Frame(
                        "DESC|offer|v=0\r\ns=stub".to_owned(),
                    ));
                    self.pending.push_back(SignalingEvent::Frame(
                        "CAND|0|candidate:1 1 udp 1 198.51.100.1 40000 typ host".to_owned(),
                    ));
                }
                Behavior::PrematureConnected {
                    session_id,
                    server_time,
                } => {
                    self.pending.push_back(SignalingEvent::Frame(format!(
                        "AUTH|OK|{session_id}|{server_time}"
                    )));
                    self.pending
                        .push_back(SignalingEvent::Frame("CONNECTED".to_owned()));
                }
                Behavior::Deny => {
                    self.pending
                        .push_back(SignalingEvent::Frame("AUTH|DENIED".to_owned()));
                }
                Behavior::Silent | Behavior::CloseOnOpen => {}
            }
        } else if frame == "READY" {
            if matches!(self.behavior, Behavior::Accept { .. }) {
                self.pending
                    .push_back(SignalingEvent::Frame("READY".to_owned()));
                self.pending
                    .push_back(SignalingEvent::Frame("CONNECTED".to_owned()));
                // A duplicate the session must ignore.
                self.pending
                    .push_back(SignalingEvent::Frame("CONNECTED".to_owned()));
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<SignalingEvent> {
        self.pending.pop_front()
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}

/// Scripted peer connection.
pub struct StubPeer {
    log: SharedLog,
    next_id: DataChannelId,
    outgoing: Vec<(DataChannelId, String)>,
    system_id: Option<DataChannelId>,
    pending: VecDeque<PeerEvent>,
    /// Answer pings on the system channel with pongs.
    pub echo_pongs: bool,
    server_time: u64,
    closed: bool,
}

impl StubPeer {
    pub fn new(log: SharedLog, server_time: u64) -> Self {
        StubPeer {
            log,
            next_id: 1,
            outgoing: Vec::new(),
            system_id: None,
            pending: VecDeque::new(),
            echo_pongs: true,
            server_time,
            closed: false,
        }
    }

    fn allocate(&mut self) -> DataChannelId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl PeerConnection for StubPeer {
    fn create_data_channel(
        &mut self,
        label: &str,
        _init: DataChannelInit,
    ) -> Result<DataChannelId, PeerError> {
        if self.closed {
            return Err(PeerError::Closed);
        }
        let id = self.allocate();
        self.outgoing.push((id, label.to_owned()));
        self.log.borrow_mut().channels_created.push(label.to_owned());
        Ok(id)
    }

    fn set_remote_description(
        &mut self,
        description: &SessionDescription,
    ) -> Result<(), PeerError> {
        if description.kind != "offer" {
            return Err(PeerError::Negotiation(format!(
                "unexpected description type {}",
                description.kind
            )));
        }
        Ok(())
    }

    fn create_answer(&mut self) -> Result<SessionDescription, PeerError> {
        // Once the answer exists the stub "negotiates" instantly: every
        // outgoing channel opens, the server-side halves appear, and the
        // system channel arrives last.
        let outgoing = self.outgoing.clone();
        for (id, label) in &outgoing {
            self.pending.push_back(PeerEvent::ChannelOpened {
                id: *id,
                label: label.clone(),
            });
        }
        let mut server_halves = Vec::new();
        for index in 0..outgoing.len() {
            let id = self.allocate();
            server_halves.push(id);
            self.pending.push_back(PeerEvent::ChannelOpened {
                id,
                label: format!("server-channel-{index}"),
            });
        }
        let system = self.allocate();
        self.system_id = Some(system);
        self.pending.push_back(PeerEvent::ChannelOpened {
            id: system,
            label: "system".to_owned(),
        });
        self.pending
            .push_back(PeerEvent::LocalCandidate(IceCandidate {
                mid: "0".to_owned(),
                candidate: "candidate:2 1 udp 2 203.0.113.9 40001 typ host".to_owned(),
            }));

        // Greet the client on the first channel so the receive path has
        // traffic without a real server.
        if let Some(&first) = server_halves.first() {
            self.pending.push_back(PeerEvent::ChannelData {
                id: first,
                data: Bytes::from_static(b"hello from server"),
            });
        }

        Ok(SessionDescription {
            kind: "answer".to_owned(),
            sdp: "v=0\r\ns=stub-answer".to_owned(),
        })
    }

    fn add_ice_candidate(&mut self, _candidate: &IceCandidate) -> Result<(), PeerError> {
        Ok(())
    }

    fn send(&mut self, id: DataChannelId, data: &[u8]) -> Result<(), PeerError> {
        if self.closed {
            return Err(PeerError::Closed);
        }
        self.log.borrow_mut().channel_sent.push((id, data.to_vec()));

        if self.echo_pongs && self.system_id == Some(id) {
            if let Ok(SystemMessage::Ping { sequence }) = SystemMessage::decode(data) {
                let pong = SystemMessage::Pong {
                    sequence,
                    server_time: self.server_time,
                };
                let mut payload = Payload::new(32);
                pong.encode(&mut payload).expect("pong encode");
                self.pending.push_back(PeerEvent::ChannelData {
                    id,
                    data: Bytes::copy_from_slice(payload.pack()),
                });
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<PeerEvent> {
        self.pending.pop_front()
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}

/// Attempt logs shared between a moved-in connector and the test body.
pub type SharedLogs = Rc<RefCell<Vec<SharedLog>>>;

/// Connector handing out one scripted endpoint per connect attempt.
pub struct ScriptedConnector {
    scripts: VecDeque<Behavior>,
    logs: SharedLogs,
    server_time: u64,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Behavior>) -> Self {
        ScriptedConnector {
            scripts: scripts.into(),
            logs: Rc::new(RefCell::new(Vec::new())),
            server_time: 1_000_000_000,
        }
    }

    /// Handle to the per-attempt logs; keep a clone before moving the
    /// connector into the socket.
    pub fn logs(&self) -> SharedLogs {
        Rc::clone(&self.logs)
    }
}

impl Connector for ScriptedConnector {
    fn open_signaling(
        &mut self,
        _address: &SocketAddr,
    ) -> Result<Box<dyn SignalingTransport>, ClientError> {
        let behavior = self
            .scripts
            .pop_front()
            .ok_or_else(|| ClientError::Transport("no scripted endpoint left".to_owned()))?;
        let log: SharedLog = Rc::new(RefCell::new(EndpointLog::default()));
        self.logs.borrow_mut().push(Rc::clone(&log));
        Ok(Box::new(StubSignaling::new(behavior, log)))
    }

    fn open_peer_connection(&mut self) -> Result<Box<dyn PeerConnection>, ClientError> {
        let log = self
            .logs
            .borrow()
            .last()
            .map(Rc::clone)
            .unwrap_or_else(|| Rc::new(RefCell::new(EndpointLog::default())));
        Ok(Box::new(StubPeer::new(log, self.server_time)))
    }
}

/// Build a raw connect token for tests.
pub fn build_token(
    version: &str,
    protocol_id: u64,
    timeout_seconds: i32,
    addresses: &[SocketAddr],
) -> Vec<u8> {
    let mut payload = Payload::new(TOKEN_SIZE);
    payload.write_string(version).unwrap();
    payload.write_u64(protocol_id).unwrap();
    payload.write_u64(1_700_000_000).unwrap();
    payload.write_u64(1_700_000_600).unwrap();
    payload.write_bytes(&[0xAA; NONCE_SIZE]).unwrap();
    payload.write_bytes(&[0xBB; PRIVATE_DATA_SIZE]).unwrap();
    payload.write_i32(timeout_seconds).unwrap();
    payload.write_u32(addresses.len() as u32).unwrap();
    for address in addresses {
        match address {
            SocketAddr::V4(v4) => {
                payload.write_u8(1).unwrap();
                payload.write_bytes(&v4.ip().octets()).unwrap();
                payload.write_u16(v4.port()).unwrap();
            }
            SocketAddr::V6(v6) => {
                payload.write_u8(2).unwrap();
                for group in v6.ip().segments() {
                    payload.write_u16(group).unwrap();
                }
                payload.write_u16(v6.port()).unwrap();
            }
        }
    }
    payload.write_bytes(&[0xCC; KEY_SIZE]).unwrap();
    payload.write_bytes(&[0xDD; KEY_SIZE]).unwrap();

    let mut bytes = payload.pack().to_vec();
    bytes.resize(TOKEN_SIZE, 0);
    bytes
}

/// Convenience: a one-endpoint token.
pub fn single_endpoint_token(timeout_seconds: i32) -> Vec<u8> {
    build_token(
        "netcode 1.02",
        1,
        timeout_seconds,
        &["127.0.0.1:8889".parse().unwrap()],
    )
}
