//! Session state machine
//!
//! One session drives one endpoint attempt: the signaling handshake, the
//! out-of-band peer-connection negotiation, channel readiness, the periodic
//! system ping, and teardown. Everything runs on the caller's task; inbound
//! completions are pulled from the two transports by [`Session::pump`] and
//! processed in arrival order.
//!
//! State flow:
//!
//! ```text
//! Init --signaling open/AUTH--> Signaling --AUTH|OK--> Negotiating
//!      --all N+1 channels open--> ReadyWait --CONNECTED--> Connected
//! any state --close/timeout/denial--> Closed (idempotent)
//! ```

use crate::channel::{outgoing_label, Channel, ChannelMode, SYSTEM_CHANNEL_LABEL};
use crate::peer::{DataChannelId, PeerConnection, PeerEvent};
use crate::signal::Signal;
use crate::signaling::{ClientFrame, ServerFrame, SignalingEvent, SignalingTransport};
use crate::stats::SharedStatistic;
use crate::time::{now_ns, Deadline, Timer};
use bytes::Bytes;
use peerlink_protocol::payload::Payload;
use peerlink_protocol::sampling::SampleStats;
use peerlink_protocol::system::{SystemMessage, MAX_SYSTEM_MESSAGE_SIZE};
use peerlink_protocol::{Clock, RttCalculator};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Terminal outcome of one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ConnectResult {
    Success = 0,
    Denied = -1,
    TimedOut = -2,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the signaling transport to open.
    Init,
    /// AUTH sent, waiting for the verdict.
    Signaling,
    /// Exchanging descriptions and candidates, waiting for channels.
    Negotiating,
    /// All channels open, waiting for the server's CONNECTED.
    ReadyWait,
    /// Fully established.
    Connected,
    Closed,
}

/// Everything a session needs besides its two transports.
pub struct SessionOptions {
    pub channel_modes: Vec<ChannelMode>,
    pub token_base64: String,
    /// Connect timeout in seconds; non-positive disables the timeout.
    pub timeout_seconds: i32,
    pub ping_interval: Duration,
    pub statistic: SharedStatistic,
}

/// One endpoint attempt.
pub struct Session {
    id: Option<u64>,
    state: SessionState,
    active: bool,

    signaling: Box<dyn SignalingTransport>,
    peer: Box<dyn PeerConnection>,
    channels: Vec<Channel>,
    system_channel: Option<DataChannelId>,

    all_channels_opened: bool,
    ready_signal_received: bool,
    connected_seen: bool,
    result_emitted: bool,

    rtt: RttCalculator,
    clock: Clock,
    scratch: Payload,

    token_base64: String,
    ping_interval: Duration,
    connect_deadline: Option<Deadline>,
    ping_timer: Option<Timer>,

    /// Fires at most once with the terminal connect outcome.
    pub on_connect_result: Signal<ConnectResult>,
    /// Fires exactly once when the session reaches `Closed`.
    pub on_closed: Signal<()>,
}

impl Session {
    /// Construct a session and create its outgoing data channels.
    pub fn new(
        signaling: Box<dyn SignalingTransport>,
        mut peer: Box<dyn PeerConnection>,
        options: SessionOptions,
    ) -> Result<Self, crate::peer::PeerError> {
        let mut channels = Vec::with_capacity(options.channel_modes.len());
        for (index, mode) in options.channel_modes.iter().enumerate() {
            let id = peer.create_data_channel(&outgoing_label(index), mode.init())?;
            channels.push(Channel::new(
                index,
                *mode,
                id,
                SharedStatistic::clone(&options.statistic),
            ));
        }

        let connect_deadline = if options.timeout_seconds > 0 {
            Some(Deadline::after(Duration::from_secs(
                options.timeout_seconds as u64,
            )))
        } else {
            warn!(
                timeout = options.timeout_seconds,
                "non-positive token timeout, connect timeout disabled"
            );
            None
        };

        Ok(Session {
            id: None,
            state: SessionState::Init,
            active: true,
            signaling,
            peer,
            channels,
            system_channel: None,
            all_channels_opened: false,
            ready_signal_received: false,
            connected_seen: false,
            result_emitted: false,
            rtt: RttCalculator::new(),
            clock: Clock::new(),
            scratch: Payload::new(MAX_SYSTEM_MESSAGE_SIZE),
            token_base64: options.token_base64,
            ping_interval: options.ping_interval,
            connect_deadline,
            ping_timer: None,
            on_connect_result: Signal::new(),
            on_closed: Signal::new(),
        })
    }

    /// Server-assigned session id, available once authentication succeeded.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// False once the session reached `Closed`.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    /// Reliability mode of channel `index`.
    pub fn channel_mode(&self, index: usize) -> Option<ChannelMode> {
        self.channels.get(index).map(Channel::mode)
    }

    /// Round-trip mean and variance in nanoseconds over the ping window.
    pub fn rtt(&self) -> SampleStats {
        self.rtt.stats()
    }

    /// Local monotonic time shifted into the server clock domain.
    pub fn time(&self) -> u64 {
        self.clock.time(now_ns())
    }

    /// Whether the periodic ping schedule has been armed.
    pub fn ping_active(&self) -> bool {
        self.ping_timer.is_some()
    }

    /// Enqueue a message payload on channel `index`.
    ///
    /// Returns false when the session or channel cannot send.
    pub fn send(&mut self, index: usize, data: &[u8]) -> bool {
        if !self.active {
            return false;
        }
        match self.channels.get_mut(index) {
            Some(channel) => channel.send(self.peer.as_mut(), data),
            None => false,
        }
    }

    /// Drain pending transport completions and fire due timers.
    ///
    /// Returns whether any event was processed, so drivers can back off
    /// when idle.
    pub fn pump(&mut self) -> bool {
        if !self.active {
            return false;
        }
        let mut progress = false;

        while self.active {
            match self.signaling.poll_event() {
                Some(SignalingEvent::Opened) => {
                    progress = true;
                    self.handle_signaling_open();
                }
                Some(SignalingEvent::Frame(frame)) => {
                    progress = true;
                    self.handle_frame(&frame);
                }
                Some(SignalingEvent::Closed) => {
                    progress = true;
                    debug!("signaling transport closed");
                    self.close();
                }
                None => break,
            }
        }

        while self.active {
            match self.peer.poll_event() {
                Some(event) => {
                    progress = true;
                    self.handle_peer_event(event);
                }
                None => break,
            }
        }

        if self.active {
            if let Some(deadline) = self.connect_deadline {
                if deadline.expired() {
                    progress = true;
                    warn!("connect timeout expired");
                    self.emit_result(ConnectResult::TimedOut);
                    self.close();
                    return progress;
                }
            }
            if let Some(timer) = self.ping_timer.as_mut() {
                if timer.try_fire() {
                    progress = true;
                    self.send_ping();
                }
            }
        }

        progress
    }

    /// Tear the session down. Idempotent; returns whether this call did
    /// the teardown.
    pub fn disconnect(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.close();
        true
    }

    fn handle_signaling_open(&mut self) {
        if self.state != SessionState::Init {
            return;
        }
        let frame = ClientFrame::Auth {
            token_base64: &self.token_base64,
        }
        .encode();
        if self.signaling.send(&frame).is_err() {
            self.close();
            return;
        }
        self.state = SessionState::Signaling;
        debug!("authentication sent");
    }

    fn handle_frame(&mut self, frame: &str) {
        let Some(parsed) = ServerFrame::parse(frame) else {
            trace!(frame, "dropping unparseable signaling frame");
            return;
        };

        match parsed {
            ServerFrame::AuthOk {
                session_id,
                server_time,
            } => {
                if self.state != SessionState::Signaling {
                    return;
                }
                self.id = Some(session_id);
                self.clock.set(server_time, now_ns());
                self.state = SessionState::Negotiating;
                debug!(session_id, "authenticated");
            }
            ServerFrame::AuthDenied { reason } => {
                warn!(%reason, "authentication denied");
                self.emit_result(ConnectResult::Denied);
                self.close();
            }
            ServerFrame::Description(description) => {
                if matches!(self.state, SessionState::Init | SessionState::Signaling) {
                    trace!("dropping early description");
                    return;
                }
                if self.peer.set_remote_description(&description).is_err() {
                    self.close();
                    return;
                }
                let answer = match self.peer.create_answer() {
                    Ok(answer) => answer,
                    Err(_) => {
                        self.close();
                        return;
                    }
                };
                let reply = ClientFrame::Description(&answer).encode();
                if self.signaling.send(&reply).is_err() {
                    self.close();
                }
            }
            ServerFrame::Candidate(candidate) => {
                if self.peer.add_ice_candidate(&candidate).is_err() {
                    warn!(mid = %candidate.mid, "rejected remote candidate");
                }
            }
            ServerFrame::Ready => {
                self.ready_signal_received = true;
                self.maybe_cancel_timeout();
            }
            ServerFrame::Connected => {
                if self.connected_seen {
                    return;
                }
                // Connection is only announced once both readiness flags
                // hold: all N+1 channels open and the peer's READY seen.
                // Signaling and peer-connection events have no
                // cross-transport ordering, so a CONNECTED racing ahead of
                // the channel opens is dropped like any other out-of-shape
                // frame.
                if !self.all_channels_opened || !self.ready_signal_received {
                    trace!(state = ?self.state, "dropping premature connected frame");
                    return;
                }
                self.connected_seen = true;
                self.state = SessionState::Connected;
                debug!(id = ?self.id, "session connected");
                self.emit_result(ConnectResult::Success);
            }
        }
    }

    fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::ChannelOpened { id, label } => self.handle_channel_opened(id, &label),
            PeerEvent::ChannelData { id, data } => self.handle_channel_data(id, data),
            PeerEvent::ChannelClosed { id } => {
                debug!(id, "data channel closed");
                self.close();
            }
            PeerEvent::LocalCandidate(candidate) => {
                let frame = ClientFrame::Candidate(&candidate).encode();
                if self.signaling.send(&frame).is_err() {
                    self.close();
                }
            }
            PeerEvent::ConnectionClosed => {
                debug!("peer connection closed");
                self.close();
            }
        }
    }

    fn handle_channel_opened(&mut self, id: DataChannelId, label: &str) {
        if label == SYSTEM_CHANNEL_LABEL {
            self.system_channel = Some(id);
            trace!(id, "system channel adopted");
            self.check_channels_ready();
            return;
        }

        if let Some(index) = parse_indexed_label(label, "client-channel-") {
            if let Some(channel) = self.channels.get_mut(index) {
                channel.handle_opened();
                trace!(index, "outgoing channel open");
                self.check_channels_ready();
            }
            return;
        }

        if let Some(index) = parse_indexed_label(label, "server-channel-") {
            if let Some(channel) = self.channels.get_mut(index) {
                channel.attach_incoming(id);
                trace!(index, "incoming channel bound");
            }
            return;
        }

        trace!(label, "ignoring unrecognized channel label");
    }

    fn handle_channel_data(&mut self, id: DataChannelId, data: Bytes) {
        if self.system_channel == Some(id) {
            self.handle_system_message(&data);
            return;
        }
        if let Some(channel) = self.channels.iter_mut().find(|channel| channel.owns(id)) {
            channel.handle_data(data);
        }
    }

    fn check_channels_ready(&mut self) {
        if self.all_channels_opened
            || self.system_channel.is_none()
            || !self.channels.iter().all(Channel::is_open)
        {
            return;
        }
        self.all_channels_opened = true;

        if self.signaling.send(&ClientFrame::Ready.encode()).is_err() {
            self.close();
            return;
        }
        self.ping_timer = Some(Timer::new(self.ping_interval));
        if self.state == SessionState::Negotiating {
            self.state = SessionState::ReadyWait;
        }
        debug!("all channels open, ready sent");
        self.maybe_cancel_timeout();
    }

    fn maybe_cancel_timeout(&mut self) {
        if self.all_channels_opened && self.ready_signal_received {
            self.connect_deadline = None;
        }
    }

    fn send_ping(&mut self) {
        let Some(system) = self.system_channel else {
            return;
        };
        let entry = self.rtt.next(now_ns());
        let ping = SystemMessage::Ping {
            sequence: entry.sequence,
        };
        if ping.encode(&mut self.scratch).is_err() {
            return;
        }
        if self.peer.send(system, self.scratch.pack()).is_err() {
            self.close();
        }
    }

    fn handle_system_message(&mut self, frame: &[u8]) {
        let message = match SystemMessage::decode(frame) {
            Ok(message) => message,
            Err(error) => {
                trace!(%error, "dropping malformed system message");
                return;
            }
        };

        match message {
            SystemMessage::Ping { sequence } => {
                // Reply immediately; this side has no authoritative time to
                // report, so the pong carries the zero-equivalent.
                let pong = SystemMessage::Pong {
                    sequence,
                    server_time: 0,
                };
                let Some(system) = self.system_channel else {
                    return;
                };
                if pong.encode(&mut self.scratch).is_err() {
                    return;
                }
                if self.peer.send(system, self.scratch.pack()).is_err() {
                    self.close();
                }
            }
            SystemMessage::Pong {
                sequence,
                server_time,
            } => {
                let recv_time = now_ns();
                let Some(entry) = self.rtt.entry(sequence) else {
                    trace!(sequence, "dropping pong without matching ping");
                    return;
                };
                self.rtt.submit(sequence, recv_time, 0);
                self.clock.sync(
                    entry.sent_time,
                    server_time,
                    server_time,
                    recv_time,
                    self.rtt.variance(),
                );
            }
        }
    }

    fn emit_result(&mut self, result: ConnectResult) {
        if self.result_emitted {
            return;
        }
        self.result_emitted = true;
        self.on_connect_result.emit(&result);
    }

    fn close(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.state = SessionState::Closed;
        self.ping_timer = None;
        self.connect_deadline = None;

        for channel in &mut self.channels {
            channel.handle_closed();
        }
        self.peer.close();
        self.signaling.close();

        debug!(id = ?self.id, "session closed");
        self.on_closed.emit(&());
    }
}

fn parse_indexed_label(label: &str, prefix: &str) -> Option<usize> {
    label.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indexed_label() {
        assert_eq!(parse_indexed_label("client-channel-0", "client-channel-"), Some(0));
        assert_eq!(parse_indexed_label("server-channel-12", "server-channel-"), Some(12));
        assert_eq!(parse_indexed_label("client-channel-x", "client-channel-"), None);
        assert_eq!(parse_indexed_label("system", "client-channel-"), None);
    }

    #[test]
    fn test_connect_result_codes() {
        assert_eq!(ConnectResult::Success as i32, 0);
        assert_eq!(ConnectResult::Denied as i32, -1);
        assert_eq!(ConnectResult::TimedOut as i32, -2);
    }
}
