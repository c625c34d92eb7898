//! Socket: token decoding, endpoint iteration, and the caller-facing API
//!
//! The socket owns at most one live session. `connect` decodes the connect
//! token, walks its endpoint list in declared order and drives one session
//! per endpoint until the first success; afterwards the caller drives the
//! established session by calling [`Socket::update`] from its own loop.

use crate::channel::ChannelMode;
use crate::config::SocketConfig;
use crate::message::Message;
use crate::peer::PeerConnection;
use crate::pool::Pool;
use crate::session::{ConnectResult, Session, SessionOptions};
use crate::signaling::SignalingTransport;
use crate::stats::{SharedStatistic, Statistic};
use crate::time::now_ns;
use bytes::Bytes;
use parking_lot::RwLock;
use peerlink_protocol::token::{ConnectToken, TokenError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Socket-level errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid connect token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("transport setup failed: {0}")]
    Transport(String),
}

/// Supplies the two out-of-scope transports for each endpoint attempt.
pub trait Connector {
    /// Open the signaling channel toward one server endpoint.
    fn open_signaling(
        &mut self,
        address: &SocketAddr,
    ) -> Result<Box<dyn SignalingTransport>, ClientError>;

    /// Create a fresh peer connection for one endpoint attempt.
    fn open_peer_connection(&mut self) -> Result<Box<dyn PeerConnection>, ClientError>;
}

/// Callbacks the socket publishes connection events through.
///
/// All methods default to no-ops so listeners implement only what they
/// need. The message handed to `on_received` is pool-backed and reclaimed
/// when the callback returns; copy out anything that must outlive it.
pub trait SocketListener {
    fn on_connected(&mut self, _session: &Session) {}
    fn on_disconnected(&mut self, _session: &Session) {}
    fn on_received(&mut self, _session: &Session, _channel: usize, _message: &mut Message) {}
}

/// Listener that ignores every event.
pub struct NoopListener;

impl SocketListener for NoopListener {}

type ReceivedQueue = Rc<RefCell<VecDeque<(usize, Bytes)>>>;

/// Client socket.
pub struct Socket {
    config: SocketConfig,
    connector: Box<dyn Connector>,
    listener: Box<dyn SocketListener>,
    session: Option<Session>,
    statistic: SharedStatistic,
    message_pool: Pool<Message>,
    incoming_pool: Pool<Message>,
    received: ReceivedQueue,
}

impl Socket {
    /// Create a socket over the given channel modes.
    pub fn new(modes: Vec<ChannelMode>, connector: Box<dyn Connector>) -> Self {
        Self::with_config(SocketConfig::with_channels(modes), connector)
    }

    pub fn with_config(config: SocketConfig, connector: Box<dyn Connector>) -> Self {
        let message_capacity = config.message_capacity;
        let pool_capacity = config.message_pool_capacity;
        Socket {
            statistic: Arc::new(RwLock::new(Statistic::new(config.channel_count()))),
            config,
            connector,
            listener: Box::new(NoopListener),
            session: None,
            message_pool: Pool::new(pool_capacity, move || Message::new(message_capacity)),
            incoming_pool: Pool::new(pool_capacity, move || Message::new(message_capacity)),
            received: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Replace the event listener.
    pub fn set_listener(&mut self, listener: Box<dyn SocketListener>) {
        self.listener = listener;
    }

    /// The live session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Snapshot of the traffic counters.
    pub fn statistic(&self) -> Statistic {
        self.statistic.read().clone()
    }

    /// Local time shifted into the server clock domain, or plain local
    /// monotonic time when no session is live.
    pub fn time(&self) -> u64 {
        match &self.session {
            Some(session) => session.time(),
            None => now_ns(),
        }
    }

    /// Acquire a pooled message for sending.
    pub fn create_message(&mut self) -> Message {
        let mut message = self.message_pool.acquire();
        message.reset(self.config.message_capacity);
        message
    }

    /// Connect with a raw 2048-byte token.
    pub fn connect(&mut self, token: &[u8]) -> Result<ConnectResult, ClientError> {
        let decoded = ConnectToken::decode(token)?;
        let token_base64 = ConnectToken::to_base64(token);
        Ok(self.connect_decoded(&decoded, token_base64))
    }

    /// Connect with a token in its URL-safe base64 transport form.
    pub fn connect_base64(&mut self, token: &str) -> Result<ConnectResult, ClientError> {
        let decoded = ConnectToken::from_base64(token)?;
        Ok(self.connect_decoded(&decoded, token.trim().to_owned()))
    }

    fn connect_decoded(&mut self, token: &ConnectToken, token_base64: String) -> ConnectResult {
        self.stop();

        let mut last = ConnectResult::Denied;
        for address in &token.server_addresses {
            debug!(%address, "trying endpoint");
            match self.try_endpoint(address, token, &token_base64) {
                ConnectResult::Success => return ConnectResult::Success,
                other => {
                    warn!(%address, result = ?other, "endpoint attempt failed");
                    last = other;
                }
            }
        }
        last
    }

    /// Drive one endpoint attempt to its terminal result.
    fn try_endpoint(
        &mut self,
        address: &SocketAddr,
        token: &ConnectToken,
        token_base64: &str,
    ) -> ConnectResult {
        self.received.borrow_mut().clear();

        let signaling = match self.connector.open_signaling(address) {
            Ok(signaling) => signaling,
            Err(error) => {
                warn!(%address, %error, "signaling setup failed");
                return ConnectResult::Denied;
            }
        };
        let peer = match self.connector.open_peer_connection() {
            Ok(peer) => peer,
            Err(error) => {
                warn!(%address, %error, "peer connection setup failed");
                return ConnectResult::Denied;
            }
        };

        let options = SessionOptions {
            channel_modes: self.config.channels.clone(),
            token_base64: token_base64.to_owned(),
            timeout_seconds: token.timeout_seconds,
            ping_interval: Duration::from_millis(self.config.ping_interval_ms),
            statistic: Arc::clone(&self.statistic),
        };
        let mut session = match Session::new(signaling, peer, options) {
            Ok(session) => session,
            Err(error) => {
                warn!(%address, %error, "session setup failed");
                return ConnectResult::Denied;
            }
        };
        self.subscribe_channels(&session);

        // Register for the terminal result strictly before pumping, so an
        // immediately-failing session cannot emit past the listener.
        let mut result_listener = session.on_connect_result.listen();

        loop {
            let progressed = session.pump();
            self.dispatch_received(&session);

            if let Some(result) = result_listener.take() {
                match result {
                    ConnectResult::Success => {
                        self.listener.on_connected(&session);
                        self.session = Some(session);
                        return ConnectResult::Success;
                    }
                    other => {
                        session.disconnect();
                        return other;
                    }
                }
            }
            if !session.is_active() {
                // Closed before any terminal result: treat the endpoint as
                // having denied the attempt.
                return ConnectResult::Denied;
            }
            if !progressed {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Drive the established session; call this from the application loop.
    ///
    /// Dispatches received messages to the listener and reports
    /// disconnection through it.
    pub fn update(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.pump();
        self.dispatch_received(&session);

        if session.is_active() {
            self.session = Some(session);
        } else {
            self.listener.on_disconnected(&session);
        }
    }

    /// Send a message on channel `index` to every listed recipient.
    ///
    /// Returns the number of successful sends. The message returns to the
    /// pool exactly once, whether or not any send succeeded.
    pub fn send(&mut self, index: usize, message: Message, recipients: &[u64]) -> usize {
        let mut count = 0;
        if let Some(session) = self.session.as_mut() {
            for recipient in recipients {
                if session.id() == Some(*recipient) && session.send(index, message.pack()) {
                    count += 1;
                }
            }
        }
        self.message_pool.release(message);
        count
    }

    /// Tear down the live session, if any.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.disconnect();
            self.listener.on_disconnected(&session);
        }
        self.received.borrow_mut().clear();
    }

    fn subscribe_channels(&self, session: &Session) {
        for channel in session.channels() {
            let queue = Rc::clone(&self.received);
            let index = channel.index();
            channel.on_data.connect(move |data: &Bytes| {
                queue.borrow_mut().push_back((index, data.clone()));
            });
        }
    }

    fn dispatch_received(&mut self, session: &Session) {
        loop {
            let next = self.received.borrow_mut().pop_front();
            let Some((channel, data)) = next else {
                break;
            };
            let mut message = self.incoming_pool.acquire();
            message.load(&data);
            self.listener.on_received(session, channel, &mut message);
            self.incoming_pool.release(message);
        }
    }
}
