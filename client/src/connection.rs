//! Dial, authenticate, select the game, reconnect.
//!
//! [`connect`] spawns a task that owns the transport. It holds no game
//! state: every parsed frame is forwarded as [`ConnectionEvent::Inbound`],
//! including the handshake replies, so wallet updates riding on them reach
//! the session.
//!
//! ## Handshake
//!
//! 1. On open, send `{set: "authentication", location, cookie, key}`
//! 2. On `{authentication: true}`, keep the `set_cookie` values for the next
//!    authentication and request `game_list` and `user_data`
//! 3. On the game list, send `{set: "game"}` for the configured tag
//!
//! `{authentication: false}` is terminal.
//!
//! ## Reconnection
//!
//! A dropped or failed connection is retried up to `max_reconnects` times,
//! waiting `attempt × reconnect_delay` before each attempt. Every successful
//! open resets the attempt counter. Past the cap the task emits
//! [`ConnectionEvent::Disconnected`] with `refresh_required` and exits.

use crate::cookies::CookieJar;
use crate::events::{capacity_or_default, EventStream};
use crate::transport::{Connector, Transport};
use crate::{Error, Result};
use skyrocket_types::{ClientLocation, ClientMessage, Inbound, ServerEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "wss://wss.polishchuk.com/nonstop-ws";
pub const DEFAULT_AUTH_KEY: &str = "ba614aC3";
pub const DEFAULT_GAME_TAG: &str = "crs1";
pub const DEFAULT_MAX_RECONNECTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionConfig {
    pub endpoint: Url,
    /// `Origin` header sent when dialing.
    pub origin: Option<String>,
    /// Page location reported in the authentication request.
    pub location: ClientLocation,
    pub auth_key: String,
    pub game_tag: String,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    /// Event channel capacity; zero selects the default.
    pub event_capacity: usize,
}

impl ConnectionConfig {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        match endpoint.scheme() {
            "ws" | "wss" => {}
            other => return Err(Error::InvalidScheme(other.to_string())),
        }
        Ok(Self {
            location: ClientLocation::from_url(&endpoint),
            endpoint,
            origin: None,
            auth_key: DEFAULT_AUTH_KEY.to_string(),
            game_tag: DEFAULT_GAME_TAG.to_string(),
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_capacity: 0,
        })
    }

    /// Present as a page served from `page`: sets the `Origin` header and
    /// the reported location.
    pub fn with_origin(mut self, page: &str) -> Result<Self> {
        let page = Url::parse(page)?;
        self.origin = Some(page.origin().ascii_serialization());
        self.location = ClientLocation::from_url(&page);
        Ok(self)
    }

    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = key.into();
        self
    }

    pub fn with_game_tag(mut self, tag: impl Into<String>) -> Self {
        self.game_tag = tag.into();
        self
    }

    pub fn with_max_reconnects(mut self, max: u32) -> Self {
        self.max_reconnects = max;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Wait before reconnect attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reconnect_delay.saturating_mul(attempt)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    /// The socket is open and authentication was sent.
    Connected,
    Authenticated,
    /// The server refused the credentials. Terminal.
    AuthenticationRejected,
    GameSelected {
        tag: String,
    },
    /// The game list did not contain the configured tag.
    GameUnavailable {
        tag: String,
    },
    /// A parsed server frame.
    Inbound(Inbound),
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    /// The task has stopped. With `refresh_required` the reconnect budget
    /// was exhausted and only a restart helps.
    Disconnected {
        refresh_required: bool,
    },
}

impl ConnectionEvent {
    /// Whether no further events follow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::AuthenticationRejected | ConnectionEvent::Disconnected { .. }
        )
    }
}

#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Shutdown,
}

/// Sends requests through the connection task.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ConnectionHandle {
    /// Queue a request. Requests issued while reconnecting are dropped.
    pub fn send(&self, message: ClientMessage) -> Result<()> {
        self.commands
            .send(Command::Send(message))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Start the connection task.
pub fn connect<C: Connector>(connector: C, config: ConnectionConfig) -> (ConnectionHandle, EventStream) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(capacity_or_default(config.event_capacity));
    let driver = Driver {
        connector,
        handshake: Handshake::new(config.game_tag.clone()),
        config,
        commands: command_rx,
        events: event_tx,
    };
    let handle = tokio::spawn(driver.run());
    (
        ConnectionHandle {
            commands: command_tx,
        },
        EventStream::new(event_rx, handle),
    )
}

/// What the handshake wants done in response to a frame.
#[derive(Debug, Default, PartialEq)]
struct Reaction {
    send: Vec<ClientMessage>,
    event: Option<ConnectionEvent>,
    fatal: bool,
}

#[derive(Debug)]
struct Handshake {
    game_tag: String,
    cookies: CookieJar,
}

impl Handshake {
    fn new(game_tag: String) -> Self {
        Self {
            game_tag,
            cookies: CookieJar::new(),
        }
    }

    fn hello(&self, config: &ConnectionConfig) -> ClientMessage {
        ClientMessage::authenticate(
            config.location.clone(),
            self.cookies.header(),
            config.auth_key.clone(),
        )
    }

    fn react(&mut self, inbound: &Inbound) -> Reaction {
        match &inbound.event {
            ServerEvent::Authentication(reply) if reply.accepted => {
                self.cookies.store_all(&reply.set_cookie);
                info!(cookies = reply.set_cookie.len(), "authenticated");
                Reaction {
                    send: vec![ClientMessage::game_list(), ClientMessage::user_data()],
                    event: Some(ConnectionEvent::Authenticated),
                    fatal: false,
                }
            }
            ServerEvent::Authentication(_) => {
                warn!("authentication rejected");
                Reaction {
                    event: Some(ConnectionEvent::AuthenticationRejected),
                    fatal: true,
                    ..Reaction::default()
                }
            }
            ServerEvent::GameList(games) => {
                let tag = self.game_tag.clone();
                if games.iter().any(|game| game.tag == tag) {
                    info!(%tag, "selecting game");
                    Reaction {
                        send: vec![ClientMessage::select_game(tag.clone())],
                        event: Some(ConnectionEvent::GameSelected { tag }),
                        fatal: false,
                    }
                } else {
                    warn!(%tag, available = games.len(), "game not offered by server");
                    Reaction {
                        event: Some(ConnectionEvent::GameUnavailable { tag }),
                        ..Reaction::default()
                    }
                }
            }
            _ => Reaction::default(),
        }
    }
}

enum Exit {
    /// Transport failed or closed; reconnect.
    Dropped,
    Shutdown,
    Rejected,
    /// Nobody is listening any more.
    Abandoned,
}

enum Step {
    Command(Option<Command>),
    Frame(Option<Result<String>>),
}

struct Driver<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    handshake: Handshake,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ConnectionEvent>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        let mut attempt = 0u32;
        loop {
            let endpoint = self.config.endpoint.clone();
            debug!(%endpoint, attempt, "dialing");
            match self
                .connector
                .connect(&endpoint, self.config.origin.as_deref())
                .await
            {
                Ok(transport) => {
                    attempt = 0;
                    info!(%endpoint, "connected");
                    if !self.emit(ConnectionEvent::Connected).await {
                        return;
                    }
                    match self.serve(transport).await {
                        Exit::Dropped => {}
                        Exit::Shutdown => {
                            info!("connection shut down");
                            self.emit(ConnectionEvent::Disconnected {
                                refresh_required: false,
                            })
                            .await;
                            return;
                        }
                        Exit::Rejected | Exit::Abandoned => return,
                    }
                }
                Err(err) => warn!(%endpoint, %err, attempt, "connection failed"),
            }

            if attempt >= self.config.max_reconnects {
                warn!(attempts = attempt, "reconnect budget exhausted");
                self.emit(ConnectionEvent::Disconnected {
                    refresh_required: true,
                })
                .await;
                return;
            }
            attempt += 1;
            let delay = self.config.backoff(attempt);
            info!(attempt, max = self.config.max_reconnects, ?delay, "reconnecting");
            if !self
                .emit(ConnectionEvent::Reconnecting { attempt, delay })
                .await
            {
                return;
            }
            if !self.wait(delay).await {
                self.emit(ConnectionEvent::Disconnected {
                    refresh_required: false,
                })
                .await;
                return;
            }
        }
    }

    /// Sleep out the backoff. Returns `false` if shutdown was requested.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => {
                        debug!(?message, "dropping request while disconnected");
                    }
                    Some(Command::Shutdown) | None => return false,
                },
            }
        }
    }

    async fn serve(&mut self, mut transport: C::Transport) -> Exit {
        let hello = self.handshake.hello(&self.config);
        if let Err(err) = transport.send(hello.to_json()).await {
            warn!(%err, "failed to send authentication");
            return Exit::Dropped;
        }
        debug!("authentication sent");

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                frame = transport.recv() => Step::Frame(frame),
            };
            match step {
                Step::Command(Some(Command::Send(message))) => {
                    debug!(?message, "sending request");
                    if let Err(err) = transport.send(message.to_json()).await {
                        warn!(%err, "send failed");
                        return Exit::Dropped;
                    }
                }
                Step::Command(Some(Command::Shutdown) | None) => {
                    if let Err(err) = transport.close().await {
                        debug!(%err, "close failed");
                    }
                    return Exit::Shutdown;
                }
                Step::Frame(Some(Ok(text))) => {
                    let inbound = match Inbound::parse(&text) {
                        Ok(inbound) => inbound,
                        Err(err) => {
                            warn!(%err, len = text.len(), "dropping malformed frame");
                            continue;
                        }
                    };
                    let reaction = self.handshake.react(&inbound);
                    if !self.emit(ConnectionEvent::Inbound(inbound)).await {
                        return Exit::Abandoned;
                    }
                    for message in reaction.send {
                        if let Err(err) = transport.send(message.to_json()).await {
                            warn!(%err, "send failed");
                            return Exit::Dropped;
                        }
                    }
                    if let Some(event) = reaction.event {
                        if !self.emit(event).await {
                            return Exit::Abandoned;
                        }
                    }
                    if reaction.fatal {
                        let _ = transport.close().await;
                        return Exit::Rejected;
                    }
                }
                Step::Frame(Some(Err(err))) => {
                    warn!(%err, "connection error");
                    return Exit::Dropped;
                }
                Step::Frame(None) => {
                    info!("connection closed by server");
                    return Exit::Dropped;
                }
            }
        }
    }

    /// Returns `false` once the event stream has been dropped.
    async fn emit(&self, event: ConnectionEvent) -> bool {
        if self.events.send(event).await.is_err() {
            debug!("event stream dropped");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::WsConnector;
    use async_trait::async_trait;
    use axum::{
        extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        routing::get,
        Router,
    };
    use serde_json::Value;
    use skyrocket_types::{SeatId, StatusUpdate};
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const WAIT: Duration = Duration::from_secs(5);

    enum ServerFrame {
        Text(String),
        Close,
        Error,
    }

    /// Client end of an in-memory connection.
    struct MemoryTransport {
        frames: mpsc::UnboundedReceiver<ServerFrame>,
        sent: mpsc::UnboundedSender<String>,
    }

    /// Server end of an in-memory connection.
    struct Peer {
        frames: mpsc::UnboundedSender<ServerFrame>,
        sent: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        fn say(&self, text: &str) {
            self.frames.send(ServerFrame::Text(text.to_string())).unwrap();
        }

        fn close(&self) {
            self.frames.send(ServerFrame::Close).unwrap();
        }

        async fn heard(&mut self) -> Value {
            let text = tokio::time::timeout(WAIT, self.sent.recv())
                .await
                .unwrap()
                .unwrap();
            serde_json::from_str(&text).unwrap()
        }
    }

    fn pair() -> (MemoryTransport, Peer) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (
            MemoryTransport {
                frames: frame_rx,
                sent: sent_tx,
            },
            Peer {
                frames: frame_tx,
                sent: sent_rx,
            },
        )
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&mut self, text: String) -> Result<()> {
            self.sent.send(text).map_err(|_| Error::ConnectionClosed)
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.frames.recv().await {
                Some(ServerFrame::Text(text)) => Some(Ok(text)),
                Some(ServerFrame::Error) => Some(Err(Error::ConnectionClosed)),
                Some(ServerFrame::Close) | None => None,
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Hands out scripted transports in order; fails once they run out.
    #[derive(Clone, Default)]
    struct MemoryConnector {
        transports: Arc<Mutex<VecDeque<MemoryTransport>>>,
        dials: Arc<AtomicUsize>,
    }

    impl MemoryConnector {
        fn with_peers(count: usize) -> (Self, Vec<Peer>) {
            let connector = Self::default();
            let mut peers = Vec::new();
            for _ in 0..count {
                let (transport, peer) = pair();
                connector.transports.lock().unwrap().push_back(transport);
                peers.push(peer);
            }
            (connector, peers)
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        type Transport = MemoryTransport;

        async fn connect(&self, _endpoint: &Url, _origin: Option<&str>) -> Result<MemoryTransport> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            self.transports
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(Error::DialTimeout)
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("ws://127.0.0.1:9/nonstop-ws")
            .unwrap()
            .with_origin("https://play.example.com/crash/")
            .unwrap()
            .with_reconnect_delay(Duration::from_millis(5))
    }

    async fn next_event(events: &mut EventStream) -> Option<ConnectionEvent> {
        tokio::time::timeout(WAIT, events.next()).await.unwrap()
    }

    /// Next event that is not a forwarded frame.
    async fn next_signal(events: &mut EventStream) -> Option<ConnectionEvent> {
        loop {
            match next_event(events).await {
                Some(ConnectionEvent::Inbound(_)) => continue,
                other => return other,
            }
        }
    }

    const AUTH_OK: &str =
        r#"{"authentication":true,"wallet":{"balance":500,"currency":"USD"},"set_cookie":["sid=abc; Path=/"]}"#;

    #[test]
    fn test_config_defaults_and_validation() {
        let config = ConnectionConfig::new(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(config.game_tag, "crs1");
        assert_eq!(config.max_reconnects, 5);
        assert_eq!(config.backoff(3), Duration::from_secs(6));
        assert_eq!(config.location.host, "wss.polishchuk.com");
        assert!(matches!(
            ConnectionConfig::new("https://example.com"),
            Err(Error::InvalidScheme(scheme)) if scheme == "https"
        ));
        assert!(matches!(ConnectionConfig::new("not a url"), Err(Error::Url(_))));
    }

    #[test]
    fn test_handshake_reactions() {
        let mut handshake = Handshake::new("crs1".to_string());
        let accepted = handshake.react(&Inbound::parse(AUTH_OK).unwrap());
        assert_eq!(
            accepted.send,
            vec![ClientMessage::game_list(), ClientMessage::user_data()]
        );
        assert_eq!(accepted.event, Some(ConnectionEvent::Authenticated));
        assert_eq!(handshake.cookies.header(), "sid=abc");

        let listed = handshake
            .react(&Inbound::parse(r#"{"game_list":[{"tag":"crs1","title":"Crash"}]}"#).unwrap());
        assert_eq!(listed.send, vec![ClientMessage::select_game("crs1")]);

        let missing = handshake
            .react(&Inbound::parse(r#"{"game_list":[{"tag":"slot9","title":"Slots"}]}"#).unwrap());
        assert!(missing.send.is_empty());
        assert_eq!(
            missing.event,
            Some(ConnectionEvent::GameUnavailable {
                tag: "crs1".to_string()
            })
        );

        let rejected = handshake.react(&Inbound::parse(r#"{"authentication":false}"#).unwrap());
        assert!(rejected.fatal);

        let status = handshake
            .react(&Inbound::parse(r#"{"status":"pause","countdown":3}"#).unwrap());
        assert_eq!(status, Reaction::default());
    }

    #[tokio::test]
    async fn test_handshake_and_requests() {
        let (connector, mut peers) = MemoryConnector::with_peers(1);
        let (handle, mut events) = connect(connector, config());
        let mut peer = peers.remove(0);

        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        let hello = peer.heard().await;
        assert_eq!(hello["set"], "authentication");
        assert_eq!(hello["key"], DEFAULT_AUTH_KEY);
        assert_eq!(hello["cookie"], "");
        assert_eq!(hello["location"]["origin"], "https://play.example.com");
        assert_eq!(hello["location"]["pathname"], "/crash/");

        peer.say(AUTH_OK);
        match next_event(&mut events).await {
            Some(ConnectionEvent::Inbound(inbound)) => {
                assert_eq!(inbound.wallet.and_then(|w| w.balance), Some(500.0));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Authenticated));
        assert_eq!(peer.heard().await["get"], "game_list");
        assert_eq!(peer.heard().await["get"], "user_data");

        peer.say(r#"{"game_list":[{"tag":"crs1","title":"Crash"}]}"#);
        assert_eq!(
            next_signal(&mut events).await,
            Some(ConnectionEvent::GameSelected {
                tag: "crs1".to_string()
            })
        );
        let select = peer.heard().await;
        assert_eq!(select["set"], "game");
        assert_eq!(select["game"], "crs1");

        handle.send(ClientMessage::cash_out(SeatId::SECOND, 321)).unwrap();
        let cash_out = peer.heard().await;
        assert_eq!(cash_out["set"], "bet");
        assert_eq!(cash_out["index"], 1);
        assert_eq!(cash_out["cash_out"], 321);

        handle.shutdown();
        assert_eq!(
            next_event(&mut events).await,
            Some(ConnectionEvent::Disconnected {
                refresh_required: false
            })
        );
        assert_eq!(next_event(&mut events).await, None);
    }

    #[tokio::test]
    async fn test_authentication_rejection_is_terminal() {
        let (connector, mut peers) = MemoryConnector::with_peers(2);
        let dials = connector.dials.clone();
        let (_handle, mut events) = connect(connector, config());
        let mut peer = peers.remove(0);

        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        peer.heard().await;
        peer.say(r#"{"authentication":false}"#);
        assert_eq!(
            next_signal(&mut events).await,
            Some(ConnectionEvent::AuthenticationRejected)
        );
        assert_eq!(next_event(&mut events).await, None);
        assert_eq!(dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_game_is_not_fatal() {
        let (connector, mut peers) = MemoryConnector::with_peers(1);
        let (_handle, mut events) = connect(connector, config());
        let peer = peers.remove(0);

        peer.say(AUTH_OK);
        peer.say(r#"{"game_list":[]}"#);
        peer.say(r#"{"status":"pause","countdown":4}"#);
        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        assert_eq!(next_signal(&mut events).await, Some(ConnectionEvent::Authenticated));
        assert_eq!(
            next_signal(&mut events).await,
            Some(ConnectionEvent::GameUnavailable {
                tag: "crs1".to_string()
            })
        );
        match next_event(&mut events).await {
            Some(ConnectionEvent::Inbound(inbound)) => assert_eq!(
                inbound.event,
                ServerEvent::Status(StatusUpdate::Pause { countdown: 4.0 })
            ),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (connector, mut peers) = MemoryConnector::with_peers(1);
        let (_handle, mut events) = connect(connector, config());
        let peer = peers.remove(0);

        peer.say("definitely not json");
        peer.say("[1, 2, 3]");
        peer.say(r#"{"status":"crash","k":2.5}"#);
        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        match next_event(&mut events).await {
            Some(ConnectionEvent::Inbound(inbound)) => assert_eq!(
                inbound.event,
                ServerEvent::Status(StatusUpdate::Crash { k: Some(2.5) })
            ),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reconnect_resets_attempts_and_reuses_cookies() {
        let (connector, mut peers) = MemoryConnector::with_peers(3);
        let delay = Duration::from_millis(5);
        let (_handle, mut events) = connect(connector, config());
        let mut third = peers.pop().unwrap();
        let mut second = peers.pop().unwrap();
        let mut first = peers.pop().unwrap();

        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        first.heard().await;
        first.say(AUTH_OK);
        assert_eq!(next_signal(&mut events).await, Some(ConnectionEvent::Authenticated));
        first.close();
        assert_eq!(
            next_signal(&mut events).await,
            Some(ConnectionEvent::Reconnecting { attempt: 1, delay })
        );
        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        assert_eq!(second.heard().await["cookie"], "sid=abc");

        // An error also reconnects, and the counter started over.
        second.frames.send(ServerFrame::Error).unwrap();
        assert_eq!(
            next_signal(&mut events).await,
            Some(ConnectionEvent::Reconnecting { attempt: 1, delay })
        );
        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        assert_eq!(third.heard().await["cookie"], "sid=abc");
    }

    #[tokio::test]
    async fn test_reconnect_cap_requires_refresh() {
        let connector = MemoryConnector::default();
        let dials = connector.dials.clone();
        let base = Duration::from_millis(2);
        let (handle, mut events) = connect(
            connector,
            config().with_max_reconnects(3).with_reconnect_delay(base),
        );

        for attempt in 1..=3 {
            assert_eq!(
                next_event(&mut events).await,
                Some(ConnectionEvent::Reconnecting {
                    attempt,
                    delay: base * attempt
                })
            );
        }
        let last = next_event(&mut events).await;
        assert_eq!(
            last,
            Some(ConnectionEvent::Disconnected {
                refresh_required: true
            })
        );
        assert!(last.is_some_and(|event| event.is_terminal()));
        assert_eq!(next_event(&mut events).await, None);
        assert_eq!(dials.load(Ordering::SeqCst), 4);
        assert!(handle.send(ClientMessage::game_list()).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff() {
        let connector = MemoryConnector::default();
        let (handle, mut events) = connect(
            connector,
            config().with_reconnect_delay(Duration::from_secs(60)),
        );
        assert!(matches!(
            next_event(&mut events).await,
            Some(ConnectionEvent::Reconnecting { attempt: 1, .. })
        ));
        handle.shutdown();
        assert_eq!(
            next_event(&mut events).await,
            Some(ConnectionEvent::Disconnected {
                refresh_required: false
            })
        );
    }

    struct LoopbackServer {
        url: String,
        server_handle: tokio::task::JoinHandle<()>,
    }

    impl LoopbackServer {
        async fn start() -> Self {
            async fn session(mut socket: WebSocket) {
                while let Some(Ok(message)) = socket.recv().await {
                    let WsMessage::Text(text) = message else {
                        continue;
                    };
                    let request: Value = serde_json::from_str(&text).unwrap();
                    if request["set"] == "authentication" {
                        socket.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();
                        socket.send(WsMessage::Text(AUTH_OK.to_string())).await.unwrap();
                    } else if request["get"] == "game_list" {
                        let list = r#"{"game_list":[{"tag":"crs1","title":"Crash"}]}"#;
                        socket.send(WsMessage::Text(list.to_string())).await.unwrap();
                    } else if request["set"] == "game" {
                        let pause = r#"{"status":"pause","countdown":5}"#;
                        socket.send(WsMessage::Text(pause.to_string())).await.unwrap();
                    }
                }
            }

            let router = Router::new().route(
                "/nonstop-ws",
                get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(session) }),
            );
            let addr = SocketAddr::from(([127, 0, 0, 1], 0));
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            let actual_addr = listener.local_addr().unwrap();
            let server_handle = tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });

            Self {
                url: format!("ws://{actual_addr}/nonstop-ws"),
                server_handle,
            }
        }
    }

    impl Drop for LoopbackServer {
        fn drop(&mut self) {
            self.server_handle.abort();
        }
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let server = LoopbackServer::start().await;
        let config = ConnectionConfig::new(&server.url)
            .unwrap()
            .with_origin("http://localhost:8080/")
            .unwrap();
        let (handle, mut events) = connect(WsConnector::default(), config);

        assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Connected));
        assert_eq!(next_signal(&mut events).await, Some(ConnectionEvent::Authenticated));
        assert_eq!(
            next_signal(&mut events).await,
            Some(ConnectionEvent::GameSelected {
                tag: "crs1".to_string()
            })
        );
        match next_event(&mut events).await {
            Some(ConnectionEvent::Inbound(inbound)) => assert_eq!(
                inbound.event,
                ServerEvent::Status(StatusUpdate::Pause { countdown: 5.0 })
            ),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.shutdown();
        assert_eq!(
            next_event(&mut events).await,
            Some(ConnectionEvent::Disconnected {
                refresh_required: false
            })
        );
    }
}
