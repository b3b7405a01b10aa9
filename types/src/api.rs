//! JSON wire protocol spoken with the legacy game server.
//!
//! Outbound requests are strongly typed ([`ClientMessage`]). Inbound frames
//! are not: the server multiplexes unrelated replies on one socket and tells
//! them apart only by which top-level key is present. [`Inbound::parse`]
//! classifies a frame by probing those keys in a fixed order and always
//! lifts the optional `wallet` object out first, since any frame may carry
//! one. Unknown fields are ignored everywhere.

use crate::round::{BetScope, SeatId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
}

/// Page location reported during authentication.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLocation {
    pub href: String,
    pub origin: String,
    pub host: String,
    pub pathname: String,
}

impl ClientLocation {
    pub fn from_url(url: &Url) -> Self {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        Self {
            href: url.as_str().to_string(),
            origin: url.origin().ascii_serialization(),
            host,
            pathname: url.path().to_string(),
        }
    }
}

/// `{"set": ...}` requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "set", rename_all = "snake_case")]
pub enum SetRequest {
    Authentication {
        location: ClientLocation,
        cookie: String,
        key: String,
    },
    Game {
        game: String,
    },
    Options {
        bet_sum: f64,
        index: u8,
    },
    Bet {
        index: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancel: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cash_out: Option<u64>,
    },
}

/// `{"get": ...}` requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "get", rename_all = "snake_case")]
pub enum GetRequest {
    GameList,
    UserData,
}

/// Any client → server frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Set(SetRequest),
    Get(GetRequest),
}

impl ClientMessage {
    pub fn authenticate(location: ClientLocation, cookie: String, key: String) -> Self {
        ClientMessage::Set(SetRequest::Authentication {
            location,
            cookie,
            key,
        })
    }

    pub fn game_list() -> Self {
        ClientMessage::Get(GetRequest::GameList)
    }

    pub fn user_data() -> Self {
        ClientMessage::Get(GetRequest::UserData)
    }

    pub fn select_game(tag: impl Into<String>) -> Self {
        ClientMessage::Set(SetRequest::Game { game: tag.into() })
    }

    pub fn bet_options(seat: SeatId, amount: f64) -> Self {
        ClientMessage::Set(SetRequest::Options {
            bet_sum: amount,
            index: seat.index(),
        })
    }

    pub fn place_bet(seat: SeatId) -> Self {
        ClientMessage::Set(SetRequest::Bet {
            index: seat.index(),
            cancel: None,
            cash_out: None,
        })
    }

    pub fn cancel_bet(seat: SeatId) -> Self {
        ClientMessage::Set(SetRequest::Bet {
            index: seat.index(),
            cancel: Some(true),
            cash_out: None,
        })
    }

    pub fn cash_out(seat: SeatId, h: u64) -> Self {
        ClientMessage::Set(SetRequest::Bet {
            index: seat.index(),
            cancel: None,
            cash_out: Some(h),
        })
    }

    pub fn to_json(&self) -> String {
        // Serializing these plain structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Balance information that may ride along with any frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wallet {
    pub balance: Option<f64>,
    pub currency: Option<String>,
}

/// One entry of the server's game catalogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameListing {
    pub tag: String,
    pub title: String,
}

/// Reply to the authentication request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthenticationReply {
    pub accepted: bool,
    pub set_cookie: Vec<String>,
}

/// Profile data pushed by the server.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserProfile {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub balance: Option<f64>,
}

/// Reason a bet request was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BetError {
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("bet already placed for this round")]
    AlreadyPlaced,
    #[error("game not accepting bets")]
    NotAcceptingBets,
    #[error("bet failed: {0}")]
    Other(String),
}

impl BetError {
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low balance" => BetError::InsufficientBalance,
            "bet already placed" | "already bet" => BetError::AlreadyPlaced,
            "game not accepting bets" => BetError::NotAcceptingBets,
            _ => BetError::Other(raw.to_string()),
        }
    }

    /// Recoverable errors state that the prior server-side state still
    /// holds, so the local `placed` flag must not be reverted.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BetError::AlreadyPlaced | BetError::NotAcceptingBets)
    }
}

/// What a `bet` reply says happened.
#[derive(Clone, Debug, PartialEq)]
pub enum BetOutcome {
    /// Bet accepted and waiting for its round.
    Placed {
        counter: Option<Value>,
        scope: Option<BetScope>,
    },
    Cancelled,
    CashedOut {
        payout: Option<f64>,
    },
    Rejected(BetError),
    /// A `bet` reply this client does not understand.
    Unrecognized,
}

/// A `bet` reply together with the seat it refers to.
#[derive(Clone, Debug, PartialEq)]
pub struct BetReply {
    /// 0-based wire index.
    pub index: u64,
    pub outcome: BetOutcome,
}

impl BetReply {
    pub fn seat(&self) -> Option<SeatId> {
        SeatId::from_index(self.index)
    }
}

/// A round status push.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusUpdate {
    Pause { countdown: f64 },
    Started { h: Option<u64> },
    Progress { k: Option<f64>, h: Option<u64> },
    Crash { k: Option<f64> },
    Unrecognized(String),
}

/// Classified inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    Authentication(AuthenticationReply),
    GameList(Vec<GameListing>),
    Bet(BetReply),
    UserData(UserProfile),
    OptionsAck,
    Status(StatusUpdate),
    Unknown,
}

/// A decoded server frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Inbound {
    pub wallet: Option<Wallet>,
    pub event: ServerEvent,
}

impl Inbound {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(map) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let wallet = map.get("wallet").and_then(parse_wallet);
        let event = classify(&map);
        Ok(Self { wallet, event })
    }

    /// Build a frame carrying only an event (used by tests and replays).
    pub fn event(event: ServerEvent) -> Self {
        Self {
            wallet: None,
            event,
        }
    }
}

fn classify(map: &Map<String, Value>) -> ServerEvent {
    if let Some(auth) = map.get("authentication") {
        return ServerEvent::Authentication(AuthenticationReply {
            accepted: truthy(auth),
            set_cookie: parse_cookies(map.get("set_cookie")),
        });
    }
    if let Some(list) = map.get("game_list").filter(|v| truthy(v)) {
        return ServerEvent::GameList(parse_game_list(list));
    }
    if let Some(bet) = map.get("bet") {
        return ServerEvent::Bet(parse_bet(map, bet));
    }
    if let Some(profile) = map
        .get("userData")
        .or_else(|| map.get("user_data"))
        .filter(|v| truthy(v))
    {
        return ServerEvent::UserData(parse_profile(profile));
    }
    if map.get("get").and_then(Value::as_str) == Some("user_data") {
        if let Some(user) = map.get("user").filter(|v| truthy(v)) {
            return ServerEvent::UserData(parse_profile(user));
        }
    }
    if map
        .get("on")
        .and_then(|on| on.get("set"))
        .and_then(Value::as_str)
        == Some("options")
    {
        return ServerEvent::OptionsAck;
    }
    if let Some(status) = map.get("status").filter(|v| truthy(v)) {
        return ServerEvent::Status(parse_status(map, status));
    }
    ServerEvent::Unknown
}

fn parse_status(map: &Map<String, Value>, status: &Value) -> StatusUpdate {
    let k = map.get("k").and_then(number);
    let h = map.get("h").and_then(ticks);
    match status.as_str() {
        Some("pause") => StatusUpdate::Pause {
            countdown: map
                .get("countdown")
                .and_then(number)
                .filter(|c| *c > 0.0)
                .unwrap_or(0.0),
        },
        Some("started") => StatusUpdate::Started { h },
        Some("progress") => StatusUpdate::Progress { k, h },
        Some("crash") => StatusUpdate::Crash { k },
        Some(other) => StatusUpdate::Unrecognized(other.to_string()),
        None => StatusUpdate::Unrecognized(status.to_string()),
    }
}

fn parse_bet(map: &Map<String, Value>, bet: &Value) -> BetReply {
    let index = map
        .get("PHP")
        .and_then(|php| php.get("index"))
        .or_else(|| map.get("index"))
        .or_else(|| bet.get("index"))
        .and_then(ticks)
        .unwrap_or(0);

    let outcome = match bet {
        Value::Object(fields) => {
            if fields.get("cancel").and_then(Value::as_bool) == Some(true) {
                BetOutcome::Cancelled
            } else if fields.contains_key("cash_out") || fields.contains_key("win") {
                BetOutcome::CashedOut {
                    payout: fields.get("win").and_then(number),
                }
            } else if fields.get("awaiting").is_some_and(truthy) {
                BetOutcome::Placed {
                    counter: fields.get("counter").filter(|c| !c.is_null()).cloned(),
                    scope: fields
                        .get("scope")
                        .and_then(Value::as_str)
                        .and_then(BetScope::parse),
                }
            } else {
                BetOutcome::Unrecognized
            }
        }
        _ if !truthy(bet) => match map.get("error").and_then(Value::as_str) {
            Some(error) if !error.is_empty() => BetOutcome::Rejected(BetError::classify(error)),
            _ => BetOutcome::Unrecognized,
        },
        _ => BetOutcome::Unrecognized,
    };

    BetReply { index, outcome }
}

fn parse_wallet(value: &Value) -> Option<Wallet> {
    let fields = value.as_object()?;
    let wallet = Wallet {
        balance: fields.get("balance").and_then(number),
        currency: fields
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    (wallet.balance.is_some() || wallet.currency.is_some()).then_some(wallet)
}

fn parse_cookies(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(cookie)) if !cookie.is_empty() => vec![cookie.clone()],
        _ => Vec::new(),
    }
}

fn parse_game_list(value: &Value) -> Vec<GameListing> {
    value
        .as_array()
        .map(|games| {
            games
                .iter()
                .filter_map(|game| {
                    let tag = game.get("tag")?.as_str()?.to_string();
                    let title = game
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or(tag.as_str())
                        .to_string();
                    Some(GameListing { tag, title })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_profile(value: &Value) -> UserProfile {
    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    UserProfile {
        name: text("name"),
        avatar: text("avatar"),
        balance: value.get("balance").and_then(number),
    }
}

/// JavaScript-style truthiness, which is what the server was written against.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numbers sometimes arrive as strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn ticks(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    number(value).filter(|n| *n >= 0.0).map(|n| n.round() as u64)
}
