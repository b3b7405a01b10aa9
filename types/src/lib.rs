//! Shared types for the skyrocket crash-game client.

pub mod api;
pub mod round;

pub use api::{
    AuthenticationReply, BetError, BetOutcome, BetReply, ClientLocation, ClientMessage,
    GameListing, Inbound, ProtocolError, ServerEvent, StatusUpdate, UserProfile, Wallet,
};
pub use round::{
    currency_symbol, format_multiplier, round2, BetScope, InvalidSeat, MultiplierBand, RoundPhase,
    SeatId, BASE_MULTIPLIER, DEFAULT_BET_AMOUNT, MAX_BET_AMOUNT, MIN_AUTO_CASHOUT, MIN_BET_AMOUNT,
};
