//! Network Layer
//!
//! Session actors and the WebSocket edge. Everything here runs on tokio;
//! match rules live in `game/` and are driven from the session actor.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ChampionData, ClientMessage, CombatUpdate, ErrorCode, ServerMessage};
pub use session::{
    ErrorCategory, JoinAccepted, MatchSession, MatchSnapshot, SessionConfig, SessionError,
    SessionHandle, SessionId, SessionManager,
};
pub use server::{GameServer, GameServerError, ServerConfig};
