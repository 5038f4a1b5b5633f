//! Champion Status Store
//!
//! Port to the external record of what each champion is doing. The match
//! engine reserves a champion on join, releases it when it leaves, and
//! reports the result when a match is decided.

mod memory;

use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::game::state::ParticipantId;

pub use memory::{InMemoryChampionStore, DEFAULT_RECOVERY_SECS};

/// Champion availability as recorded outside the match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChampionStatus {
    #[default]
    Available,
    Training,
    Arena,
    Recovering,
}

impl ChampionStatus {
    /// A champion already training or fighting cannot join a match.
    pub fn is_busy(self) -> bool {
        matches!(self, ChampionStatus::Arena | ChampionStatus::Training)
    }
}

/// Returned by the store when a result is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    #[serde(rename = "recoveryDurationSeconds")]
    pub recovery_duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("champion not found: {0}")]
    NotFound(ParticipantId),
    #[error("status store unavailable: {0}")]
    Unavailable(String),
}

/// External champion-status record.
#[async_trait]
pub trait ChampionStatusStore: Send + Sync {
    async fn get_status(&self, id: &ParticipantId) -> Result<ChampionStatus, StoreError>;

    async fn set_status(&self, id: &ParticipantId, status: ChampionStatus) -> Result<(), StoreError>;

    /// Winner becomes available, loser starts recovering.
    async fn report_match_result(
        &self,
        winner: &ParticipantId,
        loser: &ParticipantId,
    ) -> Result<MatchReport, StoreError>;
}
