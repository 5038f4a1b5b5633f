//! In-memory champion status store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ChampionStatus, ChampionStatusStore, MatchReport, StoreError};
use crate::game::state::ParticipantId;

/// Time a defeated champion spends recovering.
pub const DEFAULT_RECOVERY_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, Default)]
struct Record {
    status: ChampionStatus,
    /// Bumped on every reported defeat; a recovery timer only releases the
    /// defeat it was started for.
    defeats: u64,
}

/// Status store held in process memory.
///
/// Unknown champions read as available unless the store is strict. After
/// a reported defeat the loser returns to available once the recovery
/// period elapses, provided nothing else changed its status meanwhile and
/// no later defeat restarted the period.
#[derive(Clone)]
pub struct InMemoryChampionStore {
    records: Arc<RwLock<BTreeMap<ParticipantId, Record>>>,
    recovery: Duration,
    strict: bool,
    fail_writes: Arc<AtomicBool>,
    ack_delay: Duration,
}

impl InMemoryChampionStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            recovery: Duration::from_secs(DEFAULT_RECOVERY_SECS),
            strict: false,
            fail_writes: Arc::new(AtomicBool::new(false)),
            ack_delay: Duration::ZERO,
        }
    }

    pub fn with_recovery(mut self, recovery: Duration) -> Self {
        self.recovery = recovery;
        self
    }

    /// Unknown champions are reported as not found.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Delay every write's reply by `delay` after the write has taken
    /// effect, like a remote store whose acknowledgements are slow.
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    /// Register a champion with a starting status.
    pub async fn insert(&self, id: ParticipantId, status: ChampionStatus) {
        self.records.write().await.entry(id).or_default().status = status;
    }

    /// Make every write fail with `Unavailable` until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }

    async fn acknowledge(&self) {
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
        }
    }

    fn schedule_recovery(&self, id: ParticipantId, defeat: u64) {
        let records = Arc::clone(&self.records);
        let recovery = self.recovery;

        tokio::spawn(async move {
            tokio::time::sleep(recovery).await;

            let mut records = records.write().await;
            match records.get_mut(&id) {
                Some(record) if record.status == ChampionStatus::Recovering && record.defeats == defeat => {
                    record.status = ChampionStatus::Available;
                    info!("Champion {} recovered", id);
                }
                Some(record) if record.defeats != defeat => {
                    debug!("Champion {}: recovery superseded by a later defeat", id);
                }
                _ => {}
            }
        });
    }
}

impl Default for InMemoryChampionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChampionStatusStore for InMemoryChampionStore {
    async fn get_status(&self, id: &ParticipantId) -> Result<ChampionStatus, StoreError> {
        match self.records.read().await.get(id) {
            Some(record) => Ok(record.status),
            None if self.strict => Err(StoreError::NotFound(id.clone())),
            None => Ok(ChampionStatus::Available),
        }
    }

    async fn set_status(&self, id: &ParticipantId, status: ChampionStatus) -> Result<(), StoreError> {
        self.check_writable()?;
        debug!("Champion {} -> {:?}", id, status);
        self.records.write().await.entry(id.clone()).or_default().status = status;
        self.acknowledge().await;
        Ok(())
    }

    async fn report_match_result(
        &self,
        winner: &ParticipantId,
        loser: &ParticipantId,
    ) -> Result<MatchReport, StoreError> {
        self.check_writable()?;
        let defeat = {
            let mut records = self.records.write().await;
            records.entry(winner.clone()).or_default().status = ChampionStatus::Available;
            let record = records.entry(loser.clone()).or_default();
            record.status = ChampionStatus::Recovering;
            record.defeats += 1;
            record.defeats
        };
        self.schedule_recovery(loser.clone(), defeat);
        self.acknowledge().await;

        Ok(MatchReport { recovery_duration_secs: self.recovery.as_secs() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[tokio::test]
    async fn test_unknown_champion() {
        let lenient = InMemoryChampionStore::new();
        assert_eq!(lenient.get_status(&id("x")).await, Ok(ChampionStatus::Available));

        let strict = InMemoryChampionStore::new().strict();
        assert_eq!(strict.get_status(&id("x")).await, Err(StoreError::NotFound(id("x"))));
    }

    #[tokio::test]
    async fn test_set_and_fail_writes() {
        let store = InMemoryChampionStore::new();
        store.set_status(&id("a"), ChampionStatus::Arena).await.unwrap();
        assert_eq!(store.get_status(&id("a")).await, Ok(ChampionStatus::Arena));

        store.set_fail_writes(true);
        assert!(matches!(
            store.set_status(&id("a"), ChampionStatus::Available).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.get_status(&id("a")).await, Ok(ChampionStatus::Arena));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_timer() {
        let store = InMemoryChampionStore::new();

        let report = store.report_match_result(&id("w"), &id("l")).await.unwrap();
        assert_eq!(report.recovery_duration_secs, 300);
        assert_eq!(store.get_status(&id("w")).await, Ok(ChampionStatus::Available));
        assert_eq!(store.get_status(&id("l")).await, Ok(ChampionStatus::Recovering));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(store.get_status(&id("l")).await, Ok(ChampionStatus::Recovering));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get_status(&id("l")).await, Ok(ChampionStatus::Available));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_does_not_clobber_new_status() {
        let store = InMemoryChampionStore::new().with_recovery(Duration::from_secs(10));
        store.report_match_result(&id("w"), &id("l")).await.unwrap();

        store.set_status(&id("l"), ChampionStatus::Training).await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(store.get_status(&id("l")).await, Ok(ChampionStatus::Training));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_defeat_restarts_recovery() {
        let store = InMemoryChampionStore::new().with_recovery(Duration::from_secs(300));
        store.report_match_result(&id("w"), &id("l")).await.unwrap();

        // Rejoins while recovering and loses again 200s later
        tokio::time::sleep(Duration::from_secs(200)).await;
        store.set_status(&id("l"), ChampionStatus::Arena).await.unwrap();
        store.report_match_result(&id("w"), &id("l")).await.unwrap();

        // The first timer fires at 300s and must leave the second defeat alone
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(store.get_status(&id("l")).await, Ok(ChampionStatus::Recovering));

        tokio::time::sleep(Duration::from_secs(151)).await;
        assert_eq!(store.get_status(&id("l")).await, Ok(ChampionStatus::Available));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ack_applies_before_reply() {
        let store = InMemoryChampionStore::new().with_ack_delay(Duration::from_secs(3));
        let writer = store.clone();
        let write = tokio::spawn(async move { writer.set_status(&id("a"), ChampionStatus::Arena).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!write.is_finished());
        assert_eq!(store.records.read().await.get(&id("a")).map(|r| r.status), Some(ChampionStatus::Arena));

        assert_eq!(write.await.unwrap(), Ok(()));
    }
}
