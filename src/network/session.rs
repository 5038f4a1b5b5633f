//! Match Session Management
//!
//! One actor task per match. The actor owns the match state and serializes
//! everything through a single `select!` loop: commands from handles, the
//! simulation interval, the movement interval (exploration only) and the
//! teardown deadline. Events fan out on a broadcast channel; the latest
//! snapshot is published on a watch channel.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::core::rng::derive_session_seed;
use crate::game::map::{MapError, Position, SpawnSide};
use crate::game::state::{
    ChampionProfile, JoinError, MatchOutcome, MatchPhase, MatchState, Participant,
    ParticipantId, ParticipantSummary, Stance,
};
use crate::game::tick::{self, MatchConfig, StartMode, TickResult};
use crate::network::protocol::{ErrorCode, ServerMessage};
use crate::store::{ChampionStatus, ChampionStatusStore, StoreError};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Short hex prefix used in logs.
fn short_id(id: &SessionId) -> String {
    hex::encode(&id[..4])
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Bounded retry for status writes made during a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay after the first failure; grows linearly.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Configuration for a match session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pure simulation settings.
    pub match_config: MatchConfig,
    /// Countdown steps and combat rounds.
    pub tick_interval: Duration,
    /// Exploration moves.
    pub movement_interval: Duration,
    /// Delay between match end and disposal.
    pub teardown_grace: Duration,
    /// Upper bound on a single status-store call made at join time.
    pub store_timeout: Duration,
    /// Retry policy for status writes during the match.
    pub status_retry: RetryPolicy,
    /// Command queue capacity.
    pub command_buffer: usize,
    /// Event broadcast capacity.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            match_config: MatchConfig::default(),
            tick_interval: Duration::from_secs(1),
            movement_interval: Duration::from_secs(2),
            teardown_grace: Duration::from_secs(5),
            store_timeout: Duration::from_secs(2),
            status_retry: RetryPolicy::default(),
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl SessionConfig {
    /// Load from `ARENA_*` environment variables, falling back to defaults.
    ///
    /// An `ARENA_EXPLORATION_STEP_LIMIT` of 0 disables the exploration limit.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut match_config = defaults.match_config.clone();

        if let Some(mode) = std::env::var("ARENA_START_MODE").ok().and_then(|v| StartMode::parse(&v)) {
            match_config.start_mode = mode;
        }
        if let Some(secs) = env_parse("ARENA_COUNTDOWN_SECS") {
            match_config.countdown_secs = secs;
        }
        if let Some(rounds) = env_parse("ARENA_MAX_ROUNDS") {
            match_config.max_rounds = rounds;
        }
        if let Some(limit) = env_parse::<u32>("ARENA_EXPLORATION_STEP_LIMIT") {
            match_config.exploration_step_limit = (limit > 0).then_some(limit);
        }

        Self {
            match_config,
            tick_interval: env_parse("ARENA_TICK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            movement_interval: env_parse("ARENA_MOVEMENT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.movement_interval),
            teardown_grace: env_parse("ARENA_TEARDOWN_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.teardown_grace),
            store_timeout: env_parse("ARENA_STORE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            status_retry: RetryPolicy {
                attempts: env_parse("ARENA_STATUS_RETRIES")
                    .unwrap_or(defaults.status_retry.attempts)
                    .max(1),
                ..defaults.status_retry
            },
            ..defaults
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Broad class of a session error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input from the joiner.
    Validation,
    /// Request clashes with current state.
    Conflict,
    /// Collaborator failed; may succeed later.
    TransientExternal,
    /// Broken internal assumption.
    InvariantViolation,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Champion data absent or malformed.
    #[error("Missing champion data: {0}")]
    MissingChampionData(String),

    /// Champion is training or already fighting.
    #[error("Champion {champion} is busy ({status:?})")]
    ChampionBusy {
        champion: ParticipantId,
        status: ChampionStatus,
    },

    /// Match has two participants or has started.
    #[error("Session is full")]
    SessionFull,

    /// Champion already in this match.
    #[error("Champion {0} already joined")]
    AlreadyJoined(ParticipantId),

    /// Session actor has shut down.
    #[error("Session is closed")]
    Closed,

    /// Status store failure.
    #[error("Status store error: {0}")]
    Store(#[from] StoreError),

    /// Spawn layout unusable.
    #[error("Invalid arena layout: {0}")]
    InvalidLayout(#[from] MapError),

    /// Both spawn sides taken or blocked.
    #[error("No free spawn point on the {} side", .0.as_str())]
    NoSpawnPoint(SpawnSide),
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::MissingChampionData(_) => ErrorCategory::Validation,
            SessionError::ChampionBusy { .. }
            | SessionError::SessionFull
            | SessionError::AlreadyJoined(_)
            | SessionError::Closed => ErrorCategory::Conflict,
            SessionError::Store(_) => ErrorCategory::TransientExternal,
            SessionError::InvalidLayout(_) | SessionError::NoSpawnPoint(_) => {
                ErrorCategory::InvariantViolation
            }
        }
    }

    /// Wire code reported to the joiner.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            SessionError::MissingChampionData(_) => ErrorCode::MissingChampionData,
            SessionError::ChampionBusy { .. } => ErrorCode::ChampionBusy,
            SessionError::SessionFull | SessionError::Closed => ErrorCode::SessionFull,
            SessionError::AlreadyJoined(_) => ErrorCode::AlreadyJoined,
            SessionError::Store(_) => ErrorCode::StoreUnavailable,
            SessionError::InvalidLayout(_) | SessionError::NoSpawnPoint(_) => ErrorCode::InternalError,
        }
    }
}

impl From<JoinError> for SessionError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::SessionFull => SessionError::SessionFull,
            JoinError::AlreadyJoined(id) => SessionError::AlreadyJoined(id),
            JoinError::InvalidAttributes => {
                SessionError::MissingChampionData(JoinError::InvalidAttributes.to_string())
            }
            JoinError::NoSpawnPoint(side) => SessionError::NoSpawnPoint(side),
            JoinError::Map(e) => SessionError::InvalidLayout(e),
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Accepted join.
#[derive(Debug)]
pub struct JoinAccepted {
    pub session_id: SessionId,
    pub participant: Participant,
    /// Subscribed before the join was announced, so the joiner sees its own
    /// `player-joined` and everything after it.
    pub events: broadcast::Receiver<ServerMessage>,
}

impl JoinAccepted {
    /// Spawn position assigned to the joiner.
    pub fn position(&self) -> Position {
        self.participant.position
    }
}

/// Versioned public view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    /// Increases on every published change.
    pub version: u64,
    pub session_id: String,
    pub phase: MatchPhase,
    pub round_number: u32,
    pub round_start_time: i64,
    pub countdown: u32,
    pub winner_id: Option<ParticipantId>,
    pub outcome: Option<MatchOutcome>,
    pub participants: Vec<ParticipantSummary>,
    pub exploration_steps: u32,
    /// Set once the actor has disposed of the session.
    pub closed: bool,
}

impl MatchSnapshot {
    fn capture(id: &SessionId, version: u64, state: &MatchState, closed: bool) -> Self {
        Self {
            version,
            session_id: uuid::Uuid::from_bytes(*id).to_string(),
            phase: state.phase,
            round_number: state.round_number,
            round_start_time: state.round_start_time,
            countdown: state.countdown,
            winner_id: state.winner_id().cloned(),
            outcome: state.outcome.clone(),
            participants: state.summaries(),
            exploration_steps: state.exploration_steps,
            closed,
        }
    }

    /// Still accepting a participant.
    pub fn is_open(&self) -> bool {
        !self.closed && self.phase == MatchPhase::Waiting && self.participants.len() < 2
    }
}

enum SessionCommand {
    Join {
        profile: ChampionProfile,
        reply: oneshot::Sender<Result<JoinAccepted, SessionError>>,
    },
    Leave {
        participant_id: ParticipantId,
        consented: bool,
    },
    SetStance {
        participant_id: ParticipantId,
        stance: String,
    },
    Snapshot {
        reply: oneshot::Sender<MatchSnapshot>,
    },
    Shutdown {
        reason: String,
    },
}

/// Cloneable handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<ServerMessage>,
    snapshot: watch::Receiver<MatchSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Join with a validated champion profile.
    pub async fn join(&self, profile: ChampionProfile) -> Result<JoinAccepted, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Join { profile, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Leave the match. Unknown participants are ignored.
    pub async fn leave(&self, participant_id: ParticipantId, consented: bool) {
        let _ = self
            .commands
            .send(SessionCommand::Leave { participant_id, consented })
            .await;
    }

    /// Request a stance change. Invalid names and out-of-combat requests
    /// are ignored.
    pub async fn set_stance(&self, participant_id: ParticipantId, stance: impl Into<String>) {
        let _ = self
            .commands
            .send(SessionCommand::SetStance { participant_id, stance: stance.into() })
            .await;
    }

    /// Dispose of the session, releasing every champion still present.
    pub async fn shutdown(&self, reason: impl Into<String>) {
        let _ = self
            .commands
            .send(SessionCommand::Shutdown { reason: reason.into() })
            .await;
    }

    /// Snapshot taken by the actor after every command queued before it.
    pub async fn fetch_snapshot(&self) -> Result<MatchSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> MatchSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to broadcast events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }

    /// True once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// The session actor.
pub struct MatchSession {
    id: SessionId,
    config: SessionConfig,
    state: MatchState,
    store: Arc<dyn ChampionStatusStore>,
    events: broadcast::Sender<ServerMessage>,
    snapshot: watch::Sender<MatchSnapshot>,
    version: u64,
    /// Alive only during exploration.
    movement: Option<Interval>,
    teardown_at: Option<Instant>,
    closed: bool,
}

impl MatchSession {
    /// Start a session on the standard arena with a fresh seed.
    pub fn spawn(
        config: SessionConfig,
        store: Arc<dyn ChampionStatusStore>,
    ) -> Result<SessionHandle, SessionError> {
        let id = uuid::Uuid::new_v4().into_bytes();
        let entropy = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        let state = MatchState::new(derive_session_seed(&id, entropy))?;
        Ok(Self::spawn_with_state(id, config, store, state))
    }

    /// Start a session around a prepared match state.
    pub fn spawn_with_state(
        id: SessionId,
        config: SessionConfig,
        store: Arc<dyn ChampionStatusStore>,
        state: MatchState,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (snapshot, snapshot_rx) = watch::channel(MatchSnapshot::capture(&id, 0, &state, false));

        let session = Self {
            id,
            config,
            state,
            store,
            events: events.clone(),
            snapshot,
            version: 0,
            movement: None,
            teardown_at: None,
            closed: false,
        };

        info!("Session {} created (seed {})", short_id(&id), session.state.rng_seed);
        tokio::spawn(session.run(command_rx));

        SessionHandle {
            id,
            commands: command_tx,
            events,
            snapshot: snapshot_rx,
        }
    }

    #[instrument(skip_all, fields(session = %short_id(&self.id)))]
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let period = self.config.tick_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => self.dispose("all handles dropped"),
                },
                _ = ticker.tick() => self.on_tick(),
                _ = next_movement(&mut self.movement) => self.on_movement(),
                _ = deadline(self.teardown_at) => self.teardown(),
            }

            if self.closed {
                break;
            }
        }

        info!("Session closed");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join { profile, reply } => {
                let result = self.handle_join(profile).await;
                if let Err(e) = &result {
                    debug!("Join rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            SessionCommand::Leave { participant_id, consented } => {
                self.handle_leave(&participant_id, consented);
            }
            SessionCommand::SetStance { participant_id, stance } => {
                self.handle_set_stance(&participant_id, &stance);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(MatchSnapshot::capture(
                    &self.id,
                    self.version,
                    &self.state,
                    self.closed,
                ));
            }
            SessionCommand::Shutdown { reason } => {
                self.dispose(&reason);
            }
        }
    }

    async fn handle_join(&mut self, profile: ChampionProfile) -> Result<JoinAccepted, SessionError> {
        if self.state.phase != MatchPhase::Waiting || self.state.is_full() {
            return Err(SessionError::SessionFull);
        }
        if self.state.participant(&profile.id).is_some() {
            return Err(SessionError::AlreadyJoined(profile.id));
        }
        if !profile.attributes.is_valid() {
            return Err(JoinError::InvalidAttributes.into());
        }

        let id = profile.id.clone();
        let status = self
            .store_call(self.store.get_status(&id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => SessionError::MissingChampionData(e.to_string()),
                other => SessionError::Store(other),
            })?;
        if status.is_busy() {
            return Err(SessionError::ChampionBusy { champion: id, status });
        }
        // A timed-out reservation may still land, so failure restores the
        // status read above
        let reserved = self.store_call(self.store.set_status(&id, ChampionStatus::Arena)).await;
        if let Err(e) = reserved {
            self.dispatch_status(id, status);
            return Err(e.into());
        }

        let participant = match self.state.add_participant(profile) {
            Ok(participant) => participant,
            Err(e) => {
                self.dispatch_status(id, status);
                return Err(e.into());
            }
        };
        info!("{} joined on the {} side", participant.id, participant.side.as_str());

        let subscription = self.events.subscribe();
        let events = self.state.take_events();
        self.broadcast_events(&events);

        if self.state.is_full() {
            let result = tick::begin_match(&mut self.state, &self.config.match_config, now_ms());
            self.apply(result);
        } else {
            self.publish();
        }

        Ok(JoinAccepted { session_id: self.id, participant, events: subscription })
    }

    fn handle_leave(&mut self, participant_id: &ParticipantId, consented: bool) {
        let phase = self.state.phase;
        let (departed, result) = tick::handle_departure(&mut self.state, participant_id, consented);
        let Some(departed) = departed else {
            return;
        };
        info!("{} left during {:?}", departed.id, phase);

        if phase != MatchPhase::Finished {
            self.dispatch_status(departed.id, ChampionStatus::Available);
        }
        self.apply(result);

        if self.state.participants.is_empty() && !self.closed {
            self.dispose("empty");
        }
    }

    fn handle_set_stance(&mut self, participant_id: &ParticipantId, stance: &str) {
        let Some(stance) = Stance::parse(stance) else {
            debug!("Ignoring unknown stance {:?} from {}", stance, participant_id);
            return;
        };
        if self.state.set_stance(participant_id, stance) {
            let events = self.state.take_events();
            self.broadcast_events(&events);
            self.publish();
        }
    }

    fn on_tick(&mut self) {
        if !matches!(self.state.phase, MatchPhase::Starting | MatchPhase::Combat) {
            return;
        }
        let result = tick::tick(&mut self.state, &self.config.match_config, now_ms());
        self.apply(result);
    }

    fn on_movement(&mut self) {
        let result = tick::movement_tick(&mut self.state, &self.config.match_config, now_ms());
        self.apply(result);
    }

    /// Broadcast a step's events and react to phase changes.
    fn apply(&mut self, result: TickResult) {
        self.broadcast_events(&result.events);

        if self.state.phase == MatchPhase::Exploration {
            if self.movement.is_none() {
                let period = self.config.movement_interval;
                let mut movement = interval_at(Instant::now() + period, period);
                movement.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.movement = Some(movement);
            }
        } else if self.movement.take().is_some() {
            debug!("Movement timer cancelled");
        }

        if let Some(outcome) = result.outcome {
            self.on_match_end(outcome);
        }

        self.publish();
    }

    /// Settle champion statuses and schedule teardown.
    fn on_match_end(&mut self, outcome: MatchOutcome) {
        match &outcome {
            MatchOutcome::Victory { winner, loser } => {
                self.dispatch_result(winner.clone(), loser.clone());
            }
            MatchOutcome::Forfeit { winner, .. } => {
                self.dispatch_status(winner.clone(), ChampionStatus::Available);
            }
            MatchOutcome::Draw { .. } => {
                let ids: Vec<ParticipantId> =
                    self.state.participants.iter().map(|p| p.id.clone()).collect();
                for id in ids {
                    self.dispatch_status(id, ChampionStatus::Available);
                }
            }
        }

        self.teardown_at = Some(Instant::now() + self.config.teardown_grace);
    }

    /// Grace period over: disconnect whoever is left and close.
    fn teardown(&mut self) {
        self.teardown_at = None;
        let remaining: Vec<ParticipantId> =
            self.state.participants.iter().map(|p| p.id.clone()).collect();
        for id in remaining {
            self.state.remove_participant(&id);
        }
        self.state.take_events();
        self.dispose("match complete");
    }

    /// Close the session. Champions still present in an undecided match are
    /// released to available.
    fn dispose(&mut self, reason: &str) {
        if self.closed {
            return;
        }

        if !self.state.is_finished() {
            let present: Vec<ParticipantId> =
                self.state.participants.iter().map(|p| p.id.clone()).collect();
            for id in present {
                self.dispatch_status(id, ChampionStatus::Available);
            }
        }

        self.movement = None;
        self.teardown_at = None;
        self.closed = true;
        info!("Disposing session: {}", reason);

        let _ = self.events.send(ServerMessage::SessionClosed { reason: reason.to_string() });
        self.publish();
    }

    fn broadcast_events(&self, events: &[crate::game::events::GameEvent]) {
        for event in events {
            let _ = self.events.send(ServerMessage::from(event));
        }
    }

    fn publish(&mut self) {
        self.version += 1;
        self.snapshot
            .send_replace(MatchSnapshot::capture(&self.id, self.version, &self.state, self.closed));
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable("status store timed out".to_string())),
        }
    }

    /// Fire-and-forget status write.
    fn dispatch_status(&self, id: ParticipantId, status: ChampionStatus) {
        let store = Arc::clone(&self.store);
        let policy = self.config.status_retry;
        let session = short_id(&self.id);

        tokio::spawn(async move {
            let what = format!("set {} to {:?}", id, status);
            with_retry(policy, &session, &what, || store.set_status(&id, status)).await;
        });
    }

    /// Fire-and-forget result report.
    fn dispatch_result(&self, winner: ParticipantId, loser: ParticipantId) {
        let store = Arc::clone(&self.store);
        let policy = self.config.status_retry;
        let session = short_id(&self.id);

        tokio::spawn(async move {
            let what = format!("report {} beat {}", winner, loser);
            if let Some(report) =
                with_retry(policy, &session, &what, || store.report_match_result(&winner, &loser)).await
            {
                info!(
                    "Session {}: {} recovering for {}s",
                    session, loser, report.recovery_duration_secs
                );
            }
        });
    }
}

/// Resolves on the next movement tick, or never when exploration is off.
async fn next_movement(movement: &mut Option<Interval>) {
    match movement {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Resolves at the teardown deadline, or never when none is set.
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run a store operation with linear backoff. Failures are logged; the
/// caller never sees an error.
async fn with_retry<T, F, Fut>(policy: RetryPolicy, session: &str, what: &str, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) if attempt < attempts => {
                warn!("Session {}: {} failed (attempt {}/{}): {}", session, what, attempt, attempts, e);
                sleep(policy.backoff * attempt).await;
            }
            Err(e) => {
                error!("Session {}: giving up on {}: {}", session, what, e);
            }
        }
    }
    None
}

fn accepts_joins(handle: &SessionHandle) -> bool {
    !handle.is_closed() && handle.snapshot().is_open()
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Owns every live session and pairs joiners into them.
pub struct SessionManager {
    config: SessionConfig,
    store: Arc<dyn ChampionStatusStore>,
    /// Active sessions.
    sessions: RwLock<BTreeMap<SessionId, SessionHandle>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new(config: SessionConfig, store: Arc<dyn ChampionStatusStore>) -> Self {
        Self {
            config,
            store,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a new, empty session unless one the caller has not tried yet
    /// is open. The check and the insert share one short write lock, so
    /// concurrent joiners that all found nothing open end up in one session.
    async fn create_session(&self, tried: &BTreeSet<SessionId>) -> Result<Option<SessionHandle>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.values().any(|handle| !tried.contains(&handle.id()) && accepts_joins(handle)) {
            return Ok(None);
        }

        let handle = MatchSession::spawn(self.config.clone(), Arc::clone(&self.store))?;
        sessions.insert(handle.id(), handle.clone());
        info!("Created session {}", short_id(&handle.id()));
        Ok(Some(handle))
    }

    /// Open sessions not tried yet, in registry order.
    async fn open_sessions(&self, tried: &BTreeSet<SessionId>) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|handle| !tried.contains(&handle.id()) && accepts_joins(handle))
            .cloned()
            .collect()
    }

    /// Join the first open session with room, creating one when none has.
    ///
    /// The registry lock is never held across a join; each actor refuses a
    /// seat it no longer has, and the joiner moves on to the next session.
    pub async fn join_or_create(
        &self,
        profile: ChampionProfile,
    ) -> Result<(SessionHandle, JoinAccepted), SessionError> {
        let mut tried = BTreeSet::new();

        loop {
            let mut candidates = self.open_sessions(&tried).await;
            if candidates.is_empty() {
                match self.create_session(&tried).await? {
                    Some(handle) => candidates.push(handle),
                    None => continue,
                }
            }

            for handle in candidates {
                tried.insert(handle.id());
                match handle.join(profile.clone()).await {
                    Ok(accepted) => return Ok((handle, accepted)),
                    Err(SessionError::SessionFull | SessionError::Closed) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop handles of sessions whose actor has stopped.
    pub async fn cleanup(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_closed());

        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Cleaned up {} closed sessions", removed);
        }
    }

    /// Shut every session down.
    pub async fn shutdown_all(&self, reason: &str) {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        for handle in handles {
            handle.shutdown(reason).await;
        }
    }
}
