//! Match Simulation Steps
//!
//! Pure phase transitions for one match. The session actor calls these on
//! its timers; `simulate_match` drives them headlessly for tests, benches
//! and the demo binary. Nothing here touches a clock or a channel: the
//! caller passes the current unix time in milliseconds.

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::game::combat::{self, DEFAULT_MAX_ROUNDS};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::explore;
use crate::game::map::Position;
use crate::game::state::{
    DrawReason, MatchOutcome, MatchPhase, MatchState, Participant, ParticipantId,
    ParticipantStatus,
};

/// Countdown length in simulation ticks (seconds).
pub const DEFAULT_COUNTDOWN: u32 = 5;

/// Movement ticks before an exploration with no contact is called a draw.
pub const DEFAULT_EXPLORATION_STEP_LIMIT: u32 = 150;

/// How a full match gets from two joined participants to combat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// Fixed countdown straight into combat
    #[default]
    Countdown,
    /// Wander the map until the champions meet
    Exploration,
}

impl StartMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "countdown" => Some(StartMode::Countdown),
            "exploration" => Some(StartMode::Exploration),
            _ => None,
        }
    }
}

/// Simulation knobs for one match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Start mode applied when the second participant joins
    pub start_mode: StartMode,
    /// Countdown ticks before combat (countdown mode)
    pub countdown_secs: u32,
    /// Rounds before the match is decided on health
    pub max_rounds: u32,
    /// Movement ticks before exploration ends in a draw; `None` never ends
    pub exploration_step_limit: Option<u32>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            start_mode: StartMode::Countdown,
            countdown_secs: DEFAULT_COUNTDOWN,
            max_rounds: DEFAULT_MAX_ROUNDS,
            exploration_step_limit: Some(DEFAULT_EXPLORATION_STEP_LIMIT),
        }
    }
}

/// Result of a simulation step.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated by this step
    pub events: Vec<GameEvent>,
    /// Whether the match finished during this step
    pub match_ended: bool,
    /// Outcome, when the match finished
    pub outcome: Option<MatchOutcome>,
}

impl TickResult {
    fn drain(state: &mut MatchState) -> Self {
        let events = state.take_events();
        let match_ended = events.iter().any(GameEvent::is_match_end);
        let outcome = if match_ended { state.outcome.clone() } else { None };
        Self { events, match_ended, outcome }
    }
}

/// Lock the match once it is full and enter the configured start phase.
pub fn begin_match(state: &mut MatchState, config: &MatchConfig, now_ms: i64) -> TickResult {
    if state.phase != MatchPhase::Waiting || !state.is_full() {
        return TickResult::drain(state);
    }

    for participant in &mut state.participants {
        participant.status = ParticipantStatus::Active;
    }

    match config.start_mode {
        StartMode::Countdown => {
            info!("Match starting, combat in {}s", config.countdown_secs);
            state.phase = MatchPhase::Starting;
            state.countdown = config.countdown_secs;
            let participants = state.summaries();
            state.push_event(GameEvent::new(
                0,
                GameEventData::MatchStarting { countdown: config.countdown_secs, participants },
            ));
            if state.countdown == 0 {
                start_combat(state, now_ms, None);
            }
        }
        StartMode::Exploration => {
            info!("Exploration started");
            state.phase = MatchPhase::Exploration;
            state.exploration_steps = 0;
            state.push_event(GameEvent::exploration_started());
        }
    }

    TickResult::drain(state)
}

/// Enter combat at round 1.
fn start_combat(state: &mut MatchState, now_ms: i64, at: Option<Position>) {
    state.phase = MatchPhase::Combat;
    state.round_number = 1;
    state.round_start_time = now_ms;

    let participant_ids = state.participants.iter().map(|p| p.id.clone()).collect();
    state.push_event(GameEvent::new(
        1,
        GameEventData::CombatStarted {
            participant_ids,
            round_number: 1,
            start_time: now_ms,
            position: at,
        },
    ));
}

/// Run one simulation tick: a countdown step or a combat round.
pub fn tick(state: &mut MatchState, config: &MatchConfig, now_ms: i64) -> TickResult {
    match state.phase {
        MatchPhase::Starting => {
            state.countdown = state.countdown.saturating_sub(1);
            state.push_event(GameEvent::countdown(state.countdown));
            if state.countdown == 0 {
                start_combat(state, now_ms, None);
            }
        }
        MatchPhase::Combat => {
            if let Some(outcome) = combat::resolve_round(state, config.max_rounds, now_ms) {
                finish(state, outcome);
            }
        }
        MatchPhase::Waiting | MatchPhase::Exploration | MatchPhase::Finished => {}
    }

    TickResult::drain(state)
}

/// Run one movement tick during exploration.
pub fn movement_tick(state: &mut MatchState, config: &MatchConfig, now_ms: i64) -> TickResult {
    if state.phase != MatchPhase::Exploration {
        return TickResult::drain(state);
    }

    if let Some(collision) = explore::step(state) {
        info!(
            "{} and {} met at {}, combat begins",
            collision.participants[0], collision.participants[1], collision.position
        );
        start_combat(state, now_ms, Some(collision.position));
        return TickResult::drain(state);
    }

    state.exploration_steps += 1;
    if let Some(limit) = config.exploration_step_limit {
        if state.exploration_steps >= limit {
            info!("No engagement after {} movement ticks", state.exploration_steps);
            finish(state, MatchOutcome::Draw { reason: DrawReason::NoEngagement });
        }
    }

    TickResult::drain(state)
}

/// Remove a participant. A remaining participant in a running match wins
/// by forfeit. Returns the departed participant, if it was present.
pub fn handle_departure(
    state: &mut MatchState,
    id: &ParticipantId,
    consented: bool,
) -> (Option<Participant>, TickResult) {
    let phase = state.phase;
    let Some(departed) = state.remove_participant(id) else {
        return (None, TickResult::drain(state));
    };

    debug!("{} left during {:?} (consented: {})", departed.id, phase, consented);
    state.push_event(GameEvent::participant_left(state.round_number, departed.id.clone(), consented));

    if phase.is_in_progress() {
        let remaining = state.participants.first().map(|p| p.id.clone());
        if let Some(winner) = remaining {
            finish(state, MatchOutcome::Forfeit { winner, leaver: departed.id.clone() });
        }
    }

    (Some(departed), TickResult::drain(state))
}

/// Enter the terminal phase with an outcome.
pub fn finish(state: &mut MatchState, outcome: MatchOutcome) {
    if state.is_finished() {
        return;
    }

    if let MatchOutcome::Victory { loser, .. } = &outcome {
        if let Some(participant) = state.participant_mut(loser) {
            participant.status = ParticipantStatus::Defeated;
        }
    }

    info!("Match finished: {:?}", outcome);
    state.phase = MatchPhase::Finished;
    state.outcome = Some(outcome.clone());

    let participants = state.summaries();
    state.push_event(GameEvent::new(
        state.round_number,
        GameEventData::MatchEnded { outcome, participants },
    ));
}

/// Upper bound on simulated seconds for a headless match.
const SIMULATION_SECONDS_LIMIT: u32 = 100_000;

/// Run a full match without timers: one simulation tick per second and a
/// movement tick every second second.
///
/// Returns the final state and every event in order.
pub fn simulate_match(
    initial_state: MatchState,
    config: &MatchConfig,
    start_ms: i64,
) -> (MatchState, Vec<GameEvent>) {
    let mut state = initial_state;
    let mut all_events = state.take_events();

    all_events.extend(begin_match(&mut state, config, start_ms).events);

    for second in 1..=SIMULATION_SECONDS_LIMIT {
        if state.is_finished() {
            break;
        }
        let now_ms = start_ms + i64::from(second) * 1_000;

        if second % 2 == 0 {
            all_events.extend(movement_tick(&mut state, config, now_ms).events);
        }
        all_events.extend(tick(&mut state, config, now_ms).events);
    }

    (state, all_events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Attributes, ChampionProfile};

    fn joined(seed: u64, a: Attributes, b: Attributes) -> MatchState {
        let mut state = MatchState::new(seed).unwrap();
        for (id, attributes) in [("a", a), ("b", b)] {
            state
                .add_participant(ChampionProfile {
                    id: ParticipantId::new(id),
                    name: id.to_uppercase(),
                    attributes,
                })
                .unwrap();
        }
        state.take_events();
        state
    }

    fn exploration_config() -> MatchConfig {
        MatchConfig { start_mode: StartMode::Exploration, ..MatchConfig::default() }
    }

    #[test]
    fn test_countdown_then_combat() {
        let mut state = joined(1, Attributes::uniform(10.0), Attributes::uniform(10.0));
        let config = MatchConfig::default();

        let start = begin_match(&mut state, &config, 0);
        assert_eq!(state.phase, MatchPhase::Starting);
        assert!(matches!(
            start.events[0].data,
            GameEventData::MatchStarting { countdown: 5, ref participants } if participants.len() == 2
        ));

        for remaining in (1..5).rev() {
            let result = tick(&mut state, &config, 0);
            assert_eq!(result.events[0].data, GameEventData::Countdown { seconds_remaining: remaining });
            assert_eq!(state.phase, MatchPhase::Starting);
        }

        let result = tick(&mut state, &config, 5_000);
        assert_eq!(state.phase, MatchPhase::Combat);
        assert_eq!(state.round_number, 1);
        assert_eq!(state.round_start_time, 5_000);
        assert!(matches!(
            result.events[1].data,
            GameEventData::CombatStarted { round_number: 1, position: None, .. }
        ));
    }

    #[test]
    fn test_begin_requires_full_match() {
        let mut state = MatchState::new(1).unwrap();
        state
            .add_participant(ChampionProfile {
                id: ParticipantId::new("solo"),
                name: "Solo".into(),
                attributes: Attributes::default(),
            })
            .unwrap();

        begin_match(&mut state, &MatchConfig::default(), 0);
        assert_eq!(state.phase, MatchPhase::Waiting);
    }

    #[test]
    fn test_exploration_ends_in_combat_or_draw() {
        let config = exploration_config();
        let mut state = joined(42, Attributes::uniform(10.0), Attributes::uniform(10.0));

        begin_match(&mut state, &config, 0);
        assert_eq!(state.phase, MatchPhase::Exploration);

        let mut saw_combat = false;
        for step in 0..DEFAULT_EXPLORATION_STEP_LIMIT {
            let result = movement_tick(&mut state, &config, i64::from(step) * 2_000);
            if let Some(event) = result
                .events
                .iter()
                .find(|e| matches!(e.data, GameEventData::CombatStarted { .. }))
            {
                let a = state.participants[0].position;
                assert_eq!(a, state.participants[1].position);
                assert!(matches!(event.data, GameEventData::CombatStarted { position: Some(p), .. } if p == a));
                saw_combat = true;
                break;
            }
        }

        if saw_combat {
            assert_eq!(state.phase, MatchPhase::Combat);
        } else {
            assert_eq!(
                state.outcome,
                Some(MatchOutcome::Draw { reason: DrawReason::NoEngagement })
            );
        }
    }

    #[test]
    fn test_exploration_step_limit() {
        let config = MatchConfig {
            exploration_step_limit: Some(1),
            ..exploration_config()
        };
        let mut state = joined(3, Attributes::default(), Attributes::default());
        begin_match(&mut state, &config, 0);

        // Spawns are 16 rows apart, so one step cannot bring them together
        let result = movement_tick(&mut state, &config, 2_000);
        assert!(result.match_ended);
        assert_eq!(
            result.outcome,
            Some(MatchOutcome::Draw { reason: DrawReason::NoEngagement })
        );
        assert!(result.events.last().is_some_and(GameEvent::is_match_end));
    }

    #[test]
    fn test_movement_ignored_outside_exploration() {
        let mut state = joined(3, Attributes::default(), Attributes::default());
        let before = state.participants.clone();

        let result = movement_tick(&mut state, &exploration_config(), 0);
        assert!(result.events.is_empty());
        assert_eq!(state.participants, before);
    }

    #[test]
    fn test_forfeit_during_combat() {
        let config = MatchConfig { countdown_secs: 0, ..MatchConfig::default() };
        let mut state = joined(1, Attributes::uniform(10.0), Attributes::uniform(10.0));
        begin_match(&mut state, &config, 0);
        assert_eq!(state.phase, MatchPhase::Combat);

        let (departed, result) = handle_departure(&mut state, &ParticipantId::new("a"), true);
        assert_eq!(departed.map(|p| p.id), Some(ParticipantId::new("a")));
        assert_eq!(
            result.outcome,
            Some(MatchOutcome::Forfeit {
                winner: ParticipantId::new("b"),
                leaver: ParticipantId::new("a"),
            })
        );
        assert!(matches!(result.events[0].data, GameEventData::ParticipantLeft { consented: true, .. }));
        assert!(state.is_finished());
    }

    #[test]
    fn test_departure_while_waiting_is_not_forfeit() {
        let mut state = MatchState::new(1).unwrap();
        state
            .add_participant(ChampionProfile {
                id: ParticipantId::new("a"),
                name: "A".into(),
                attributes: Attributes::default(),
            })
            .unwrap();

        let (departed, result) = handle_departure(&mut state, &ParticipantId::new("a"), false);
        assert!(departed.is_some());
        assert!(!result.match_ended);
        assert_eq!(state.phase, MatchPhase::Waiting);

        let (missing, _) = handle_departure(&mut state, &ParticipantId::new("a"), false);
        assert!(missing.is_none());
    }

    #[test]
    fn test_departure_after_finish_keeps_outcome() {
        let mut state = joined(1, Attributes::default(), Attributes::default());
        finish(&mut state, MatchOutcome::Draw { reason: DrawReason::HealthTied });
        state.take_events();

        let (_, result) = handle_departure(&mut state, &ParticipantId::new("a"), true);
        assert!(!result.match_ended);
        assert_eq!(state.outcome, Some(MatchOutcome::Draw { reason: DrawReason::HealthTied }));
    }

    #[test]
    fn test_simulated_match_is_deterministic() {
        let config = exploration_config();
        let a = Attributes { strength: 40.0, agility: 20.0, ..Attributes::uniform(10.0) };
        let b = Attributes::uniform(15.0);

        let (first, first_events) = simulate_match(joined(777, a, b), &config, 0);
        let (second, second_events) = simulate_match(joined(777, a, b), &config, 0);

        assert!(first.is_finished());
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first_events, second_events);
        assert!(first_events.last().is_some_and(GameEvent::is_match_end));
    }

    #[test]
    fn test_simulated_countdown_match_has_winner() {
        let strong = Attributes { strength: 80.0, weapon_skill: 40.0, ..Attributes::default() };
        let (state, events) = simulate_match(
            joined(5, strong, Attributes::default()),
            &MatchConfig::default(),
            0,
        );

        assert_eq!(state.winner_id(), Some(&ParticipantId::new("a")));
        let loser = state.participant(&ParticipantId::new("b")).unwrap();
        assert_eq!(loser.status, ParticipantStatus::Defeated);
        assert_eq!(loser.current_health, 0);
        assert!(events.iter().any(|e| matches!(e.data, GameEventData::Countdown { .. })));
    }

    #[test]
    fn test_random_matches_always_settle() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        for _ in 0..25 {
            let seed: u64 = rng.gen();
            let a = Attributes::uniform(rng.gen_range(0.0..60.0));
            let b = Attributes { strength: rng.gen_range(0.0..90.0), ..Attributes::uniform(rng.gen_range(0.0..60.0)) };

            let (state, events) = simulate_match(joined(seed, a, b), &exploration_config(), 0);

            assert!(state.is_finished(), "seed {} never finished", seed);
            assert_eq!(events.iter().filter(|e| e.is_match_end()).count(), 1, "seed {}", seed);
            assert!(events.last().is_some_and(GameEvent::is_match_end));

            for event in &events {
                if let GameEventData::PositionChanged { position, .. } = &event.data {
                    assert!(state.map.is_walkable(*position), "seed {} walked onto {}", seed, position);
                }
            }
            for participant in &state.participants {
                assert!(participant.current_health <= participant.max_health);
            }

            let fought = events.iter().any(|e| matches!(e.data, GameEventData::CombatStarted { .. }));
            if state.outcome == Some(MatchOutcome::Draw { reason: DrawReason::NoEngagement }) {
                assert!(!fought);
            } else {
                assert!(fought);
            }
        }
    }
}
