//! Combat Resolution
//!
//! Attribute-driven damage with stance modifiers, one round per
//! simulation tick. Each participant attacks the other in join order.

use std::cmp::Ordering;

use tracing::debug;

use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::{Attributes, DrawReason, MatchOutcome, MatchState, Participant, Stance};

/// Rounds resolved before the match is decided on health.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Damage multiplier applied by an aggressive stance.
pub const AGGRESSIVE_MULTIPLIER: f64 = 1.2;

/// Damage multiplier applied by a defensive stance.
pub const DEFENSIVE_MULTIPLIER: f64 = 0.7;

/// Raw offensive output of an attacker.
pub fn base_damage(attacker: &Attributes) -> f64 {
    let physical_power =
        attacker.strength * 0.4 + attacker.agility * 0.3 + attacker.stamina * 0.3;
    let skill_bonus =
        attacker.unarmed_skill * 0.4 + attacker.weapon_skill * 0.4 + attacker.intelligence * 0.2;

    physical_power + skill_bonus * 0.5
}

/// Damage soaked by a defender.
pub fn total_defense(defender: &Attributes) -> f64 {
    let physical_defense =
        defender.hardiness * 0.5 + defender.agility * 0.3 + defender.stamina * 0.2;
    let skill_defense =
        defender.unarmed_skill * 0.3 + defender.survival_skill * 0.3 + defender.intelligence * 0.4;

    physical_defense + skill_defense * 0.3
}

/// Combined stance factor. An aggressive defender takes more damage.
pub fn stance_multiplier(attacker: Stance, defender: Stance) -> f64 {
    let mut multiplier = 1.0;

    match attacker {
        Stance::Aggressive => multiplier *= AGGRESSIVE_MULTIPLIER,
        Stance::Defensive => multiplier *= DEFENSIVE_MULTIPLIER,
        Stance::Neutral => {}
    }
    match defender {
        Stance::Defensive => multiplier *= DEFENSIVE_MULTIPLIER,
        Stance::Aggressive => multiplier *= AGGRESSIVE_MULTIPLIER,
        Stance::Neutral => {}
    }

    multiplier
}

/// Damage of one attack: floored, never below 1.
pub fn calculate_damage(
    attacker: &Attributes,
    attacker_stance: Stance,
    defender: &Attributes,
    defender_stance: Stance,
) -> u32 {
    let raw = (base_damage(attacker) - total_defense(defender))
        * stance_multiplier(attacker_stance, defender_stance);
    let floored = raw.floor();

    if floored.is_nan() || floored < 1.0 {
        1
    } else {
        // Saturating cast; absurd attributes cap at u32::MAX
        floored as u32
    }
}

/// Damage `attacker` would deal to `defender` with their current stances.
pub fn damage_between(attacker: &Participant, defender: &Participant) -> u32 {
    calculate_damage(
        &attacker.attributes,
        attacker.stance,
        &defender.attributes,
        defender.stance,
    )
}

/// Compare health percentages without division. `Greater` means `a` is
/// healthier.
pub fn compare_health(a: &Participant, b: &Participant) -> Ordering {
    let a_share = u64::from(a.current_health) * u64::from(b.max_health);
    let b_share = u64::from(b.current_health) * u64::from(a.max_health);
    a_share.cmp(&b_share)
}

/// Outcome when the round limit is exceeded.
pub fn decide_on_health(a: &Participant, b: &Participant) -> MatchOutcome {
    match compare_health(a, b) {
        Ordering::Greater => MatchOutcome::Victory { winner: a.id.clone(), loser: b.id.clone() },
        Ordering::Less => MatchOutcome::Victory { winner: b.id.clone(), loser: a.id.clone() },
        Ordering::Equal => MatchOutcome::Draw { reason: DrawReason::HealthTied },
    }
}

/// Resolve one combat round.
///
/// Both exchanges always happen. A participant at zero health afterwards
/// loses; when both are at zero the attacker of the first lethal exchange
/// wins. Otherwise the round advances and, past `max_rounds`, the match is
/// decided on health percentage.
pub fn resolve_round(state: &mut MatchState, max_rounds: u32, now_ms: i64) -> Option<MatchOutcome> {
    if state.participants.len() < 2 {
        return None;
    }

    let round = state.round_number;
    let mut first_lethal: Option<usize> = None;

    for (attacker_idx, defender_idx) in [(0usize, 1usize), (1, 0)] {
        let damage = damage_between(&state.participants[attacker_idx], &state.participants[defender_idx]);
        let remaining_health = state.participants[defender_idx].take_damage(damage);

        if remaining_health == 0 && first_lethal.is_none() {
            first_lethal = Some(attacker_idx);
        }

        let attacker = &state.participants[attacker_idx];
        let defender = &state.participants[defender_idx];
        debug!(
            "Round {}: {} hits {} for {} ({} left)",
            round, attacker.name, defender.name, damage, remaining_health
        );
        let event = GameEvent::new(
            round,
            GameEventData::DamageDealt {
                attacker: attacker.name.clone(),
                defender: defender.name.clone(),
                attacker_stance: attacker.stance,
                defender_stance: defender.stance,
                damage,
                remaining_health,
            },
        );
        state.push_event(event);
    }

    if let Some(winner_idx) = first_lethal {
        let loser_idx = 1 - winner_idx;
        return Some(MatchOutcome::Victory {
            winner: state.participants[winner_idx].id.clone(),
            loser: state.participants[loser_idx].id.clone(),
        });
    }

    state.round_number += 1;
    state.round_start_time = now_ms;

    if state.round_number > max_rounds {
        return Some(decide_on_health(&state.participants[0], &state.participants[1]));
    }

    state.push_event(GameEvent::round_started(state.round_number, now_ms));
    None
}
