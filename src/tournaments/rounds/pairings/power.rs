//! Power-matched pairings for preliminary rounds.
//!
//! Teams are ranked, grouped into brackets by win count and paired with the
//! adjacent team in their bracket. A bracket with an odd number of teams
//! sends its lowest ranked team down to the top of the next bracket.

use itertools::Itertools;
use rand::seq::SliceRandom;

use crate::{
    Error,
    tournaments::{
        config::{ByePolicy, FirstRoundPolicy},
        rounds::{
            pairings::{
                Pairing, PairingInput, ProposedTrial, UnresolvableConstraint,
            },
            trials::Side,
        },
        standings::history::TeamHistory,
        teams::Team,
    },
};

/// Pairs a preliminary round.
pub fn pair_preliminary(mut input: PairingInput) -> Result<Pairing, Error> {
    if input.teams.is_empty() {
        return Err(Error::InvalidPairingInput(
            "there are no teams to pair".to_string(),
        ));
    }

    let first_round = input.round.number == 1;

    let mut ordered = if first_round {
        first_round_order(&mut input)
    } else {
        power_order(&input)
    };

    let mut warnings = Vec::new();
    let mut byes = Vec::new();

    if ordered.len() % 2 == 1 {
        match input.policy.bye {
            ByePolicy::Disallow => {
                return Err(Error::InvalidPairingInput(format!(
                    "an even number of teams is required, but there are {} \
                     (no bye policy is configured)",
                    ordered.len()
                )));
            }
            ByePolicy::LowestRanked => {
                let (idx, _) = ordered
                    .iter()
                    .enumerate()
                    .rev()
                    .min_by_key(|(_, (team, _))| {
                        input.history.bye_count(&team.id)
                    })
                    .ok_or_else(|| {
                        Error::Internal("no team to give a bye".to_string())
                    })?;
                let (team, _) = ordered.remove(idx);

                tracing::warn!(team = %team.id, "assigning bye");
                warnings.push(UnresolvableConstraint::Bye {
                    team: team.id.clone(),
                });
                byes.push(team);
            }
        }
    }

    let brackets = if first_round {
        vec![ordered.into_iter().map(|(team, _)| team).collect()]
    } else {
        make_brackets(ordered)?
    };

    let mut trials = Vec::with_capacity(input.teams.len() / 2);

    for bracket in brackets {
        let mut pairs = bracket
            .into_iter()
            .tuples::<(Team, Team)>()
            .collect::<Vec<_>>();

        warnings.extend(avoid_repeat_opponents(&mut pairs, &input.history));

        for (a, b) in pairs {
            let (trial, warning) =
                allocate_sides(a, b, input.round.number, &input.history);
            warnings.extend(warning);
            trials.push(trial);
        }
    }

    Ok(Pairing {
        trials,
        byes,
        warnings,
    })
}

/// Order used for the first round, where nobody has a record yet.
fn first_round_order(input: &mut PairingInput) -> Vec<(Team, u32)> {
    let mut teams = input.teams.clone();
    teams.sort_by(|a, b| {
        a.team_number.cmp(&b.team_number).then_with(|| a.id.cmp(&b.id))
    });

    if input.policy.first_round == FirstRoundPolicy::Random {
        teams.shuffle(&mut input.rng);
    }

    teams.into_iter().map(|team| (team, 0)).collect()
}

/// Eligible teams in standings order, with their win counts.
fn power_order(input: &PairingInput) -> Vec<(Team, u32)> {
    input
        .standings
        .ranked
        .iter()
        .filter(|ranked| input.teams.iter().any(|t| t.id == ranked.team.id))
        .map(|ranked| (ranked.team.clone(), ranked.record.wins))
        .collect()
}

/// Splits teams (ordered best first) into even-sized brackets of equal win
/// count, pulling the lowest ranked team of an odd bracket down into the
/// next one.
fn make_brackets(ordered: Vec<(Team, u32)>) -> Result<Vec<Vec<Team>>, Error> {
    let mut brackets = Vec::new();
    let mut carried: Vec<Team> = Vec::new();

    for (wins, group) in &ordered.into_iter().chunk_by(|(_, wins)| *wins) {
        let mut bracket = std::mem::take(&mut carried);
        bracket.extend(group.map(|(team, _)| team));

        if bracket.len() % 2 == 1
            && let Some(lowest) = bracket.pop()
        {
            tracing::debug!(team = %lowest.id, wins, "pulling team down");
            carried.push(lowest);
        }

        if !bracket.is_empty() {
            brackets.push(bracket);
        }
    }

    if !carried.is_empty() {
        return Err(Error::Internal(
            "odd team left over after bracketing".to_string(),
        ));
    }

    Ok(brackets)
}

/// Swaps opponents within a bracket so that teams do not meet again.
///
/// Each repeated pairing gets a single swap with another pair of the same
/// bracket, tried nearest first; if no swap removes the repeat without
/// creating another, the repeat is kept and reported.
fn avoid_repeat_opponents(
    pairs: &mut [(Team, Team)],
    history: &TeamHistory,
) -> Vec<UnresolvableConstraint> {
    let met = |a: &Team, b: &Team| history.have_met(&a.id, &b.id);
    let mut warnings = Vec::new();

    for i in 0..pairs.len() {
        if !met(&pairs[i].0, &pairs[i].1) {
            continue;
        }

        let candidates = (i + 1..pairs.len()).chain((0..i).rev());
        let mut resolved = false;

        for j in candidates {
            let (a, b) = pairs[i].clone();
            let (c, d) = pairs[j].clone();

            let swapped = if !met(&a, &c) && !met(&b, &d) {
                Some(((a, c), (b, d)))
            } else if !met(&a, &d) && !met(&b, &c) {
                Some(((a, d), (b, c)))
            } else {
                None
            };

            if let Some((first, second)) = swapped {
                tracing::debug!(
                    first = ?(&first.0.id, &first.1.id),
                    second = ?(&second.0.id, &second.1.id),
                    "swapped opponents to avoid a repeat pairing"
                );
                pairs[i] = first;
                pairs[j] = second;
                resolved = true;
                break;
            }
        }

        if !resolved {
            let (a, b) = &pairs[i];
            tracing::warn!(a = %a.id, b = %b.id, "accepting repeat pairing");
            warnings.push(UnresolvableConstraint::OpponentRepeat {
                teams: (a.id.clone(), b.id.clone()),
            });
        }
    }

    warnings
}

/// Chooses which team prosecutes.
///
/// Neither team should argue the side it argued in the previous round. When
/// both orders satisfy this, the lower team number prosecutes; when neither
/// does, the team which has prosecuted less often prosecutes and the repeat
/// is reported.
fn allocate_sides(
    a: Team,
    b: Team,
    round_number: i64,
    history: &TeamHistory,
) -> (ProposedTrial, Option<UnresolvableConstraint>) {
    let last_a = history.side_before(&a.id, round_number);
    let last_b = history.side_before(&b.id, round_number);

    let a_may_prosecute =
        last_a != Some(Side::Prosecution) && last_b != Some(Side::Defense);
    let b_may_prosecute =
        last_b != Some(Side::Prosecution) && last_a != Some(Side::Defense);

    let lower_number_first = |a: Team, b: Team| {
        if (a.team_number, &a.id) <= (b.team_number, &b.id) {
            (a, b)
        } else {
            (b, a)
        }
    };

    let (prosecution, defense) = match (a_may_prosecute, b_may_prosecute) {
        (true, true) => lower_number_first(a, b),
        (true, false) => (a, b),
        (false, true) => (b, a),
        (false, false) => {
            let (a_pros, _) = history.side_counts(&a.id);
            let (b_pros, _) = history.side_counts(&b.id);
            match a_pros.cmp(&b_pros) {
                std::cmp::Ordering::Less => (a, b),
                std::cmp::Ordering::Greater => (b, a),
                std::cmp::Ordering::Equal => lower_number_first(a, b),
            }
        }
    };

    let warning = [(&prosecution, Side::Prosecution), (&defense, Side::Defense)]
        .into_iter()
        .find(|(team, side)| {
            history.side_before(&team.id, round_number) == Some(*side)
        })
        .map(|(team, side)| {
            tracing::warn!(team = %team.id, %side, "team repeats a side");
            UnresolvableConstraint::SideRepeat {
                team: team.id.clone(),
                side,
            }
        });

    (
        ProposedTrial {
            prosecution,
            defense,
        },
        warning,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test::fixtures::{pairing_input, round, trial};
    use crate::tournaments::{
        config::PairingPolicy,
        rounds::trials::Trial,
        standings::history::TeamHistory,
    };

    fn numbers(pairing: &Pairing) -> Vec<(i64, i64)> {
        pairing
            .trials
            .iter()
            .map(|t| (t.prosecution.team_number, t.defense.team_number))
            .collect()
    }

    fn history_of(trials: &[Trial], rounds: usize) -> TeamHistory {
        let rounds = (1..=rounds)
            .map(|n| round(&format!("r{n}"), n as i64))
            .collect::<Vec<_>>();
        TeamHistory::from_records(&rounds, trials, &[])
    }

    #[test]
    fn first_round_pairs_by_team_number() {
        let input = pairing_input(1, 8, &[], TeamHistory::default());
        let pairing = pair_preliminary(input).unwrap();

        assert_eq!(numbers(&pairing), vec![(1, 2), (3, 4), (5, 6), (7, 8)]);
        assert!(pairing.warnings.is_empty());
        assert!(pairing.byes.is_empty());
    }

    #[test]
    fn odd_team_count_is_rejected_without_bye_policy() {
        let input = pairing_input(1, 7, &[], TeamHistory::default());
        assert!(matches!(
            pair_preliminary(input),
            Err(Error::InvalidPairingInput(_))
        ));
    }

    #[test]
    fn empty_team_list_is_rejected() {
        let input = pairing_input(1, 0, &[], TeamHistory::default());
        assert!(matches!(
            pair_preliminary(input),
            Err(Error::InvalidPairingInput(_))
        ));
    }

    #[test]
    fn bye_goes_to_lowest_ranked_team_without_a_bye() {
        let mut input = pairing_input(1, 7, &[], TeamHistory::default());
        input.policy.bye = ByePolicy::LowestRanked;
        let pairing = pair_preliminary(input).unwrap();

        assert_eq!(pairing.byes.len(), 1);
        assert_eq!(pairing.byes[0].team_number, 7);
        assert_eq!(numbers(&pairing), vec![(1, 2), (3, 4), (5, 6)]);
        assert!(matches!(
            pairing.warnings.as_slice(),
            [UnresolvableConstraint::Bye { team }] if team == "t7"
        ));

        // in round 2, t7 has had its bye so t5 (lowest ranked without one)
        // sits out instead
        let history = TeamHistory::from_records(
            &[round("r1", 1)],
            &[
                trial("r1", "t1", "t2"),
                trial("r1", "t3", "t4"),
                trial("r1", "t5", "t6"),
            ],
            &[crate::test::fixtures::bye("r1", "t7")],
        );
        let mut input =
            pairing_input(2, 7, &[1, 0, 1, 0, 0, 1, 1], history);
        input.policy.bye = ByePolicy::LowestRanked;
        let pairing = pair_preliminary(input).unwrap();
        assert_eq!(pairing.byes[0].team_number, 5);
    }

    #[test]
    fn winners_meet_winners_without_repeats() {
        let history = history_of(
            &[
                trial("r1", "t1", "t2"),
                trial("r1", "t3", "t4"),
                trial("r1", "t5", "t6"),
                trial("r1", "t7", "t8"),
            ],
            1,
        );
        let input = pairing_input(2, 8, &[1, 1, 1, 1, 0, 0, 0, 0], history);
        let pairing = pair_preliminary(input).unwrap();

        let pairs = numbers(&pairing)
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(1, 3), (2, 4), (5, 7), (6, 8)]);
        assert!(!pairing.warnings.iter().any(|w| matches!(
            w,
            UnresolvableConstraint::OpponentRepeat { .. }
        )));
    }

    #[test]
    fn sides_alternate_from_previous_round() {
        // round 1: t1 and t3 prosecuted, t2 and t4 defended
        let history =
            history_of(&[trial("r1", "t1", "t2"), trial("r1", "t3", "t4")], 1);
        // t1 and t4 won
        let input = pairing_input(2, 4, &[1, 0, 0, 1], history);
        let pairing = pair_preliminary(input).unwrap();

        assert_eq!(numbers(&pairing), vec![(4, 1), (2, 3)]);
        assert!(pairing.warnings.is_empty());
    }

    #[test]
    fn unavoidable_side_repeat_is_reported() {
        let history =
            history_of(&[trial("r1", "t1", "t2"), trial("r1", "t3", "t4")], 1);
        // t1 and t3 won and prosecuted: one of them must prosecute again
        let input = pairing_input(2, 4, &[1, 0, 1, 0], history);
        let pairing = pair_preliminary(input).unwrap();

        let pairs = numbers(&pairing);
        assert!(pairs.contains(&(3, 1)) || pairs.contains(&(1, 3)));
        let repeats = pairing
            .warnings
            .iter()
            .filter(|w| matches!(w, UnresolvableConstraint::SideRepeat { .. }))
            .count();
        assert_eq!(repeats, 2);
    }

    #[test]
    fn odd_bracket_pulls_lowest_team_down() {
        let history = TeamHistory::default();
        // three teams on one win, three on zero
        let input = pairing_input(2, 6, &[1, 1, 1, 0, 0, 0], history);
        let pairing = pair_preliminary(input).unwrap();

        let pairs = numbers(&pairing)
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(1, 2), (3, 4), (5, 6)]);
    }

    #[test]
    fn unavoidable_repeat_is_accepted_and_flagged() {
        // only two teams, who have already met
        let history = history_of(&[trial("r1", "t1", "t2")], 1);
        let input = pairing_input(2, 2, &[1, 0], history);
        let pairing = pair_preliminary(input).unwrap();

        assert_eq!(pairing.trials.len(), 1);
        assert!(pairing.warnings.iter().any(|w| matches!(
            w,
            UnresolvableConstraint::OpponentRepeat { .. }
        )));
    }

    #[test]
    fn random_first_round_is_reproducible_and_complete() {
        let make = || {
            let mut input = pairing_input(1, 10, &[], TeamHistory::default());
            input.policy = PairingPolicy {
                first_round: FirstRoundPolicy::Random,
                seed: Some(42),
                ..PairingPolicy::default()
            };
            input.rng = rand::SeedableRng::seed_from_u64(42);
            pair_preliminary(input).unwrap()
        };

        let first = make();
        let second = make();
        assert_eq!(numbers(&first), numbers(&second));

        let covered = first
            .trials
            .iter()
            .flat_map(|t| [t.prosecution.id.clone(), t.defense.id.clone()])
            .collect::<HashSet<_>>();
        assert_eq!(covered.len(), 10);
    }

    #[test]
    fn every_team_is_paired_exactly_once() {
        for n in (2..=24).step_by(2) {
            let wins = (0..n).map(|i| (i % 3) as u32).collect::<Vec<_>>();
            let input = pairing_input(3, n, &wins, TeamHistory::default());
            let pairing = pair_preliminary(input).unwrap();

            assert_eq!(pairing.trials.len(), n / 2);
            let mut seen = HashSet::new();
            for trial in &pairing.trials {
                assert_ne!(trial.prosecution.id, trial.defense.id);
                assert!(seen.insert(trial.prosecution.id.clone()));
                assert!(seen.insert(trial.defense.id.clone()));
            }
            assert_eq!(seen.len(), n);
        }
    }
}
