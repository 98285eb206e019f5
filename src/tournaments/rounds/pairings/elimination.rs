//! Single-elimination brackets.
//!
//! Seeds are laid out in the standard bracket order, so that the two best
//! seeds can only meet in the final. Each round pairs the surviving teams
//! with their neighbour in that order.

use crate::{
    Error,
    tournaments::{
        config::EliminationSides,
        rounds::pairings::{Pairing, ProposedTrial},
        teams::Team,
    },
};

/// The seeds (1-based) of a bracket of `size` teams, in bracket slot order.
///
/// `size` must be a power of two. For 8 teams this is
/// `[1, 8, 4, 5, 2, 7, 3, 6]`.
pub fn bracket_order(size: usize) -> Vec<usize> {
    let mut order = vec![1];
    while order.len() < size {
        let n = order.len() * 2;
        order = order.iter().flat_map(|&seed| [seed, n + 1 - seed]).collect();
    }
    order
}

/// Pairs an elimination round.
///
/// `seeds` is the full bracket in seed order (best first); `survivors` are
/// the teams still in the competition, which for the first elimination round
/// are all of the seeds.
pub fn pair_elimination(
    seeds: &[Team],
    survivors: &[Team],
    sides: EliminationSides,
) -> Result<Pairing, Error> {
    if seeds.len() < 2 || !seeds.len().is_power_of_two() {
        return Err(Error::InvalidPairingInput(format!(
            "a bracket needs a power of two teams (at least two), not {}",
            seeds.len()
        )));
    }

    if survivors.len() < 2 {
        return Err(Error::InvalidPairingInput(
            "the bracket is already complete".to_string(),
        ));
    }

    if !survivors.len().is_power_of_two() {
        return Err(Error::InvalidPairingInput(format!(
            "{} teams remain in the bracket",
            survivors.len()
        )));
    }

    let order = bracket_order(seeds.len());
    let seed_of = |team: &Team| seeds.iter().position(|s| s.id == team.id);
    let slot_of = |seed: usize| order.iter().position(|&s| s == seed + 1);

    let mut placed = survivors
        .iter()
        .map(|team| {
            seed_of(team)
                .and_then(|seed| slot_of(seed).map(|slot| (slot, seed, team)))
                .ok_or_else(|| {
                    Error::InvalidPairingInput(format!(
                        "team {} is not in the bracket",
                        team.id
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    placed.sort_by_key(|(slot, _, _)| *slot);

    // the bracket is split into one block per survivor, and every survivor
    // must have come through a different block
    let block = seeds.len() / survivors.len();
    if let Some((i, (_, _, team))) = placed
        .iter()
        .enumerate()
        .find(|(i, (slot, _, _))| slot / block != *i)
    {
        return Err(Error::InvalidPairingInput(format!(
            "team {} cannot still be in the bracket alongside the other \
             {} teams (position {i})",
            team.id,
            survivors.len() - 1
        )));
    }

    let mut trials = Vec::with_capacity(survivors.len() / 2);
    for pair in placed.chunks(2) {
        let [(_, seed_a, a), (_, seed_b, b)] = pair else {
            return Err(Error::Internal("unpaired bracket slot".to_string()));
        };

        let (higher, lower) = if seed_a < seed_b { (a, b) } else { (b, a) };
        let (prosecution, defense) = match sides {
            EliminationSides::HigherSeedProsecutes => (higher, lower),
            EliminationSides::LowerSeedProsecutes => (lower, higher),
        };

        trials.push(ProposedTrial {
            prosecution: Team::clone(prosecution),
            defense: Team::clone(defense),
        });
    }

    Ok(Pairing {
        trials,
        ..Pairing::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures::team;

    fn seeds(n: i64) -> Vec<Team> {
        (1..=n).map(team).collect()
    }

    fn numbers(pairing: &Pairing) -> Vec<(i64, i64)> {
        pairing
            .trials
            .iter()
            .map(|t| (t.prosecution.team_number, t.defense.team_number))
            .collect()
    }

    #[test]
    fn bracket_orders() {
        assert_eq!(bracket_order(1), vec![1]);
        assert_eq!(bracket_order(2), vec![1, 2]);
        assert_eq!(bracket_order(4), vec![1, 4, 2, 3]);
        assert_eq!(bracket_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
    }

    #[test]
    fn first_round_pairs_by_seed() {
        let seeds = seeds(4);
        let pairing = pair_elimination(
            &seeds,
            &seeds,
            EliminationSides::HigherSeedProsecutes,
        )
        .unwrap();
        assert_eq!(numbers(&pairing), vec![(1, 4), (2, 3)]);
        assert!(pairing.warnings.is_empty());

        let pairing =
            pair_elimination(&seeds, &seeds, EliminationSides::LowerSeedProsecutes)
                .unwrap();
        assert_eq!(numbers(&pairing), vec![(4, 1), (3, 2)]);
    }

    #[test]
    fn winners_meet_their_neighbours() {
        let seeds = seeds(8);
        // 1, 5, 7 and 3 won their quarter finals
        let survivors = vec![
            seeds[0].clone(),
            seeds[2].clone(),
            seeds[4].clone(),
            seeds[6].clone(),
        ];
        let pairing = pair_elimination(
            &seeds,
            &survivors,
            EliminationSides::HigherSeedProsecutes,
        )
        .unwrap();
        assert_eq!(numbers(&pairing), vec![(1, 5), (3, 7)]);

        let finalists = vec![seeds[2].clone(), seeds[0].clone()];
        let pairing = pair_elimination(
            &seeds,
            &finalists,
            EliminationSides::HigherSeedProsecutes,
        )
        .unwrap();
        assert_eq!(numbers(&pairing), vec![(1, 3)]);
    }

    #[test]
    fn invalid_brackets_are_rejected() {
        let six = seeds(6);
        assert!(matches!(
            pair_elimination(&six, &six, EliminationSides::default()),
            Err(Error::InvalidPairingInput(_))
        ));

        let eight = seeds(8);
        assert!(matches!(
            pair_elimination(&eight, &eight[..1], EliminationSides::default()),
            Err(Error::InvalidPairingInput(_))
        ));

        // seeds 1 and 8 meet in the first round, so both cannot survive it
        let impossible = vec![
            eight[0].clone(),
            eight[7].clone(),
            eight[1].clone(),
            eight[2].clone(),
        ];
        assert!(matches!(
            pair_elimination(&eight, &impossible, EliminationSides::default()),
            Err(Error::InvalidPairingInput(_))
        ));
    }
}
