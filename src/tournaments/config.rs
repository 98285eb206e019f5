use serde::{Deserialize, Serialize};

/// How the first preliminary round (where nobody has a record yet) is paired.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FirstRoundPolicy {
    /// Teams are paired in `team_number` order: 1v2, 3v4, ...
    #[default]
    #[serde(rename = "team_number")]
    TeamNumber,
    /// Teams are shuffled before being paired in order.
    #[serde(rename = "random")]
    Random,
}

impl std::fmt::Display for FirstRoundPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FirstRoundPolicy::TeamNumber => "by team number",
            FirstRoundPolicy::Random => "random",
        })
    }
}

/// What to do when an odd number of teams must be paired.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ByePolicy {
    /// Refuse to pair an odd number of teams.
    #[default]
    #[serde(rename = "disallow")]
    Disallow,
    /// The lowest ranked team which has not yet had a bye sits the round
    /// out. The bye is recorded and flagged for review.
    #[serde(rename = "lowest_ranked")]
    LowestRanked,
}

impl std::fmt::Display for ByePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ByePolicy::Disallow => "no byes",
            ByePolicy::LowestRanked => "bye to lowest ranked team",
        })
    }
}

/// Side allocation in elimination rounds.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EliminationSides {
    #[default]
    #[serde(rename = "higher_seed_prosecutes")]
    HigherSeedProsecutes,
    #[serde(rename = "lower_seed_prosecutes")]
    LowerSeedProsecutes,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PairingPolicy {
    pub first_round: FirstRoundPolicy,
    /// Seed for [`FirstRoundPolicy::Random`]. When unset, a fresh seed is
    /// drawn from the operating system.
    pub seed: Option<u64>,
    pub bye: ByePolicy,
    pub elimination_sides: EliminationSides,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PublishPolicy {
    /// Refuse to publish a round while any of its trials lacks a courtroom.
    pub require_courtrooms: bool,
}

/// Which courtrooms a trial prefers, beyond the default name/location order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Locality {
    #[default]
    #[serde(rename = "none")]
    None,
    /// Prefer a courtroom whose location is the district of one of the two
    /// schools in the trial.
    #[serde(rename = "school_district")]
    SchoolDistrict,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CourtroomPolicy {
    pub locality: Locality,
}

#[cfg(test)]
#[test]
fn test_policy_from_toml() {
    let policy: PairingPolicy = toml::from_str(
        r#"
        first_round = "random"
        seed = 7
        bye = "lowest_ranked"
        "#,
    )
    .unwrap();

    assert_eq!(policy.first_round, FirstRoundPolicy::Random);
    assert_eq!(policy.seed, Some(7));
    assert_eq!(policy.bye, ByePolicy::LowestRanked);
    assert_eq!(
        policy.elimination_sides,
        EliminationSides::HigherSeedProsecutes
    );
}

#[cfg(test)]
#[test]
fn test_policy_display() {
    assert_eq!(FirstRoundPolicy::TeamNumber.to_string(), "by team number");
    assert_eq!(
        ByePolicy::LowestRanked.to_string(),
        "bye to lowest ranked team"
    );
}
