//! Role, team, and species — the fixed gameplay-identity triple.

use serde::{Deserialize, Serialize};

/// Which side wins when this role's team wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Team {
    Villager,
    Werewolf,
    /// Neither side has won yet, or the game aborted without a decisive winner.
    None,
}

/// What a divination reports. `Possessed` is `Werewolf` team but `Human` species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Species {
    Human,
    Werewolf,
}

/// A gameplay role. Team and species are fixed per role, never per agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Werewolf,
    Possessed,
    Seer,
    Bodyguard,
    Villager,
    Medium,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Werewolf,
        Role::Possessed,
        Role::Seer,
        Role::Bodyguard,
        Role::Villager,
        Role::Medium,
    ];

    pub fn team(self) -> Team {
        match self {
            Role::Werewolf | Role::Possessed => Team::Werewolf,
            Role::Seer | Role::Bodyguard | Role::Villager | Role::Medium => Team::Villager,
        }
    }

    pub fn species(self) -> Species {
        match self {
            Role::Werewolf => Species::Werewolf,
            Role::Possessed | Role::Seer | Role::Bodyguard | Role::Villager | Role::Medium => {
                Species::Human
            }
        }
    }

    /// The canonical uppercase spelling used in persisted and wire data.
    pub fn name(self) -> &'static str {
        match self {
            Role::Werewolf => "WEREWOLF",
            Role::Possessed => "POSSESSED",
            Role::Seer => "SEER",
            Role::Bodyguard => "BODYGUARD",
            Role::Villager => "VILLAGER",
            Role::Medium => "MEDIUM",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        Some(match name {
            "WEREWOLF" => Role::Werewolf,
            "POSSESSED" => Role::Possessed,
            "SEER" => Role::Seer,
            "BODYGUARD" => Role::Bodyguard,
            "VILLAGER" => Role::Villager,
            "MEDIUM" => Role::Medium,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn possessed_is_werewolf_team_but_human_species() {
        assert_eq!(Role::Possessed.team(), Team::Werewolf);
        assert_eq!(Role::Possessed.species(), Species::Human);
    }

    #[test]
    fn role_name_round_trips() {
        for role in Role::ALL {
            assert_eq!(Role::from_name(role.name()), Some(role));
        }
    }
}
