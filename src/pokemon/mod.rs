mod crawler;
mod data;

pub use crawler::{PageKind, TcgCrawler, LISTING_URL};
pub use data::{CardTable, TcgData, UrlTable};

use crate::Item;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One card detail page.
///
/// `None` means the page had no such element. It is kept apart from an empty
/// string, which the stat fields produce for a stat block without content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub title: Option<String>,
    pub card_type: Option<String>,
    pub hp: Option<String>,
    pub pokemon_type: Option<String>,
    pub evolves_from: Option<String>,
    pub skills: Vec<Skill>,
    pub expansion: Option<String>,
    pub name: Option<String>,
    pub illustrator: Option<String>,
    pub poke_body: Option<Ability>,
    pub poke_power: Option<Ability>,
    // Keys are left out entirely when the page has fewer stat blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weakness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resistance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retreat_cost: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub is_ability: bool,
    pub skill_cost: Vec<String>,
    pub skill_name: Option<String>,
    pub skill_damage: Option<String>,
    pub skill_text: Option<String>,
}

/// A Poké-Body or Poké-Power section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Item for CardRecord {
    fn is_incomplete(&self) -> bool {
        self.title.is_none()
    }
}

fn or_none(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("None")
}

impl fmt::Display for CardRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title           : {}", or_none(&self.title))?;
        writeln!(f, "Card Type       : {}", or_none(&self.card_type))?;
        writeln!(f, "HP              : {}", or_none(&self.hp))?;
        writeln!(f, "Pokemon Type    : {}", or_none(&self.pokemon_type))?;
        writeln!(f, "Evolves From    : {}", or_none(&self.evolves_from))?;
        writeln!(f, "Expansion       : {}", or_none(&self.expansion))?;
        writeln!(f, "Name            : {}", or_none(&self.name))?;
        writeln!(f, "Illustrator     : {}", or_none(&self.illustrator))?;
        if let Some(body) = self.poke_body.as_ref() {
            writeln!(f, "Poke-Body       : {}", or_none(&body.name))?;
        }
        if let Some(power) = self.poke_power.as_ref() {
            writeln!(f, "Poke-Power      : {}", or_none(&power.name))?;
        }
        writeln!(f, "Weakness        : {}", or_none(&self.weakness))?;
        writeln!(f, "Resistance      : {}", or_none(&self.resistance))?;
        writeln!(f, "Retreat Cost    : {}", or_none(&self.retreat_cost))?;
        writeln!(f, "Skills          : ")?;
        for s in &self.skills {
            writeln!(
                f,
                "> {}{} [{}] {}",
                if s.is_ability { "(Ability) " } else { "" },
                or_none(&s.skill_name),
                s.skill_cost.join(" "),
                s.skill_damage.as_deref().unwrap_or("")
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unreached_stats_are_omitted_from_json() {
        let record = CardRecord {
            title: Some("Pikachu".to_string()),
            weakness: Some("Fighting".to_string()),
            resistance: Some(String::new()),
            ..CardRecord::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["weakness"], "Fighting");
        assert_eq!(object["resistance"], "");
        assert!(!object.contains_key("retreat_cost"));
        assert!(object["evolves_from"].is_null());
        assert!(object["poke_body"].is_null());
    }

    #[test]
    fn test_missing_title_is_incomplete() {
        assert!(CardRecord::default().is_incomplete());
        let record = CardRecord {
            title: Some(String::new()),
            ..CardRecord::default()
        };
        assert!(!record.is_incomplete());
    }
}
