//! Character/world/style cards (spec §3).

use serde::{Deserialize, Serialize};

fn default_stars() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterCard {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_stars")]
    pub stars: u8,
}

impl CharacterCard {
    pub fn clamp_stars(&mut self) {
        self.stars = self.stars.clamp(1, 3);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default = "default_stars")]
    pub stars: u8,
}

impl WorldCard {
    pub fn clamp_stars(&mut self) {
        self.stars = self.stars.clamp(1, 3);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleCard {
    pub style: String,
}

/// Tagged union over the three card variants, used wherever the pipeline
/// needs to treat cards uniformly (scoring, rendering, context selection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Card {
    Character(CharacterCard),
    World(WorldCard),
    Style(StyleCard),
}

impl Card {
    pub fn name(&self) -> Option<&str> {
        match self {
            Card::Character(c) => Some(&c.name),
            Card::World(w) => Some(&w.name),
            Card::Style(_) => None,
        }
    }
}
