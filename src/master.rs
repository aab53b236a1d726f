//! Item and gacha master tables, and their normalization into [`GachaConfig`].
//!
//! ```json
//! {
//!   "gachas": { "101": { "name": "Spring", "featuredItemRate": 300,
//!                        "rarityRates": { "0": 6000, "1": 3000, "2": 700, "3": 250, "4": 50 },
//!                        "pool": [1, 2, 10, 11] } },
//!   "items":  { "1": { "name": "Potion", "rarity": 0 } }
//! }
//! ```
//!
//! A gacha entry may carry `cumulativeRarityRates` and `rarityItems` already
//! normalized; those are used as-is.

use crate::config::read_with_fallback;
use crate::error::{Result, SeekError};
use crate::gacha::{GachaConfig, ItemId, RARITY_TIERS};
use crate::search::TargetElement;
use log::{info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

pub const FEATURED_TOKENS: [&str; 2] = ["featured", "目玉"];
pub const CONFIRMED_TOKENS: [&str; 2] = ["confirmed", "目玉(確定)"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GachaEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub featured_item_rate: u32,
    #[serde(default)]
    pub rarity_rates: HashMap<String, u32>,
    #[serde(default)]
    pub pool: Vec<ItemId>,
    #[serde(default)]
    pub cumulative_rarity_rates: Option<Vec<u32>>,
    #[serde(default)]
    pub rarity_items: Option<HashMap<String, Vec<ItemId>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemEntry {
    pub name: String,
    pub rarity: u8,
}

#[derive(Debug, Deserialize)]
struct MasterFile {
    #[serde(default)]
    gachas: BTreeMap<String, GachaEntry>,
    #[serde(default)]
    items: BTreeMap<ItemId, ItemEntry>,
}

#[derive(Debug)]
pub struct MasterData {
    gachas: BTreeMap<String, GachaEntry>,
    items: BTreeMap<ItemId, ItemEntry>,
    ids_by_name: HashMap<String, ItemId>,
}

impl MasterData {
    pub fn load(path: &str) -> Result<Self> {
        let (found_at, contents) = read_with_fallback(path).ok_or_else(|| {
            SeekError::Config(format!(
                "master data not found at './{}' or '../../{}'",
                path, path
            ))
        })?;
        let master = Self::from_json(&contents)?;
        info!(
            "[Master] Loaded {} gachas and {} items from {}",
            master.gachas.len(),
            master.items.len(),
            found_at
        );
        Ok(master)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: MasterFile = serde_json::from_str(contents)?;
        // Later ids win on duplicate names.
        let ids_by_name = file
            .items
            .iter()
            .map(|(&id, item)| (item.name.clone(), id))
            .collect();
        Ok(MasterData {
            gachas: file.gachas,
            items: file.items,
            ids_by_name,
        })
    }

    pub fn gacha_ids(&self) -> impl Iterator<Item = &str> {
        self.gachas.keys().map(String::as_str)
    }

    pub fn gacha_name(&self, gacha_id: &str) -> Option<&str> {
        self.gachas.get(gacha_id).map(|g| g.name.as_str())
    }

    pub fn item_name(&self, id: ItemId) -> Option<&str> {
        self.items.get(&id).map(|item| item.name.as_str())
    }

    pub fn item_id(&self, name: &str) -> Option<ItemId> {
        self.ids_by_name.get(name).copied()
    }

    /// Normalized banner for `gacha_id`.
    pub fn gacha_config(&self, gacha_id: &str) -> Result<GachaConfig> {
        let entry = self
            .gachas
            .get(gacha_id)
            .ok_or_else(|| SeekError::UnknownGacha(gacha_id.to_string()))?;

        let pools = match &entry.rarity_items {
            Some(by_tier) => tier_table(|tier| by_tier.get(&tier.to_string()).cloned().unwrap_or_default()),
            None => self.split_pool(gacha_id, &entry.pool),
        };

        let config = match &entry.cumulative_rarity_rates {
            Some(cumulative) => {
                // A short table repeats its last threshold (no further tiers).
                let mut table = [0u32; RARITY_TIERS];
                let mut last = 0;
                for (tier, slot) in table.iter_mut().enumerate() {
                    last = cumulative.get(tier).copied().unwrap_or(last);
                    *slot = last;
                }
                GachaConfig::new(entry.featured_item_rate, table, pools)
            }
            None => {
                let rates = tier_table(|tier| entry.rarity_rates.get(&tier.to_string()).copied().unwrap_or(0));
                GachaConfig::from_rates(entry.featured_item_rate, rates, pools)
            }
        };

        if !config.is_well_formed() {
            warn!(
                "[Master] Gacha {} rarity thresholds {:?} do not cover 0..10000; uncovered rolls become invalid draws",
                gacha_id,
                config.cumulative_rates()
            );
        }
        Ok(config)
    }

    fn split_pool(&self, gacha_id: &str, pool: &[ItemId]) -> [Vec<ItemId>; RARITY_TIERS] {
        let mut tiers: [Vec<ItemId>; RARITY_TIERS] = Default::default();
        for &id in pool {
            match self.items.get(&id) {
                Some(item) if (item.rarity as usize) < RARITY_TIERS => tiers[item.rarity as usize].push(id),
                Some(item) => warn!(
                    "[Master] Gacha {}: item {} has rarity {} outside 0..{}, skipped",
                    gacha_id, id, item.rarity, RARITY_TIERS
                ),
                None => warn!("[Master] Gacha {}: item {} not in item master, skipped", gacha_id, id),
            }
        }
        tiers
    }

    /// Parses a comma separated list of item names and reserved tokens.
    pub fn parse_target(&self, text: &str) -> Result<Vec<TargetElement>> {
        text.split([',', '\n'])
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| self.parse_token(token))
            .collect()
    }

    fn parse_token(&self, token: &str) -> Result<TargetElement> {
        if CONFIRMED_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            return Ok(TargetElement::ConfirmedFeatured);
        }
        if FEATURED_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            return Ok(TargetElement::Featured);
        }
        self.item_id(token)
            .map(TargetElement::Item)
            .ok_or_else(|| SeekError::UnknownItem(token.to_string()))
    }
}

fn tier_table<T, F: FnMut(usize) -> T>(f: F) -> [T; RARITY_TIERS] {
    std::array::from_fn(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = r#"{
        "gachas": {
            "101": {
                "name": "Spring",
                "featuredItemRate": 300,
                "rarityRates": { "0": 6000, "1": 3000, "2": 700, "3": 250, "4": 50 },
                "pool": [1, 2, 10, 11, 20, 30, 40, 99, 7]
            },
            "102": {
                "name": "Prepared",
                "featuredItemRate": 0,
                "cumulativeRarityRates": [5000, 10000],
                "rarityItems": { "0": [1], "1": [10, 11] }
            },
            "103": {
                "rarityRates": { "0": 5000 },
                "pool": [1]
            }
        },
        "items": {
            "1": { "name": "Potion", "rarity": 0 },
            "2": { "name": "Ether", "rarity": 0 },
            "7": { "name": "Relic", "rarity": 9 },
            "10": { "name": "Sword", "rarity": 1 },
            "11": { "name": "Shield", "rarity": 1 },
            "20": { "name": "Bow", "rarity": 2 },
            "30": { "name": "Staff", "rarity": 3 },
            "40": { "name": "Crown", "rarity": 4 }
        }
    }"#;

    #[test]
    fn normalizes_rates_and_pools() {
        let master = MasterData::from_json(MASTER).unwrap();
        let config = master.gacha_config("101").unwrap();
        assert_eq!(config.featured_rate(), 300);
        assert_eq!(config.cumulative_rates(), &[6000, 9000, 9700, 9950, 10_000]);
        assert_eq!(config.pool(0), &[1, 2]);
        assert_eq!(config.pool(1), &[10, 11]);
        assert_eq!(config.pool(2), &[20]);
        assert_eq!(config.pool(3), &[30]);
        assert_eq!(config.pool(4), &[40]);
        assert!(config.reroll_enabled());
        assert!(config.is_well_formed());
    }

    #[test]
    fn prenormalized_fields_are_used_as_is() {
        let master = MasterData::from_json(MASTER).unwrap();
        let config = master.gacha_config("102").unwrap();
        assert_eq!(config.cumulative_rates(), &[5000, 10_000, 10_000, 10_000, 10_000]);
        assert_eq!(config.pool(1), &[10, 11]);
        assert!(config.pool(2).is_empty());
    }

    #[test]
    fn incomplete_rates_still_build() {
        let master = MasterData::from_json(MASTER).unwrap();
        let config = master.gacha_config("103").unwrap();
        assert!(!config.is_well_formed());
        assert_eq!(master.gacha_name("103"), Some(""));
    }

    #[test]
    fn unknown_gacha_is_an_error() {
        let master = MasterData::from_json(MASTER).unwrap();
        assert!(matches!(master.gacha_config("999"), Err(SeekError::UnknownGacha(_))));
        assert_eq!(master.gacha_ids().collect::<Vec<_>>(), vec!["101", "102", "103"]);
    }

    #[test]
    fn parses_names_and_reserved_tokens() {
        let master = MasterData::from_json(MASTER).unwrap();
        let target = master.parse_target("Sword, featured ,目玉(確定),Potion,, 目玉, Confirmed").unwrap();
        assert_eq!(
            target,
            vec![
                TargetElement::Item(10),
                TargetElement::Featured,
                TargetElement::ConfirmedFeatured,
                TargetElement::Item(1),
                TargetElement::Featured,
                TargetElement::ConfirmedFeatured,
            ]
        );
        assert_eq!(master.item_name(11), Some("Shield"));
    }

    #[test]
    fn unknown_item_name_is_an_error() {
        let master = MasterData::from_json(MASTER).unwrap();
        match master.parse_target("Sword,Excalibur") {
            Err(SeekError::UnknownItem(name)) => assert_eq!(name, "Excalibur"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
