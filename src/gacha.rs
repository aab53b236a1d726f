use crate::rng;

/// Number of rarity tiers; the game only has these five.
pub const RARITY_TIERS: usize = 5;
/// Rates and thresholds are expressed out of this many.
pub const RATE_SCALE: u32 = 10_000;
/// The only tier that re-rolls an immediate duplicate.
pub const REROLL_TIER: u8 = 1;

pub type ItemId = u32;

/// Normalized, read-only description of one gacha banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GachaConfig {
    featured_rate: u32,
    cumulative_rates: [u32; RARITY_TIERS],
    pools: [Vec<ItemId>; RARITY_TIERS],
    reroll_enabled: bool,
}

impl GachaConfig {
    pub fn new(
        featured_rate: u32,
        cumulative_rates: [u32; RARITY_TIERS],
        pools: [Vec<ItemId>; RARITY_TIERS],
    ) -> Self {
        let reroll_pool = &pools[REROLL_TIER as usize];
        let reroll_enabled = reroll_pool
            .iter()
            .any(|&id| id != reroll_pool[0]);
        GachaConfig {
            featured_rate,
            cumulative_rates,
            pools,
            reroll_enabled,
        }
    }

    /// Builds the cumulative thresholds from per-tier rates.
    pub fn from_rates(
        featured_rate: u32,
        rarity_rates: [u32; RARITY_TIERS],
        pools: [Vec<ItemId>; RARITY_TIERS],
    ) -> Self {
        let mut cumulative = [0u32; RARITY_TIERS];
        let mut total = 0u32;
        for (slot, rate) in cumulative.iter_mut().zip(rarity_rates) {
            total = total.saturating_add(rate);
            *slot = total;
        }
        Self::new(featured_rate, cumulative, pools)
    }

    #[inline]
    pub fn featured_rate(&self) -> u32 {
        self.featured_rate
    }

    #[inline]
    pub fn cumulative_rates(&self) -> &[u32; RARITY_TIERS] {
        &self.cumulative_rates
    }

    #[inline]
    pub fn pool(&self, rarity: u8) -> &[ItemId] {
        &self.pools[rarity as usize]
    }

    pub fn pools(&self) -> &[Vec<ItemId>; RARITY_TIERS] {
        &self.pools
    }

    #[allow(dead_code)]
    #[inline]
    pub fn reroll_enabled(&self) -> bool {
        self.reroll_enabled
    }

    /// First tier whose cumulative threshold lies above `roll`.
    #[inline]
    pub fn tier_for(&self, roll: u32) -> Option<u8> {
        self.cumulative_rates
            .iter()
            .position(|&threshold| threshold > roll)
            .map(|tier| tier as u8)
    }

    /// Whether thresholds cover the whole roll range.
    pub fn is_well_formed(&self) -> bool {
        self.cumulative_rates.windows(2).all(|w| w[0] <= w[1])
            && self.cumulative_rates[RARITY_TIERS - 1] == RATE_SCALE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    Featured,
    Item { rarity: u8, item: ItemId },
    /// Malformed banner data; `rarity` is set when the tier resolved but its pool was empty.
    Invalid { rarity: Option<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawOutcome {
    pub draw: Draw,
    pub next_state: u32,
    /// Item remembered for the tier-1 duplicate check of the following draw.
    pub last_item: Option<ItemId>,
}

impl DrawOutcome {
    #[inline]
    pub fn is_featured(&self) -> bool {
        matches!(self.draw, Draw::Featured)
    }

    #[inline]
    pub fn rarity(&self) -> Option<u8> {
        match self.draw {
            Draw::Featured => None,
            Draw::Item { rarity, .. } => Some(rarity),
            Draw::Invalid { rarity } => rarity,
        }
    }

    #[inline]
    pub fn item_id(&self) -> Option<ItemId> {
        match self.draw {
            Draw::Item { item, .. } => Some(item),
            _ => None,
        }
    }
}

/// Simulates one draw starting from `state`.
///
/// Takes two, three or four generator steps depending on the branch:
/// featured check, rarity roll, item pick, and the tier-1 re-roll when the
/// picked item repeats `last_item`.
pub fn advance(state: u32, last_item: Option<ItemId>, config: &GachaConfig) -> DrawOutcome {
    let s1 = rng::next(state);
    if s1 % RATE_SCALE < config.featured_rate {
        return DrawOutcome {
            draw: Draw::Featured,
            next_state: s1,
            last_item: None,
        };
    }

    let s2 = rng::next(s1);
    let Some(rarity) = config.tier_for(s2 % RATE_SCALE) else {
        return DrawOutcome {
            draw: Draw::Invalid { rarity: None },
            next_state: s2,
            last_item,
        };
    };

    let s3 = rng::next(s2);
    let pool = config.pool(rarity);
    if pool.is_empty() {
        return DrawOutcome {
            draw: Draw::Invalid {
                rarity: Some(rarity),
            },
            next_state: s3,
            last_item,
        };
    }
    let picked = pool[s3 as usize % pool.len()];

    if rarity == REROLL_TIER && config.reroll_enabled && last_item == Some(picked) {
        let s4 = rng::next(s3);
        return reroll(pool, picked, s4, last_item);
    }

    DrawOutcome {
        draw: Draw::Item {
            rarity,
            item: picked,
        },
        next_state: s3,
        last_item: Some(picked),
    }
}

// Picks from the pool with every copy of `duplicate` removed, without allocating.
fn reroll(pool: &[ItemId], duplicate: ItemId, state: u32, last_item: Option<ItemId>) -> DrawOutcome {
    let invalid = DrawOutcome {
        draw: Draw::Invalid {
            rarity: Some(REROLL_TIER),
        },
        next_state: state,
        last_item,
    };
    let remaining = pool.iter().filter(|&&id| id != duplicate).count();
    if remaining == 0 {
        return invalid;
    }
    match pool
        .iter()
        .filter(|&&id| id != duplicate)
        .nth(state as usize % remaining)
    {
        Some(&item) => DrawOutcome {
            draw: Draw::Item {
                rarity: REROLL_TIER,
                item,
            },
            next_state: state,
            last_item: Some(item),
        },
        None => invalid,
    }
}

/// Simulates `draws` consecutive draws from `seed`.
pub fn simulate_sequence(seed: u32, draws: usize, config: &GachaConfig) -> Vec<DrawOutcome> {
    let mut out = Vec::with_capacity(draws);
    let mut state = seed;
    let mut last_item = None;
    for _ in 0..draws {
        let outcome = advance(state, last_item, config);
        state = outcome.next_state;
        last_item = outcome.last_item;
        out.push(outcome);
    }
    out
}
