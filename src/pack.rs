//! Flat `u32` encoding of a [`GachaConfig`], used to hand one banner to every
//! worker of a shared-memory search.
//!
//! Layout: `[MAGIC, featured_rate, cum_0..cum_4, (offset_t, len_t) x 5, items..]`.
//! Offsets count from the first item word.

use crate::error::{Result, SeekError};
use crate::gacha::{GachaConfig, ItemId, RARITY_TIERS};

pub const MAGIC: u32 = 0x4743_4631;
pub const HEADER_WORDS: usize = 2 + RARITY_TIERS + 2 * RARITY_TIERS;

const RATES_AT: usize = 2;
const POOLS_AT: usize = RATES_AT + RARITY_TIERS;

pub fn encode(config: &GachaConfig) -> Vec<u32> {
    let item_count: usize = config.pools().iter().map(Vec::len).sum();
    let mut words = Vec::with_capacity(HEADER_WORDS + item_count);
    words.push(MAGIC);
    words.push(config.featured_rate());
    words.extend_from_slice(config.cumulative_rates());

    let mut offset = 0u32;
    for pool in config.pools() {
        words.push(offset);
        words.push(pool.len() as u32);
        offset += pool.len() as u32;
    }
    for pool in config.pools() {
        words.extend_from_slice(pool);
    }
    words
}

pub fn decode(words: &[u32]) -> Result<GachaConfig> {
    if words.len() < HEADER_WORDS {
        return Err(SeekError::Pack(format!(
            "{} words, header alone needs {}",
            words.len(),
            HEADER_WORDS
        )));
    }
    if words[0] != MAGIC {
        return Err(SeekError::Pack(format!("bad magic {:#010x}", words[0])));
    }

    let featured_rate = words[1];
    let mut cumulative = [0u32; RARITY_TIERS];
    cumulative.copy_from_slice(&words[RATES_AT..POOLS_AT]);

    let items = &words[HEADER_WORDS..];
    let mut pools: [Vec<ItemId>; RARITY_TIERS] = Default::default();
    for (tier, pool) in pools.iter_mut().enumerate() {
        let offset = words[POOLS_AT + 2 * tier] as usize;
        let len = words[POOLS_AT + 2 * tier + 1] as usize;
        let slice = offset
            .checked_add(len)
            .and_then(|end| items.get(offset..end))
            .ok_or_else(|| {
                SeekError::Pack(format!(
                    "tier {} pool {}+{} exceeds {} item words",
                    tier,
                    offset,
                    len,
                    items.len()
                ))
            })?;
        pool.extend_from_slice(slice);
    }

    Ok(GachaConfig::new(featured_rate, cumulative, pools))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GachaConfig {
        GachaConfig::from_rates(
            250,
            [5000, 3000, 1500, 400, 100],
            [vec![1, 2, 3], vec![10, 11], vec![], vec![30], vec![40, 41, 42]],
        )
    }

    #[test]
    fn decodes_to_the_same_config() {
        let config = sample();
        let words = encode(&config);
        assert_eq!(words.len(), HEADER_WORDS + 9);
        assert_eq!(&words[HEADER_WORDS..HEADER_WORDS + 3], &[1, 2, 3]);
        assert_eq!(decode(&words).unwrap(), config);
    }

    #[test]
    fn rejects_short_or_foreign_buffers() {
        assert!(matches!(decode(&[MAGIC, 1, 2]), Err(SeekError::Pack(_))));
        let mut words = encode(&sample());
        words[0] = 0;
        assert!(matches!(decode(&words), Err(SeekError::Pack(_))));
    }

    #[test]
    fn rejects_pool_past_the_end() {
        let mut words = encode(&sample());
        // tier 4 length
        words[POOLS_AT + 9] = 100;
        assert!(matches!(decode(&words), Err(SeekError::Pack(_))));
        words[POOLS_AT + 9] = 3;
        words[POOLS_AT + 8] = u32::MAX;
        assert!(decode(&words).is_err());
    }
}
