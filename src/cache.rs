use crate::gacha::{self, DrawOutcome, GachaConfig, ItemId};

/// Longest draw sequence a single seed is replayed for.
pub const STEP_CACHE_CAPACITY: usize = 60;

/// Lazily extended draw sequence for one seed.
///
/// Entry `k` is the outcome after `k + 1` draws from the bound seed. Entries
/// are only ever appended in order, and `reset` throws all of them away; the
/// backing buffer is kept so checking millions of seeds does not allocate.
pub struct StepCache<'a> {
    config: &'a GachaConfig,
    seed: u32,
    steps: Vec<DrawOutcome>,
}

impl<'a> StepCache<'a> {
    pub fn new(config: &'a GachaConfig, seed: u32) -> Self {
        StepCache {
            config,
            seed,
            steps: Vec::with_capacity(STEP_CACHE_CAPACITY),
        }
    }

    #[inline]
    pub fn reset(&mut self, seed: u32) {
        self.seed = seed;
        self.steps.clear();
    }

    #[allow(dead_code)]
    #[inline]
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Number of steps simulated so far for the bound seed.
    #[allow(dead_code)]
    #[inline]
    pub fn computed(&self) -> usize {
        self.steps.len()
    }

    /// Outcome of draw `k`, or `None` past the cache capacity.
    pub fn get_step(&mut self, k: usize) -> Option<DrawOutcome> {
        if k >= STEP_CACHE_CAPACITY {
            return None;
        }
        while self.steps.len() <= k {
            let (state, last_item) = self.tail();
            self.steps
                .push(gacha::advance(state, last_item, self.config));
        }
        Some(self.steps[k])
    }

    #[inline]
    fn tail(&self) -> (u32, Option<ItemId>) {
        match self.steps.last() {
            Some(prev) => (prev.next_state, prev.last_item),
            None => (self.seed, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gacha::simulate_sequence;

    fn config() -> GachaConfig {
        GachaConfig::from_rates(
            800,
            [5000, 3000, 1500, 400, 100],
            [vec![1, 2, 3, 4], vec![10, 11], vec![20, 21, 22], vec![30], vec![40, 41]],
        )
    }

    #[test]
    fn matches_uncached_simulation_at_every_position() {
        let config = config();
        for seed in [1u32, 2, 0xFFFF_FFFF, 0x8000_0000, 123_456_789] {
            let reference = simulate_sequence(seed, STEP_CACHE_CAPACITY, &config);
            let mut cache = StepCache::new(&config, seed);
            for k in [5usize, 0, 17, 3, 59, 30] {
                assert_eq!(cache.get_step(k), Some(reference[k]));
            }
            assert_eq!(cache.computed(), STEP_CACHE_CAPACITY);
        }
    }

    #[test]
    fn extends_only_as_far_as_asked() {
        let config = config();
        let mut cache = StepCache::new(&config, 99);
        cache.get_step(4);
        assert_eq!(cache.computed(), 5);
        cache.get_step(2);
        assert_eq!(cache.computed(), 5);
        assert_eq!(cache.get_step(STEP_CACHE_CAPACITY), None);
        assert_eq!(cache.computed(), 5);
    }

    #[test]
    fn reset_discards_previous_seed() {
        let config = config();
        let mut cache = StepCache::new(&config, 7);
        cache.get_step(10);
        cache.reset(8);
        assert_eq!(cache.computed(), 0);
        assert_eq!(cache.seed(), 8);
        let fresh = simulate_sequence(8, 3, &config);
        assert_eq!(cache.get_step(2), Some(fresh[2]));
    }
}
