use std::sync::atomic::{AtomicU32, Ordering};

lazy_static! {
    static ref STATS: Stats = Stats::new();
}

/// hit/miss counters of the cache, shared by the whole process
#[derive(Serialize, Debug)]
pub struct Stats {
    cache_hits: AtomicU32,
    cache_misses: AtomicU32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct LoadedStats {
    pub cache_hits: u32,
    pub cache_misses: u32,
}

impl LoadedStats {
    /// fraction of lookups answered by the cache, 0 when nothing was looked up yet
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        f64::from(self.cache_hits) / f64::from(total)
    }
}

impl Stats {
    fn new() -> Stats {
        Stats {
            cache_hits: AtomicU32::new(0u32),
            cache_misses: AtomicU32::new(0u32),
        }
    }

    pub(crate) fn cache_hit() {
        STATS.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_miss() {
        STATS.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Load the atomic stats variables as regular u32's
    pub fn load() -> LoadedStats {
        LoadedStats {
            cache_hits: STATS.cache_hits.load(Ordering::Relaxed),
            cache_misses: STATS.cache_misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio() {
        let empty = LoadedStats {
            cache_hits: 0,
            cache_misses: 0,
        };
        assert_eq!(empty.hit_ratio(), 0.0);

        let stats = LoadedStats {
            cache_hits: 3,
            cache_misses: 1,
        };
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
