//! Weighted colour sampling for newly spawned tiles.

use crate::tile::{TileCatalog, TileColor};
use rand::prelude::*;
use std::collections::BTreeMap;

/// Cumulative probability table over catalog colours.
#[derive(Debug, Clone)]
pub struct SpawnTable {
    /// (upper bound, colour), upper bounds ascending.
    buckets: Vec<(f32, TileColor)>,
    /// Share of draws above the last bucket, spawned uniformly over the catalog.
    spill: f32,
    /// Uniform fallback when the weights are unusable.
    fallback: Vec<TileColor>,
}

impl SpawnTable {
    /// Normalise `weights` and build the cumulative table. A weighted colour with
    /// no catalog entry keeps its share of the total; draws landing in that share
    /// pick uniformly from the catalog. A zero total spawns uniformly.
    pub fn load(catalog: &TileCatalog, weights: &BTreeMap<TileColor, f32>) -> Self {
        let fallback: Vec<TileColor> = catalog.colors().collect();
        let uniform = |fallback: Vec<TileColor>| Self {
            buckets: Vec::new(),
            spill: 1.0,
            fallback,
        };
        let mut total = 0.0;
        let mut missing = false;
        let mut usable = Vec::new();
        for (&color, &weight) in weights {
            if !weight.is_finite() || weight <= 0.0 {
                continue;
            }
            total += weight;
            if catalog.contains(color) {
                usable.push((weight, color));
            } else {
                missing = true;
                log::error!("spawn weight for {color} has no catalog entry, its share spawns uniformly");
            }
        }
        if total <= 0.0 {
            log::error!("spawn weights sum to zero, spawning uniformly over the catalog");
            return uniform(fallback);
        }
        if usable.is_empty() {
            return uniform(fallback);
        }
        let mut acc = 0.0;
        let mut buckets: Vec<(f32, TileColor)> = usable
            .into_iter()
            .map(|(w, color)| {
                acc += w / total;
                (acc, color)
            })
            .collect();
        let spill = if !missing {
            if let Some(last) = buckets.last_mut() {
                last.0 = 1.0;
            }
            0.0
        } else {
            (1.0 - acc).max(0.0)
        };
        Self {
            buckets,
            spill,
            fallback,
        }
    }

    /// True when sampling falls back to uniform.
    pub fn is_uniform(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Probability of `color` under this table.
    pub fn probability(&self, color: TileColor) -> f32 {
        let uniform_share = if self.fallback.contains(&color) {
            self.spill / self.fallback.len() as f32
        } else {
            0.0
        };
        let mut prev = 0.0;
        for &(bound, c) in &self.buckets {
            if c == color {
                return bound - prev + uniform_share;
            }
            prev = bound;
        }
        uniform_share
    }

    /// First bucket whose cumulative bound reaches a uniform draw in [0, 1);
    /// draws past the last bucket pick uniformly from the catalog.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<TileColor> {
        let draw: f32 = rng.r#gen();
        self.buckets
            .iter()
            .find(|(bound, _)| draw < *bound)
            .map(|(_, color)| *color)
            .or_else(|| self.fallback.choose(rng).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(TileColor, f32)]) -> BTreeMap<TileColor, f32> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn normalises_and_samples_only_weighted_colours() {
        let catalog = TileCatalog::terminal_default();
        let table = SpawnTable::load(
            &catalog,
            &weights(&[(TileColor::Red, 3.0), (TileColor::Blue, 1.0), (TileColor::Green, 0.0)]),
        );
        assert!(!table.is_uniform());
        assert!((table.probability(TileColor::Red) - 0.75).abs() < 1e-6);
        assert!((table.probability(TileColor::Blue) - 0.25).abs() < 1e-6);
        assert_eq!(table.probability(TileColor::Green), 0.0);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let c = table.sample(&mut rng).unwrap();
            assert!(matches!(c, TileColor::Red | TileColor::Blue));
        }
    }

    #[test]
    fn zero_weights_fall_back_to_uniform_catalog() {
        let catalog = TileCatalog::with_colors([TileColor::Yellow, TileColor::Purple]);
        let table = SpawnTable::load(&catalog, &weights(&[(TileColor::Yellow, 0.0)]));
        assert!(table.is_uniform());
        assert!((table.probability(TileColor::Purple) - 0.5).abs() < 1e-6);
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            seen.insert(table.sample(&mut rng).unwrap());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn weights_outside_the_catalog_spill_to_uniform() {
        let catalog = TileCatalog::with_colors([TileColor::Green, TileColor::Blue]);
        let table = SpawnTable::load(
            &catalog,
            &weights(&[(TileColor::Red, 1.0), (TileColor::Green, 1.0)]),
        );
        assert!(!table.is_uniform());
        assert!((table.probability(TileColor::Green) - 0.75).abs() < 1e-6);
        assert!((table.probability(TileColor::Blue) - 0.25).abs() < 1e-6);
        assert_eq!(table.probability(TileColor::Red), 0.0);

        let mut rng = StdRng::seed_from_u64(3);
        let mut blues = 0;
        for _ in 0..1000 {
            match table.sample(&mut rng) {
                Some(TileColor::Blue) => blues += 1,
                Some(TileColor::Green) => {}
                other => panic!("unexpected colour {other:?}"),
            }
        }
        assert!((150..350).contains(&blues), "{blues} blues");
    }

    #[test]
    fn only_unknown_colours_weighted_spawns_uniformly() {
        let catalog = TileCatalog::with_colors([TileColor::Green, TileColor::Blue]);
        let table = SpawnTable::load(&catalog, &weights(&[(TileColor::Red, 1.0)]));
        assert!(table.is_uniform());
        assert!((table.probability(TileColor::Blue) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_catalog_samples_nothing() {
        let table = SpawnTable::load(&TileCatalog::new(), &BTreeMap::new());
        assert_eq!(table.sample(&mut StdRng::seed_from_u64(0)), None);
    }
}
