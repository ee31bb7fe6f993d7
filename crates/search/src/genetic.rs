//! Crossover and mutation over the best flag sets of a generation

use crate::generation::SeenChecksums;
use crate::operator::{with_state, SearchOperator};
use bestflags_config::{FlagCatalog, GeneticConfig};
use bestflags_core::{FlagSet, Task};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;

/// Breeds a generation from the best flag sets of the previous one.
///
/// The `population` lowest-cost tasks are the parents. Each offspring takes
/// every catalog flag from one of two parents picked by binary tournament,
/// then each flag is redrawn from its states with probability
/// `mutation_rate`. Offspring that were already proposed are discarded, and
/// after `trials` discards in a row the generation is closed as it stands.
#[derive(Debug)]
pub struct GeneticOperator {
    catalog: Arc<FlagCatalog>,
    config: GeneticConfig,
    rng: Mutex<StdRng>,
}

impl GeneticOperator {
    pub fn new(catalog: Arc<FlagCatalog>, config: GeneticConfig, seed: u64) -> Self {
        Self {
            catalog,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    fn crossover(&self, rng: &mut StdRng, mother: &FlagSet, father: &FlagSet) -> FlagSet {
        self.catalog.iter().fold(FlagSet::new(), |child, spec| {
            let donor = if rng.gen_bool(0.5) { mother } else { father };
            with_state(&child, spec, donor.get(&spec.name))
        })
    }

    fn mutate(&self, rng: &mut StdRng, flags: FlagSet) -> FlagSet {
        self.catalog.iter().fold(flags, |flags, spec| {
            if !rng.gen_bool(self.config.mutation_rate) {
                return flags;
            }
            match spec.states().choose(rng) {
                Some(state) => with_state(&flags, spec, *state),
                None => flags,
            }
        })
    }
}

impl SearchOperator for GeneticOperator {
    fn propose(&self, ranked: &[&Task], seen: &SeenChecksums) -> Vec<FlagSet> {
        let parents: Vec<&FlagSet> = ranked
            .iter()
            .take(self.config.population)
            .map(|task| task.flags())
            .collect();
        if parents.is_empty() {
            return Vec::new();
        }

        let mut guard = self.rng.lock();
        let rng = &mut *guard;
        let mut offspring = Vec::with_capacity(self.config.population);
        let mut proposed = HashSet::new();
        let mut duplicates = 0;
        while offspring.len() < self.config.population && duplicates < self.config.trials {
            let mother = tournament(rng, &parents);
            let father = tournament(rng, &parents);
            let child = self.crossover(rng, mother, father);
            let child = self.mutate(rng, child);

            let checksum = child.checksum();
            if seen.contains(&checksum) || !proposed.insert(checksum) {
                duplicates += 1;
                continue;
            }
            duplicates = 0;
            offspring.push(child);
        }

        tracing::debug!(
            parents = parents.len(),
            offspring = offspring.len(),
            duplicates,
            "offspring bred"
        );
        offspring
    }
}

/// The better of two uniformly drawn parents; `parents` is ranked best first
fn tournament<'a>(rng: &mut StdRng, parents: &[&'a FlagSet]) -> &'a FlagSet {
    let first = rng.gen_range(0..parents.len());
    let second = rng.gen_range(0..parents.len());
    parents[first.min(second)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bestflags_config::FlagSpec;
    use bestflags_core::FlagValue;

    fn catalog() -> Arc<FlagCatalog> {
        Arc::new(
            FlagCatalog::new([
                FlagSpec::toggle("-funroll-loops"),
                FlagSpec::toggle("-fomit-frame-pointer"),
                FlagSpec::range("opt_level", 0, 4),
            ])
            .unwrap(),
        )
    }

    fn config(mutation_rate: f64) -> GeneticConfig {
        GeneticConfig {
            population: 4,
            mutation_rate,
            trials: 20,
        }
    }

    #[test]
    fn offspring_only_inherit_parental_values_without_mutation() {
        let operator = GeneticOperator::new(catalog(), config(0.0), 7);
        let left = Task::new(FlagSet::from_iter([
            ("-funroll-loops", FlagValue::Bool(true)),
            ("opt_level", FlagValue::Int(1)),
        ]));
        let right = Task::new(FlagSet::from_iter([
            ("-fomit-frame-pointer", FlagValue::Bool(true)),
            ("opt_level", FlagValue::Int(3)),
        ]));
        let mut seen = SeenChecksums::new();
        seen.insert(left.checksum().clone());
        seen.insert(right.checksum().clone());

        let offspring = operator.propose(&[&left, &right], &seen);
        assert!(!offspring.is_empty());
        assert!(offspring.len() <= 4);
        for child in &offspring {
            assert!(catalog().check(child).is_ok());
            let level = child.get("opt_level");
            assert!(level == Some(FlagValue::Int(1)) || level == Some(FlagValue::Int(3)));
            assert!(!seen.contains(&child.checksum()));
        }
    }

    #[test]
    fn offspring_are_distinct_and_unseen() {
        let operator = GeneticOperator::new(catalog(), config(0.5), 11);
        let parent = Task::new(FlagSet::from_iter([("opt_level", FlagValue::Int(0))]));
        let mut seen = SeenChecksums::new();
        seen.insert(parent.checksum().clone());

        let offspring = operator.propose(&[&parent], &seen);
        let unique: HashSet<_> = offspring.iter().map(FlagSet::checksum).collect();
        assert_eq!(unique.len(), offspring.len());
        assert!(!unique.contains(parent.checksum()));
    }

    #[test]
    fn the_same_seed_breeds_the_same_offspring() {
        let parents = [
            Task::new(FlagSet::from_iter([("opt_level", FlagValue::Int(2))])),
            Task::new(FlagSet::from_iter([
                ("-funroll-loops", FlagValue::Bool(true)),
                ("opt_level", FlagValue::Int(0)),
            ])),
        ];
        let ranked: Vec<&Task> = parents.iter().collect();
        let breed = |seed| {
            GeneticOperator::new(catalog(), config(0.3), seed)
                .propose(&ranked, &SeenChecksums::new())
        };
        assert_eq!(breed(5), breed(5));
    }

    #[test]
    fn exhausted_space_closes_the_generation() {
        let catalog = Arc::new(FlagCatalog::new([FlagSpec::toggle("-fpic")]).unwrap());
        let operator = GeneticOperator::new(Arc::clone(&catalog), config(1.0), 3);
        let on = Task::new(FlagSet::from_iter([("-fpic", FlagValue::Bool(true))]));
        let off = Task::new(FlagSet::new());
        let mut seen = SeenChecksums::new();
        seen.insert(on.checksum().clone());
        seen.insert(off.checksum().clone());

        assert!(operator.propose(&[&on, &off], &seen).is_empty());
    }
}
