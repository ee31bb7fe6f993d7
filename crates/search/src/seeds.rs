//! Seed flag sets for the first generation

use crate::operator::{canonical, with_state};
use bestflags_config::{FlagCatalog, FlagDomain, StartingPoint, SteeringConfig, Strategy};
use bestflags_core::{FlagSet, FlagValue, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;

/// The flag set the search starts from
pub fn starting_flags(catalog: &FlagCatalog, start: &StartingPoint, seed: u64) -> Result<FlagSet> {
    let flags: FlagSet = match start {
        StartingPoint::Empty => catalog
            .iter()
            .filter(|spec| !spec.is_omittable())
            .filter_map(|spec| match spec.domain {
                FlagDomain::Range { start, .. } => Some((spec.name.clone(), FlagValue::Int(start))),
                FlagDomain::Toggle => None,
            })
            .collect(),
        StartingPoint::All => catalog
            .iter()
            .map(|spec| {
                let value = match spec.domain {
                    FlagDomain::Range { end, .. } => FlagValue::Int(end - 1),
                    FlagDomain::Toggle => FlagValue::Bool(true),
                };
                (spec.name.clone(), value)
            })
            .collect(),
        StartingPoint::Random => random_flags(catalog, &mut StdRng::seed_from_u64(seed)),
        StartingPoint::Explicit { flags } => {
            catalog.check(flags)?;
            canonical(catalog, flags)
        }
    };
    tracing::debug!(start = ?start, flags = %flags, "seed flag set chosen");
    Ok(flags)
}

/// The flag sets of the first generation for the configured strategy.
///
/// Hill climbing starts from the single starting flag set. The genetic
/// strategy fills the rest of its population with random flag sets.
pub fn initial_pool(catalog: &FlagCatalog, config: &SteeringConfig) -> Result<Vec<FlagSet>> {
    let start = starting_flags(catalog, &config.start, config.seed)?;
    Ok(match config.strategy {
        Strategy::HillClimb => vec![start],
        Strategy::Genetic => random_population(
            catalog,
            start,
            config.genetic.population,
            config.genetic.trials,
            config.seed,
        ),
    })
}

/// Up to `size` distinct flag sets: `first`, then random draws.
///
/// Drawing stops early after `trials` duplicates in a row, which happens
/// when the catalog has fewer states than `size`.
pub fn random_population(
    catalog: &FlagCatalog,
    first: FlagSet,
    size: usize,
    trials: usize,
    seed: u64,
) -> Vec<FlagSet> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut checksums = HashSet::from([first.checksum()]);
    let mut population = vec![first];
    let mut duplicates = 0;
    while population.len() < size && duplicates < trials {
        let flags = random_flags(catalog, &mut rng);
        if checksums.insert(flags.checksum()) {
            population.push(flags);
            duplicates = 0;
        } else {
            duplicates += 1;
        }
    }
    tracing::debug!(size = population.len(), "random population drawn");
    population
}

/// Each catalog flag in a uniformly chosen state
fn random_flags(catalog: &FlagCatalog, rng: &mut StdRng) -> FlagSet {
    catalog.iter().fold(FlagSet::new(), |flags, spec| match spec.states().choose(rng) {
        Some(state) => with_state(&flags, spec, *state),
        None => flags,
    })
}
