//! Candidate proposal over the flag catalog

use crate::generation::SeenChecksums;
use crate::genetic::GeneticOperator;
use bestflags_config::{FlagCatalog, FlagDomain, FlagSpec, SteeringConfig, Strategy, Topology};
use bestflags_core::{FlagSet, FlagValue, Task};
use std::sync::Arc;

/// Proposes the flag sets of the next generation
pub trait SearchOperator: Send + Sync {
    /// Candidates following a generation whose resolved tasks are `ranked`,
    /// lowest cost first with ties in pool order.
    ///
    /// May return flag sets already in `seen`; the caller filters those.
    fn propose(&self, ranked: &[&Task], seen: &SeenChecksums) -> Vec<FlagSet>;
}

/// The operator for the configured strategy
pub fn operator_for(catalog: Arc<FlagCatalog>, config: &SteeringConfig) -> Arc<dyn SearchOperator> {
    match config.strategy {
        Strategy::HillClimb => Arc::new(NeighborOperator::new(catalog, config.topology)),
        Strategy::Genetic => Arc::new(GeneticOperator::new(
            catalog,
            config.genetic.clone(),
            config.seed,
        )),
    }
}

/// Moves one catalog flag at a time, per the configured [`Topology`].
///
/// Flags are visited in catalog order. Under [`Topology::Step`] a flag moves
/// to the adjacent state above, then the one below; under
/// [`Topology::AllValues`] it moves to each of its other states in order.
#[derive(Debug, Clone)]
pub struct NeighborOperator {
    catalog: Arc<FlagCatalog>,
    topology: Topology,
}

impl NeighborOperator {
    pub fn new(catalog: Arc<FlagCatalog>, topology: Topology) -> Self {
        Self { catalog, topology }
    }

    pub fn catalog(&self) -> &Arc<FlagCatalog> {
        &self.catalog
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    fn moves(&self, spec: &FlagSpec, flags: &FlagSet) -> Vec<Option<FlagValue>> {
        let states = spec.states();
        match (self.topology, position(spec, &states, flags)) {
            (Topology::Step, Some(index)) => {
                let mut moves = Vec::with_capacity(2);
                if let Some(above) = states.get(index + 1) {
                    moves.push(*above);
                }
                if index > 0 {
                    moves.push(states[index - 1]);
                }
                moves
            }
            // A required flag missing from the set enters at its first value.
            (Topology::Step, None) => {
                states.iter().copied().find(Option::is_some).into_iter().collect()
            }
            (Topology::AllValues, Some(index)) => states
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, state)| *state)
                .collect(),
            (Topology::AllValues, None) => states.into_iter().filter(Option::is_some).collect(),
        }
    }

    /// Flag sets one move away from `flags`, in catalog order
    pub fn neighbors(&self, flags: &FlagSet) -> Vec<FlagSet> {
        self.catalog
            .iter()
            .flat_map(|spec| {
                self.moves(spec, flags)
                    .into_iter()
                    .map(move |state| with_state(flags, spec, state))
            })
            .collect()
    }
}

impl SearchOperator for NeighborOperator {
    fn propose(&self, ranked: &[&Task], _seen: &SeenChecksums) -> Vec<FlagSet> {
        ranked
            .first()
            .map(|best| self.neighbors(best.flags()))
            .unwrap_or_default()
    }
}

/// Index of the flag's current state in `states`; `None` when the flag is
/// absent but may not be omitted, or holds a value outside its domain.
fn position(spec: &FlagSpec, states: &[Option<FlagValue>], flags: &FlagSet) -> Option<usize> {
    let current = match (flags.get(&spec.name), &spec.domain) {
        (None, FlagDomain::Toggle) => Some(FlagValue::Bool(false)),
        (value, _) => value,
    };
    states.iter().position(|state| *state == current)
}

/// `flags` with `spec` moved to `state`.
///
/// Absence and a `false` toggle are the same compiler invocation, so both
/// are represented by leaving the flag out; equal invocations then share a
/// checksum.
pub fn with_state(flags: &FlagSet, spec: &FlagSpec, state: Option<FlagValue>) -> FlagSet {
    match state {
        None | Some(FlagValue::Bool(false)) => flags.without(&spec.name),
        Some(value) => flags.with(spec.name.clone(), value),
    }
}

/// Drop `false` toggles so equivalent flag sets compare and hash equal
pub fn canonical(catalog: &FlagCatalog, flags: &FlagSet) -> FlagSet {
    flags
        .iter()
        .filter(|(name, value)| {
            !(*value == FlagValue::Bool(false)
                && matches!(
                    catalog.get(name).map(|spec| &spec.domain),
                    Some(FlagDomain::Toggle)
                ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::strategy::Strategy;
    use std::collections::HashSet;

    fn catalog(specs: Vec<FlagSpec>) -> Arc<FlagCatalog> {
        Arc::new(FlagCatalog::new(specs).unwrap())
    }

    fn level(value: i64) -> FlagSet {
        FlagSet::from_iter([("opt_level", FlagValue::Int(value))])
    }

    #[test]
    fn step_climbs_like_the_classic_hill_climber() {
        let operator = NeighborOperator::new(
            catalog(vec![
                FlagSpec::toggle("-funroll-loops"),
                FlagSpec::range("-falign-loops", 1, 4).omittable(),
            ]),
            Topology::Step,
        );

        // Absent flags are switched on / added at their start value.
        let neighbors = operator.neighbors(&FlagSet::new());
        assert_eq!(
            neighbors,
            vec![
                FlagSet::from_iter([("-funroll-loops", FlagValue::Bool(true))]),
                FlagSet::from_iter([("-falign-loops", FlagValue::Int(1))]),
            ]
        );

        // A present toggle is removed; a numeric flag steps up, then down.
        let current = FlagSet::from_iter([
            ("-funroll-loops", FlagValue::Bool(true)),
            ("-falign-loops", FlagValue::Int(2)),
        ]);
        let neighbors = operator.neighbors(&current);
        assert_eq!(neighbors.len(), 3);
        assert_eq!(neighbors[0], current.without("-funroll-loops"));
        assert_eq!(neighbors[1].get("-falign-loops"), Some(FlagValue::Int(3)));
        assert_eq!(neighbors[2].get("-falign-loops"), Some(FlagValue::Int(1)));

        // At its start value a numeric flag is removed instead.
        let at_start = FlagSet::from_iter([("-falign-loops", FlagValue::Int(1))]);
        let neighbors = operator.neighbors(&at_start);
        assert_eq!(neighbors[2], FlagSet::new());
    }

    #[test]
    fn all_values_visits_every_other_level() {
        let operator = NeighborOperator::new(
            catalog(vec![FlagSpec::range("opt_level", 0, 4)]),
            Topology::AllValues,
        );
        assert_eq!(operator.neighbors(&level(0)), vec![level(1), level(2), level(3)]);
        assert_eq!(operator.neighbors(&level(2)), vec![level(0), level(1), level(3)]);
    }

    #[test]
    fn missing_required_flag_enters_at_its_first_value() {
        let operator = NeighborOperator::new(
            catalog(vec![FlagSpec::range("opt_level", 0, 4)]),
            Topology::Step,
        );
        assert_eq!(operator.neighbors(&FlagSet::new()), vec![level(0)]);
        // The top level only steps down.
        assert_eq!(operator.neighbors(&level(3)), vec![level(2)]);
    }

    #[test]
    fn propose_expands_the_best_ranked_task_only() {
        let operator = NeighborOperator::new(
            catalog(vec![FlagSpec::range("opt_level", 0, 4)]),
            Topology::AllValues,
        );
        let (best, other) = (Task::new(level(2)), Task::new(level(0)));
        let proposed = operator.propose(&[&best, &other], &SeenChecksums::new());
        assert_eq!(proposed, vec![level(0), level(1), level(3)]);
        assert!(operator.propose(&[], &SeenChecksums::new()).is_empty());
    }

    #[test]
    fn strategy_selects_the_operator() {
        let catalog = catalog(vec![FlagSpec::range("opt_level", 0, 4)]);
        let best = Task::new(level(0));
        let mut config = SteeringConfig {
            topology: Topology::AllValues,
            ..SteeringConfig::default()
        };
        let climber = operator_for(Arc::clone(&catalog), &config);
        assert_eq!(climber.propose(&[&best], &SeenChecksums::new()).len(), 3);

        config.strategy = bestflags_config::Strategy::Genetic;
        config.genetic.mutation_rate = 0.0;
        let genetic = operator_for(catalog, &config);
        // Without mutation a lone parent only breeds copies of itself.
        let mut seen = SeenChecksums::new();
        seen.insert(best.checksum().clone());
        assert!(genetic.propose(&[&best], &seen).is_empty());
    }

    #[test]
    fn canonical_drops_false_toggles_only() {
        let catalog = catalog(vec![
            FlagSpec::toggle("-fpic"),
            FlagSpec::range("opt_level", 0, 4),
        ]);
        let flags = FlagSet::from_iter([
            ("-fpic", FlagValue::Bool(false)),
            ("opt_level", FlagValue::Int(0)),
        ]);
        assert_eq!(canonical(&catalog, &flags), level(0));
    }

    fn arb_catalog() -> impl Strategy<Value = Vec<FlagSpec>> {
        prop::collection::vec((any::<bool>(), 1i64..5, any::<bool>()), 1..6).prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (toggle, width, optional))| {
                    if toggle {
                        FlagSpec::toggle(format!("-f{i}"))
                    } else {
                        let spec = FlagSpec::range(format!("-p{i}"), 0, width);
                        if optional {
                            spec.omittable()
                        } else {
                            spec
                        }
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn neighbors_are_distinct_legal_and_never_the_input(
            specs in arb_catalog(),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 6),
            all_values in any::<bool>(),
        ) {
            let catalog = catalog(specs);
            let mut flags = FlagSet::new();
            for (spec, pick) in catalog.iter().zip(&picks) {
                let states = spec.states();
                flags = with_state(&flags, spec, states[pick.index(states.len())]);
            }
            let topology = if all_values { Topology::AllValues } else { Topology::Step };
            let operator = NeighborOperator::new(Arc::clone(&catalog), topology);

            let neighbors = operator.neighbors(&flags);
            let unique: HashSet<_> = neighbors.iter().map(FlagSet::checksum).collect();
            prop_assert_eq!(unique.len(), neighbors.len());
            prop_assert!(!unique.contains(&flags.checksum()));
            for neighbor in &neighbors {
                prop_assert!(catalog.check(neighbor).is_ok());
            }
        }
    }
}
