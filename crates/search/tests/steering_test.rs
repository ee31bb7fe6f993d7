use bestflags_config::{
    FlagCatalog, FlagSpec, GeneticConfig, StartingPoint, SteeringConfig, Topology,
};
use bestflags_core::{Cost, Error, FlagSet, FlagValue};
use bestflags_pipeline::testing::{ScriptedCompiler, ScriptedRunner};
use bestflags_pipeline::{Pipeline, PipelineConfig};
use bestflags_search::{
    initial_pool, operator_for, starting_flags, NeighborOperator, SearchReport, Steering,
    SteeringState, StopReason,
};
use proptest::prelude::*;
use std::sync::Arc;

fn steering(
    catalog: FlagCatalog,
    topology: Topology,
    compiler: Arc<ScriptedCompiler>,
    runner: Arc<ScriptedRunner>,
    config: &SteeringConfig,
) -> Steering {
    let operator = Arc::new(NeighborOperator::new(Arc::new(catalog), topology));
    Steering::new(scripted_pipeline(compiler, runner), operator, config)
}

fn scripted_pipeline(compiler: Arc<ScriptedCompiler>, runner: Arc<ScriptedRunner>) -> Pipeline {
    Pipeline::new(
        compiler,
        runner,
        PipelineConfig {
            builders: 3,
            executors: 2,
            queue_capacity: 4,
        },
    )
}

fn int(flags: &FlagSet, name: &str) -> i64 {
    match flags.get(name) {
        Some(FlagValue::Int(value)) => value,
        _ => 0,
    }
}

#[tokio::test]
async fn opt_level_scenario_converges_on_level_two() {
    let catalog = FlagCatalog::new([FlagSpec::range("opt_level", 0, 4)]).unwrap();
    let start = starting_flags(&catalog, &StartingPoint::Empty, 0).unwrap();
    let compiler = Arc::new(ScriptedCompiler::succeeding());
    let runner = Arc::new(ScriptedRunner::by_flags(|flags| {
        Ok(Cost::new([100.0, 80.0, 60.0, 90.0][int(flags, "opt_level") as usize]))
    }));

    let mut steering = steering(
        catalog,
        Topology::AllValues,
        compiler.clone(),
        runner,
        &SteeringConfig::default(),
    );
    let report = steering.run(start).await.unwrap();

    let best = report.best.as_ref().unwrap();
    assert_eq!(best.flags, FlagSet::from_iter([("opt_level", FlagValue::Int(2))]));
    assert_eq!(best.cost, Cost::new(60.0));
    assert_eq!(best.generation, 1);
    assert_eq!(report.stop_reason, StopReason::EmptyFrontier);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.evaluated, 4);
    assert_eq!(compiler.calls(), 4);
    assert_eq!(steering.state(), SteeringState::Done);
}

#[tokio::test]
async fn stops_at_the_generation_limit() {
    let catalog =
        FlagCatalog::new((0..6).map(|i| FlagSpec::toggle(format!("-f{i}")))).unwrap();
    // Every enabled flag helps, so each generation improves.
    let runner = Arc::new(ScriptedRunner::by_flags(|flags| {
        Ok(Cost::new(100.0 - flags.len() as f64))
    }));
    let config = SteeringConfig {
        max_generations: 3,
        ..SteeringConfig::default()
    };

    let mut steering = steering(
        catalog,
        Topology::Step,
        Arc::new(ScriptedCompiler::succeeding()),
        runner,
        &config,
    );
    let report = steering.run(FlagSet::new()).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::MaxGenerations);
    assert_eq!(report.rounds, 3);
    assert_eq!(report.best.as_ref().unwrap().cost, Cost::new(98.0));
    assert_eq!(report.best.as_ref().unwrap().generation, 2);
}

#[tokio::test]
async fn patience_tolerates_flat_generations() {
    let catalog =
        FlagCatalog::new((0..4).map(|i| FlagSpec::toggle(format!("-f{i}")))).unwrap();
    let runner = Arc::new(ScriptedRunner::by_flags(|_| Ok(Cost::new(10.0))));
    let config = SteeringConfig {
        patience: 2,
        ..SteeringConfig::default()
    };

    let mut steering = steering(
        catalog,
        Topology::Step,
        Arc::new(ScriptedCompiler::succeeding()),
        runner,
        &config,
    );
    let report = steering.run(FlagSet::new()).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::NoImprovement);
    assert_eq!(report.rounds, 3);
    // Ties keep the seed, found first.
    let best = report.best.unwrap();
    assert_eq!(best.generation, 0);
    assert_eq!(best.flags, FlagSet::new());
}

#[tokio::test]
async fn all_failing_builds_report_no_improvement() {
    let catalog = FlagCatalog::new([FlagSpec::range("opt_level", 0, 4)]).unwrap();
    let runner = Arc::new(ScriptedRunner::by_flags(|_| Ok(Cost::new(1.0))));
    let mut steering = steering(
        catalog,
        Topology::AllValues,
        Arc::new(ScriptedCompiler::failing_when(|_| true)),
        runner.clone(),
        &SteeringConfig::default(),
    );

    let report = steering
        .run(FlagSet::from_iter([("opt_level", FlagValue::Int(0))]))
        .await
        .unwrap();

    assert!(report.best.is_none());
    assert_eq!(report.stop_reason, StopReason::NoImprovement);
    assert_eq!(report.build_failures, report.evaluated);
    assert_eq!(runner.calls(), 0);
    assert!(report.to_string().contains("no improvement found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hill_climb_reaches_the_minimum_sum() {
    let catalog = FlagCatalog::new(
        ["-fa", "-fb", "-fc"]
            .into_iter()
            .map(|name| FlagSpec::range(name, 0, 5)),
    )
    .unwrap();
    let start = starting_flags(&catalog, &StartingPoint::All, 0).unwrap();
    let runner = Arc::new(ScriptedRunner::by_flags(|flags| {
        Ok(Cost::new(
            (int(flags, "-fa") + int(flags, "-fb") + int(flags, "-fc")) as f64,
        ))
    }));
    let compiler = Arc::new(ScriptedCompiler::succeeding());

    let mut steering = steering(
        catalog,
        Topology::Step,
        compiler.clone(),
        runner,
        &SteeringConfig::default(),
    );
    let report = steering.run(start).await.unwrap();

    let best = report.best.unwrap();
    assert_eq!(best.cost, Cost::new(0.0));
    let sum = int(&best.flags, "-fa") + int(&best.flags, "-fb") + int(&best.flags, "-fc");
    assert_eq!(sum, 0);
    assert!(report.rounds <= SteeringConfig::default().max_generations);
    assert_eq!(compiler.calls(), report.evaluated);
}

#[tokio::test]
async fn a_finished_steering_cannot_run_again() {
    let catalog = FlagCatalog::new([FlagSpec::toggle("-flto")]).unwrap();
    let mut steering = steering(
        catalog,
        Topology::Step,
        Arc::new(ScriptedCompiler::succeeding()),
        Arc::new(ScriptedRunner::by_flags(|_| Ok(Cost::new(1.0)))),
        &SteeringConfig::default(),
    );
    steering.run(FlagSet::new()).await.unwrap();
    let err = steering.run(FlagSet::new()).await.unwrap_err();
    assert!(err.is_structural());
}

#[tokio::test]
async fn a_failed_run_cannot_be_resumed() {
    let catalog = FlagCatalog::new([FlagSpec::toggle("-flto")]).unwrap();
    let mut steering = steering(
        catalog,
        Topology::Step,
        Arc::new(ScriptedCompiler::succeeding()),
        Arc::new(ScriptedRunner::by_flags(|_| panic!("benchmark harness crashed"))),
        &SteeringConfig::default(),
    );

    let err = steering.run(FlagSet::new()).await.unwrap_err();
    assert!(err.is_structural());
    assert_eq!(steering.state(), SteeringState::Failed);

    let err = steering.run(FlagSet::new()).await.unwrap_err();
    assert!(matches!(err, Error::IllegalTransition { ref from, .. } if from == "Failed"));
    assert_eq!(steering.state(), SteeringState::Failed);
}

fn sum_catalog() -> FlagCatalog {
    FlagCatalog::new(
        ["-fa", "-fb", "-fc", "-fd"]
            .into_iter()
            .map(|name| FlagSpec::range(name, 0, 4)),
    )
    .unwrap()
}

fn sum_cost(flags: &FlagSet) -> f64 {
    ["-fa", "-fb", "-fc", "-fd"]
        .iter()
        .map(|name| int(flags, name))
        .sum::<i64>() as f64
}

fn genetic_config(seed: u64) -> SteeringConfig {
    SteeringConfig {
        strategy: bestflags_config::Strategy::Genetic,
        max_generations: 40,
        patience: 20,
        start: StartingPoint::All,
        seed,
        genetic: GeneticConfig {
            population: 10,
            mutation_rate: 0.1,
            trials: 20,
        },
        ..SteeringConfig::default()
    }
}

async fn genetic_search(seed: u64, compiler: Arc<ScriptedCompiler>) -> SearchReport {
    let catalog = Arc::new(sum_catalog());
    let config = genetic_config(seed);
    let pool = initial_pool(&catalog, &config).unwrap();
    let runner = Arc::new(ScriptedRunner::by_flags(|flags| Ok(Cost::new(sum_cost(flags)))));
    let mut steering = Steering::new(
        scripted_pipeline(compiler, runner),
        operator_for(catalog, &config),
        &config,
    );
    let report = steering.run_pool(pool).await.unwrap();
    assert_eq!(steering.state(), SteeringState::Done);
    report
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn genetic_search_improves_on_its_first_generation() {
    let compiler = Arc::new(ScriptedCompiler::succeeding());
    let report = genetic_search(17, compiler.clone()).await;

    let best = report.best.as_ref().unwrap();
    assert!(best.cost < Cost::new(12.0));
    assert_eq!(sum_cost(&best.flags), best.cost.value());
    assert!(report.rounds <= 40);
    assert_eq!(compiler.calls(), report.evaluated);
    assert_eq!(report.build_cache.misses as usize, report.evaluated);
}

#[tokio::test]
async fn genetic_search_is_reproducible_for_a_seed() {
    let first = genetic_search(3, Arc::new(ScriptedCompiler::succeeding())).await;
    let again = genetic_search(3, Arc::new(ScriptedCompiler::succeeding())).await;
    assert_eq!(first.best, again.best);
    assert_eq!(first.rounds, again.rounds);
    assert_eq!(first.evaluated, again.evaluated);
}

fn pseudo_cost(flags: &FlagSet) -> f64 {
    let checksum = flags.checksum();
    u32::from_str_radix(&checksum.as_str()[..6], 16).unwrap_or(0) as f64
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn no_flag_set_is_ever_evaluated_twice(
        widths in prop::collection::vec(1i64..4, 1..5),
        toggles in 0usize..4,
        all_values in any::<bool>(),
        patience in 1usize..4,
        max_generations in 1usize..12,
    ) {
        let specs = widths
            .iter()
            .enumerate()
            .map(|(i, width)| FlagSpec::range(format!("-p{i}"), 0, *width).omittable())
            .chain((0..toggles).map(|i| FlagSpec::toggle(format!("-f{i}"))));
        let catalog = FlagCatalog::new(specs).unwrap();
        let topology = if all_values { Topology::AllValues } else { Topology::Step };
        let config = SteeringConfig { patience, max_generations, ..SteeringConfig::default() };
        let compiler = Arc::new(ScriptedCompiler::succeeding());
        let runner =
            Arc::new(ScriptedRunner::by_flags(|flags| Ok(Cost::new(pseudo_cost(flags)))));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let report = runtime.block_on(async {
            let mut steering = steering(catalog, topology, compiler.clone(), runner, &config);
            steering.run(FlagSet::new()).await
        }).unwrap();

        prop_assert_eq!(compiler.calls(), report.evaluated);
        prop_assert!(report.rounds <= max_generations);
        prop_assert_eq!(report.build_cache.misses as usize, report.evaluated);
    }
}
