use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use nixrs::derivation::{Derivation, DerivationOutput};
use nixrs::hash::Algorithm;
use nixrs::realisation::{DrvOutput, Realisation};
use nixrs::store::{BuildSettings, DummyStore, RepairFlag, Store};
use nixrs::store_path::{ContentAddressMethodAlgorithm, StoreDir, StorePath};
use nixrs_goal::{derivation_goal, path_substitution_goal, ExitCode, Scheduler};

/// Scenario 1: substitute a single store object with no dependencies.
///
/// Two `DummyStore`s A and B. `hello` is added to A; a scheduler on B runs
/// `PathSubstitutionGoal(H)` with B's substituter list `[A]`.
#[tokio::test]
async fn substitute_single_store_object() {
    let mut a = DummyStore::writable();
    let h = a.add_text_to_store("hello", b"Hello, world!", false).unwrap();

    let b = DummyStore::writable();
    let scheduler = Arc::new(Scheduler::new(b, StoreDir::default(), BuildSettings::default()));

    let outcome = path_substitution_goal(scheduler.clone(), h.clone(), vec![a.clone()], RepairFlag::NoRepair)
        .await
        .unwrap();
    assert_eq!(ExitCode::Success, outcome.exit_code);

    let mut b = scheduler.store();
    let info_a = a.query_path_info(&h).await.unwrap().unwrap();
    let info_b = b.query_path_info(&h).await.unwrap().unwrap();
    assert_eq!(info_a.nar_hash, info_b.nar_hash);
    assert_eq!(info_a.nar_size, info_b.nar_size);

    let mut nar_a = Vec::new();
    a.nar_from_path(&h, &mut nar_a).await.unwrap();
    let mut nar_b = Vec::new();
    b.nar_from_path(&h, &mut nar_b).await.unwrap();
    assert_eq!(nar_a, nar_b);
}

/// Scenario 2: substitute a path with one dependency.
///
/// `dep` and `main` (referencing `dep`) both live in A; substituting `main`
/// into B must pull `dep` along with it so B's copy of `main` doesn't end
/// up with a dangling reference.
#[tokio::test]
async fn substitute_with_one_dependency() {
    let mut a = DummyStore::writable();
    let dep = a.add_text_to_store("dep", b"a dependency", false).unwrap();

    let main_content = format!("I depend on {}", dep);
    let main = a
        .add_text_to_store("main", main_content.as_bytes(), false)
        .unwrap();
    {
        let mut info = a.query_path_info(&main).await.unwrap().unwrap();
        info.references.insert(dep.clone());
        // DummyStore has no separate "set references" entry point; adding
        // again with the reference recorded mirrors how a real store
        // records the reference scan performed while ingesting `main`.
        let mut nar = Vec::new();
        a.nar_from_path(&main, &mut nar).await.unwrap();
        a.add_to_store(
            &info,
            Cursor::new(nar),
            RepairFlag::NoRepair,
            nixrs::store::CheckSignaturesFlag::NoCheckSigs,
        )
        .await
        .unwrap();
    }

    let b = DummyStore::writable();
    let scheduler = Arc::new(Scheduler::new(b, StoreDir::default(), BuildSettings::default()));

    let outcome = path_substitution_goal(
        scheduler.clone(),
        main.clone(),
        vec![a.clone()],
        RepairFlag::NoRepair,
    )
    .await
    .unwrap();
    // `PathSubstitutionGoal` walks the freshly-copied path's references and
    // awaits a nested goal per reference, so a single goal on `main` also
    // leaves `dep` valid in B without a separate explicit request for it.
    assert_eq!(ExitCode::Success, outcome.exit_code);

    let mut b = scheduler.store();
    let info = b.query_path_info(&main).await.unwrap().unwrap();
    assert!(info.references.contains(&dep));
    assert!(b.query_path_info(&dep).await.unwrap().is_some());

    let mut nar_a = Vec::new();
    a.nar_from_path(&dep, &mut nar_a).await.unwrap();
    let mut nar_b = Vec::new();
    b.nar_from_path(&dep, &mut nar_b).await.unwrap();
    assert_eq!(nar_a, nar_b);
}

fn drv_stand_in_path(name: &str) -> StorePath {
    format!("g1w7hy3qg1w7hy3qg1w7hy3qg1w7hy3q-{name}.drv")
        .parse()
        .unwrap()
}

fn single_output_drv(name: &str, output: DerivationOutput) -> Derivation {
    Derivation {
        name: name.to_string(),
        platform: "x86_64-linux".into(),
        builder: "/bin/sh".into(),
        args: vec!["-c".into(), "echo Hello".into()],
        env: BTreeMap::from([("out".into(), String::new())]),
        input_srcs: Default::default(),
        input_drvs: BTreeMap::new(),
        outputs: BTreeMap::from([("out".to_string(), output)]),
        structured_attrs: None,
    }
}

/// Scenario 3: build-trace substitution for a CA floating output.
///
/// `drv` has one floating output `out` (method=nar, algo=sha256) and no
/// static output path. A's build trace already has a realisation for
/// `drvHash["out"]` pointing at an output valid in A. Running
/// `DerivationGoal(drv, "out")` against B (with A as a substituter) must
/// resolve the output through the build trace and substitute it in,
/// without ever calling a builder.
#[tokio::test]
async fn build_trace_substitution_for_floating_output() {
    let store_dir = StoreDir::default();
    let drv = single_output_drv(
        "thing",
        DerivationOutput::CAFloating(ContentAddressMethodAlgorithm::Recursive(Algorithm::SHA256)),
    );
    let modulo = drv.hash_derivation_modulo(&store_dir, &BTreeMap::new()).unwrap();
    let drv_hash = *modulo.hashes.get("out").unwrap();
    let output_name: nixrs::derived_path::OutputName = "out".parse().unwrap();
    let id = DrvOutput {
        drv_hash,
        output_name: output_name.clone(),
    };

    let mut a = DummyStore::writable();
    let out_in_a = a.add_text_to_store("thing-out", b"built output", false).unwrap();
    a.insert_realisation(Realisation {
        id: id.clone(),
        out_path: out_in_a.clone(),
        signatures: Default::default(),
        dependent_realisations: Default::default(),
    });

    let b = DummyStore::writable();
    let scheduler = Arc::new(Scheduler::new(b, store_dir, BuildSettings::default()));

    let outcome = derivation_goal(
        scheduler.clone(),
        drv_stand_in_path("thing"),
        drv,
        output_name,
        vec![a.clone()],
    )
    .await
    .unwrap();
    assert_eq!(ExitCode::Success, outcome.exit_code);
    assert_eq!(Some(out_in_a.clone()), outcome.output_path);

    let mut b = scheduler.store();
    assert!(b.query_path_info(&out_in_a).await.unwrap().is_some());
    assert_eq!(Some(out_in_a), scheduler.lookup_realisation(&id).map(|r| r.out_path));
}

/// Scenario 4: fill-in-deferred, happy path, driven through `DerivationGoal`.
///
/// `drv` starts with a `Deferred` output and no `inputDrvs`, so
/// `hashDerivationModulo`/`fillInOutputPaths` can resolve it completely to
/// an `InputAddressed` path before the goal ever sees it — the same
/// division of labour `DerivationGoal`'s own doc comment describes.
/// `DerivationGoal` then substitutes that now-concrete output from A.
#[tokio::test]
async fn fill_in_deferred_happy_path_then_substitute() {
    let store_dir = StoreDir::default();
    let mut drv = single_output_drv("thing", DerivationOutput::Deferred);
    let modulo = drv.hash_derivation_modulo(&store_dir, &BTreeMap::new()).unwrap();
    drv.fill_in_output_paths(&store_dir, &modulo).unwrap();
    let DerivationOutput::InputAddressed(resolved_path) = drv.outputs.get("out").unwrap().clone() else {
        panic!("fill_in_output_paths should have produced an InputAddressed output");
    };

    // Re-applying `fill_in_output_paths` is a no-op.
    let before = drv.outputs.clone();
    drv.fill_in_output_paths(&store_dir, &modulo).unwrap();
    assert_eq!(before, drv.outputs);

    let mut a = DummyStore::writable();
    {
        let nar = b"the built output";
        let out_path = a.add_text_to_store("thing-out", nar, false).unwrap();
        // `add_text_to_store` content-addresses its own path; swap the
        // recorded info over to the path `fillInOutputPaths` computed so A
        // can answer a query for it the way a real store's build step
        // would have written it there directly.
        let mut info = a.query_path_info(&out_path).await.unwrap().unwrap();
        info.path = resolved_path.clone();
        let mut nar_bytes = Vec::new();
        a.nar_from_path(&out_path, &mut nar_bytes).await.unwrap();
        a.add_to_store(
            &info,
            Cursor::new(nar_bytes),
            RepairFlag::NoRepair,
            nixrs::store::CheckSignaturesFlag::NoCheckSigs,
        )
        .await
        .unwrap();
    }

    let b = DummyStore::writable();
    let scheduler = Arc::new(Scheduler::new(b, store_dir, BuildSettings::default()));

    let outcome = derivation_goal(
        scheduler.clone(),
        drv_stand_in_path("thing"),
        drv,
        "out".parse().unwrap(),
        vec![a],
    )
    .await
    .unwrap();
    assert_eq!(ExitCode::Success, outcome.exit_code);
    assert_eq!(Some(resolved_path.clone()), outcome.output_path);
    assert!(scheduler.store().query_path_info(&resolved_path).await.unwrap().is_some());
}

/// Scenario 5: fill-in-deferred, blocked by a dynamic input.
///
/// `drv`'s single output is still `Deferred` and `inputDrvs` references
/// another derivation whose hash this goal graph has no bottom-up pass to
/// resolve. `DerivationGoal` must report `Failed` rather than guessing a
/// path, since nothing short of that input actually resolving can tell it
/// what `out`'s path is.
#[tokio::test]
async fn fill_in_deferred_blocked_by_unresolved_input() {
    let store_dir = StoreDir::default();
    let mut drv = single_output_drv("thing", DerivationOutput::Deferred);
    let input_drv_path = drv_stand_in_path("dep");
    drv.input_drvs
        .insert(input_drv_path, std::collections::BTreeSet::from(["out".parse().unwrap()]));

    let b = DummyStore::writable();
    let scheduler = Arc::new(Scheduler::new(b, store_dir, BuildSettings::default()));

    let outcome = derivation_goal(
        scheduler.clone(),
        drv_stand_in_path("thing"),
        drv,
        "out".parse().unwrap(),
        Vec::<DummyStore>::new(),
    )
    .await
    .unwrap();
    assert_eq!(ExitCode::Failed, outcome.exit_code);
    assert_eq!(None, outcome.output_path);
}

/// Scenario 6: `OutputsSpec` union algebra, exercised directly (it has no
/// store or goal dimension to drive through a `DummyStore`).
#[test]
fn outputs_spec_union() {
    use nixrs::derived_path::OutputSpec;

    let a: OutputSpec = "a".parse().unwrap();
    let b: OutputSpec = "b".parse().unwrap();
    let ab: OutputSpec = "a,b".parse().unwrap();
    assert_eq!(ab, a.union_(&b));

    let all: OutputSpec = "*".parse().unwrap();
    assert_eq!(all, all.union_(&a));
}

/// A path B has no substituter for ends the goal with `NoSubstituters`,
/// not an error.
#[tokio::test]
async fn no_substituters_is_not_an_error() {
    let a = DummyStore::writable();
    let b = DummyStore::writable();
    let scheduler = Arc::new(Scheduler::new(b, StoreDir::default(), BuildSettings::default()));

    let mut unrelated = DummyStore::writable();
    let missing = unrelated.add_text_to_store("missing", b"never copied", false).unwrap();

    let outcome = path_substitution_goal(scheduler, missing, vec![a], RepairFlag::NoRepair)
        .await
        .unwrap();
    assert_eq!(ExitCode::NoSubstituters, outcome.exit_code);
}
