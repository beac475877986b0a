use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nixrs::realisation::{DrvOutput, Realisation};
use nixrs::store::{BuildSettings, MutexStore, Store};
use nixrs::store_path::{StoreDir, StoreDirProvider};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::goals::{
    BuildTraceOutcome, BuildingOutcome, DerivationOutcome, ResolutionOutcome, SubstitutionOutcome,
    TrampolineOutcome,
};
use crate::job::JobCategory;
use crate::table::GoalTable;

/// Default `pollInterval`, matching the C++ worker's `settings.pollInterval`
/// default of 5 seconds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Caps concurrent substituter dials the way `maxSubstitutionJobs` does,
/// since it is not yet wired through the command line the way
/// `maxBuildJobs` is.
const DEFAULT_MAX_SUBSTITUTION_JOBS: u64 = 16;

/// Owns the job-slot semaphores and the per-goal-type interning tables
/// that back the whole scheduler; the Rust analogue of `Worker`.
///
/// Goals are plain `async fn`s (see [`crate::goals`]) rather than
/// hand-rolled coroutines: a goal's suspension points are just the
/// `.await`s on store calls, sub-goal futures, semaphore permits, and
/// `tokio::time::sleep`. The scheduler's job is purely to dedup
/// concurrent requests for the same goal key and gate how many goals of
/// each category may be doing real work (spawning a child, dialing a
/// substituter) at once.
pub struct Scheduler<S> {
    store: MutexStore<S>,
    store_dir: StoreDir,
    settings: Arc<BuildSettings>,
    build_permits: Arc<Semaphore>,
    substitution_permits: Arc<Semaphore>,
    poll_interval: Duration,

    /// `buildTrace[drvHash][outputName]`, flattened to a single map
    /// keyed by the pair directly. Populated as `DerivationBuildingGoal`
    /// runs finish, consulted by `BuildTraceTrampolineGoal` as the
    /// "can we skip building?" oracle.
    build_trace: Mutex<HashMap<DrvOutput, Realisation>>,

    pub(crate) trampoline_goals: GoalTable<TrampolineOutcome>,
    pub(crate) derivation_goals: GoalTable<DerivationOutcome>,
    pub(crate) resolution_goals: GoalTable<ResolutionOutcome>,
    pub(crate) build_trace_goals: GoalTable<BuildTraceOutcome>,
    pub(crate) path_substitution_goals: GoalTable<SubstitutionOutcome>,
    pub(crate) drv_output_substitution_goals: GoalTable<SubstitutionOutcome>,
    pub(crate) building_goals: GoalTable<BuildingOutcome>,
}

impl<S> Scheduler<S>
where
    S: Store + Send + 'static,
{
    pub fn new(store: S, store_dir: StoreDir, settings: BuildSettings) -> Self {
        let max_substitution_jobs = if settings.max_substitution_jobs > 0 {
            settings.max_substitution_jobs
        } else {
            DEFAULT_MAX_SUBSTITUTION_JOBS
        };
        Scheduler {
            store: MutexStore::new(store_dir.clone(), store),
            store_dir,
            build_permits: Arc::new(Semaphore::new(settings.max_build_jobs.max(1) as usize)),
            substitution_permits: Arc::new(Semaphore::new(max_substitution_jobs as usize)),
            settings: Arc::new(settings),
            poll_interval: DEFAULT_POLL_INTERVAL,
            build_trace: Mutex::new(HashMap::new()),
            trampoline_goals: GoalTable::new(),
            derivation_goals: GoalTable::new(),
            resolution_goals: GoalTable::new(),
            build_trace_goals: GoalTable::new(),
            path_substitution_goals: GoalTable::new(),
            drv_output_substitution_goals: GoalTable::new(),
            building_goals: GoalTable::new(),
        }
    }

    pub fn store(&self) -> MutexStore<S> {
        self.store.clone()
    }

    pub fn store_dir(&self) -> &StoreDir {
        &self.store_dir
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// `Worker::waitForBuildSlot`'s `JobCategory::Build`/`Substitution`
    /// arms: suspend until a slot is free, then hold it until the
    /// returned guard is dropped (the `childTerminated` equivalent).
    /// `Administration` goals never call this; they run unbounded.
    pub async fn acquire_slot(&self, category: JobCategory) -> Option<OwnedSemaphorePermit> {
        match category {
            JobCategory::Build => Some(
                self.build_permits
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("build semaphore never closed"),
            ),
            JobCategory::Substitution => Some(
                self.substitution_permits
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("substitution semaphore never closed"),
            ),
            JobCategory::Administration => None,
        }
    }

    /// `Worker::waitForAWhile`: used by lock-retry loops in
    /// `DerivationBuildingGoal` when another process holds the output
    /// lock.
    pub async fn wait_for_a_while(&self) {
        tokio::time::sleep(self.poll_interval).await;
    }

    /// Records a freshly-built output in the in-memory build trace, the
    /// same moment the C++ worker writes the realisation to the
    /// `BuildTrace` table in its DB.
    pub fn record_realisation(&self, id: DrvOutput, realisation: Realisation) {
        self.build_trace
            .lock()
            .expect("build trace mutex poisoned")
            .insert(id, realisation);
    }

    /// `BuildTraceTrampolineGoal`'s first check: is there already a known
    /// realisation for this output, without building or substituting
    /// anything?
    pub fn lookup_realisation(&self, id: &DrvOutput) -> Option<Realisation> {
        self.build_trace
            .lock()
            .expect("build trace mutex poisoned")
            .get(id)
            .cloned()
    }
}

