//! The scheduler core (C5): owns the job queue, the cluster, and the
//! estimator behind a single lock, and drives the admission loop a round at
//! a time. Mirrors the reference simulator's split between a cheap,
//! synchronous `Simulation` driver and an external event source — here the
//! event source is completions reported by the `ResourceManager` collaborator
//! and ticks reported by the `PeriodicUpdater`, rather than a `BinaryHeap`.

use crate::application::{AppId, Application};
use crate::cluster::Cluster;
use crate::error::ScheduleError;
use crate::estimator::{leave_one_out_update, GroupEstimator};
use crate::policy::{get_application_to_schedule, place_containers, PolicyKind};
use crate::resource_manager::ResourceManager;
use crate::telemetry::{RunWindow, TelemetryExport};
use crate::topology::GroupTag;
use crate::updater::PeriodicUpdater;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Static configuration, supplied once at construction, never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub policy: PolicyKind,
    pub jobs_to_peek: usize,
    pub update_interval: Duration,
    pub waiting_limit: Option<u64>,
    pub print_estimation: bool,
    pub seed: u64,
    /// Where to persist the estimator's learned table at finalization, if
    /// anywhere. Finalization can be triggered by the last application's
    /// completion callback as well as by an explicit `Scheduler::stop`, so
    /// the path is carried here rather than passed in at call time.
    pub estimator_output: Option<String>,
}

impl Config {
    pub fn new(policy: PolicyKind) -> Self {
        Self {
            jobs_to_peek: policy.default_jobs_to_peek(),
            policy,
            update_interval: Duration::from_secs(60),
            waiting_limit: None,
            print_estimation: false,
            seed: 0,
            estimator_output: None,
        }
    }
}

struct SchedulerState {
    queue: VecDeque<Application>,
    cluster: Cluster,
    estimator: Box<dyn GroupEstimator>,
    waiting_time_hist: BTreeMap<u64, u64>,
    scheduled_apps_num: u64,
    rng: StdRng,
}

impl SchedulerState {
    fn run_update_tick(&mut self) {
        for (groups, sample) in self.cluster.apps_usage() {
            if groups.is_empty() || !sample.is_not_idle() {
                continue;
            }
            leave_one_out_update(self.estimator.as_mut(), &groups, sample.rate());
        }
    }
}

/// The scheduling core. Cheap to clone (an `Arc` handle); every public method
/// locks the shared state for the duration of its body and releases it
/// before returning.
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    resource_manager: Arc<dyn ResourceManager>,
    telemetry: Arc<dyn TelemetryExport>,
    config: Config,
    updater: Mutex<Option<PeriodicUpdater>>,
    started_at: Mutex<Option<Instant>>,
    finalized: AtomicBool,
}

impl Scheduler {
    pub fn new(
        cluster: Cluster,
        estimator: Box<dyn GroupEstimator>,
        resource_manager: Arc<dyn ResourceManager>,
        telemetry: Arc<dyn TelemetryExport>,
        config: Config,
    ) -> Arc<Self> {
        let state = SchedulerState {
            queue: VecDeque::new(),
            cluster,
            estimator,
            waiting_time_hist: BTreeMap::new(),
            scheduled_apps_num: 0,
            rng: StdRng::seed_from_u64(config.seed),
        };
        Arc::new(Self {
            state: Arc::new(Mutex::new(state)),
            resource_manager,
            telemetry,
            config,
            updater: Mutex::new(None),
            started_at: Mutex::new(None),
            finalized: AtomicBool::new(false),
        })
    }

    /// Enqueue one application. Does not attempt to schedule it; call
    /// `drain_round` (directly, or implicitly via `start`'s updater tick) to
    /// make progress on the queue.
    pub fn add_application(&self, app: Application) {
        let mut state = self.state.lock().unwrap();
        log::debug!("enqueued {app}");
        state.queue.push_back(app);
    }

    pub fn add_applications(&self, apps: impl IntoIterator<Item = Application>) {
        for app in apps {
            self.add_application(app);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn has_running_applications(&self) -> bool {
        self.state.lock().unwrap().cluster.has_application_running()
    }

    /// Start the periodic updater thread, which drains one schedulable
    /// application per tick and feeds the estimator from live usage
    /// samples.
    pub fn start(self: &Arc<Self>) {
        *self.started_at.lock().unwrap() = Some(Instant::now());
        let weak_self = Arc::downgrade(self);
        let interval = self.config.update_interval;
        let updater = PeriodicUpdater::start(interval, move || {
            if let Some(this) = weak_self.upgrade() {
                this.tick();
            }
        });
        *self.updater.lock().unwrap() = Some(updater);
    }

    /// One periodic-updater tick: refresh the estimator from current usage,
    /// then try to admit as many queued applications as currently fit.
    fn tick(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            state.run_update_tick();
        }
        self.drain_schedulable();
    }

    /// Admit every application the configured policy can currently place,
    /// one round at a time, until nothing more fits. Shared by the periodic
    /// updater's tick and by completion re-entry (§4.4(ii): "otherwise
    /// re-enter the round loop").
    fn drain_schedulable(self: &Arc<Self>) {
        loop {
            match self.try_schedule_one() {
                Ok(()) => continue,
                Err(ScheduleError::NoApplicationCanBeScheduled) => break,
                Err(e) => {
                    log::warn!("scheduling round aborted: {e}");
                    break;
                }
            }
        }
    }

    /// Attempt to admit a single application from the head of the queue
    /// window, per the configured policy. Fully placing it, committing it to
    /// the cluster as running, and submitting it to the resource manager.
    fn try_schedule_one(self: &Arc<Self>) -> Result<(), ScheduleError> {
        let mut state = self.state.lock().unwrap();
        if state.queue.is_empty() {
            return Err(ScheduleError::NoApplicationCanBeScheduled);
        }

        let (mut app, existing_group) = get_application_to_schedule(
            self.config.policy,
            &mut state.queue,
            &state.cluster,
            state.estimator.as_ref(),
            self.config.jobs_to_peek,
            state.scheduled_apps_num,
            self.config.waiting_limit,
            &mut state.rng,
        )?;

        // First-scheduling-round decrement (§3/§9): an application that was
        // never bumped past 0 waits one fewer tick than its raw count once
        // admitted.
        app.waiting_time = app.waiting_time.saturating_sub(1);
        *state.waiting_time_hist.entry(app.waiting_time).or_insert(0) += 1;

        let placement = place_containers(
            self.config.policy,
            &mut state.cluster,
            &mut app,
            &mut state.rng,
            existing_group,
        );
        if let Err(e) = placement {
            // Could not place even though the fit-check passed (e.g. the
            // peeked fit check raced a concurrent placement); requeue and
            // surface as "nothing schedulable this round" rather than
            // losing the application.
            state.queue.push_front(app);
            return Err(ScheduleError::Placement(e));
        }

        state.scheduled_apps_num += 1;
        let app_id = app.id;
        state.cluster.commit_running(app);
        drop(state);

        let weak_self = Arc::downgrade(self);
        self.resource_manager.submit(
            app_id,
            Box::new(move |finished_id| {
                if let Some(this) = weak_self.upgrade() {
                    this.on_application_finished(finished_id);
                }
            }),
        );
        Ok(())
    }

    /// §4.4(ii)/(iii): on every completion, remove the finished application
    /// and re-enter the round loop so a newly-freed slot is used
    /// immediately rather than waiting for the next periodic tick; if that
    /// leaves nothing queued and nothing running, finalize the run right
    /// here instead of relying on an external caller to notice.
    fn on_application_finished(self: &Arc<Self>, app_id: AppId) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(app) = state.cluster.remove_applications(app_id) {
                log::debug!("{app} finished");
            }
        }

        self.drain_schedulable();

        let drained = {
            let state = self.state.lock().unwrap();
            state.queue.is_empty() && !state.cluster.has_application_scheduled()
        };
        if drained {
            if let Err(e) = self.finalize() {
                log::warn!("finalization triggered by completion failed: {e}");
            }
        }
    }

    pub fn group_of_running(&self, app_id: AppId) -> Option<GroupTag> {
        let state = self.state.lock().unwrap();
        state
            .cluster
            .applications(true)
            .into_iter()
            .find(|a| a.id == app_id)
            .map(|a| a.group)
    }

    fn waiting_time_histogram(&self) -> BTreeMap<u64, u64> {
        self.state.lock().unwrap().waiting_time_hist.clone()
    }

    /// Print the waiting-time distribution and the estimator's learned
    /// table, when `print_estimation` is enabled, mirroring the original
    /// source's end-of-run diagnostics.
    fn print_estimation(&self) {
        if !self.config.print_estimation {
            return;
        }
        for (waiting_time, count) in self.waiting_time_histogram() {
            log::info!("waiting_time={waiting_time} count={count}");
        }
        self.state.lock().unwrap().estimator.print();
    }

    /// Stop the updater thread, persist the estimator, export telemetry for
    /// the run window, and print the waiting-time report. Safe to call from
    /// an external caller (e.g. the CLI, after its own fixed run duration)
    /// as well as from `on_application_finished`; `finalize` itself runs at
    /// most once.
    pub fn stop(&self) -> anyhow::Result<()> {
        self.finalize()
    }

    fn finalize(&self) -> anyhow::Result<()> {
        if self
            .finalized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        if let Some(updater) = self.updater.lock().unwrap().as_mut() {
            updater.stop();
        }
        self.print_estimation();

        if let Some(path) = self.config.estimator_output.as_deref() {
            self.state.lock().unwrap().estimator.save(path)?;
        }

        if let Some(started_at) = self.started_at.lock().unwrap().take() {
            let node_addresses: Vec<String> = self
                .state
                .lock()
                .unwrap()
                .cluster
                .nodes()
                .iter()
                .map(|n| n.address.clone())
                .collect();
            let window = RunWindow {
                node_addresses,
                started_at,
                stopped_at: Instant::now(),
            };
            self.telemetry.export(&window);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Node;
    use crate::estimator::ComplementarityEstimator;
    use crate::metrics::ConstantMetricsBackend;
    use crate::resource_manager::ManualResourceManager;
    use crate::telemetry::NullTelemetryExport;
    use crate::topology::SlotIndex;
    use std::thread;

    fn test_cluster(capacities: &[usize]) -> Cluster {
        let nodes = capacities
            .iter()
            .enumerate()
            .map(|(i, &c)| Node::new(format!("n{i}"), c))
            .collect();
        Cluster::new(nodes, SlotIndex::new(), Arc::new(ConstantMetricsBackend { rate: 0.5 }))
    }

    #[test]
    fn test_round_robin_schedules_and_completes_an_application() {
        let cluster = test_cluster(&[4, 4]);
        let rm = ManualResourceManager::new();
        let scheduler = Scheduler::new(
            cluster,
            Box::new(ComplementarityEstimator::new()),
            rm.clone(),
            Arc::new(NullTelemetryExport),
            Config::new(PolicyKind::RoundRobin),
        );

        scheduler.add_application(Application::without_group(1, "job", 4));
        assert_eq!(scheduler.queue_len(), 1);

        let result = scheduler.try_schedule_one();
        assert!(result.is_ok());
        assert_eq!(scheduler.queue_len(), 0);
        assert!(scheduler.has_running_applications());

        rm.finish(1);
        assert!(!scheduler.has_running_applications());
    }

    #[test]
    fn test_try_schedule_one_on_empty_queue_is_no_application() {
        let cluster = test_cluster(&[4]);
        let scheduler = Scheduler::new(
            cluster,
            Box::new(ComplementarityEstimator::new()),
            ManualResourceManager::new(),
            Arc::new(NullTelemetryExport),
            Config::new(PolicyKind::Random),
        );
        let result = scheduler.try_schedule_one();
        assert!(matches!(result, Err(ScheduleError::NoApplicationCanBeScheduled)));
    }

    #[test]
    fn test_start_stop_runs_at_least_one_tick_without_panicking() {
        let cluster = test_cluster(&[4, 4]);
        let rm = ManualResourceManager::new();
        let scheduler = Scheduler::new(
            cluster,
            Box::new(ComplementarityEstimator::new()),
            rm,
            Arc::new(NullTelemetryExport),
            Config {
                update_interval: Duration::from_millis(10),
                ..Config::new(PolicyKind::RoundRobin)
            },
        );
        scheduler.add_application(Application::without_group(1, "job", 4));
        scheduler.start();
        thread::sleep(Duration::from_millis(60));
        assert!(scheduler.has_running_applications());
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_completion_re_enters_the_round_loop_immediately() {
        // 1 node / 4 slots, queue = [A(n=4), B(n=4)], round-robin: B must
        // not wait for a periodic tick once A's completion frees the node.
        let cluster = test_cluster(&[4]);
        let rm = ManualResourceManager::new();
        let scheduler = Scheduler::new(
            cluster,
            Box::new(ComplementarityEstimator::new()),
            rm.clone(),
            Arc::new(NullTelemetryExport),
            Config::new(PolicyKind::RoundRobin),
        );
        scheduler.add_application(Application::without_group(1, "a", 4));
        scheduler.add_application(Application::without_group(2, "b", 4));
        scheduler.try_schedule_one().unwrap();
        assert_eq!(scheduler.queue_len(), 1);

        rm.finish(1);
        assert_eq!(scheduler.queue_len(), 0);
        assert!(scheduler.has_running_applications());
    }

    #[test]
    fn test_last_completion_finalizes_without_external_stop() {
        let cluster = test_cluster(&[4]);
        let rm = ManualResourceManager::new();
        let scheduler = Scheduler::new(
            cluster,
            Box::new(ComplementarityEstimator::new()),
            rm.clone(),
            Arc::new(NullTelemetryExport),
            Config::new(PolicyKind::RoundRobin),
        );
        scheduler.add_application(Application::without_group(1, "a", 4));
        scheduler.try_schedule_one().unwrap();

        rm.finish(1);
        assert!(!scheduler.has_running_applications());
        assert!(scheduler.finalized.load(Ordering::SeqCst));

        // A subsequent explicit stop must not panic or double-run.
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_waiting_time_is_decremented_once_on_admission() {
        let cluster = test_cluster(&[4]);
        let scheduler = Scheduler::new(
            cluster,
            Box::new(ComplementarityEstimator::new()),
            ManualResourceManager::new(),
            Arc::new(NullTelemetryExport),
            Config::new(PolicyKind::RoundRobin),
        );
        let mut app = Application::without_group(1, "a", 4);
        app.waiting_time = 3;
        scheduler.add_application(app);
        scheduler.try_schedule_one().unwrap();
        let hist = scheduler.waiting_time_histogram();
        assert_eq!(hist.get(&2), Some(&1));
        assert!(!hist.contains_key(&3));
    }

    #[test]
    fn test_run_update_tick_trains_on_a_lone_application_per_node() {
        let mut cluster = test_cluster(&[4]);
        cluster.place_container("n0", 1).unwrap();
        let mut app = Application::new(1, "solo", 9, 1);
        app.assign(0, "n0");
        cluster.commit_running(app);

        let mut state = SchedulerState {
            queue: VecDeque::new(),
            cluster,
            estimator: Box::new(ComplementarityEstimator::new()),
            waiting_time_hist: BTreeMap::new(),
            scheduled_apps_num: 0,
            rng: StdRng::seed_from_u64(0),
        };
        state.run_update_tick();
        // a single application alone on a node must still have produced a
        // (group, []) datapoint, not be skipped for lack of a peer.
        let (best_group, _) = state.estimator.best_group_pair(&[], &[9]);
        assert_eq!(best_group, 9);
    }

    #[test]
    fn test_waiting_time_saturates_at_zero() {
        let cluster = test_cluster(&[4]);
        let scheduler = Scheduler::new(
            cluster,
            Box::new(ComplementarityEstimator::new()),
            ManualResourceManager::new(),
            Arc::new(NullTelemetryExport),
            Config::new(PolicyKind::RoundRobin),
        );
        scheduler.add_application(Application::without_group(1, "a", 4));
        scheduler.try_schedule_one().unwrap();
        let hist = scheduler.waiting_time_histogram();
        assert_eq!(hist.get(&0), Some(&1));
    }
}
