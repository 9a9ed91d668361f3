use clap::Parser;
use complement_scheduler::cluster::{Cluster, Node};
use complement_scheduler::metrics::ConstantMetricsBackend;
use complement_scheduler::resource_manager::MockResourceManager;
use complement_scheduler::telemetry::NullTelemetryExport;
use complement_scheduler::topology::SlotIndex;
use complement_scheduler::{Application, ComplementarityEstimator, Config, PolicyKind, Scheduler};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, clap::Parser)]
#[command(long_about = None)]
struct Args {
    /// Number of nodes in the cluster.
    #[arg(long, default_value_t = 8)]
    num_nodes: usize,
    /// Container slots per node.
    #[arg(long, default_value_t = 4)]
    node_capacity: usize,
    /// Number of applications submitted at startup.
    #[arg(long, default_value_t = 20)]
    num_applications: usize,
    /// Containers requested per application.
    #[arg(long, default_value_t = 2)]
    app_containers: usize,
    /// Placement policy to use.
    #[arg(long, default_value_t = String::from("round-robin"))]
    policy: String,
    /// Periodic update interval, in ms. Defaults faster than the library's
    /// own 60s default so the demo produces visible ticks within
    /// `run_for_ms`.
    #[arg(long, default_value_t = 250)]
    update_interval_ms: u64,
    /// Simulated completion delay for every admitted application, in ms.
    #[arg(long, default_value_t = 500)]
    completion_delay_ms: u64,
    /// How long to let the scheduler run before stopping it, in ms.
    #[arg(long, default_value_t = 5000)]
    run_for_ms: u64,
    /// Print the waiting-time histogram and the estimator's learned table
    /// on exit.
    #[arg(long, default_value_t = false)]
    print_estimation: bool,
    /// Path to save the estimator's learned table to on exit, if any.
    #[arg(long)]
    estimator_output: Option<String>,
    /// Initial seed for the pseudo-random number generator.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn parse_policy(policy: &str) -> anyhow::Result<PolicyKind> {
    match policy {
        "random" => Ok(PolicyKind::Random),
        "round-robin" => Ok(PolicyKind::RoundRobin),
        "adaptive" => Ok(PolicyKind::Adaptive),
        "group-adaptive" => Ok(PolicyKind::GroupAdaptive),
        "group-adaptive-extend" => Ok(PolicyKind::GroupAdaptiveExtend),
        other => Err(anyhow::anyhow!("unknown policy: {other}")),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let policy = parse_policy(&args.policy)?;

    let nodes = (0..args.num_nodes)
        .map(|i| Node::new(format!("node-{i}"), args.node_capacity))
        .collect();
    let cluster = Cluster::new(
        nodes,
        SlotIndex::new(),
        Arc::new(ConstantMetricsBackend { rate: 0.7 }),
    );

    let config = Config {
        update_interval: Duration::from_millis(args.update_interval_ms),
        print_estimation: args.print_estimation,
        seed: args.seed,
        estimator_output: args.estimator_output.clone(),
        ..Config::new(policy)
    };

    let scheduler = Scheduler::new(
        cluster,
        Box::new(ComplementarityEstimator::new()),
        Arc::new(MockResourceManager::new(Duration::from_millis(
            args.completion_delay_ms,
        ))),
        Arc::new(NullTelemetryExport),
        config,
    );

    let apps = (0..args.num_applications).map(|i| {
        Application::without_group(i as u64, format!("app-{i}"), args.app_containers)
    });
    scheduler.add_applications(apps);

    log::info!(
        "starting scheduler: policy={policy}, nodes={}, queued={}",
        args.num_nodes,
        scheduler.queue_len()
    );
    scheduler.start();
    std::thread::sleep(Duration::from_millis(args.run_for_ms));
    scheduler.stop()?;

    Ok(())
}
