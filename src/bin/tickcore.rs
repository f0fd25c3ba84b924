use clap::Parser;
use serde_json::{json, Value};
use std::{cell::Cell, path::PathBuf, rc::Rc, time::Duration};
use tickcore::{
    config::SimulationConfig,
    context::{ExecutionContext, SharedState},
    diagnostics::{metrics::InMemoryMetrics, TracingLogger},
    error::{CapabilityError, ProcessError, ProcessResult},
    simulation::{self, WallClockProbe},
    Member, Members, Process, ProcessConfig, Protocol, ProtocolConfig, Scheduler, TickResult,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

/// Counts every tick it has seen.
#[derive(Default)]
struct Census {
    seen: u64,
}

impl Process for Census {
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
        self.seen += 1;
        ctx.shared_mut().set("census.seen", self.seen)?;
        Ok(())
    }
}

/// Deposits one unit of energy per tick into the ledger.
#[derive(Default)]
struct Harvest;

impl Process for Harvest {
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
        let balance = ctx.surface().call("deposit", &[json!(1)])?;
        ctx.shared_mut().set("ledger.balance", balance)?;
        Ok(())
    }
}

/// Fails on every third tick.
#[derive(Default)]
struct Flaky;

impl Process for Flaky {
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
        if ctx.tick() % 3 == 0 {
            return Err(ProcessError::failed(format!(
                "flaky unit gave up on tick {}",
                ctx.tick()
            )));
        }
        Ok(())
    }
}

/// Burns a few milliseconds of the cycle budget.
#[derive(Default)]
struct Planner;

impl Process for Planner {
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
        std::thread::sleep(Duration::from_millis(5));
        ctx.metrics()
            .record("planner.usage", ctx.compute().current_usage());
        Ok(())
    }
}

#[derive(Default)]
struct Ledger {
    balance: Cell<i64>,
}

impl Protocol for Ledger {
    fn members(self: Rc<Self>) -> Vec<(String, Member)> {
        Members::of(self)
            .method("deposit", |ledger, args| {
                let amount = args
                    .first()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| CapabilityError::InvalidArgument {
                        member: "deposit".to_string(),
                        message: "expected an integer amount".to_string(),
                    })?;
                ledger.balance.set(ledger.balance.get() + amount);
                Ok(json!(ledger.balance.get()))
            })
            .method("balance", |ledger, _| Ok(json!(ledger.balance.get())))
            .property("currency", "energy")
            .build()
    }
}

async fn run(cli: &Cli) -> TickResult<()> {
    let config = if cli.config.exists() {
        SimulationConfig::from_file(&cli.config)?
    } else {
        SimulationConfig::default()
    };

    info!("config loaded.");
    debug!("config: {:?}", config);

    let metrics = InMemoryMetrics::new();
    let mut scheduler = Scheduler::builder()
        .config(config.scheduler.clone())
        .logger(Rc::new(TracingLogger))
        .metrics(Rc::new(metrics.clone()))
        .process_default::<Census>(ProcessConfig::singleton("census", 100))?
        .process_default::<Harvest>(ProcessConfig::new("harvest", 50))?
        .process_default::<Flaky>(ProcessConfig::new("flaky", 20))?
        .process_default::<Planner>(ProcessConfig::new("planner", 10))?
        .protocol_default::<Ledger>(ProtocolConfig::new("ledger"))?
        .build()?;

    let probe = WallClockProbe::from_config(&config);
    let mut shared = SharedState::new();

    println!(
        "Running {} cycles every {:?}. Press Ctrl+C to stop early.",
        config.cycles, config.tick_interval
    );

    let print_report = |report: &tickcore::CycleReport| match serde_json::to_string(report) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("Failed to serialize report: {}", e),
    };

    tokio::select! {
        result = simulation::drive(&mut scheduler, &probe, &mut shared, &config, print_report) => {
            let completed = result?;
            info!("Simulation finished after {} cycles", completed);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Shutdown signal received, stopping simulation.");
        }
    }

    for name in metrics.names() {
        debug!(
            "metric {}: count={}, mean={:?}",
            name,
            metrics.count(&name),
            metrics.mean(&name)
        );
    }
    println!("Final shared state: {}", Value::from(shared));

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
