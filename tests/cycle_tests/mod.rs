use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tickcore::{
    config::SchedulerConfig,
    diagnostics::{metrics::InMemoryMetrics, MockLogger},
    CycleReport, Environment, ExecutionContext, Member, Members, Process, ProcessConfig,
    ProcessDescriptor, ProcessError, ProcessResult, Protocol, ProtocolConfig, Scheduler,
    SharedState,
};

use crate::ManualProbe;

type Trace = Rc<RefCell<Vec<String>>>;

/// Writes its name and the tick to the trace, optionally burning compute.
struct Recorder {
    name: String,
    trace: Trace,
    burn: Option<(Rc<Cell<f64>>, f64)>,
}

impl Process for Recorder {
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
        self.trace
            .borrow_mut()
            .push(format!("{}@{}", self.name, ctx.tick()));
        if let Some((usage, amount)) = &self.burn {
            usage.set(usage.get() + amount);
        }
        Ok(())
    }
}

fn recorder(name: &str, priority: i32, trace: &Trace) -> ProcessDescriptor {
    let (name, trace) = (name.to_string(), trace.clone());
    ProcessDescriptor::new(ProcessConfig::new(&name, priority), move || Recorder {
        name: name.clone(),
        trace: trace.clone(),
        burn: None,
    })
}

struct AlwaysFails;

impl Process for AlwaysFails {
    fn run(&mut self, _ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
        Err(ProcessError::failed("intentional failure"))
    }
}

#[derive(Default)]
struct Ledger {
    total: Cell<i64>,
}

impl Protocol for Ledger {
    fn members(self: Rc<Self>) -> Vec<(String, Member)> {
        Members::of(self)
            .method("add", |ledger, args| {
                let amount = args.first().and_then(Value::as_i64).unwrap_or(1);
                ledger.total.set(ledger.total.get() + amount);
                Ok(json!(ledger.total.get()))
            })
            .build()
    }
}

/// Adds to the ledger and mirrors the running total into shared state.
#[derive(Default)]
struct Depositor;

impl Process for Depositor {
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
        let total = ctx.surface().call("add", &[json!(2)])?;
        ctx.shared_mut().set("total", total)?;
        Ok(())
    }
}

fn cycle(
    scheduler: &mut Scheduler,
    probe: &ManualProbe,
    shared: &mut SharedState,
    tick: u64,
) -> CycleReport {
    probe.usage.set(0.0);
    scheduler.run(&Environment::new(tick, probe), shared)
}

#[test]
fn test_end_to_end_priority_execution() {
    let trace: Trace = Rc::default();
    let mut scheduler = Scheduler::builder()
        .process(recorder("LowPriority", 10, &trace))
        .unwrap()
        .process(recorder("HighPriority", 100, &trace))
        .unwrap()
        .process(recorder("MediumPriority", 50, &trace))
        .unwrap()
        .build()
        .unwrap();

    let probe = ManualProbe::new(100.0);
    let mut shared = SharedState::new();
    let report = cycle(&mut scheduler, &probe, &mut shared, 1);

    assert_eq!(
        *trace.borrow(),
        vec!["HighPriority@1", "MediumPriority@1", "LowPriority@1"]
    );
    assert_eq!(
        report,
        CycleReport {
            tick: 1,
            run: 3,
            failed: 0,
            skipped: 0,
        }
    );
}

#[test]
fn test_failing_unit_does_not_stop_cycle() {
    let trace: Trace = Rc::default();
    let mut scheduler = Scheduler::builder()
        .process(recorder("before", 30, &trace))
        .unwrap()
        .process(ProcessDescriptor::new(
            ProcessConfig::new("broken", 20),
            || AlwaysFails,
        ))
        .unwrap()
        .process(recorder("after", 10, &trace))
        .unwrap()
        .build()
        .unwrap();

    let probe = ManualProbe::new(100.0);
    let mut shared = SharedState::new();
    for tick in 1..=2 {
        let report = cycle(&mut scheduler, &probe, &mut shared, tick);
        assert_eq!((report.run, report.failed), (2, 1));
    }
    assert_eq!(
        *trace.borrow(),
        vec!["before@1", "after@1", "before@2", "after@2"]
    );
}

#[test]
fn test_budget_breach_skips_lower_priorities() {
    let trace: Trace = Rc::default();
    let probe = ManualProbe::new(100.0);
    let (usage, hungry_trace) = (probe.usage.clone(), trace.clone());

    let mut scheduler = Scheduler::builder()
        .config(SchedulerConfig::with_emergency_threshold(0.9))
        .process(ProcessDescriptor::new(
            ProcessConfig::new("hungry", 100),
            move || Recorder {
                name: "hungry".to_string(),
                trace: hungry_trace.clone(),
                burn: Some((usage.clone(), 95.0)),
            },
        ))
        .unwrap()
        .process(recorder("second", 50, &trace))
        .unwrap()
        .process(recorder("third", 10, &trace))
        .unwrap()
        .build()
        .unwrap();

    let mut shared = SharedState::new();
    let report = cycle(&mut scheduler, &probe, &mut shared, 7);

    assert_eq!(*trace.borrow(), vec!["hungry@7"]);
    assert_eq!(report.run, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.total(), 3);
}

#[test]
fn test_below_threshold_runs_everything() {
    let trace: Trace = Rc::default();
    let probe = ManualProbe::new(100.0);
    let (usage, spender_trace) = (probe.usage.clone(), trace.clone());

    let mut scheduler = Scheduler::builder()
        .process(ProcessDescriptor::new(
            ProcessConfig::new("spender", 100),
            move || Recorder {
                name: "spender".to_string(),
                trace: spender_trace.clone(),
                burn: Some((usage.clone(), 89.0)),
            },
        ))
        .unwrap()
        .process(recorder("next", 50, &trace))
        .unwrap()
        .build()
        .unwrap();

    let mut shared = SharedState::new();
    let report = cycle(&mut scheduler, &probe, &mut shared, 1);
    assert!(report.is_clean());
    assert_eq!(report.run, 2);
}

#[test]
fn test_empty_scheduler_emits_exactly_one_warning() {
    let mut logger = MockLogger::new();
    logger.expect_warn().times(1).return_const(());
    logger.expect_info().never();
    logger.expect_error().never();

    let mut scheduler = Scheduler::builder()
        .logger(Rc::new(logger))
        .build()
        .unwrap();

    let probe = ManualProbe::new(100.0);
    let mut shared = SharedState::new();
    let report = cycle(&mut scheduler, &probe, &mut shared, 1);

    assert_eq!(report, CycleReport::new(1));
    assert!(shared.is_empty());
}

#[test]
fn test_capability_state_survives_cycles() {
    let metrics = InMemoryMetrics::new();
    let mut scheduler = Scheduler::builder()
        .process_default::<Depositor>(ProcessConfig::new("depositor", 1))
        .unwrap()
        .protocol_default::<Ledger>(ProtocolConfig::new("ledger"))
        .unwrap()
        .metrics(Rc::new(metrics.clone()))
        .build()
        .unwrap();

    let probe = ManualProbe::new(100.0);
    let mut shared = SharedState::new();
    for tick in 1..=3 {
        cycle(&mut scheduler, &probe, &mut shared, tick);
    }

    assert_eq!(shared.get::<i64>("total").unwrap(), Some(6));
    assert_eq!(metrics.count("process.depositor"), 3);
    assert_eq!(metrics.sum("cycle.run"), 3.0);
    assert_eq!(metrics.sum("cycle.failed"), 0.0);
}

#[test]
fn test_singleton_and_per_cycle_construction_counts() {
    let built: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    let trace: Trace = Rc::default();

    let (b1, t1) = (built.clone(), trace.clone());
    let (b2, t2) = (built.clone(), trace.clone());
    let mut scheduler = Scheduler::builder()
        .process(ProcessDescriptor::new(
            ProcessConfig::singleton("singleton", 2),
            move || {
                b1.borrow_mut().push("singleton");
                Recorder {
                    name: "singleton".to_string(),
                    trace: t1.clone(),
                    burn: None,
                }
            },
        ))
        .unwrap()
        .process(ProcessDescriptor::new(
            ProcessConfig::new("fresh", 1),
            move || {
                b2.borrow_mut().push("fresh");
                Recorder {
                    name: "fresh".to_string(),
                    trace: t2.clone(),
                    burn: None,
                }
            },
        ))
        .unwrap()
        .build()
        .unwrap();

    let probe = ManualProbe::new(100.0);
    let mut shared = SharedState::new();
    for tick in 1..=3 {
        cycle(&mut scheduler, &probe, &mut shared, tick);
    }

    let built = built.borrow();
    assert_eq!(built.iter().filter(|n| **n == "singleton").count(), 1);
    assert_eq!(built.iter().filter(|n| **n == "fresh").count(), 3);
    assert_eq!(trace.borrow().len(), 6);
}

#[test]
fn test_world_is_visible_to_units() {
    struct World {
        rooms: u32,
    }

    struct RoomCounter;

    impl Process for RoomCounter {
        fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()> {
            let rooms = ctx
                .env()
                .world::<World>()
                .map(|w| w.rooms)
                .ok_or_else(|| ProcessError::failed("no world"))?;
            ctx.shared_mut().set("rooms", rooms)?;
            Ok(())
        }
    }

    let mut scheduler = Scheduler::builder()
        .process(ProcessDescriptor::new(
            ProcessConfig::new("rooms", 1),
            || RoomCounter,
        ))
        .unwrap()
        .build()
        .unwrap();

    let probe = ManualProbe::new(100.0);
    let world = World { rooms: 4 };
    let mut shared = SharedState::new();
    let env = Environment::new(1, &probe).with_world(&world);
    let report = scheduler.run(&env, &mut shared);

    assert_eq!(report.run, 1);
    assert_eq!(shared.get::<u32>("rooms").unwrap(), Some(4));
}

#[test]
fn test_tied_priorities_keep_order_across_cycles() {
    let trace: Trace = Rc::default();
    let mut scheduler = Scheduler::builder()
        .process(recorder("alpha", 5, &trace))
        .unwrap()
        .process(recorder("beta", 5, &trace))
        .unwrap()
        .process(recorder("lead", 9, &trace))
        .unwrap()
        .process(recorder("gamma", 5, &trace))
        .unwrap()
        .build()
        .unwrap();

    let probe = ManualProbe::new(100.0);
    let mut shared = SharedState::new();
    let mut cycles = Vec::new();
    for tick in 1..=2 {
        cycle(&mut scheduler, &probe, &mut shared, tick);
        let names: Vec<String> = trace
            .borrow_mut()
            .drain(..)
            .map(|entry| entry.split('@').next().unwrap_or_default().to_string())
            .collect();
        cycles.push(names);
    }

    // 同じ優先度は登録順のまま、サイクル間でも順序が変わらない
    assert_eq!(cycles[0], vec!["lead", "alpha", "beta", "gamma"]);
    assert_eq!(cycles[0], cycles[1]);
}
