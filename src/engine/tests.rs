//! Scenario tests for the process engine and daemon.
//!
//! A scriptable `test.probe` module is driven through real configuration
//! text; transitions are observed on the event bus. Timer behavior runs on a
//! paused tokio clock, which jumps to the retry deadline once every task is
//! idle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::engine::process::ProcessEngine;
use crate::engine::{Daemon, RETRY_INTERVAL};
use crate::error::{LoadError, ModuleError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::modules::{InstanceCtx, InstanceHandle, Module, ModuleInstance, ModuleRegistry};
use crate::value::Value;

// ---- the probe module ----

/// Shared controller for `test.probe` instances, keyed by the statement's
/// first argument.
#[derive(Default)]
struct ProbeState {
    /// Live instance handles (latest generation per key).
    handles: Mutex<HashMap<String, InstanceHandle>>,
    /// Remaining scripted init failures per key.
    init_failures: Mutex<HashMap<String, usize>>,
    /// Keys that do not report up from init (driven manually).
    manual_up: Mutex<HashSet<String>>,
    /// Keys whose variable resolution fails.
    var_failures: Mutex<HashSet<String>>,
}

type Probe = Arc<ProbeState>;

impl ProbeState {
    fn fail_init(&self, key: &str, times: usize) {
        self.init_failures.lock().unwrap().insert(key.into(), times);
    }

    fn manual(&self, key: &str) {
        self.manual_up.lock().unwrap().insert(key.into());
    }

    fn fail_vars(&self, key: &str) {
        self.var_failures.lock().unwrap().insert(key.into());
    }

    fn allow_vars(&self, key: &str) {
        self.var_failures.lock().unwrap().remove(key);
    }

    fn handle(&self, key: &str) -> InstanceHandle {
        self.handles
            .lock()
            .unwrap()
            .get(key)
            .expect("no live probe instance")
            .clone()
    }

    fn send_up(&self, key: &str) {
        self.handle(key).up();
    }

    fn send_down(&self, key: &str) {
        self.handle(key).down();
    }

    fn send_dying(&self, key: &str) {
        self.handle(key).dying();
    }

    fn send_died(&self, key: &str, is_error: bool) {
        self.handle(key).died(is_error);
    }
}

struct ProbeModule {
    state: Probe,
}

impl Module for ProbeModule {
    fn kind(&self) -> &str {
        "test.probe"
    }

    fn init(&self, ctx: InstanceCtx) -> Result<Box<dyn ModuleInstance>, ModuleError> {
        let key = ctx
            .args
            .as_list()
            .and_then(|args| args.first())
            .and_then(Value::as_str)
            .ok_or_else(|| ModuleError::BadArgs {
                reason: "first argument must name the probe".into(),
            })?
            .to_string();

        if let Some(left) = self.state.init_failures.lock().unwrap().get_mut(&key) {
            if *left > 0 {
                *left -= 1;
                return Err(ModuleError::Init {
                    reason: format!("scripted failure for {key}"),
                });
            }
        }

        self.state
            .handles
            .lock()
            .unwrap()
            .insert(key.clone(), ctx.handle.clone());
        if !self.state.manual_up.lock().unwrap().contains(&key) {
            ctx.handle.up();
        }

        Ok(Box::new(ProbeInstance {
            key,
            state: Arc::clone(&self.state),
            handle: ctx.handle,
        }))
    }
}

struct ProbeInstance {
    key: String,
    state: Probe,
    handle: InstanceHandle,
}

impl ModuleInstance for ProbeInstance {
    fn die(&mut self) {
        self.handle.died(false);
    }

    fn get_var(&self, path: &str) -> Result<Value, ModuleError> {
        if self.state.var_failures.lock().unwrap().contains(&self.key) {
            return Err(ModuleError::UnknownVariable { path: path.into() });
        }
        Ok(Value::str(format!("{}/{}", self.key, path)))
    }
}

// ---- harness ----

struct Harness {
    probe: Probe,
    rx: broadcast::Receiver<Event>,
    token: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

fn start(config_text: &str, configure: impl FnOnce(&ProbeState)) -> Harness {
    let probe: Probe = Arc::default();
    configure(&probe);

    let mut registry = ModuleRegistry::builtin();
    registry.register(Arc::new(ProbeModule {
        state: Arc::clone(&probe),
    }));

    let doc = config::parse(config_text).unwrap();
    let bus = Bus::default();
    let rx = bus.subscribe();
    let engine = ProcessEngine::load(&doc.processes[0], &registry, bus).unwrap();

    let token = CancellationToken::new();
    let task = tokio::spawn(engine.run(token.child_token()));
    Harness {
        probe,
        rx,
        token,
        task,
    }
}

impl Harness {
    async fn next(&mut self) -> Event {
        self.rx.recv().await.expect("event bus closed")
    }

    /// Asserts the very next event.
    async fn expect(&mut self, kind: EventKind, statement: Option<usize>) -> Event {
        let ev = self.next().await;
        assert_eq!(ev.kind, kind, "unexpected event {ev:?}");
        assert_eq!(ev.statement, statement, "unexpected statement in {ev:?}");
        ev
    }

    /// Skips events until the given one shows up.
    async fn expect_eventually(&mut self, kind: EventKind, statement: Option<usize>) -> Event {
        for _ in 0..64 {
            let ev = self.next().await;
            if ev.kind == kind && ev.statement == statement {
                return ev;
            }
        }
        panic!("event {kind:?} for statement {statement:?} not observed");
    }
}

const ABC: &str = r#"
    process p {
        test.probe("a");
        test.probe("b");
        test.probe("c");
    }
"#;

// ---- scenarios ----

#[tokio::test]
async fn chain_comes_up_in_order() {
    let mut h = start(ABC, |_| {});

    for i in 0..3 {
        h.expect(EventKind::StatementInitializing, Some(i)).await;
        h.expect(EventKind::StatementUp, Some(i)).await;
    }
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test]
async fn empty_process_is_immediate_victory() {
    let mut h = start("process p { }", |_| {});
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test(start_paused = true)]
async fn init_failure_schedules_retry_and_recovers() {
    let mut h = start(ABC, |p| p.fail_init("b", 1));

    h.expect(EventKind::StatementInitializing, Some(0)).await;
    h.expect(EventKind::StatementUp, Some(0)).await;
    h.expect(EventKind::StatementInitializing, Some(1)).await;
    let retry = h.expect(EventKind::RetryScheduled, Some(1)).await;
    assert_eq!(retry.delay, Some(RETRY_INTERVAL));

    // the paused clock jumps to the deadline; the advance re-runs and succeeds
    h.expect(EventKind::StatementInitializing, Some(1)).await;
    h.expect(EventKind::StatementUp, Some(1)).await;
    h.expect(EventKind::StatementInitializing, Some(2)).await;
    h.expect(EventKind::StatementUp, Some(2)).await;
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test]
async fn down_tears_down_dependents_in_reverse_and_reinstates() {
    let mut h = start(ABC, |_| {});
    h.expect_eventually(EventKind::ProcessUp, None).await;

    h.probe.send_down("a");
    h.expect(EventKind::StatementDown, Some(0)).await;
    h.expect(EventKind::StatementDying, Some(2)).await;
    h.expect(EventKind::StatementDied, Some(2)).await;
    h.expect(EventKind::StatementDying, Some(1)).await;
    h.expect(EventKind::StatementDied, Some(1)).await;

    // the frontier waits for `a`; once it is back up the chain is reinstated
    h.probe.send_up("a");
    h.expect(EventKind::StatementUp, Some(0)).await;
    h.expect(EventKind::StatementInitializing, Some(1)).await;
    h.expect(EventKind::StatementUp, Some(1)).await;
    h.expect(EventKind::StatementInitializing, Some(2)).await;
    h.expect(EventKind::StatementUp, Some(2)).await;
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test(start_paused = true)]
async fn variable_resolution_failure_retries_until_it_succeeds() {
    let config = r#"
        process p {
            test.probe("a") a;
            test.probe("b", a.x);
        }
    "#;
    let mut h = start(config, |p| p.fail_vars("a"));

    h.expect(EventKind::StatementInitializing, Some(0)).await;
    h.expect(EventKind::StatementUp, Some(0)).await;

    // two failing cycles, spaced by the retry interval
    for _ in 0..2 {
        h.expect(EventKind::StatementInitializing, Some(1)).await;
        let retry = h.expect(EventKind::RetryScheduled, Some(1)).await;
        assert_eq!(retry.delay, Some(RETRY_INTERVAL));
    }

    h.probe.allow_vars("a");
    h.expect(EventKind::StatementInitializing, Some(1)).await;
    h.expect(EventKind::StatementUp, Some(1)).await;
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test(start_paused = true)]
async fn unknown_referent_keeps_retrying() {
    let config = r#"
        process p {
            test.probe("a");
            test.probe("b", z.v);
        }
    "#;
    let mut h = start(config, |_| {});

    h.expect(EventKind::StatementInitializing, Some(0)).await;
    h.expect(EventKind::StatementUp, Some(0)).await;
    for _ in 0..3 {
        h.expect(EventKind::StatementInitializing, Some(1)).await;
        h.expect(EventKind::RetryScheduled, Some(1)).await;
    }
    h.task.abort();
}

#[tokio::test]
async fn termination_mid_advance_retreats_fully() {
    let mut h = start(ABC, |p| p.manual("b"));

    h.expect(EventKind::StatementInitializing, Some(0)).await;
    h.expect(EventKind::StatementUp, Some(0)).await;
    h.expect(EventKind::StatementInitializing, Some(1)).await;

    // `b` is still CHILD and `c` was never created
    h.token.cancel();
    h.expect(EventKind::StatementDying, Some(1)).await;
    h.expect(EventKind::StatementDied, Some(1)).await;
    h.expect(EventKind::StatementDying, Some(0)).await;
    h.expect(EventKind::StatementDied, Some(0)).await;
    h.expect(EventKind::ProcessRetreated, None).await;

    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dying_with_error_schedules_retry() {
    let config = r#"process p { test.probe("a"); test.probe("b"); }"#;
    let mut h = start(config, |_| {});
    h.expect_eventually(EventKind::ProcessUp, None).await;

    h.probe.send_dying("b");
    h.probe.send_died("b", true);
    h.expect(EventKind::StatementDying, Some(1)).await;
    let died = h.expect(EventKind::StatementDied, Some(1)).await;
    assert!(died.error.is_some());
    h.expect(EventKind::RetryScheduled, Some(1)).await;

    // after the deadline, `b` comes back and the chain is whole again
    h.expect(EventKind::StatementInitializing, Some(1)).await;
    h.expect(EventKind::StatementUp, Some(1)).await;
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test]
async fn dying_from_child_reinstates_without_error() {
    let mut h = start(ABC, |p| p.manual("b"));

    h.expect(EventKind::StatementInitializing, Some(0)).await;
    h.expect(EventKind::StatementUp, Some(0)).await;
    h.expect(EventKind::StatementInitializing, Some(1)).await;

    // DYING straight from CHILD, no prior UP
    h.probe.send_dying("b");
    h.probe.send_died("b", false);
    h.expect(EventKind::StatementDying, Some(1)).await;
    h.expect(EventKind::StatementDied, Some(1)).await;

    // no error, so the advance re-creates `b` immediately
    h.expect(EventKind::StatementInitializing, Some(1)).await;
    h.probe.send_up("b");
    h.expect(EventKind::StatementUp, Some(1)).await;
    h.expect(EventKind::StatementInitializing, Some(2)).await;
    h.expect(EventKind::StatementUp, Some(2)).await;
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test]
async fn up_then_dying_settles_like_direct_dying() {
    let mut h = start(ABC, |p| p.manual("b"));

    h.expect(EventKind::StatementInitializing, Some(0)).await;
    h.expect(EventKind::StatementUp, Some(0)).await;
    h.expect(EventKind::StatementInitializing, Some(1)).await;

    // UP immediately followed by DYING: `c` may briefly get created, but the
    // chain settles at re-initializing `b`, same as dying straight from CHILD
    h.probe.send_up("b");
    h.probe.send_dying("b");
    h.probe.send_died("b", false);
    h.expect_eventually(EventKind::StatementDied, Some(1)).await;
    h.expect_eventually(EventKind::StatementInitializing, Some(1))
        .await;

    h.probe.send_up("b");
    h.expect_eventually(EventKind::ProcessUp, None).await;
    h.task.abort();
}

#[tokio::test]
async fn reports_violating_preconditions_are_dropped() {
    let config = r#"process p { test.probe("a"); }"#;
    let mut h = start(config, |_| {});
    h.expect_eventually(EventKind::ProcessUp, None).await;

    // a second UP while ADULT must not produce any event or corrupt state
    h.probe.send_up("a");
    h.probe.send_down("a");
    h.expect(EventKind::StatementDown, Some(0)).await;

    h.probe.send_up("a");
    h.expect(EventKind::StatementUp, Some(0)).await;
    h.expect(EventKind::ProcessUp, None).await;
    h.task.abort();
}

// ---- daemon ----

#[tokio::test]
async fn daemon_requires_at_least_one_loaded_process() {
    let doc = config::parse("process p { no.such.module(); }").unwrap();
    let daemon = Daemon::new(doc, ModuleRegistry::builtin());

    let err = daemon.run().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Load(LoadError::NoProcesses)));
}

#[tokio::test]
async fn daemon_skips_processes_that_fail_to_load() {
    let probe: Probe = Arc::default();
    let mut registry = ModuleRegistry::builtin();
    registry.register(Arc::new(ProbeModule {
        state: Arc::clone(&probe),
    }));

    let doc = config::parse(
        r#"
        process bad { no.such.module(); }
        process good { test.probe("a"); }
        "#,
    )
    .unwrap();
    let daemon = Daemon::new(doc, registry);
    let mut rx = daemon.subscribe();
    let task = tokio::spawn(daemon.run());

    loop {
        let ev = rx.recv().await.unwrap();
        if ev.kind == EventKind::ProcessUp {
            assert_eq!(ev.process.as_deref(), Some("good"));
            break;
        }
    }
    task.abort();
}

#[tokio::test]
async fn global_init_failure_aborts_startup() {
    struct BrokenModule;

    impl Module for BrokenModule {
        fn kind(&self) -> &str {
            "broken"
        }

        fn global_init(&self) -> Result<(), ModuleError> {
            Err(ModuleError::Init {
                reason: "no hardware".into(),
            })
        }

        fn init(&self, _ctx: InstanceCtx) -> Result<Box<dyn ModuleInstance>, ModuleError> {
            unreachable!("never instantiated")
        }
    }

    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(BrokenModule));
    let doc = config::parse("process p { }").unwrap();

    let err = Daemon::new(doc, registry).run().await.unwrap_err();
    assert!(matches!(err, RuntimeError::GlobalInit { ref module, .. } if module == "broken"));
}
