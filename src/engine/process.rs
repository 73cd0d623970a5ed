//! # ProcessEngine: the per-process state machine.
//!
//! Owns the ordered statement vector and the two interlocked pointers:
//!
//! - **AP** (advance pointer): index of the next statement to instantiate;
//!   everything before it has a requested, not-torn-down instance.
//! - **FP** (live pointer): one past the last statement with a live instance;
//!   everything at or after it is `FORGOTTEN`.
//!
//! `AP <= FP` always. `AP == FP == len` is victory. When `AP < FP`, the
//! statements in `[AP, FP)` have lost their prerequisite and are torn down
//! from the back before the chain can advance again.
//!
//! ## Control flow
//! Every external stimulus funnels through [`work`](ProcessEngine::work):
//!
//! ```text
//! instance feedback (Up/Down/Dying/Died) ─┐
//! retry deadline ─────────────────────────┼──► update state ──► work()
//! terminate edge ─────────────────────────┘          │
//!                                                    ├─ terminating? retreat()
//! work(): disarm retry timer                         └─ otherwise    fight()
//!
//! fight():  AP < FP          → kill stmts[FP-1] (once), await its death
//!           AP == FP, frontier CHILD → wait for it to come up
//!           AP == FP, frontier ADULT → advance()
//!
//! advance(): AP == len → victory
//!            retry window open → wait()
//!            else materialize args, init instance → CHILD, AP+=1, FP+=1
//!            on failure → record error, wait()
//!
//! retreat(): FP == 0 → done, actor exits
//!            else kill stmts[FP-1], clamp AP
//! ```
//!
//! ## Rules
//! - The engine runs as one actor task; feedback is serialized through an
//!   mpsc channel, so every transition runs to completion before the next is
//!   observed. Modules may report `Up` from inside `init`; it is just a
//!   queued message.
//! - Feedback carrying a stale epoch, or violating a state precondition, is
//!   logged and dropped; modules are external code.
//! - Only the statement at AP can be waiting, so one retry deadline per
//!   process suffices; it is cleared at the top of every `work`.

use futures::future::OptionFuture;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ProcessDecl;
use crate::engine::statement::{Argument, ProcStatement, StatementState, StatementTemplate};
use crate::error::{AdvanceError, LoadError};
use crate::events::{Bus, Event, EventKind};
use crate::modules::{
    Feedback, FeedbackMsg, InstanceCtx, InstanceHandle, ModuleRegistry, StatementEvent,
};
use crate::value::Value;

/// The state engine for one declared process.
pub(crate) struct ProcessEngine {
    name: String,
    stmts: Vec<ProcStatement>,
    /// Advance pointer.
    ap: usize,
    /// Live pointer.
    fp: usize,
    /// Armed retry deadline; `None` means the timer is disarmed.
    deadline: Option<Instant>,
    terminating: bool,
    finished: bool,
    tx: mpsc::UnboundedSender<FeedbackMsg>,
    rx: mpsc::UnboundedReceiver<FeedbackMsg>,
    bus: Bus,
}

impl ProcessEngine {
    /// Loads a process from its parsed declaration.
    ///
    /// Statement templates load atomically: the first failure aborts the
    /// whole process load.
    pub(crate) fn load(
        decl: &ProcessDecl,
        registry: &ModuleRegistry,
        bus: Bus,
    ) -> Result<Self, LoadError> {
        let mut stmts = Vec::with_capacity(decl.statements.len());
        for (index, sdecl) in decl.statements.iter().enumerate() {
            let template = StatementTemplate::load(&decl.name, index, sdecl, registry)?;
            stmts.push(ProcStatement::new(index, template));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            name: decl.name.clone(),
            stmts,
            ap: 0,
            fp: 0,
            deadline: None,
            terminating: false,
            finished: false,
            tx,
            rx,
            bus,
        })
    }

    /// Runs the engine until the process has fully retreated.
    ///
    /// `token` delivers the daemon's terminate edge; after it fires the
    /// engine only retreats.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        self.work();

        while !self.finished {
            let timer: OptionFuture<_> = self.deadline.map(sleep_until).into();
            tokio::select! {
                Some(msg) = self.rx.recv() => self.handle_feedback(msg),
                Some(()) = timer => self.retry_fired(),
                _ = token.cancelled(), if !self.terminating => {
                    debug!(target: "chainvisor::engine", "process {}: terminating", self.name);
                    self.terminating = true;
                    self.work();
                }
            }
        }
    }

    // ---- the state machine ----

    /// Single entry point for every external event.
    fn work(&mut self) {
        self.assert_pointers();

        // Stop the timer in case we were waiting.
        self.deadline = None;

        if self.terminating {
            self.retreat();
        } else {
            self.fight();
        }
    }

    /// Makes forward progress toward `AP == FP == len` with all prior
    /// statements adult.
    fn fight(&mut self) {
        if self.ap == self.fp {
            let frontier_child =
                self.ap > 0 && self.stmts[self.ap - 1].state == StatementState::Child;
            if !frontier_child {
                self.advance();
            }
            return;
        }

        // A statement beyond the active prefix must die before we can make
        // progress at AP.
        self.kill(self.fp - 1);
        self.assert_pointers();
    }

    /// Instantiates the statement at AP, or declares victory at the end.
    fn advance(&mut self) {
        debug_assert_eq!(self.ap, self.fp);
        debug_assert!(self.ap == 0 || self.stmts[self.ap - 1].state == StatementState::Adult);

        if self.ap == self.stmts.len() {
            info!(target: "chainvisor::engine", "process {}: victory", self.name);
            self.bus
                .publish(Event::now(EventKind::ProcessUp).with_process(self.name.as_str()));
            self.assert_pointers();
            return;
        }

        let index = self.ap;
        let now = Instant::now();
        {
            let ps = &self.stmts[index];
            debug_assert_eq!(ps.state, StatementState::Forgotten);
            if ps.have_error && ps.error_until.is_some_and(|until| until > now) {
                self.wait();
                return;
            }
        }

        info!(
            target: "chainvisor::engine",
            "process {}: statement {}: initializing", self.name, index
        );
        self.bus.publish(
            Event::now(EventKind::StatementInitializing)
                .with_process(self.name.as_str())
                .with_statement(index),
        );

        let args = match self.materialize_args(index) {
            Ok(args) => args,
            Err(e) => {
                error!(
                    target: "chainvisor::engine",
                    "process {}: statement {}: {}", self.name, index, e
                );
                self.fail_advance(index);
                return;
            }
        };

        let ps = &mut self.stmts[index];
        ps.epoch += 1;
        let ctx = InstanceCtx {
            name: ps.template.name.clone(),
            args,
            log_prefix: format!("process {}: statement {}: module: ", self.name, index),
            handle: InstanceHandle::new(self.tx.clone(), index, ps.epoch),
        };
        match ps.template.module.init(ctx) {
            Ok(instance) => {
                ps.instance = Some(instance);
                ps.state = StatementState::Child;
                self.ap += 1;
                self.fp += 1;
                self.assert_pointers();
            }
            Err(source) => {
                let e = AdvanceError::Init { source };
                error!(
                    target: "chainvisor::engine",
                    "process {}: statement {}: {}", self.name, index, e
                );
                self.fail_advance(index);
            }
        }
    }

    /// Records the advance failure on `stmts[index]` and enters the retry
    /// wait.
    fn fail_advance(&mut self, index: usize) {
        self.stmts[index].set_error(Instant::now());
        self.wait();
    }

    /// Arms the retry timer for the errored statement at AP.
    fn wait(&mut self) {
        debug_assert_eq!(self.ap, self.fp);
        debug_assert!(self.ap < self.stmts.len());
        let ps = &self.stmts[self.ap];
        debug_assert!(ps.have_error);
        let Some(until) = ps.error_until else {
            debug_assert!(false, "have_error without a deadline");
            return;
        };

        info!(
            target: "chainvisor::engine",
            "process {}: statement {}: waiting after error", self.name, self.ap
        );
        self.bus.publish(
            Event::now(EventKind::RetryScheduled)
                .with_process(self.name.as_str())
                .with_statement(self.ap)
                .with_delay(until.saturating_duration_since(Instant::now())),
        );

        self.deadline = Some(until);
        self.assert_pointers();
    }

    /// The retry deadline fired: clear the error and try the advance again.
    fn retry_fired(&mut self) {
        self.deadline = None;

        debug_assert_eq!(self.ap, self.fp);
        debug_assert!(self.ap < self.stmts.len());
        debug_assert!(self.stmts[self.ap].have_error);

        info!(target: "chainvisor::engine", "process {}: retrying", self.name);
        self.stmts[self.ap].have_error = false;
        self.advance();
    }

    /// Tears down the chain from the back; marks the engine finished once
    /// nothing is live.
    fn retreat(&mut self) {
        if self.fp == 0 {
            debug_assert_eq!(self.ap, 0);
            info!(target: "chainvisor::engine", "process {}: retreated", self.name);
            self.bus
                .publish(Event::now(EventKind::ProcessRetreated).with_process(self.name.as_str()));
            self.finished = true;
            return;
        }

        let index = self.fp - 1;
        if self.stmts[index].state != StatementState::Dying {
            self.kill(index);
            // Statements at and after the dying one lose their prerequisite.
            if self.ap > index {
                self.ap = index;
            }
        }
        self.assert_pointers();
    }

    /// Orders the statement's instance to terminate, once.
    fn kill(&mut self, index: usize) {
        let ps = &mut self.stmts[index];
        if ps.state == StatementState::Dying {
            return;
        }
        debug_assert!(matches!(
            ps.state,
            StatementState::Child | StatementState::Adult
        ));

        info!(
            target: "chainvisor::engine",
            "process {}: statement {}: killing", self.name, index
        );
        self.bus.publish(
            Event::now(EventKind::StatementDying)
                .with_process(self.name.as_str())
                .with_statement(index),
        );

        if let Some(instance) = ps.instance.as_mut() {
            instance.die();
        } else {
            debug_assert!(false, "live statement without an instance");
        }
        ps.state = StatementState::Dying;
    }

    // ---- argument materialization ----

    /// Resolves every argument of `stmts[index]` into a fresh list value.
    fn materialize_args(&self, index: usize) -> Result<Value, AdvanceError> {
        let template = &self.stmts[index].template;
        let mut items = Vec::with_capacity(template.args.len());
        for arg in &template.args {
            match arg {
                Argument::Literal(v) => items.push(v.clone()),
                Argument::VarRef { target, path } => {
                    items.push(self.resolve_var(target, path.as_deref())?);
                }
            }
        }
        Ok(Value::List(items))
    }

    /// Resolves `target.path` against the closest earlier statement named
    /// `target`.
    fn resolve_var(&self, target: &str, path: Option<&str>) -> Result<Value, AdvanceError> {
        let path = path.unwrap_or("");

        let referent = self.stmts[..self.ap]
            .iter()
            .rev()
            .find(|ps| ps.template.name.as_deref() == Some(target));
        let Some(rps) = referent else {
            return Err(AdvanceError::UnknownReference {
                target: target.to_string(),
                path: path.to_string(),
            });
        };
        debug_assert_eq!(rps.state, StatementState::Adult);

        let Some(instance) = rps.instance.as_ref() else {
            debug_assert!(false, "adult statement without an instance");
            return Err(AdvanceError::UnknownReference {
                target: target.to_string(),
                path: path.to_string(),
            });
        };
        instance
            .get_var(path)
            .map_err(|source| AdvanceError::Resolve {
                target: target.to_string(),
                path: path.to_string(),
                source,
            })
    }

    // ---- instance feedback ----

    fn handle_feedback(&mut self, msg: FeedbackMsg) {
        let Some(ps) = self.stmts.get(msg.index) else {
            debug_assert!(false, "feedback for unknown statement {}", msg.index);
            return;
        };
        if msg.epoch != ps.epoch || ps.state == StatementState::Forgotten {
            debug!(
                target: "chainvisor::engine",
                "process {}: statement {}: stale feedback dropped", self.name, msg.index
            );
            return;
        }

        match msg.feedback {
            Feedback::Event(event) => self.handle_event(msg.index, event),
            Feedback::Died { is_error } => self.handle_died(msg.index, is_error),
        }
    }

    /// Applies an `Up`/`Down`/`Dying` report from the statement's instance.
    fn handle_event(&mut self, index: usize, event: StatementEvent) {
        let state = self.stmts[index].state;
        match event {
            StatementEvent::Up => {
                if state != StatementState::Child {
                    self.reject_event(index, "up", state);
                    return;
                }
                info!(
                    target: "chainvisor::engine",
                    "process {}: statement {}: up", self.name, index
                );
                self.bus.publish(
                    Event::now(EventKind::StatementUp)
                        .with_process(self.name.as_str())
                        .with_statement(index),
                );
                self.stmts[index].state = StatementState::Adult;
            }
            StatementEvent::Down => {
                if state != StatementState::Adult {
                    self.reject_event(index, "down", state);
                    return;
                }
                info!(
                    target: "chainvisor::engine",
                    "process {}: statement {}: down", self.name, index
                );
                self.bus.publish(
                    Event::now(EventKind::StatementDown)
                        .with_process(self.name.as_str())
                        .with_statement(index),
                );
                self.stmts[index].state = StatementState::Child;
                // Statements strictly after this one lost their prerequisite.
                if self.ap > index + 1 {
                    self.ap = index + 1;
                }
            }
            StatementEvent::Dying => {
                if !matches!(state, StatementState::Child | StatementState::Adult) {
                    self.reject_event(index, "dying", state);
                    return;
                }
                info!(
                    target: "chainvisor::engine",
                    "process {}: statement {}: dying", self.name, index
                );
                self.bus.publish(
                    Event::now(EventKind::StatementDying)
                        .with_process(self.name.as_str())
                        .with_statement(index),
                );
                self.stmts[index].state = StatementState::Dying;
                if self.ap > index {
                    self.ap = index;
                }
            }
        }

        self.work();
    }

    /// The instance finished terminating: destroy it and resettle the
    /// pointers.
    fn handle_died(&mut self, index: usize, is_error: bool) {
        let ps = &mut self.stmts[index];
        debug_assert_ne!(ps.state, StatementState::Forgotten);

        // Dropping the instance also drops its materialized argument list.
        ps.instance = None;
        ps.state = StatementState::Forgotten;

        if is_error {
            ps.set_error(Instant::now());
        } else {
            ps.have_error = false;
        }

        if self.ap > index {
            self.ap = index;
        }
        while self.fp > 0 && self.stmts[self.fp - 1].state == StatementState::Forgotten {
            self.fp -= 1;
        }

        info!(
            target: "chainvisor::engine",
            "process {}: statement {}: died", self.name, index
        );
        let mut ev = Event::now(EventKind::StatementDied)
            .with_process(self.name.as_str())
            .with_statement(index);
        if is_error {
            error!(
                target: "chainvisor::engine",
                "process {}: statement {}: with error", self.name, index
            );
            ev = ev.with_error("terminated with error");
        }
        self.bus.publish(ev);

        self.work();
    }

    fn reject_event(&self, index: usize, what: &str, state: StatementState) {
        warn!(
            target: "chainvisor::engine",
            "process {}: statement {}: dropped '{}' report in state {:?}",
            self.name, index, what, state
        );
    }

    // ---- invariants ----

    /// Checks the pointer invariants (debug builds only): `AP <= FP <= len`,
    /// the active prefix is adult except possibly a child frontier, and FP
    /// equals the longest prefix ending in a non-forgotten statement.
    fn assert_pointers(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(self.ap <= self.stmts.len());
            assert!(self.fp >= self.ap);
            assert!(self.fp <= self.stmts.len());

            for i in 0..self.ap {
                if i == self.ap - 1 {
                    assert!(matches!(
                        self.stmts[i].state,
                        StatementState::Adult | StatementState::Child
                    ));
                } else {
                    assert_eq!(self.stmts[i].state, StatementState::Adult);
                }
            }

            let mut fp = self.stmts.len();
            while fp > 0 && self.stmts[fp - 1].state == StatementState::Forgotten {
                fp -= 1;
            }
            assert_eq!(self.fp, fp);
        }
    }
}
