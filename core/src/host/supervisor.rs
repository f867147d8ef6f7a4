//! Execution supervisor
//!
//! Owns every piece of mutable host state: the single live interpreter, the
//! busy flag, the status stack, the blocking bridge and the pending-code
//! slot. Only the command-processing path touches it.
//!
//! An operation (run or step) is an explicit state machine:
//!
//! ```text
//! Idle --run/step--> Running --input needed--> AwaitingInput
//!                       ^                            |
//!                       +---------- unblock ---------+
//! Running --halted/failed--> Idle
//! ```
//!
//! Between two commands a busy supervisor is always `AwaitingInput`.

use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::blocker::{kind_name, BlockingBridge};
use super::status::StatusStack;
use super::Outbox;
use crate::error::{HostError, Result};
use crate::esolangs::{InterpreterHandle, Outcome, Registry, StepBudget};
use crate::types::{Event, InputKind, LangOptions};

/* ===================== Operations ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Run,
    Step,
}

impl OperationKind {
    pub fn action(self) -> &'static str {
        match self {
            OperationKind::Run => "interpret",
            OperationKind::Step => "step",
        }
    }

    fn label(self, lang: &str) -> String {
        match self {
            OperationKind::Run => format!("Interpreting {}", lang),
            OperationKind::Step => format!("Stepping {}", lang),
        }
    }
}

/// The in-flight run or step. Its presence is the busy flag.
#[derive(Debug)]
struct Operation {
    kind: OperationKind,
    lang: &'static str,
    started: Instant,
    /// Status depth before the operation pushed its label
    status_depth: usize,
    budget: StepBudget,
}

/// How an operation ended.
#[derive(Debug)]
enum Termination {
    Halted,
    Progressed,
    Failed(HostError),
}

/* ===================== Supervisor ===================== */

pub struct Supervisor {
    registry: Registry,
    active: Option<InterpreterHandle>,
    pending_code: Option<String>,
    status: StatusStack,
    bridge: BlockingBridge,
    busy: Option<Operation>,
    step_limit: Option<u64>,
    outbox: Outbox,
}

impl Supervisor {
    pub fn new(registry: Registry, step_limit: Option<u64>) -> Self {
        Self {
            registry,
            active: None,
            pending_code: None,
            status: StatusStack::new(),
            bridge: BlockingBridge::new(),
            busy: None,
            step_limit,
            outbox: Outbox::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn active(&self) -> Option<&InterpreterHandle> {
        self.active.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn is_blocked(&self) -> bool {
        self.bridge.is_blocked()
    }

    pub fn status(&self) -> &StatusStack {
        &self.status
    }

    pub fn pending_code(&self) -> Option<&str> {
        self.pending_code.as_deref()
    }

    /// Everything emitted since the last call, in order.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.outbox.drain()
    }

    /// Surface an error as an `Error` event.
    pub(crate) fn report(&mut self, err: HostError) {
        warn!(error = %err, misuse = err.is_misuse(), "Reporting error");
        self.outbox.emit(Event::error(err.to_string()));
    }

    /* ===================== Lifecycle ===================== */

    /// Replace the live interpreter with a freshly built one.
    pub fn set_language(&mut self, lang: &str, options: &LangOptions) -> Result<()> {
        let mut handle = self.registry.create(lang, options)?;

        if self.abandon("setLanguage") && self.pending_code.take().is_some() {
            warn!(lang, "Discarding code held for the replaced interpreter");
        }

        if let Some(source) = self.pending_code.take() {
            debug!(lang, "Applying held code to new interpreter");
            if let Err(err) = load_into(&mut handle, &source, &mut self.outbox) {
                self.report(err);
            }
        }

        self.outbox.emit(handle.created_event());
        self.active = Some(handle);
        Ok(())
    }

    /// Hand source to the live interpreter, or hold it until one exists
    /// and is idle.
    pub fn load_code(&mut self, source: &str) -> Result<()> {
        match self.active.as_mut() {
            Some(handle) if self.busy.is_none() => load_into(handle, source, &mut self.outbox),
            _ => {
                debug!(busy = self.busy.is_some(), "Holding code");
                self.pending_code = Some(source.to_string());
                Ok(())
            }
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        let lang = self.active_lang("reset")?;
        self.abandon("reset");
        self.flush_pending();

        if let Some(handle) = self.active.as_mut() {
            handle.with_io(&mut self.outbox, |interp, io| interp.reset(io));
        }
        self.outbox
            .print(format!("> interpreter reset --lang {}\n", lang));
        Ok(())
    }

    /* ===================== Execution ===================== */

    /// Run the program until it halts, fails, or asks for input.
    pub fn run_to_completion(&mut self, source: Option<&str>) -> Result<()> {
        let lang = self.active_lang("interpret")?;
        self.ensure_idle(lang, OperationKind::Run)?;

        self.outbox.print(format!(
            "\n> interpreter execute --lang {} --file ./userInput\n",
            lang
        ));
        self.begin(OperationKind::Run, lang);

        if let Some(source) = source {
            let loaded = match self.active.as_mut() {
                Some(handle) => load_into(handle, source, &mut self.outbox),
                None => Err(HostError::NoInterpreter("interpret")),
            };
            if let Err(err) = loaded {
                self.finish(Termination::Failed(err));
                return Ok(());
            }
        }

        self.drive();
        Ok(())
    }

    /// Execute a single instruction.
    pub fn step(&mut self) -> Result<()> {
        let lang = self.active_lang("step")?;
        let supported = self
            .active
            .as_ref()
            .is_some_and(|handle| handle.capabilities().supports_step);
        if !supported {
            return Err(HostError::CapabilityMissing {
                lang: lang.to_string(),
                capability: "step",
            });
        }
        self.ensure_idle(lang, OperationKind::Step)?;

        self.begin(OperationKind::Step, lang);
        self.drive();
        Ok(())
    }

    /// Resolve the outstanding input request and continue the operation.
    pub fn unblock(&mut self, value: &JsonValue, pop_status: bool) -> Result<()> {
        let (blocker, input) = self.bridge.unblock(value)?;
        info!(blocker_id = %blocker.id, kind = kind_name(blocker.kind), "Input supplied");

        if pop_status {
            self.status.pop(&mut self.outbox);
        }

        let Some(handle) = self.active.as_mut() else {
            return Err(HostError::Internal(
                "input supplied with no interpreter loaded".to_string(),
            ));
        };
        let lang = handle.lang();
        let resumed = handle.with_io(&mut self.outbox, |interp, io| interp.resume(input, io));

        match (resumed, self.busy.as_ref().map(|op| op.kind)) {
            (Err(source), _) => {
                let err = HostError::InterpreterFailure {
                    lang: lang.to_string(),
                    source,
                };
                if self.busy.is_some() {
                    self.finish(Termination::Failed(err));
                } else {
                    return Err(err);
                }
            }
            (Ok(()), Some(OperationKind::Run)) => self.drive(),
            (Ok(()), Some(OperationKind::Step)) => self.finish(Termination::Progressed),
            (Ok(()), None) => {}
        }
        Ok(())
    }

    /* ===================== Capabilities ===================== */

    pub fn minify(&mut self, source: &str) -> Result<()> {
        let lang = self.active_lang("minify")?;
        let missing = || HostError::CapabilityMissing {
            lang: lang.to_string(),
            capability: "minify",
        };
        let code = self
            .active
            .as_ref()
            .filter(|handle| handle.capabilities().supports_minify)
            .and_then(|handle| handle.interpreter().minify_code(source))
            .ok_or_else(missing)?;

        self.outbox.print(format!(
            "> interpreter minify --lang {} --file ./userInput\n",
            lang
        ));
        self.outbox.emit(Event::MinifiedCode { code });
        Ok(())
    }

    pub fn text_to_code(&mut self, text: &str) -> Result<()> {
        let lang = self.active_lang("textToCode")?;
        let missing = || HostError::CapabilityMissing {
            lang: lang.to_string(),
            capability: "text-to-code",
        };
        let code = self
            .active
            .as_ref()
            .filter(|handle| handle.capabilities().supports_text_to_code)
            .and_then(|handle| handle.interpreter().text_to_code(text))
            .ok_or_else(missing)?;

        self.outbox.print(format!(
            "> interpreter --from-text ./userText.txt --lang {}\n",
            lang
        ));
        self.outbox.emit(Event::TextToCode {
            lang: lang.to_string(),
            code,
        });
        Ok(())
    }

    /// Terminate any in-flight operation after a handler blew up mid-way.
    /// The operation ends like any other failure, completion report included.
    pub(crate) fn recover(&mut self, err: HostError) {
        match &self.busy {
            Some(op) => {
                warn!(lang = op.lang, action = op.kind.action(), "Failing operation after internal error");
                self.finish(Termination::Failed(err));
            }
            None => {
                self.bridge.abandon();
                self.report(err);
            }
        }
    }

    /* ===================== Internals ===================== */

    fn active_lang(&self, action: &'static str) -> Result<&'static str> {
        self.active
            .as_ref()
            .map(InterpreterHandle::lang)
            .ok_or(HostError::NoInterpreter(action))
    }

    fn ensure_idle(&self, lang: &str, kind: OperationKind) -> Result<()> {
        match &self.busy {
            Some(op) => {
                debug!(lang, rejected = kind.action(), in_flight = op.kind.action(), "Busy");
                Err(HostError::Busy {
                    lang: lang.to_string(),
                    action: op.kind.action(),
                })
            }
            None => Ok(()),
        }
    }

    fn begin(&mut self, kind: OperationKind, lang: &'static str) {
        info!(lang, action = kind.action(), "Operation started");
        self.busy = Some(Operation {
            kind,
            lang,
            started: Instant::now(),
            status_depth: self.status.depth(),
            budget: StepBudget::new(self.step_limit),
        });
        self.status.push(kind.label(lang), &mut self.outbox);
    }

    /// Advance the in-flight operation until it suspends or terminates.
    fn drive(&mut self) {
        let (Some(op), Some(handle)) = (self.busy.as_mut(), self.active.as_mut()) else {
            return;
        };
        let kind = op.kind;
        let budget = &mut op.budget;
        let result = handle.with_io(&mut self.outbox, |interp, io| match kind {
            OperationKind::Run => interp.run(io, budget),
            OperationKind::Step => interp.step(io),
        });
        let lang = handle.lang();

        match result {
            Ok(Outcome::Suspended(input)) => self.suspend(input),
            Ok(Outcome::Halted) => self.finish(Termination::Halted),
            Ok(Outcome::Progressed) => self.finish(Termination::Progressed),
            Err(source) => self.finish(Termination::Failed(HostError::InterpreterFailure {
                lang: lang.to_string(),
                source,
            })),
        }
    }

    fn suspend(&mut self, kind: InputKind) {
        match self.bridge.create(kind) {
            Ok(blocker) => {
                info!(blocker_id = %blocker.id, kind = kind_name(kind), "Awaiting input");
                self.status.push(kind.status_label(), &mut self.outbox);
                self.outbox.emit(kind.request_event());
            }
            Err(err) => self.finish(Termination::Failed(err)),
        }
    }

    /// Terminal bookkeeping for every exit path: unwind status, clear busy,
    /// then report.
    fn finish(&mut self, termination: Termination) {
        let Some(op) = self.busy.take() else {
            return;
        };
        self.bridge.abandon();
        self.status.unwind_to(op.status_depth, &mut self.outbox);
        let elapsed = op.started.elapsed();

        match op.kind {
            OperationKind::Run => {
                let exit_code = match termination {
                    Termination::Failed(err) => {
                        self.report(err);
                        1
                    }
                    Termination::Halted | Termination::Progressed => 0,
                };
                info!(
                    lang = op.lang,
                    exit_code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    steps = op.budget.used(),
                    "Execution terminated"
                );
                self.outbox.print(format!(
                    "\n... Execution terminated with exit code {} ({} ms)",
                    exit_code,
                    elapsed.as_millis()
                ));
            }
            OperationKind::Step => {
                let progressed = matches!(termination, Termination::Progressed);
                if let Termination::Failed(err) = termination {
                    self.report(err);
                }
                debug!(lang = op.lang, progressed, "Step finished");
                if !progressed {
                    self.outbox.print("Unable to complete step\n");
                }
            }
        }

        self.flush_pending();
    }

    /// Abandon an operation that is waiting for input. Loud: the host is told
    /// the request it is presumably displaying is gone. Returns whether an
    /// operation was abandoned.
    fn abandon(&mut self, reason: &str) -> bool {
        let Some(op) = self.busy.take() else {
            return false;
        };
        let blocker = self.bridge.abandon();
        self.status.unwind_to(op.status_depth, &mut self.outbox);

        let request = blocker.map_or("in-flight", |b| kind_name(b.kind));
        warn!(
            lang = op.lang,
            action = op.kind.action(),
            request,
            reason,
            "Abandoning operation"
        );
        self.outbox.emit(Event::error(format!(
            "{} {} abandoned by {}: pending {} input request dropped",
            op.lang,
            op.kind.action(),
            reason,
            request
        )));
        true
    }

    /// Apply code that was held while the supervisor was busy.
    fn flush_pending(&mut self) {
        if self.busy.is_some() {
            return;
        }
        let Some(handle) = self.active.as_mut() else {
            return;
        };
        let Some(source) = self.pending_code.take() else {
            return;
        };
        debug!(lang = handle.lang(), "Applying held code");
        if let Err(err) = load_into(handle, &source, &mut self.outbox) {
            self.report(err);
        }
    }
}

/// Install `source` and return the machine to its initial state.
fn load_into(handle: &mut InterpreterHandle, source: &str, outbox: &mut Outbox) -> Result<()> {
    let lang = handle.lang();
    handle
        .with_io(outbox, |interp, io| {
            interp.set_code(source).map(|()| interp.reset(io))
        })
        .map_err(|source| HostError::CodeLoad {
            lang: lang.to_string(),
            source,
        })
}
