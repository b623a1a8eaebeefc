//! The Begin/End operation protocol.
//!
//! Every remote operation is split into a non-blocking `Begin` that returns an
//! [`OperationContext`] and an `End` that waits for, validates, and extracts
//! the result. [`begin`] builds the context, arms its timeout, and hands an
//! [`OperationCompleter`] to the engine through a dispatch closure.
//!
//! ## Context lifecycle
//!
//! ```text
//! Created ──dispatch ok──▶ Scheduled ──┬─▶ Completed(Succeeded)
//!    │                                 ├─▶ Completed(Failed)
//!    │ (zero timeout, or the engine    ├─▶ Completed(TimedOut)
//!    │  completes during dispatch)     └─▶ Completed(Cancelled)
//!    └────────────────────────────────────▶ Completed(..)
//! ```
//!
//! The first terminal transition wins. It stores the outcome, wakes any `End`
//! waiting on the context, and invokes the completion callback exactly once,
//! on whichever thread performed the transition. Every later transition
//! (e.g. an engine completing after the timeout fired) is discarded.
//!
//! The callback only signals "go call `End`"; it never carries the result.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::EnginePayload;
use crate::{
    ContextId, FabricError, InterfaceId, MisuseKind, OperationName, RemoteErrorCode,
    SubsystemName, Timeout,
};

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Caller-supplied object invoked once when an operation reaches a terminal
/// state.
///
/// May run on an engine-owned thread or a timer task, or synchronously inside
/// `Begin` when the operation completes immediately. Implementations should
/// return quickly; calling `End` from inside the callback is allowed but the
/// `End` future must be driven elsewhere.
pub trait CompletionCallback: Send + Sync {
    /// Called on the terminal transition of `context`.
    fn invoke(&self, context: &OperationContext);
}

impl<F> CompletionCallback for F
where
    F: Fn(&OperationContext) + Send + Sync,
{
    fn invoke(&self, context: &OperationContext) {
        self(context)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The engine completed the operation successfully.
    Succeeded,
    /// The engine completed the operation with an error.
    Failed,
    /// The caller's timeout expired first.
    TimedOut,
    /// The caller cancelled the operation first.
    Cancelled,
}

/// Lifecycle state of an [`OperationContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// The context exists but the engine has not accepted the request yet.
    Created,
    /// The engine accepted the request; the outcome is pending.
    Scheduled,
    /// Terminal.
    Completed(OutcomeKind),
}

impl ContextState {
    /// Returns `true` for [`ContextState::Completed`].
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Completed(OutcomeKind::Succeeded) => write!(f, "succeeded"),
            Self::Completed(OutcomeKind::Failed) => write!(f, "failed"),
            Self::Completed(OutcomeKind::TimedOut) => write!(f, "timed_out"),
            Self::Completed(OutcomeKind::Cancelled) => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// What a `Begin` call is issuing: which operation, through which interface,
/// with which timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTarget {
    /// Subsystem the operation belongs to.
    pub subsystem: SubsystemName,
    /// Operation slot.
    pub operation: OperationName,
    /// Interface version the operation is issued through.
    pub interface: InterfaceId,
    /// Caller-specified timeout.
    pub timeout: Timeout,
    /// Opaque tag of the client instance issuing the operation. `End` calls
    /// routed through a client compare it against their own tag.
    pub issuer: u64,
}

impl OperationTarget {
    /// Returns `Subsystem.Operation`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.subsystem, self.operation)
    }
}

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

struct Lifecycle {
    state: ContextState,
    outcome: Option<Result<EnginePayload, FabricError>>,
    consumed: bool,
    /// Set when `Begin` failed; the context no longer exists for the caller.
    discarded: bool,
    /// Set when the completer was dropped before the engine accepted it.
    completer_dropped: bool,
    callback: Option<Arc<dyn CompletionCallback>>,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    id: ContextId,
    target: OperationTarget,
    lifecycle: Mutex<Lifecycle>,
    issuing: AtomicBool,
    completed_synchronously: AtomicBool,
    done: watch::Sender<bool>,
}

fn lock(m: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Performs the terminal transition if no other transition won first.
    fn finish(
        self: &Arc<Self>,
        kind: OutcomeKind,
        outcome: Result<EnginePayload, FabricError>,
    ) -> bool {
        let (callback, timer) = {
            let mut life = lock(&self.lifecycle);
            if life.state.is_terminal() {
                return false;
            }
            life.state = ContextState::Completed(kind);
            life.outcome = Some(outcome);
            let callback = if life.discarded {
                None
            } else {
                life.callback.take()
            };
            (callback, life.timer.take())
        };

        if self.issuing.load(Ordering::Acquire) {
            self.completed_synchronously.store(true, Ordering::Release);
        }
        if let Some(timer) = timer {
            timer.abort();
        }
        self.done.send_replace(true);

        tracing::debug!(
            context_id = %self.id,
            operation = %self.target.qualified_name(),
            state = %ContextState::Completed(kind),
            "operation context reached terminal state"
        );

        if let Some(callback) = callback {
            let context = OperationContext {
                shared: Arc::clone(self),
            };
            if catch_unwind(AssertUnwindSafe(|| callback.invoke(&context))).is_err() {
                tracing::error!(
                    context_id = %self.id,
                    operation = %self.target.qualified_name(),
                    "completion callback panicked"
                );
            }
        }
        true
    }

    fn time_out(self: &Arc<Self>) -> bool {
        let err = FabricError::Timeout {
            operation: self.target.operation.clone(),
            timeout: self.target.timeout,
        };
        self.finish(OutcomeKind::TimedOut, Err(err))
    }

    fn state(&self) -> ContextState {
        lock(&self.lifecycle).state
    }
}

// ---------------------------------------------------------------------------
// Caller side
// ---------------------------------------------------------------------------

/// Handle to one in-flight or completed operation.
///
/// Cloning is cheap; all clones refer to the same context. The engine holds
/// the matching [`OperationCompleter`]. The context is destroyed once both
/// sides have released it.
#[derive(Clone)]
pub struct OperationContext {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("id", &self.shared.id)
            .field("operation", &self.shared.target.qualified_name())
            .field("state", &self.state())
            .finish()
    }
}

impl OperationContext {
    /// Returns the context's id.
    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    /// Returns the operation this context was issued for.
    pub fn operation(&self) -> &OperationName {
        &self.shared.target.operation
    }

    /// Returns the subsystem this context was issued for.
    pub fn subsystem(&self) -> &SubsystemName {
        &self.shared.target.subsystem
    }

    /// Returns the interface version the operation was issued through.
    pub fn interface(&self) -> InterfaceId {
        self.shared.target.interface
    }

    /// Returns the timeout the operation was issued with.
    pub fn timeout(&self) -> Timeout {
        self.shared.target.timeout
    }

    /// Returns the tag of the client instance that issued this context.
    pub fn issuer(&self) -> u64 {
        self.shared.target.issuer
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ContextState {
        self.shared.state()
    }

    /// Returns `true` once the context reached a terminal state.
    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns `true` if the terminal transition happened before `Begin`
    /// returned.
    pub fn completed_synchronously(&self) -> bool {
        self.shared.completed_synchronously.load(Ordering::Acquire)
    }

    /// Requests cancellation.
    ///
    /// Returns `true` if this call moved the context to
    /// `Completed(Cancelled)`; `false` if it had already reached a terminal
    /// state. The engine is not guaranteed to stop the remote work; it can
    /// observe the cancellation through [`OperationCompleter::is_abandoned`].
    pub fn cancel(&self) -> bool {
        let err = FabricError::Cancelled {
            operation: self.shared.target.operation.clone(),
        };
        self.shared.finish(OutcomeKind::Cancelled, Err(err))
    }

    /// Completes the `End` half of the operation.
    ///
    /// Fails with [`MisuseKind::ForeignContext`] if the context was issued by a
    /// different subsystem or operation (the context is left untouched), and
    /// with [`MisuseKind::AlreadyConsumed`] on any second call. Otherwise waits,
    /// without polling, for the terminal state and returns its outcome.
    ///
    /// Dropping the returned future before it resolves leaves the outcome in
    /// place for a later `End`.
    pub async fn end(&self, subsystem: &str, operation: &str) -> Result<EnginePayload, FabricError> {
        self.check_owner(subsystem, operation)?;
        let claim = self.claim()?;

        let mut done = self.shared.done.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = done.wait_for(|finished| *finished).await;

        claim.take()
    }

    /// Non-blocking variant of [`OperationContext::end`].
    ///
    /// Returns [`MisuseKind::NotCompleted`] without consuming the context if
    /// the operation is still in flight.
    pub fn try_end(&self, subsystem: &str, operation: &str) -> Result<EnginePayload, FabricError> {
        self.check_owner(subsystem, operation)?;
        {
            let mut life = lock(&self.shared.lifecycle);
            if life.consumed {
                return Err(MisuseKind::AlreadyConsumed { context: self.id() }.into());
            }
            if !life.state.is_terminal() {
                return Err(MisuseKind::NotCompleted { context: self.id() }.into());
            }
            life.consumed = true;
        }
        self.take_outcome()
    }

    fn check_owner(&self, subsystem: &str, operation: &str) -> Result<(), FabricError> {
        let target = &self.shared.target;
        if target.subsystem.as_str() == subsystem && target.operation.as_str() == operation {
            return Ok(());
        }
        tracing::warn!(
            context_id = %self.id(),
            expected = %format!("{subsystem}.{operation}"),
            actual = %target.qualified_name(),
            "End called with a context from another operation"
        );
        Err(MisuseKind::ForeignContext {
            context: self.id(),
            expected: format!("{subsystem}.{operation}"),
            actual: target.qualified_name(),
        }
        .into())
    }

    fn claim(&self) -> Result<EndClaim<'_>, FabricError> {
        let mut life = lock(&self.shared.lifecycle);
        if life.consumed {
            tracing::warn!(context_id = %self.id(), "End called twice on one context");
            return Err(MisuseKind::AlreadyConsumed { context: self.id() }.into());
        }
        life.consumed = true;
        Ok(EndClaim {
            context: self,
            taken: false,
        })
    }

    fn take_outcome(&self) -> Result<EnginePayload, FabricError> {
        lock(&self.shared.lifecycle)
            .outcome
            .take()
            .unwrap_or_else(|| Err(MisuseKind::AlreadyConsumed { context: self.id() }.into()))
    }
}

/// An `End` that is waiting for the outcome. Released without taking it, the
/// context can be ended again.
struct EndClaim<'a> {
    context: &'a OperationContext,
    taken: bool,
}

impl EndClaim<'_> {
    fn take(mut self) -> Result<EnginePayload, FabricError> {
        self.taken = true;
        self.context.take_outcome()
    }
}

impl Drop for EndClaim<'_> {
    fn drop(&mut self) {
        if !self.taken {
            lock(&self.context.shared.lifecycle).consumed = false;
            tracing::debug!(context_id = %self.context.id(), "End abandoned before completion");
        }
    }
}

// ---------------------------------------------------------------------------
// Engine side
// ---------------------------------------------------------------------------

/// Engine-side handle that delivers the outcome of one operation.
///
/// Consumed by [`complete`](Self::complete) or [`fail`](Self::fail). Dropping
/// it without either fails the context with [`RemoteErrorCode::ObjectClosed`],
/// so a context never waits forever on an engine that lost track of it.
pub struct OperationCompleter {
    shared: Arc<Shared>,
    finished: bool,
}

impl std::fmt::Debug for OperationCompleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCompleter")
            .field("context_id", &self.shared.id)
            .field("operation", &self.shared.target.qualified_name())
            .finish()
    }
}

impl OperationCompleter {
    /// Returns the id of the context this completer feeds.
    pub fn context_id(&self) -> ContextId {
        self.shared.id
    }

    /// Returns the operation being completed.
    pub fn operation(&self) -> &OperationName {
        &self.shared.target.operation
    }

    /// Returns `true` if the caller stopped waiting (timeout or cancellation).
    ///
    /// Engines may use this to skip work that has not started yet.
    pub fn is_abandoned(&self) -> bool {
        self.shared.state().is_terminal()
    }

    /// Resolves once the context reaches a terminal state, whoever caused it.
    ///
    /// The returned future does not borrow the completer, so an engine can
    /// park the completer elsewhere and release it when this resolves.
    pub fn abandoned(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut done = self.shared.done.subscribe();
        async move {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Delivers a successful result. Returns `false` if the context had
    /// already reached a terminal state; the payload is then discarded.
    pub fn complete(mut self, payload: EnginePayload) -> bool {
        self.finished = true;
        let accepted = self.shared.finish(OutcomeKind::Succeeded, Ok(payload));
        self.log_if_late(accepted);
        accepted
    }

    /// Delivers a remote failure. Returns `false` if the context had already
    /// reached a terminal state.
    pub fn fail(mut self, code: RemoteErrorCode, message: impl Into<String>) -> bool {
        self.finished = true;
        let err = FabricError::Remote {
            operation: self.shared.target.operation.clone(),
            code,
            message: message.into(),
        };
        let accepted = self.shared.finish(OutcomeKind::Failed, Err(err));
        self.log_if_late(accepted);
        accepted
    }

    fn log_if_late(&self, accepted: bool) {
        if !accepted {
            tracing::debug!(
                context_id = %self.shared.id,
                operation = %self.shared.target.qualified_name(),
                state = %self.shared.state(),
                "late completion discarded"
            );
        }
    }
}

impl Drop for OperationCompleter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        {
            let mut life = lock(&self.shared.lifecycle);
            if life.state == ContextState::Created {
                // Still inside dispatch; `begin` decides what this means.
                life.completer_dropped = true;
                return;
            }
        }
        let err = FabricError::Remote {
            operation: self.shared.target.operation.clone(),
            code: RemoteErrorCode::ObjectClosed,
            message: "engine released the operation without completing it".to_string(),
        };
        self.shared.finish(OutcomeKind::Failed, Err(err));
    }
}

// ---------------------------------------------------------------------------
// Begin
// ---------------------------------------------------------------------------

/// Issues one operation.
///
/// Creates the context, arms its timeout on the ambient tokio runtime, and
/// calls `dispatch` with the engine-side completer. Returns without waiting
/// for the operation.
///
/// - No ambient runtime, or `dispatch` returning `Err`: a scheduling failure
///   is returned and no context exists. The callback is never invoked.
/// - [`Timeout::ZERO`]: the context completes as timed out before `begin`
///   returns and `dispatch` is never called.
/// - [`Timeout::INFINITE`]: no timer is armed.
pub fn begin<F>(
    target: OperationTarget,
    callback: Option<Arc<dyn CompletionCallback>>,
    dispatch: F,
) -> Result<OperationContext, FabricError>
where
    F: FnOnce(OperationCompleter) -> Result<(), FabricError>,
{
    let runtime = Handle::try_current().map_err(|_| FabricError::Scheduling {
        target: target.qualified_name(),
        reason: "no async runtime is available to drive completions".to_string(),
        transient: false,
    })?;

    let (done, _) = watch::channel(false);
    let shared = Arc::new(Shared {
        id: ContextId::next(),
        target,
        lifecycle: Mutex::new(Lifecycle {
            state: ContextState::Created,
            outcome: None,
            consumed: false,
            discarded: false,
            completer_dropped: false,
            callback,
            timer: None,
        }),
        issuing: AtomicBool::new(true),
        completed_synchronously: AtomicBool::new(false),
        done,
    });
    let context = OperationContext {
        shared: Arc::clone(&shared),
    };

    tracing::debug!(
        context_id = %shared.id,
        operation = %shared.target.qualified_name(),
        timeout = %shared.target.timeout,
        "begin operation"
    );

    if shared.target.timeout.is_zero() {
        shared.time_out();
        shared.issuing.store(false, Ordering::Release);
        return Ok(context);
    }

    let timer = shared
        .target
        .timeout
        .as_duration()
        .map(|after| spawn_timer(&runtime, Arc::downgrade(&shared), after));

    let completer = OperationCompleter {
        shared: Arc::clone(&shared),
        finished: false,
    };

    if let Err(err) = dispatch(completer) {
        if let Some(timer) = timer {
            timer.abort();
        }
        let mut life = lock(&shared.lifecycle);
        life.discarded = true;
        life.callback = None;
        drop(life);
        tracing::warn!(
            context_id = %shared.id,
            operation = %shared.target.qualified_name(),
            error = %err,
            "operation could not be scheduled"
        );
        return Err(err);
    }

    let lost_completer = {
        let mut life = lock(&shared.lifecycle);
        if life.state == ContextState::Created {
            life.state = ContextState::Scheduled;
        }
        match timer {
            Some(timer) if !life.state.is_terminal() => life.timer = Some(timer),
            Some(timer) => timer.abort(),
            None => {}
        }
        life.completer_dropped && !life.state.is_terminal()
    };
    if lost_completer {
        let err = FabricError::Remote {
            operation: shared.target.operation.clone(),
            code: RemoteErrorCode::ObjectClosed,
            message: "engine released the operation without completing it".to_string(),
        };
        shared.finish(OutcomeKind::Failed, Err(err));
    }

    shared.issuing.store(false, Ordering::Release);
    Ok(context)
}

fn spawn_timer(runtime: &Handle, shared: Weak<Shared>, after: std::time::Duration) -> JoinHandle<()> {
    runtime.spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(shared) = shared.upgrade() {
            shared.time_out();
        }
    })
}
