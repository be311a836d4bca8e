use crate::error::ReadinessError;
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{Either, LocalBoxFuture, Shared, select};
use std::cell::{Cell, RefCell};
use web_time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Pending,
    Ready,
    Abandoned,
}

/// One-shot "external libraries are loaded" signal.
///
/// The host resolves it once with [`signal`](Self::signal), or reports failure
/// with [`abandon`](Self::abandon). Any number of waiters may await it. An
/// abandoned gate stays abandoned until [`reopen`](Self::reopen) is called.
pub struct DependencyGate {
    sender: RefCell<Option<oneshot::Sender<()>>>,
    ready: RefCell<Shared<oneshot::Receiver<()>>>,
    state: Cell<GateState>,
}

impl Default for DependencyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGate {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: RefCell::new(Some(sender)),
            ready: RefCell::new(receiver.shared()),
            state: Cell::new(GateState::Pending),
        }
    }

    pub fn signal(&self) {
        if let Some(sender) = self.sender.borrow_mut().take() {
            let _ = sender.send(());
            self.state.set(GateState::Ready);
            log::debug!("Dependencies signalled ready");
        }
    }

    pub fn abandon(&self) {
        if self.sender.borrow_mut().take().is_some() {
            self.state.set(GateState::Abandoned);
            log::warn!("Dependencies reported as failed");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.get() == GateState::Ready
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.get() == GateState::Abandoned
    }

    /// Put an abandoned gate back to pending so it can be signalled again.
    ///
    /// Returns `false`, changing nothing, unless the gate was abandoned.
    pub fn reopen(&self) -> bool {
        if !self.is_abandoned() {
            return false;
        }
        let (sender, receiver) = oneshot::channel();
        *self.sender.borrow_mut() = Some(sender);
        *self.ready.borrow_mut() = receiver.shared();
        self.state.set(GateState::Pending);
        log::debug!("Dependency gate reopened");
        true
    }

    /// Wait for the signal, giving up when `timer` resolves first.
    pub async fn wait(
        &self,
        timer: LocalBoxFuture<'static, ()>,
        timeout_ms: u32,
    ) -> Result<(), ReadinessError> {
        let started = Instant::now();
        let ready = self.ready.borrow().clone();
        let result = match select(ready, timer).await {
            Either::Left((Ok(()), _)) => Ok(()),
            Either::Left((Err(oneshot::Canceled), _)) => Err(ReadinessError::Abandoned),
            Either::Right(((), _)) => Err(ReadinessError::TimedOut { timeout_ms }),
        };
        log::debug!(
            "Waited {:.1} ms for dependencies: {:?}",
            started.elapsed().as_secs_f64() * 1000.0,
            result
        );
        result
    }
}
