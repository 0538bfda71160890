use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::catalog::FetchError;
use crate::decorate::Entity;
use crate::logging::debug_log;
use crate::machine::{self, Context, Effect, Event, Intent, Invocation, State, UnknownIntent};
use crate::pipeline::{CancelToken, Fetch};

struct Settled {
    invocation: Invocation,
    outcome: Result<Entity, FetchError>,
}

struct Pending {
    invocation: Invocation,
    cancel: CancelToken,
}

/// Drives [`machine::transition`] and owns the one pipeline worker that may
/// be in flight.
pub struct Controller {
    state: State,
    context: Context,
    fetch: Arc<dyn Fetch>,
    next_invocation: Invocation,
    pending: Option<Pending>,
    response_tx: Sender<Settled>,
    response_rx: Receiver<Settled>,
}

impl Controller {
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            state: State::Idle,
            context: Context::default(),
            fetch,
            next_invocation: 1,
            pending: None,
            response_tx,
            response_rx,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, State::Loading { .. })
    }

    /// Returns whether the state or context changed.
    pub fn dispatch(&mut self, intent: Intent) -> bool {
        self.apply(Event::Intent(intent))
    }

    pub fn dispatch_named(&mut self, name: &str) -> Result<bool, UnknownIntent> {
        let intent = name.parse::<Intent>()?;
        Ok(self.dispatch(intent))
    }

    /// Applies every outcome that has already arrived without blocking.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            changed |= self.settle(message);
        }
        changed
    }

    /// Blocks for the next outcome. Returns false on timeout.
    pub fn wait_settled(&mut self, timeout: Duration) -> bool {
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.settle(message);
                true
            }
            Err(_) => false,
        }
    }

    fn settle(&mut self, message: Settled) -> bool {
        let Settled {
            invocation,
            outcome,
        } = message;
        if let Err(err) = &outcome {
            debug_log(format!("controller: invocation {invocation} failed: {err}"));
        }
        if self.state.invocation() != Some(invocation) {
            debug_log(format!("controller: dropping stale invocation {invocation}"));
        }
        self.apply(Event::Settled {
            invocation,
            outcome,
        })
    }

    fn apply(&mut self, event: Event) -> bool {
        let next = machine::transition(&self.state, &self.context, event, self.next_invocation);
        let changed = next.state != self.state || next.context != self.context;
        if next.state != self.state {
            debug_log(format!("controller: {} -> {}", self.state, next.state));
        }
        self.state = next.state;
        self.context = next.context;

        match next.effect {
            Effect::None => {}
            Effect::Start(invocation) => self.start(invocation),
            Effect::Cancel(invocation) => self.cancel(invocation),
        }
        if self.state.invocation().is_none() {
            self.pending = None;
        }
        changed
    }

    fn start(&mut self, invocation: Invocation) {
        self.next_invocation = invocation.wrapping_add(1);
        if let Some(stale) = self.pending.take() {
            stale.cancel.cancel();
        }

        let cancel = CancelToken::new();
        self.pending = Some(Pending {
            invocation,
            cancel: cancel.clone(),
        });
        debug_log(format!("controller: starting invocation {invocation}"));

        let fetch = self.fetch.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let outcome = fetch.run(&cancel);
            if cancel.is_cancelled() {
                return;
            }
            let _ = tx.send(Settled {
                invocation,
                outcome,
            });
        });
    }

    fn cancel(&mut self, invocation: Invocation) {
        if let Some(pending) = self.pending.take() {
            debug_log(format!(
                "controller: cancelling invocation {} (requested {invocation})",
                pending.invocation
            ));
            pending.cancel.cancel();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Immediate {
        runs: AtomicUsize,
    }

    impl Fetch for Immediate {
        fn run(&self, _cancel: &CancelToken) -> Result<Entity, FetchError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(Entity {
                id: n as i64,
                name: format!("mon-{n}"),
                image: String::new(),
                category: "ghost".into(),
            })
        }
    }

    #[test]
    fn starts_idle_with_default_context() {
        let controller = Controller::new(Arc::new(Immediate {
            runs: AtomicUsize::new(0),
        }));
        assert_eq!(controller.state(), State::Idle);
        assert_eq!(controller.context(), &Context::default());
        assert!(!controller.is_loading());
    }

    #[test]
    fn named_intents_reject_unknown_names() {
        let mut controller = Controller::new(Arc::new(Immediate {
            runs: AtomicUsize::new(0),
        }));
        assert!(controller.dispatch_named("RELOAD").is_err());
        assert_eq!(controller.state(), State::Idle);
        assert_eq!(controller.dispatch_named("ABORT"), Ok(false));
    }

    #[test]
    fn load_settles_into_ready() {
        let mut controller = Controller::new(Arc::new(Immediate {
            runs: AtomicUsize::new(0),
        }));
        assert!(controller.dispatch(Intent::Load));
        assert!(controller.is_loading());
        assert!(controller.wait_settled(Duration::from_secs(5)));
        assert_eq!(controller.state(), State::Ready);
        let entity = controller.context().entity().unwrap();
        assert_eq!(entity.category, "ghost");
        assert_eq!(controller.context().background(), "#735797");
    }
}
