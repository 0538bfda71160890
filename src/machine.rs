//! Fetch lifecycle as a pure transition function.
//!
//! [`transition`] never performs work itself. It hands back the next state,
//! the next context snapshot and the [`Effect`] the driver has to carry out.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::catalog::FetchError;
use crate::decorate::{background_for, Entity, DEFAULT_BACKGROUND};

pub type Invocation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Loading { invocation: Invocation },
    Ready,
    Failed,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Loading { .. } => "loading",
            State::Ready => "ready",
            State::Failed => "failed",
        }
    }

    pub fn invocation(&self) -> Option<Invocation> {
        match self {
            State::Loading { invocation } => Some(*invocation),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Load,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported intent {0:?}; expected LOAD or ABORT")]
pub struct UnknownIntent(pub String);

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOAD" => Ok(Intent::Load),
            "ABORT" => Ok(Intent::Abort),
            other => Err(UnknownIntent(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum Event {
    Intent(Intent),
    Settled {
        invocation: Invocation,
        outcome: Result<Entity, FetchError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Start(Invocation),
    Cancel(Invocation),
}

/// Data the presentation layer renders from. Entity and background always
/// change together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    entity: Option<Arc<Entity>>,
    background: &'static str,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            entity: None,
            background: DEFAULT_BACKGROUND,
        }
    }
}

impl Context {
    pub fn with_entity(entity: Entity) -> Self {
        let background = background_for(&entity.category);
        Self {
            entity: Some(Arc::new(entity)),
            background,
        }
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_deref()
    }

    pub fn background(&self) -> &'static str {
        self.background
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: State,
    pub context: Context,
    pub effect: Effect,
}

impl Transition {
    fn stay(state: &State, context: &Context) -> Self {
        Self {
            state: *state,
            context: context.clone(),
            effect: Effect::None,
        }
    }
}

/// `next` is the identity handed to a pipeline started by this transition.
pub fn transition(state: &State, context: &Context, event: Event, next: Invocation) -> Transition {
    match (*state, event) {
        (State::Idle | State::Ready | State::Failed, Event::Intent(Intent::Load)) => Transition {
            state: State::Loading { invocation: next },
            context: context.clone(),
            effect: Effect::Start(next),
        },
        (State::Loading { invocation }, Event::Intent(Intent::Abort)) => Transition {
            state: State::Idle,
            context: context.clone(),
            effect: Effect::Cancel(invocation),
        },
        (State::Loading { .. }, Event::Intent(Intent::Load)) => Transition::stay(state, context),
        (State::Idle | State::Ready | State::Failed, Event::Intent(Intent::Abort)) => {
            Transition::stay(state, context)
        }
        (
            State::Loading { invocation },
            Event::Settled {
                invocation: settled,
                outcome,
            },
        ) if invocation == settled => match outcome {
            Ok(entity) => Transition {
                state: State::Ready,
                context: Context::with_entity(entity),
                effect: Effect::None,
            },
            Err(_) => Transition {
                state: State::Failed,
                context: context.clone(),
                effect: Effect::None,
            },
        },
        (_, Event::Settled { .. }) => Transition::stay(state, context),
    }
}
