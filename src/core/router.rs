use tracing::trace;

use crate::core::game::InputEvent;
use crate::core::session::{Invocation, SessionController};
use crate::error::GameFault;

/// Pointer event as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawPointer {
    /// Absolute screen coordinates.
    MouseDown { x: i32, y: i32 },
    MouseUp { x: i32, y: i32 },
    MouseMove { x: i32, y: i32 },
    /// Fractions of the screen, `0.0..=1.0`.
    FingerDown { x: f32, y: f32 },
    FingerUp { x: f32, y: f32 },
    FingerMotion { x: f32, y: f32 },
}

fn denormalize(x: f32, y: f32, (width, height): (u16, u16)) -> (i32, i32) {
    ((x * f32::from(width)) as i32, (y * f32::from(height)) as i32)
}

/// Contract-level events for one raw pointer event.
///
/// A finger release becomes down *then* up: touch layers upstream report
/// lifts that way and games rely on it.
pub fn translate(raw: RawPointer, screen: (u16, u16)) -> Vec<InputEvent> {
    match raw {
        RawPointer::MouseDown { x, y } => vec![InputEvent::PointerDown { x, y }],
        RawPointer::MouseUp { x, y } => vec![InputEvent::PointerUp { x, y }],
        RawPointer::MouseMove { x, y } => vec![InputEvent::PointerMove { x, y }],
        RawPointer::FingerDown { x, y } => {
            let (x, y) = denormalize(x, y, screen);
            vec![InputEvent::PointerDown { x, y }]
        }
        RawPointer::FingerMotion { x, y } => {
            let (x, y) = denormalize(x, y, screen);
            vec![InputEvent::PointerMove { x, y }]
        }
        RawPointer::FingerUp { x, y } => {
            let (x, y) = denormalize(x, y, screen);
            vec![InputEvent::PointerDown { x, y }, InputEvent::PointerUp { x, y }]
        }
    }
}

/// What happened to a routed event.
#[derive(Debug)]
pub enum Routed {
    /// No active game; the event was dropped.
    Dropped,
    /// Delivered. `consumed` is the game's answer for voice events.
    Delivered { consumed: bool },
    /// The game crashed handling it and was force-stopped.
    Crashed(GameFault),
}

impl Routed {
    pub fn crashed(self) -> Option<GameFault> {
        match self {
            Routed::Crashed(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Invocation<bool>> for Routed {
    fn from(outcome: Invocation<bool>) -> Self {
        match outcome {
            Invocation::Idle => Routed::Dropped,
            Invocation::Done(consumed) => Routed::Delivered { consumed },
            Invocation::Crashed(fault) => Routed::Crashed(fault),
        }
    }
}

/// Turns UI input into contract calls on the active game.
#[derive(Debug, Default)]
pub struct InputRouter;

impl InputRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn dispatch(&self, session: &mut SessionController, event: InputEvent) -> Routed {
        trace!(?event, "routing");
        let outcome = match event {
            InputEvent::PointerDown { x, y } => {
                session.invoke("pointer_down", |g| g.on_pointer_down(x, y).map(|_| false))
            }
            InputEvent::PointerUp { x, y } => session.invoke("pointer_up", |g| g.on_pointer_up(x, y).map(|_| false)),
            InputEvent::PointerMove { x, y } => {
                session.invoke("pointer_move", |g| g.on_pointer_move(x, y).map(|_| false))
            }
            InputEvent::Voice(text) => session.invoke("voice", |g| g.on_voice(&text)),
            InputEvent::Tick => session.invoke("tick", |g| g.tick().map(|_| false)),
        };
        outcome.into()
    }

    /// Route a raw pointer event; stops at the first crash.
    pub fn pointer(&self, session: &mut SessionController, raw: RawPointer, screen: (u16, u16)) -> Routed {
        if session.is_idle() {
            return Routed::Dropped;
        }
        let mut last = Routed::Dropped;
        for event in translate(raw, screen) {
            last = self.dispatch(session, event);
            if matches!(last, Routed::Crashed(_) | Routed::Dropped) {
                break;
            }
        }
        last
    }

    pub fn voice(&self, session: &mut SessionController, transcript: &str) -> Routed {
        self.dispatch(session, InputEvent::Voice(transcript.to_string()))
    }

    pub fn tick(&self, session: &mut SessionController) -> Routed {
        self.dispatch(session, InputEvent::Tick)
    }
}
