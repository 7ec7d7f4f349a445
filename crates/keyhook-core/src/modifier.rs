// Keyhook Modifier Suppression
// Per-modifier state machine deciding when a withheld modifier is released to the OS

use std::collections::HashMap;

use strum_macros::{Display, EnumString};

use crate::event::EventType;

/// Where a modifier stands with respect to suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ModifierState {
    /// Not involved in any pending decision
    #[default]
    Free,
    /// Pressed and withheld until we know whether a hotkey follows
    Pending,
    /// Consumed by a suppressed hotkey
    Suppressed,
    /// Delivered to the OS as a normal modifier
    Allowed,
}

/// What kind of key produced the event being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Origin {
    /// The modifier itself
    Modifier,
    /// A key completing a blocking hotkey
    Hotkey,
    /// Anything else
    Other,
}

/// Outcome of one state-machine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Emit a synthetic press of the modifier before the event goes through
    pub press: bool,
    /// Overrides the tentative decision; `None` keeps it
    pub accept: Option<bool>,
    pub next: ModifierState,
}

const fn step(press: bool, accept: Option<bool>, next: ModifierState) -> Transition {
    Transition { press, accept, next }
}

/// The full transition table.
pub fn transition(state: ModifierState, event_type: EventType, origin: Origin) -> Transition {
    use EventType::{Down, Up};
    use ModifierState::{Allowed, Free, Pending, Suppressed};

    match (state, event_type, origin) {
        (Free, Up, Origin::Modifier) => step(false, Some(true), Free),
        (Free, Down, Origin::Modifier) => step(false, Some(false), Pending),
        (Pending, Up, Origin::Modifier) => step(true, Some(true), Free),
        (Pending, Down, Origin::Modifier) => step(false, Some(true), Allowed),
        (Suppressed, Up, Origin::Modifier) => step(false, Some(false), Free),
        (Suppressed, Down, Origin::Modifier) => step(false, Some(false), Suppressed),
        (Allowed, Up, Origin::Modifier) => step(false, Some(true), Free),
        (Allowed, Down, Origin::Modifier) => step(false, Some(true), Allowed),

        (Free, _, Origin::Hotkey) => step(false, None, Free),
        (Pending, _, Origin::Hotkey) => step(false, None, Suppressed),
        (Suppressed, _, Origin::Hotkey) => step(false, None, Suppressed),
        (Allowed, _, Origin::Hotkey) => step(false, None, Allowed),

        (Free, _, Origin::Other) => step(false, Some(true), Free),
        (Pending, _, Origin::Other) => step(true, Some(true), Allowed),
        (Suppressed, Up, Origin::Other) => step(false, Some(false), Allowed),
        (Suppressed, Down, Origin::Other) => step(true, Some(true), Allowed),
        (Allowed, _, Origin::Other) => step(false, Some(true), Allowed),
    }
}

/// States of all modifiers; absent entries are `Free`.
#[derive(Debug, Default)]
pub struct ModifierMachine {
    states: HashMap<u16, ModifierState>,
}

impl ModifierMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, code: u16) -> ModifierState {
        self.states.get(&code).copied().unwrap_or_default()
    }

    /// Run one step for `code` and store the next state
    pub fn apply(&mut self, code: u16, event_type: EventType, origin: Origin) -> Transition {
        let result = transition(self.state(code), event_type, origin);
        if result.next == ModifierState::Free {
            self.states.remove(&code);
        } else {
            self.states.insert(code, result.next);
        }
        result
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
