use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A raw press/release event as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn press(key: &str) -> Self {
        Self { key: key.to_string(), pressed: true }
    }

    pub fn release(key: &str) -> Self {
        Self { key: key.to_string(), pressed: false }
    }

    /// Parses a host line of the form `down <key>` / `up <key>`.
    ///
    /// `space` names the space bar so it survives whitespace splitting.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, key) = line.split_once(char::is_whitespace)?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let key = if key.eq_ignore_ascii_case("space") { " " } else { key };
        match verb {
            "down" | "press" | "keydown" => Some(Self::press(key)),
            "up" | "release" | "keyup" => Some(Self::release(key)),
            _ => None,
        }
    }
}

/// Driving controls the keyboard maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Forward,
    Backward,
    Left,
    Right,
    Brake,
}

impl Control {
    pub const ALL: [Control; 5] = [
        Control::Forward,
        Control::Backward,
        Control::Left,
        Control::Right,
        Control::Brake,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "w" | "ArrowUp" => Some(Control::Forward),
            "s" | "ArrowDown" => Some(Control::Backward),
            "a" | "ArrowLeft" => Some(Control::Left),
            "d" | "ArrowRight" => Some(Control::Right),
            " " | "Space" | "space" => Some(Control::Brake),
            _ => None,
        }
    }

    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Control::Forward => &["w", "ArrowUp"],
            Control::Backward => &["s", "ArrowDown"],
            Control::Left => &["a", "ArrowLeft"],
            Control::Right => &["d", "ArrowRight"],
            Control::Brake => &[" ", "Space", "space"],
        }
    }
}

/// Which controls are held this tick. Read once per tick by the control law.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub brake: bool,
}

impl DriverInput {
    pub fn driving(&self) -> bool {
        self.forward || self.backward
    }

    pub fn steering(&self) -> bool {
        self.left || self.right
    }
}

/// Key name -> pressed state. Unseen keys read as released.
#[derive(Debug, Default, Clone)]
pub struct InputTracker {
    keys: HashMap<String, bool>,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_key_event(&mut self, key: &str, is_pressed: bool) {
        if Control::from_key(key).is_none() {
            debug!(key, is_pressed, "unmapped key");
        }
        self.keys.insert(key.to_string(), is_pressed);
    }

    pub fn apply(&mut self, event: &KeyEvent) {
        self.on_key_event(&event.key, event.pressed);
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.keys.get(key).copied().unwrap_or(false)
    }

    pub fn is_control_held(&self, control: Control) -> bool {
        control.keys().iter().any(|k| self.is_held(k))
    }

    pub fn driver_input(&self) -> DriverInput {
        DriverInput {
            forward: self.is_control_held(Control::Forward),
            backward: self.is_control_held(Control::Backward),
            left: self.is_control_held(Control::Left),
            right: self.is_control_held(Control::Right),
            brake: self.is_control_held(Control::Brake),
        }
    }

    pub fn release_all(&mut self) {
        for state in self.keys.values_mut() {
            *state = false;
        }
    }
}
