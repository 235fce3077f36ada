use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A logical action produced by the platform layer.
///
/// The camera and light consume actions, never raw key codes, so the headless
/// tools and the desktop window drive the same update logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    RotateUp,
    RotateDown,
    RotateLeft,
    RotateRight,
    LightUp,
    LightDown,
    LightLeft,
    LightRight,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::MoveForward,
        Action::MoveBackward,
        Action::MoveLeft,
        Action::MoveRight,
        Action::MoveUp,
        Action::MoveDown,
        Action::RotateUp,
        Action::RotateDown,
        Action::RotateLeft,
        Action::RotateRight,
        Action::LightUp,
        Action::LightDown,
        Action::LightLeft,
        Action::LightRight,
    ];

    /// Kebab-case name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Action::MoveForward => "move-forward",
            Action::MoveBackward => "move-backward",
            Action::MoveLeft => "move-left",
            Action::MoveRight => "move-right",
            Action::MoveUp => "move-up",
            Action::MoveDown => "move-down",
            Action::RotateUp => "rotate-up",
            Action::RotateDown => "rotate-down",
            Action::RotateLeft => "rotate-left",
            Action::RotateRight => "rotate-right",
            Action::LightUp => "light-up",
            Action::LightDown => "light-down",
            Action::LightLeft => "light-left",
            Action::LightRight => "light-right",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action `{0}`")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| ParseActionError(s.to_string()))
    }
}

/// Actions currently held down.
///
/// Sampled once per frame. Ordered so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    held: BTreeSet<Action>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, action: Action) {
        if self.held.insert(action) {
            tracing::trace!(%action, "pressed");
        }
    }

    pub fn release(&mut self, action: Action) {
        if self.held.remove(&action) {
            tracing::trace!(%action, "released");
        }
    }

    /// Apply a press or release.
    pub fn set(&mut self, action: Action, pressed: bool) {
        if pressed {
            self.press(action);
        } else {
            self.release(action);
        }
    }

    pub fn is_pressed(&self, action: Action) -> bool {
        self.held.contains(&action)
    }

    /// Drop every held action, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.held.iter().copied()
    }
}

impl FromIterator<Action> for KeyState {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self {
            held: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for action in Action::ALL {
            assert_eq!(action.name().parse::<Action>(), Ok(action));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "jump".parse::<Action>().unwrap_err();
        assert_eq!(err.to_string(), "unknown action `jump`");
    }

    #[test]
    fn press_and_release() {
        let mut keys = KeyState::new();
        keys.press(Action::MoveForward);
        keys.press(Action::RotateLeft);
        assert!(keys.is_pressed(Action::MoveForward));
        assert!(keys.is_pressed(Action::RotateLeft));

        keys.release(Action::MoveForward);
        assert!(!keys.is_pressed(Action::MoveForward));
        assert!(keys.is_pressed(Action::RotateLeft));
    }

    #[test]
    fn repeated_press_is_single_entry() {
        let mut keys = KeyState::new();
        keys.set(Action::MoveUp, true);
        keys.set(Action::MoveUp, true);
        assert_eq!(keys.iter().count(), 1);
        keys.set(Action::MoveUp, false);
        assert!(keys.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut keys: KeyState = [Action::LightUp, Action::MoveDown].into_iter().collect();
        assert!(!keys.is_empty());
        keys.clear();
        assert!(keys.is_empty());
    }
}
