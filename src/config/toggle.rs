//! Tri-state switch for settings that fall back to a broader default.

use serde::{Deserialize, Serialize};

/// An optional boolean: explicitly on, explicitly off, or inherited.
///
/// Serialized as a plain JSON boolean; a missing or `null` field is `Unset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Toggle {
    #[default]
    Unset,
    On,
    Off,
}

impl Toggle {
    /// Resolves to a concrete value, using `default` when unset.
    #[must_use]
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Self::Unset => default,
            Self::On => true,
            Self::Off => false,
        }
    }

    /// Returns `self` if set, otherwise `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        if self.is_unset() { fallback } else { self }
    }

    /// Returns true when no value was given.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        *self == Self::Unset
    }
}

impl From<Option<bool>> for Toggle {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unset,
            Some(true) => Self::On,
            Some(false) => Self::Off,
        }
    }
}

impl From<Toggle> for Option<bool> {
    fn from(value: Toggle) -> Self {
        match value {
            Toggle::Unset => None,
            Toggle::On => Some(true),
            Toggle::Off => Some(false),
        }
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}
