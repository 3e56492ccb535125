// outcome.rs - Success that may have come from a fallback path
//
// Every stage returns a usable value. When a stage had to fall back it says
// so with the reason, the caller logs it and carries on.

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Full(T),
    Degraded { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded { value, reason: reason.into() }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Full(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Full(v) | Self::Degraded { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Full(v) | Self::Degraded { value: v, .. } => v,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Full(v) => Outcome::Full(f(v)),
            Self::Degraded { value, reason } => Outcome::Degraded { value: f(value), reason },
        }
    }

    /// Unwrap the value, logging a warning if it is degraded.
    pub fn log_degraded(self, stage: &str) -> T {
        if let Self::Degraded { reason, .. } = &self {
            warn!(stage, reason = %reason, "Stage degraded to fallback");
        }
        self.into_value()
    }
}
