use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, AsRefStr, Serialize, Deserialize)]
pub enum Urgency {
    Low = 0,
    #[default]
    Normal = 1,
    Critical = 2,
}
impl Urgency {
    /// Maps any stored integer into range.
    pub fn clamped(value: i64) -> Self {
        match value {
            i64::MIN..=0 => Self::Low,
            1 => Self::Normal,
            _ => Self::Critical,
        }
    }
}
impl From<Urgency> for i32 {
    fn from(value: Urgency) -> Self {
        value as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Serialize, Deserialize)]
pub enum CloseReason {
    Expired,
    DismissedByUser,
    Closed,
    /// A reason code outside the known set, kept verbatim.
    Other(u32),
}
impl From<u32> for CloseReason {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Expired,
            1 => Self::DismissedByUser,
            2 => Self::Closed,
            other => Self::Other(other),
        }
    }
}
impl From<CloseReason> for u32 {
    fn from(value: CloseReason) -> Self {
        match value {
            CloseReason::Expired => 0,
            CloseReason::DismissedByUser => 1,
            CloseReason::Closed => 2,
            CloseReason::Other(other) => other,
        }
    }
}

/// Signals broadcast by the notification manager, each keyed by notification id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceSignal {
    ActionInvoked { id: u32, action_key: String },
    NotificationClosed { id: u32, reason: CloseReason },
    InputTextSet { id: u32, text: String },
}
impl ServiceSignal {
    pub fn id(&self) -> u32 {
        match self {
            Self::ActionInvoked { id, .. }
            | Self::NotificationClosed { id, .. }
            | Self::InputTextSet { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn urgency_clamps_out_of_range_values() {
        assert_eq!(Urgency::clamped(5), Urgency::Critical);
        assert_eq!(Urgency::clamped(-3), Urgency::Low);
        for urgency in Urgency::iter() {
            assert_eq!(Urgency::clamped(i64::from(i32::from(urgency))), urgency);
        }
    }

    #[test]
    fn close_reasons_map_both_ways() {
        assert_eq!(CloseReason::from(1), CloseReason::DismissedByUser);
        assert_eq!(CloseReason::from(7), CloseReason::Other(7));
        assert_eq!(u32::from(CloseReason::Closed), 2);
    }
}
