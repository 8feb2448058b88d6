//! Scheduler priority levels and their timeouts.

use serde::{Deserialize, Serialize};

use super::SchedulerConfig;

/// Largest signed 31-bit integer, used as the "never expires" Idle timeout.
pub const MAX_SIGNED_31_BIT_INT: i64 = 1_073_741_823;

/// Timeout of an Immediate task: already expired when scheduled.
pub const IMMEDIATE_PRIORITY_TIMEOUT: i64 = -1;
/// Default UserBlocking timeout in milliseconds.
pub const USER_BLOCKING_PRIORITY_TIMEOUT: i64 = 250;
/// Default Normal timeout in milliseconds.
pub const NORMAL_PRIORITY_TIMEOUT: i64 = 5000;
/// Default Low timeout in milliseconds.
pub const LOW_PRIORITY_TIMEOUT: i64 = 10000;
/// Idle tasks never time out.
pub const IDLE_PRIORITY_TIMEOUT: i64 = MAX_SIGNED_31_BIT_INT;

/// Priority of a scheduled task, most urgent first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityLevel {
    /// No priority; only meaningful as "nothing is running".
    NoPriority = 0,
    /// Must run now.
    Immediate = 1,
    /// Result of user interaction.
    UserBlocking = 2,
    /// Regular work.
    #[default]
    Normal = 3,
    /// Can wait.
    Low = 4,
    /// Only when nothing else is pending.
    Idle = 5,
}

impl PriorityLevel {
    /// Timeout added to a task's start time to get its expiration time.
    pub fn timeout(
        self,
        config: &SchedulerConfig,
    ) -> i64 {
        match self {
            PriorityLevel::Immediate => IMMEDIATE_PRIORITY_TIMEOUT,
            PriorityLevel::UserBlocking => config.user_blocking_timeout_ms,
            PriorityLevel::Idle => IDLE_PRIORITY_TIMEOUT,
            PriorityLevel::Low => config.low_timeout_ms,
            PriorityLevel::NoPriority | PriorityLevel::Normal => config.normal_timeout_ms,
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            PriorityLevel::NoPriority => "no-priority",
            PriorityLevel::Immediate => "immediate",
            PriorityLevel::UserBlocking => "user-blocking",
            PriorityLevel::Normal => "normal",
            PriorityLevel::Low => "low",
            PriorityLevel::Idle => "idle",
        };
        f.write_str(name)
    }
}
