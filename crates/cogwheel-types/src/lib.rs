use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of one exclusive subsystem registered in a resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Identity of one command (or command group) known to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Lifecycle of a command.
///
/// ```text
/// Idle -> Acquiring -> Running -> { Ending, Suspended, Terminated }
/// Suspended -> Acquiring            (persistent resume)
/// Ending | Terminated -> Idle       (terminal reset)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Constructed or reset; holds nothing.
    #[default]
    Idle,
    /// Claiming every declared resource.
    Acquiring,
    /// Holds all resources; `execute` runs once per period.
    Running,
    /// Finished normally; `end` is running.
    Ending,
    /// Interrupted persistent command waiting for its resources to free up.
    Suspended,
    /// Run routine has exited (finished, cancelled or failed).
    Terminated,
}

impl CommandState {
    /// `true` for states in which the command may hold resources.
    pub fn may_hold_resources(self) -> bool {
        matches!(self, CommandState::Running | CommandState::Ending)
    }

    /// `true` once the run routine has exited or parked.
    pub fn has_exited(self) -> bool {
        matches!(self, CommandState::Terminated | CommandState::Suspended)
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandState::Idle => "idle",
            CommandState::Acquiring => "acquiring",
            CommandState::Running => "running",
            CommandState::Ending => "ending",
            CommandState::Suspended => "suspended",
            CommandState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// The overridable hooks of a command, used to label user-code failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    Initialize,
    Execute,
    IsFinished,
    End,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Hook::Initialize => "initialize",
            Hook::Execute => "execute",
            Hook::IsFinished => "is_finished",
            Hook::End => "end",
        };
        f.write_str(s)
    }
}

/// Error type returned by user-implemented command hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Scheduler error taxonomy.
#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Resource Conflict: {command} needs {resource} held by {holder}")]
    ResourceConflict {
        command: CommandId,
        resource: ResourceId,
        holder: CommandId,
    },

    #[error("User Code Failure in {command}::{hook}: {source}")]
    UserCodeFailure {
        command: CommandId,
        hook: Hook,
        #[source]
        source: HookError,
    },

    #[error("Programming Misuse: {0}")]
    Misuse(String),

    #[error("Unknown command {0}")]
    UnknownCommand(CommandId),

    #[error("Unknown resource {0}")]
    UnknownResource(ResourceId),
}

impl SchedError {
    /// `true` for conflicts, which the caller may retry on a later start.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SchedError::ResourceConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_state_serializes_snake_case() {
        let json = serde_json::to_string(&CommandState::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
        let back: CommandState = serde_json::from_str("\"terminated\"").unwrap();
        assert_eq!(back, CommandState::Terminated);
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(CommandState::default(), CommandState::Idle);
    }

    #[test]
    fn only_running_and_ending_hold_resources() {
        assert!(CommandState::Running.may_hold_resources());
        assert!(CommandState::Ending.may_hold_resources());
        assert!(!CommandState::Suspended.may_hold_resources());
        assert!(!CommandState::Idle.may_hold_resources());
    }

    #[test]
    fn ids_display_with_prefix() {
        assert_eq!(ResourceId(3).to_string(), "res#3");
        assert_eq!(CommandId(12).to_string(), "cmd#12");
    }

    #[test]
    fn sched_error_display() {
        let err = SchedError::ResourceConflict {
            command: CommandId(2),
            resource: ResourceId(0),
            holder: CommandId(1),
        };
        let msg = err.to_string();
        assert!(msg.contains("Resource Conflict"));
        assert!(msg.contains("cmd#1"));
        assert!(err.is_conflict());

        let err2 = SchedError::UserCodeFailure {
            command: CommandId(4),
            hook: Hook::Execute,
            source: "motor stalled".into(),
        };
        assert!(err2.to_string().contains("cmd#4::execute"));
        assert!(err2.to_string().contains("motor stalled"));
        assert!(!err2.is_conflict());
    }
}
