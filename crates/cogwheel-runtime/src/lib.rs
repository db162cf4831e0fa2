//! `cogwheel-runtime` – the cooperative command scheduler.
//!
//! Robot behaviours are written as [`Command`]s: small objects with
//! `initialize`/`execute`/`is_finished`/`end` hooks.  The [`Scheduler`]
//! advances each running command one step per tick, making sure no two
//! commands ever drive the same subsystem at once.
//!
//! # Modules
//!
//! - [`command`] – the [`Command`] trait and [`ScheduledCommand`], the
//!   per-command state machine (acquire, run, suspend, resume, terminate).
//! - [`group`] – [`CommandGroup`]: sequential and parallel composition.
//! - [`scheduler`] – [`Scheduler`] and [`SchedulerConfig`]: owns resources
//!   and commands and performs one tick per call.
//! - [`driver`] – [`run_periodic`][driver::run_periodic]: tokio loop that
//!   paces ticks to the control period.
//! - [`pacing`] – cadence arithmetic and [`CycleStats`].
//! - [`clock`] – [`Clock`] abstraction with a manual clock for tests.
//! - [`instant`] – closure-backed commands and a timed wait.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: subscriber
//!   and optional OTLP export.
//!
//! # Resources
//!
//! Subsystem locks live in the kernel's [`ResourceTable`]; the scheduler
//! owns one and exposes it through
//! [`Scheduler::register_resource`].  Commands refer to resources only by
//! [`ResourceId`].

pub mod clock;
pub mod command;
pub mod driver;
pub mod group;
pub mod instant;
pub mod pacing;
pub mod scheduler;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, ScheduledCommand};
pub use group::{CommandGroup, Node};
pub use instant::{FnCommand, InstantCommand, WaitCommand};
pub use pacing::{Cadence, CycleStats, pace_delay};
pub use scheduler::{Scheduler, SchedulerConfig, TickReport};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

pub use cogwheel_kernel::{InterruptSignal, ResourceTable};
pub use cogwheel_types::{CommandId, CommandState, Hook, HookError, ResourceId, SchedError};
