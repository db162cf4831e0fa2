//! `cogwheel-kernel` – Resource arbitration
//!
//! The exclusive-access layer of Cogwheel. It does not schedule anything; it
//! decides who may touch which subsystem and tells waiters when that changes.
//!
//! # Modules
//!
//! - [`resource`] – [`Resource`][resource::Resource] and
//!   [`ResourceTable`][resource::ResourceTable]: one mutual-exclusion lock per
//!   subsystem with non-blocking try-acquire, holder-checked release and a
//!   level-triggered waiter list.  The table acquires a command's whole
//!   requirement set all-or-nothing.
//! - [`interrupt`] – [`InterruptSignal`][interrupt::InterruptSignal]:
//!   the shared, level-triggered cancellation flag observed by a command or by
//!   every member of a command group.

pub mod interrupt;
pub mod resource;

pub use interrupt::InterruptSignal;
pub use resource::{Resource, ResourceTable};
