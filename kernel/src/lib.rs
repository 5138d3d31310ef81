//! Port layer of a preemptive kernel for 8-bit PIC18 microcontrollers.
//!
//! Builds the initial stack image of each task, sizes task stacks, keeps the
//! critical-section nesting counter and drives the save/restore primitives
//! when the scheduler starts, yields or takes a tick. Heap calls go through
//! a gate that holds preemption off.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod util;

pub mod arch;
pub mod config;
pub mod mm;
pub mod sched;
pub mod sync;
pub mod task;

pub use config::{AddressTier, PortConfig};
pub use sched::{Port, PreemptionControl, SchedulerHooks, SchedulerState};
pub use util::{KError, KResult};
