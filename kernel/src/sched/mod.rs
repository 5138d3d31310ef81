//! Port side of the scheduler: start, yield, tick and stop.
//!
//! The ready lists and the choice of the next task belong to the kernel above
//! (`SchedulerHooks`). This module only moves contexts in and out of the CPU
//! and keeps the live critical-nesting counter in step with them.

use crate::arch::pic18::PortHardware;
use crate::config::PortConfig;
use crate::sync::CriticalNesting;
use crate::task::context::initialise_stack;
use crate::task::stack::{minimal_stack_size, TaskStack};
use crate::util::{KError, KResult};

/// Kernel entry points the port calls during a switch.
pub trait SchedulerHooks {
    /// Stack of the task that is current right now.
    fn current_stack(&mut self) -> &mut TaskStack;

    /// Picks the highest priority ready task and makes it current.
    fn switch_context(&mut self);

    /// Advances the tick count. Returns whether a switch is due; a suspended
    /// scheduler answers `false` and pends the tick.
    fn increment_tick(&mut self) -> bool;
}

/// Scheduler suspension, used to keep heap operations atomic.
pub trait PreemptionControl {
    fn suspend_all(&self);
    /// Pended ticks and yields are the kernel's business; the port only
    /// needs the scheduler running again.
    fn resume_all(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotStarted,
    Running,
    Halted,
}

/// Process-wide port state: configuration, live critical nesting and the
/// scheduler lifecycle.
pub struct Port<H> {
    hw: H,
    config: PortConfig,
    nesting: CriticalNesting,
    state: SchedulerState,
}

impl<H: PortHardware> Port<H> {
    pub fn new(hw: H, config: PortConfig) -> Self {
        Self {
            hw,
            config,
            nesting: CriticalNesting::new(),
            state: SchedulerState::NotStarted,
        }
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn critical_nesting(&self) -> u8 {
        self.nesting.depth()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn minimal_stack_size(&self) -> u16 {
        minimal_stack_size(&self.config)
    }

    /// Writes the initial image of a new task onto `stack`.
    pub fn initialise_stack(&self, stack: &mut TaskStack, entry: u16, parameter: u16) -> usize {
        initialise_stack(stack, &self.config, entry, parameter)
    }

    pub fn enter_critical(&mut self) {
        self.nesting.enter(&mut self.hw);
    }

    pub fn exit_critical(&mut self) {
        self.nesting.exit(&mut self.hw);
    }

    /// Runs `f` inside a critical section.
    pub fn critical<R>(&mut self, f: impl FnOnce(&mut H) -> R) -> R {
        self.enter_critical();
        let r = f(&mut self.hw);
        self.exit_critical();
        r
    }

    /// Arms the tick and restores the first task.
    ///
    /// On the device control never comes back. With a simulated core the call
    /// returns once the core holds the first task's context. Only valid once,
    /// from `NotStarted`.
    ///
    /// Device glue that ever sees control come back out of this call must
    /// call [`Port::scheduler_returned`].
    pub fn start_scheduler<S: SchedulerHooks>(&mut self, sched: &mut S) -> KResult<()> {
        if self.state != SchedulerState::NotStarted {
            return Err(KError::Invalid);
        }
        crate::kprintln!(
            "port: starting scheduler tier={:?} scratch={} min_stack={}",
            self.config.tier,
            self.config.scratch_bytes,
            self.minimal_stack_size()
        );

        self.hw.setup_tick();
        self.state = SchedulerState::Running;
        self.restore(sched);
        Ok(())
    }

    /// Stops the scheduler by resetting the device.
    pub fn end_scheduler(&mut self) {
        crate::kprintln!("port: end_scheduler -> reset");
        self.state = SchedulerState::Halted;
        self.hw.hard_reset();
        // Power-on value: interrupts stay masked until a new start.
        self.nesting = CriticalNesting::new();
    }

    /// Handles control coming back out of a restore that cannot return.
    pub fn scheduler_returned(&mut self) {
        crate::kprintln!("port: scheduler returned, resetting");
        self.end_scheduler();
    }

    /// Manual context switch. Must store a task exactly like [`Port::tick`].
    pub fn yield_now<S: SchedulerHooks>(&mut self, sched: &mut S) {
        debug_assert_eq!(self.state, SchedulerState::Running);
        self.save(sched);
        sched.switch_context();
        self.restore(sched);
    }

    /// Body of the tick interrupt.
    pub fn tick<S: SchedulerHooks>(&mut self, sched: &mut S) {
        debug_assert_eq!(self.state, SchedulerState::Running);
        self.save(sched);
        if sched.increment_tick() {
            sched.switch_context();
        }
        self.restore(sched);
    }

    fn save<S: SchedulerHooks>(&mut self, sched: &mut S) {
        let nesting = self.nesting.depth();
        self.hw.save_context(sched.current_stack(), nesting);
    }

    fn restore<S: SchedulerHooks>(&mut self, sched: &mut S) {
        let nesting = self.hw.restore_context(sched.current_stack());
        self.nesting.reload(nesting);
    }
}
