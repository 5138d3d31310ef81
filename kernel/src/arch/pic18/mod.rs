//! PIC18 hooks the port layer calls into.
//!
//! On the device these are a handful of assembly macros (save, restore,
//! timer setup, `reset`). `sim::Pic18Core` is a register-level model of the
//! same primitives, used on the host.

pub mod regs;
pub mod sim;

use crate::task::stack::TaskStack;

/// Global interrupt enable.
pub trait InterruptMask {
    fn set_interrupts(&mut self, enabled: bool);
}

/// Everything below the port that touches the CPU directly.
pub trait PortHardware: InterruptMask {
    /// Programs the periodic tick timer and its interrupt.
    fn setup_tick(&mut self);

    /// Pushes the running context onto `stack`: the register block, the
    /// compiler scratch area, every hardware return address, their count
    /// and `critical_nesting`, in the layout of
    /// [`InitialFrame`](crate::task::context::InitialFrame).
    ///
    /// Interrupts are masked on return.
    fn save_context(&mut self, stack: &mut TaskStack, critical_nesting: u8);

    /// Pops a context pushed by `save_context` (or built by the frame
    /// builder) and returns into it. Interrupts come back enabled only if the
    /// restored nesting is zero. Returns that nesting.
    ///
    /// On the device this never returns to the caller.
    fn restore_context(&mut self, stack: &mut TaskStack) -> u8;

    /// Full device reset.
    fn hard_reset(&mut self);
}
