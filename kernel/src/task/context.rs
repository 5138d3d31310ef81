//! Initial stack image of a new task.
//!
//! A new task has to look as if it had called `yield_now` itself and been
//! switched out: the restore primitive then pops the image like any other
//! saved context and "returns" into the task entry.
//!
//! Layout, from the top of the reserved region downward:
//!
//! ```text
//!   param high, param low
//!   STATUS WREG BSR PRODH PRODL FSR0H FSR0L FSR1H FSR1L TABLAT
//!   [TBLPTRU=0] TBLPTRH TBLPTRL [PCLATU] PCLATH
//!   scratch[0..n] = 0
//!   [TOSU=0] TOSH TOSL             <- entry address
//!   1                              <- return records on the hardware stack
//!   0                              <- critical nesting
//! ```
//!
//! Bracketed fields exist only on the large tier.

use crate::arch::pic18::regs::{Register, RegisterFile};
use crate::config::{PortConfig, NO_CRITICAL_NESTING};
use crate::task::stack::TaskStack;

/// Fields of a fresh task image, in push order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialFrame {
    pub parameter: u16,
    pub registers: RegisterFile,
    /// Task entry. Function pointers never point above 64 KiB, so TOSU is
    /// always written as zero.
    pub entry: u16,
    pub return_depth: u8,
    pub critical_nesting: u8,
}

impl InitialFrame {
    pub const fn new(entry: u16, parameter: u16) -> Self {
        Self {
            parameter,
            registers: RegisterFile::initial(),
            entry,
            return_depth: 1,
            critical_nesting: NO_CRITICAL_NESTING,
        }
    }

    /// Bytes the image occupies for `cfg`.
    pub const fn len(cfg: &PortConfig) -> usize {
        2 + cfg.tier.fsr_bytes() as usize
            + cfg.scratch_bytes as usize
            + cfg.tier.call_return_entry() as usize
            + 1
            + 1
    }

    /// Pushes the image onto `stack` and returns the new top of stack.
    ///
    /// The stack must have at least [`InitialFrame::len`] free bytes; nothing
    /// here checks that.
    pub fn write(&self, stack: &mut TaskStack, cfg: &PortConfig) -> usize {
        let [param_hi, param_lo] = self.parameter.to_be_bytes();
        stack.push(param_hi);
        stack.push(param_lo);

        for &reg in Register::save_order(cfg.tier) {
            stack.push(self.registers.get(reg));
        }

        // Scratch do compilador (page 0).
        for _ in 0..cfg.scratch_bytes {
            stack.push(0);
        }

        let [entry_hi, entry_lo] = self.entry.to_be_bytes();
        if cfg.tier.is_large() {
            stack.push(0); // TOSU
        }
        stack.push(entry_hi);
        stack.push(entry_lo);

        stack.push(self.return_depth);
        stack.push(self.critical_nesting);

        stack.top()
    }
}

/// Builds the initial image for a task entering at `entry` with `parameter`.
pub fn initialise_stack(stack: &mut TaskStack, cfg: &PortConfig, entry: u16, parameter: u16) -> usize {
    InitialFrame::new(entry, parameter).write(stack, cfg)
}
