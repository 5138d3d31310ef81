//! Critical-section nesting.
//!
//! The compiler keeps no frame pointer, so nesting cannot be tracked on the
//! task stack the way other ports do. One counter is kept instead. It is
//! saved into every task image on a switch and reloaded on restore, so each
//! task resumes with its own depth.
//!
//! GIEH is only touched when the depth crosses between 0 and 1. While the
//! counter sits at the startup sentinel no enter/exit pair can reach zero,
//! so interrupts stay masked until the first task is restored.

use crate::arch::pic18::InterruptMask;
use crate::config::CRITICAL_NESTING_SENTINEL;

#[derive(Debug)]
pub struct CriticalNesting {
    depth: u8,
}

impl CriticalNesting {
    /// Counter as it is before the scheduler starts.
    pub const fn new() -> Self {
        Self { depth: CRITICAL_NESTING_SENTINEL }
    }

    #[inline]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    #[inline]
    pub fn is_nested(&self) -> bool {
        self.depth != 0
    }

    pub fn enter<M: InterruptMask + ?Sized>(&mut self, mask: &mut M) {
        if self.depth == 0 {
            mask.set_interrupts(false);
        }
        debug_assert!(self.depth < u8::MAX, "critical nesting overflow");
        self.depth = self.depth.wrapping_add(1);
    }

    pub fn exit<M: InterruptMask + ?Sized>(&mut self, mask: &mut M) {
        debug_assert!(self.depth > 0, "exit_critical without enter_critical");
        self.depth = self.depth.wrapping_sub(1);
        if self.depth == 0 {
            mask.set_interrupts(true);
        }
    }

    /// Takes the depth found in a restored task image.
    #[inline]
    pub(crate) fn reload(&mut self, depth: u8) {
        self.depth = depth;
    }
}

impl Default for CriticalNesting {
    fn default() -> Self {
        Self::new()
    }
}
