//! PIC18 special-function registers that form part of a task context.

use crate::config::AddressTier;

/// Registers saved on every context switch.
///
/// The declaration order is the order in which they are pushed onto the task
/// stack. The save/restore primitive depends on it; reordering breaks every
/// image already on a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Status,
    Wreg,
    Bsr,
    Prodh,
    Prodl,
    Fsr0h,
    Fsr0l,
    Fsr1h,
    Fsr1l,
    Tablat,
    /// Large tier only.
    Tblptru,
    Tblptrh,
    Tblptrl,
    /// Large tier only.
    Pclatu,
    Pclath,
}

const SMALL_ORDER: [Register; 13] = [
    Register::Status,
    Register::Wreg,
    Register::Bsr,
    Register::Prodh,
    Register::Prodl,
    Register::Fsr0h,
    Register::Fsr0l,
    Register::Fsr1h,
    Register::Fsr1l,
    Register::Tablat,
    Register::Tblptrh,
    Register::Tblptrl,
    Register::Pclath,
];

const LARGE_ORDER: [Register; 15] = [
    Register::Status,
    Register::Wreg,
    Register::Bsr,
    Register::Prodh,
    Register::Prodl,
    Register::Fsr0h,
    Register::Fsr0l,
    Register::Fsr1h,
    Register::Fsr1l,
    Register::Tablat,
    Register::Tblptru,
    Register::Tblptrh,
    Register::Tblptrl,
    Register::Pclatu,
    Register::Pclath,
];

impl Register {
    pub const COUNT: usize = 15;

    /// Push order of the register-save block for `tier`.
    pub const fn save_order(tier: AddressTier) -> &'static [Register] {
        match tier {
            AddressTier::Small => &SMALL_ORDER,
            AddressTier::Large => &LARGE_ORDER,
        }
    }

    /// Byte written into this slot of a fresh task image.
    ///
    /// The values only make a new frame easy to spot in a memory dump.
    /// TBLPTRU is the exception: it must be zero so table reads start in
    /// the low 64 KiB.
    pub const fn initial_value(self) -> u8 {
        match self {
            Register::Status => 0x11,
            Register::Wreg => 0x22,
            Register::Bsr => 0x33,
            Register::Prodh => 0x44,
            Register::Prodl => 0x55,
            Register::Fsr0h => 0x66,
            Register::Fsr0l => 0x77,
            Register::Fsr1h => 0x88,
            Register::Fsr1l => 0x99,
            Register::Tablat => 0xAA,
            Register::Tblptru => 0x00,
            Register::Tblptrh => 0xCC,
            Register::Tblptrl => 0xDD,
            Register::Pclatu => 0xEE,
            Register::Pclath => 0xFF,
        }
    }
}

/// Values of every context register, indexed by [`Register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterFile {
    slots: [u8; Register::COUNT],
}

impl RegisterFile {
    pub const fn zeroed() -> Self {
        Self { slots: [0; Register::COUNT] }
    }

    /// The register contents of a task that has never run.
    pub const fn initial() -> Self {
        let mut slots = [0; Register::COUNT];
        let mut i = 0;
        while i < LARGE_ORDER.len() {
            let reg = LARGE_ORDER[i];
            slots[reg as usize] = reg.initial_value();
            i += 1;
        }
        Self { slots }
    }

    #[inline]
    pub fn get(&self, reg: Register) -> u8 {
        self.slots[reg as usize]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: u8) {
        self.slots[reg as usize] = value;
    }
}

bitflags::bitflags! {
    /// INTCON bits the port touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Intcon: u8 {
        /// Global (high-priority) interrupt enable.
        const GIEH   = 1 << 7;
        /// Peripheral / low-priority interrupt enable.
        const GIEL   = 1 << 6;
        const TMR0IE = 1 << 5;
        const TMR0IF = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_order_lengths_match_tier() {
        assert_eq!(Register::save_order(AddressTier::Small).len(), AddressTier::Small.fsr_bytes() as usize);
        assert_eq!(Register::save_order(AddressTier::Large).len(), AddressTier::Large.fsr_bytes() as usize);
    }

    #[test]
    fn test_small_order_is_large_order_without_upper_bytes() {
        let filtered: alloc::vec::Vec<Register> = Register::save_order(AddressTier::Large)
            .iter()
            .copied()
            .filter(|r| !matches!(r, Register::Tblptru | Register::Pclatu))
            .collect();
        assert_eq!(filtered.as_slice(), Register::save_order(AddressTier::Small));
    }

    #[test]
    fn test_initial_register_file() {
        let regs = RegisterFile::initial();
        assert_eq!(regs.get(Register::Status), 0x11);
        assert_eq!(regs.get(Register::Tablat), 0xAA);
        assert_eq!(regs.get(Register::Tblptru), 0x00);
        assert_eq!(regs.get(Register::Pclath), 0xFF);
    }
}
