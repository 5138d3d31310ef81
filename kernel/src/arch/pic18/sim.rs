//! Register-level model of the PIC18 context primitives.
//!
//! Only the state a context switch moves is modelled: the saved SFRs, the
//! compiler's page-0 scratch bytes, the 31-entry hardware return stack, the
//! program counter and INTCON.

use alloc::vec;
use alloc::vec::Vec;

use super::regs::{Intcon, Register, RegisterFile};
use super::{InterruptMask, PortHardware};
use crate::config::{AddressTier, PortConfig};
use crate::task::stack::TaskStack;

/// Depth of the hardware call/return stack.
pub const RETURN_STACK_DEPTH: usize = 31;

/// Tick interrupt vector (high priority).
pub const HIGH_VECTOR: u32 = 0x0008;

pub struct Pic18Core {
    tier: AddressTier,
    pub regs: RegisterFile,
    pub scratch: Vec<u8>,
    pub return_stack: Vec<u32>,
    pub pc: u32,
    pub intcon: Intcon,
    tick_setups: u32,
    resets: u32,
}

impl Pic18Core {
    pub fn new(cfg: &PortConfig) -> Self {
        Self {
            tier: cfg.tier,
            regs: RegisterFile::zeroed(),
            scratch: vec![0; cfg.scratch_bytes as usize],
            return_stack: Vec::with_capacity(RETURN_STACK_DEPTH),
            pc: 0,
            intcon: Intcon::empty(),
            tick_setups: 0,
            resets: 0,
        }
    }

    pub fn tier(&self) -> AddressTier {
        self.tier
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.intcon.contains(Intcon::GIEH)
    }

    pub fn tick_setups(&self) -> u32 {
        self.tick_setups
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    fn push_return(&mut self, addr: u32) {
        debug_assert!(self.return_stack.len() < RETURN_STACK_DEPTH, "hardware stack overflow");
        self.return_stack.push(addr & self.tier.address_mask());
    }

    /// `call target`: the return address goes on the hardware stack.
    pub fn call(&mut self, target: u32, return_to: u32) {
        self.push_return(return_to);
        self.pc = target & self.tier.address_mask();
    }

    /// Takes the tick interrupt if GIEH allows it: pushes the PC, masks
    /// interrupts and jumps to the vector. Returns whether it was taken.
    pub fn raise_tick(&mut self) -> bool {
        self.intcon.insert(Intcon::TMR0IF);
        if !self.intcon.contains(Intcon::GIEH | Intcon::TMR0IE) {
            return false;
        }
        let pc = self.pc;
        self.push_return(pc);
        self.intcon.remove(Intcon::GIEH | Intcon::TMR0IF);
        self.pc = HIGH_VECTOR;
        true
    }

    /// The 16-bit argument a freshly started task finds just above its top
    /// of stack.
    pub fn argument(&self, stack: &TaskStack) -> u16 {
        u16::from_le_bytes([stack.peek(0), stack.peek(1)])
    }
}

impl InterruptMask for Pic18Core {
    fn set_interrupts(&mut self, enabled: bool) {
        self.intcon.set(Intcon::GIEH, enabled);
    }
}

impl PortHardware for Pic18Core {
    fn setup_tick(&mut self) {
        self.tick_setups += 1;
        self.intcon.remove(Intcon::TMR0IF);
        self.intcon.insert(Intcon::TMR0IE | Intcon::GIEL);
    }

    fn save_context(&mut self, stack: &mut TaskStack, critical_nesting: u8) {
        self.intcon.remove(Intcon::GIEH);

        for &reg in Register::save_order(self.tier) {
            stack.push(self.regs.get(reg));
        }
        for &byte in &self.scratch {
            stack.push(byte);
        }

        // Esvazia a stack de hardware, do topo para a base.
        let mut depth = 0u8;
        while let Some(addr) = self.return_stack.pop() {
            if self.tier.is_large() {
                stack.push((addr >> 16) as u8);
            }
            stack.push((addr >> 8) as u8);
            stack.push(addr as u8);
            depth += 1;
        }
        stack.push(depth);
        stack.push(critical_nesting);
    }

    fn restore_context(&mut self, stack: &mut TaskStack) -> u8 {
        let nesting = stack.pop();
        let depth = stack.pop();

        self.return_stack.clear();
        for _ in 0..depth {
            let lo = stack.pop() as u32;
            let hi = stack.pop() as u32;
            let up = if self.tier.is_large() { stack.pop() as u32 } else { 0 };
            self.push_return((up << 16) | (hi << 8) | lo);
        }

        for i in (0..self.scratch.len()).rev() {
            self.scratch[i] = stack.pop();
        }
        for &reg in Register::save_order(self.tier).iter().rev() {
            let byte = stack.pop();
            self.regs.set(reg, byte);
        }

        // `retfie` quando nao ha secao critica pendente, `return` caso contrario.
        self.pc = self.return_stack.pop().unwrap_or(0);
        self.intcon.set(Intcon::GIEH, nesting == 0);
        nesting
    }

    fn hard_reset(&mut self) {
        self.resets += 1;
        self.regs = RegisterFile::zeroed();
        self.scratch.iter_mut().for_each(|b| *b = 0);
        self.return_stack.clear();
        self.pc = 0;
        self.intcon = Intcon::empty();
    }
}
