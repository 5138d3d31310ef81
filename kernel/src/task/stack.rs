//! Task stacks and their minimum size.

use alloc::boxed::Box;
use alloc::vec;

use crate::config::{PortConfig, MINIMAL_CALL_RETURN_DEPTH, STACK_OTHER_BYTES};
use crate::util::{KError, KResult};

/// Smallest stack, in bytes, that survives a context switch at maximum
/// call/return depth.
///
/// `scratch + register block + depth * record size + other bytes`. The scratch
/// size comes from the same `PortConfig` the frame builder uses.
pub const fn minimal_stack_size(cfg: &PortConfig) -> u16 {
    cfg.scratch_bytes as u16
        + cfg.tier.fsr_bytes()
        + MINIMAL_CALL_RETURN_DEPTH * cfg.tier.call_return_entry()
        + STACK_OTHER_BYTES
}

/// Byte stack owned by one task. Grows downward.
///
/// `top` is the number of bytes below the pushed data that are still free:
/// the next push lands at `mem[top - 1]`, which is where the hardware
/// top-of-stack pointer would point. Running out of room is the caller's
/// sizing bug; it is not reported, the slice index simply panics.
pub struct TaskStack {
    mem: Box<[u8]>,
    top: usize,
}

impl TaskStack {
    /// Allocates `bytes` of zeroed stack. Stacks are addressed with 16-bit
    /// pointers, so the size must be in `1..=u16::MAX`.
    pub fn new(bytes: usize) -> KResult<Self> {
        if bytes == 0 || bytes > u16::MAX as usize {
            return Err(KError::OutOfRange);
        }
        Ok(Self { mem: vec![0u8; bytes].into_boxed_slice(), top: bytes })
    }

    /// Stack large enough for the minimal context plus `extra` bytes of
    /// task locals.
    pub fn for_config(cfg: &PortConfig, extra: usize) -> KResult<Self> {
        Self::new(minimal_stack_size(cfg) as usize + extra)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    /// Bytes currently pushed.
    #[inline]
    pub fn used(&self) -> usize {
        self.mem.len() - self.top
    }

    /// Offset of the slot the top-of-stack pointer refers to plus one; also
    /// the number of free bytes.
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        debug_assert!(self.top > 0, "task stack overflow");
        self.top -= 1;
        self.mem[self.top] = byte;
    }

    #[inline]
    pub fn pop(&mut self) -> u8 {
        debug_assert!(self.top < self.mem.len(), "task stack underflow");
        let byte = self.mem[self.top];
        self.top += 1;
        byte
    }

    /// Reads the byte `depth` slots above the top without popping it
    /// (`0` is the most recently pushed byte).
    #[inline]
    pub fn peek(&self, depth: usize) -> u8 {
        self.mem[self.top + depth]
    }

    /// Pushed bytes, outermost (most recently pushed) first.
    pub fn image(&self) -> &[u8] {
        &self.mem[self.top..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AddressTier;

    #[test]
    fn test_minimal_stack_size_without_scratch() {
        assert_eq!(minimal_stack_size(&PortConfig::new(AddressTier::Small, 0)), 53);
        assert_eq!(minimal_stack_size(&PortConfig::new(AddressTier::Large, 0)), 65);
    }

    #[test]
    fn test_minimal_stack_size_adds_scratch() {
        for scratch in [1u8, 17, 200, 255] {
            let small = PortConfig::new(AddressTier::Small, scratch);
            let large = PortConfig::new(AddressTier::Large, scratch);
            assert_eq!(minimal_stack_size(&small), scratch as u16 + 13 + 20 + 20);
            assert_eq!(minimal_stack_size(&large), scratch as u16 + 15 + 30 + 20);
        }
    }

    #[test]
    fn test_push_pop_is_lifo() {
        let mut stack = TaskStack::new(4).unwrap();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.used(), 3);
        assert_eq!(stack.top(), 1);
        assert_eq!(stack.peek(0), 3);
        assert_eq!(stack.image(), &[3, 2, 1]);
        assert_eq!(stack.pop(), 3);
        assert_eq!(stack.pop(), 2);
        assert_eq!(stack.pop(), 1);
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_stack_size_limits() {
        assert_eq!(TaskStack::new(0).err(), Some(KError::OutOfRange));
        assert_eq!(TaskStack::new(u16::MAX as usize + 1).err(), Some(KError::OutOfRange));
        let cfg = PortConfig::new(AddressTier::Large, 4);
        let stack = TaskStack::for_config(&cfg, 32).unwrap();
        assert_eq!(stack.capacity(), 65 + 4 + 32);
        assert_eq!(stack.top(), stack.capacity());
    }
}
