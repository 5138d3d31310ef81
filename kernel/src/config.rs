//! Build-time configuration of the port.
//!
//! Everything that shapes a task's stack image is resolved here exactly once:
//! the address-space tier (which decides the width of TBLPTR, PCLAT and the
//! hardware return addresses) and the size of the compiler's page-0 scratch
//! area. The frame builder and the minimal-stack calculator both read the same
//! `PortConfig`, so they cannot disagree on the layout.

use crate::util::{KError, KResult};

/// Register bytes saved per context, small tier (ROM <= 64 KiB).
pub const FSR_BYTES_SMALL: u16 = 13;
/// Register bytes saved per context, large tier (adds TBLPTRU and PCLATU).
pub const FSR_BYTES_LARGE: u16 = 15;

/// Bytes per hardware return-stack entry: TOSH/TOSL.
pub const CALL_RETURN_ENTRY_SMALL: u16 = 2;
/// Bytes per hardware return-stack entry: TOSU/TOSH/TOSL.
pub const CALL_RETURN_ENTRY_LARGE: u16 = 3;

/// Call/return depth every task must be able to hold when switched out.
pub const MINIMAL_CALL_RETURN_DEPTH: u16 = 10;

/// Parameter (2) + return-record count (1) + nesting (1) + 16 bytes of slack.
pub const STACK_OTHER_BYTES: u16 = 20;

/// Nesting depth stored in a fresh task image.
pub const NO_CRITICAL_NESTING: u8 = 0;

/// Live nesting value before the scheduler starts. Any enter/exit pair issued
/// from startup code leaves interrupts masked while the counter sits here.
pub const CRITICAL_NESTING_SENTINEL: u8 = 0x7F;

/// Devices with more than this many ROM words need the large layout.
pub const LARGE_ROM_THRESHOLD_WORDS: u32 = 0x8000;

/// Page-0 scratch bytes reported by the toolchain, taken from
/// `PIC18_SCRATCH_BYTES` when the crate is compiled.
pub const TOOLCHAIN_SCRATCH_BYTES: u8 = match option_env!("PIC18_SCRATCH_BYTES") {
    Some(s) => parse_scratch(s),
    None => 0,
};

const fn parse_scratch(s: &str) -> u8 {
    let bytes = s.as_bytes();
    assert!(!bytes.is_empty(), "PIC18_SCRATCH_BYTES is empty");
    let mut value: u16 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        assert!(b.is_ascii_digit(), "PIC18_SCRATCH_BYTES must be decimal");
        value = value * 10 + (b - b'0') as u16;
        assert!(value <= u8::MAX as u16, "PIC18_SCRATCH_BYTES must fit in one byte");
        i += 1;
    }
    value as u8
}

/// Address-space layout of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTier {
    /// Up to 64 KiB of program memory.
    Small,
    /// More than 64 KiB: TBLPTRU, PCLATU and TOSU become part of the context.
    Large,
}

impl AddressTier {
    /// Tier chosen by the `rom-large` feature.
    pub const BUILD: AddressTier = if cfg!(feature = "rom-large") {
        AddressTier::Large
    } else {
        AddressTier::Small
    };

    pub const fn from_rom_words(words: u32) -> Self {
        if words > LARGE_ROM_THRESHOLD_WORDS {
            AddressTier::Large
        } else {
            AddressTier::Small
        }
    }

    /// Size of the register-save block.
    pub const fn fsr_bytes(self) -> u16 {
        match self {
            AddressTier::Small => FSR_BYTES_SMALL,
            AddressTier::Large => FSR_BYTES_LARGE,
        }
    }

    /// Size of one call/return record.
    pub const fn call_return_entry(self) -> u16 {
        match self {
            AddressTier::Small => CALL_RETURN_ENTRY_SMALL,
            AddressTier::Large => CALL_RETURN_ENTRY_LARGE,
        }
    }

    pub const fn is_large(self) -> bool {
        matches!(self, AddressTier::Large)
    }

    /// Mask applied to program-memory addresses held on the return stack.
    pub const fn address_mask(self) -> u32 {
        match self {
            AddressTier::Small => 0x00_FFFF,
            AddressTier::Large => 0x1F_FFFF,
        }
    }
}

/// The one configuration shared by the frame builder and the size calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub tier: AddressTier,
    pub scratch_bytes: u8,
}

impl PortConfig {
    /// What this build was compiled for.
    pub const TOOLCHAIN: PortConfig = PortConfig::new(AddressTier::BUILD, TOOLCHAIN_SCRATCH_BYTES);

    pub const fn new(tier: AddressTier, scratch_bytes: u8) -> Self {
        Self { tier, scratch_bytes }
    }

    /// Builds a config from raw device/toolchain figures.
    ///
    /// The scratch size is loaded with a single `movlw`, so anything wider
    /// than a byte cannot come from a real toolchain.
    pub fn from_toolchain(rom_words: u32, scratch: u16) -> KResult<Self> {
        let scratch_bytes = u8::try_from(scratch).map_err(|_| KError::OutOfRange)?;
        Ok(Self::new(AddressTier::from_rom_words(rom_words), scratch_bytes))
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::TOOLCHAIN
    }
}
