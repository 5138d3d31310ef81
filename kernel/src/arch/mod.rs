pub mod pic18;

pub use pic18::{InterruptMask, PortHardware};
