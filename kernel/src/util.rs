use core::fmt;

use spin::Once;

/// Where `kprint!` output goes. Installed once by the platform (UART on the
/// target, stdout in the host simulator).
pub type ConsoleFn = fn(fmt::Arguments);

static CONSOLE: Once<ConsoleFn> = Once::new();

/// Registers the console sink. Later calls keep the first sink.
pub fn set_console(sink: ConsoleFn) {
    CONSOLE.call_once(|| sink);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // Sem console registrado: descarta.
    if let Some(sink) = CONSOLE.get() {
        sink(args);
    }
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ({
        $crate::util::_print(format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($fmt:expr) => ($crate::kprint!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::kprint!(concat!($fmt, "\n"), $($arg)*));
}

pub use crate::kprintln;

/// Errors for configuration and lifecycle misuse of the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KError {
    /// Operation not valid in the current scheduler state.
    Invalid,
    /// Value does not fit the width the hardware gives it.
    OutOfRange,
}

pub type KResult<T> = core::result::Result<T, KError>;
