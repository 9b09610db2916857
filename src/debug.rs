use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $error:expr) => {
        if !$cond {
            Err($error)
        } else {
            Ok(())
        }
    };
}

#[macro_export]
macro_rules! ensure_not {
    ($cond:expr, $error:expr) => {
        if $cond {
            Err($error)
        } else {
            Ok(())
        }
    };
}

const PREFIX: &str = "[MPXY]: ";

/// Byte sink the console writes to.
#[derive(Clone, Copy)]
pub enum Sink {
    /// A firmware provided character output routine.
    Putc(fn(u8)),
    /// A memory mapped ns16550 compatible UART.
    Uart(raw::RawConsole),
}

impl Sink {
    fn put(&self, c: u8) {
        match self {
            Sink::Putc(putc) => putc(c),
            Sink::Uart(uart) => uart.put(c),
        }
    }
}

impl Write for &Sink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.bytes() {
            self.put(c);
        }

        Ok(())
    }
}

pub struct Console {
    sink: Sink,
    level: LevelFilter,
}

impl Console {
    pub const fn new(sink: Sink, level: LevelFilter) -> Self {
        Self { sink, level }
    }
}

/// Write a single log line, prefix and level included.
pub fn write_line(out: &mut impl Write, record: &Record) -> fmt::Result {
    write!(out, "{}{:<5} {}\r\n", PREFIX, record.level(), record.args())
}

impl Log for Console {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // output is best effort
            let _ = write_line(&mut &self.sink, record);
        }
    }

    fn flush(&self) {}
}

static LOGGER: Once<Console> = Once::new();

/// Install the firmware console as the `log` backend.
pub fn init(sink: Sink, level: LevelFilter) -> Result<(), SetLoggerError> {
    let console = LOGGER.call_once(|| Console::new(sink, level));
    log::set_logger(console)?;
    log::set_max_level(level);
    Ok(())
}

pub mod raw {
    const THR: usize = 0x00;
    const LSR: usize = 0x05;
    const LSR_THRE: u8 = 1 << 5;

    /// Polled ns16550 transmitter, usable before the firmware console is up.
    #[derive(Clone, Copy)]
    pub struct RawConsole {
        base: usize,
    }

    impl RawConsole {
        /// # Safety
        ///
        /// `base` must be the address of a ns16550 register block mapped for M-mode.
        pub const unsafe fn new(base: usize) -> Self {
            Self { base }
        }

        pub fn put(&self, c: u8) {
            unsafe {
                let lsr = (self.base + LSR) as *const u8;
                while lsr.read_volatile() & LSR_THRE == 0 {}
                ((self.base + THR) as *mut u8).write_volatile(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn lines_carry_prefix_and_level() {
        let mut out = String::new();
        write_line(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("channel {} registered", 7))
                .build(),
        )
        .unwrap();
        assert_eq!(out, "[MPXY]: WARN  channel 7 registered\r\n");
    }

    #[test]
    fn console_filters_by_level() {
        let console = Console::new(Sink::Putc(|_| {}), LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let error = Metadata::builder().level(Level::Error).build();
        assert!(!console.enabled(&debug));
        assert!(console.enabled(&error));
    }

    #[test]
    fn uart_sink_writes_the_transmit_register() {
        // LSR reports an empty transmitter so put() never spins.
        let mut regs = [0u8; 8];
        regs[LSR_OFFSET] = 1 << 5;
        let uart = unsafe { raw::RawConsole::new(regs.as_mut_ptr() as usize) };
        let sink = Sink::Uart(uart);
        write!(&mut &sink, "A").unwrap();
        assert_eq!(regs[0], b'A');
    }

    const LSR_OFFSET: usize = 5;
}
