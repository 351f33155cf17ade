//! Memory-mapped device registers.
//!
//! | address | register                  |
//! |---------|---------------------------|
//! | xFE00   | keyboard status (KBSR)    |
//! | xFE02   | keyboard data (KBDR)      |
//! | xFE04   | display status (DSR)      |
//! | xFE06   | display data (DDR)        |
//! | xFFFE   | machine control (MCR)     |
//!
//! Bit 15 of a status register means "ready". Bit 15 of MCR is the clock
//! enable: the run loop only advances while it is set.

use crate::cpu::memory::DeviceBus;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const KEYBOARD_STATUS: u16 = 0xFE00;
pub const KEYBOARD_DATA: u16 = 0xFE02;
pub const DISPLAY_STATUS: u16 = 0xFE04;
pub const DISPLAY_DATA: u16 = 0xFE06;
pub const MACHINE_CONTROL: u16 = 0xFFFE;

/// Ready bit of KBSR/DSR.
pub const READY: u16 = 1 << 15;

/// Clock-enable bit of MCR.
pub const CLOCK_ENABLE: u16 = 1 << 15;

/// Character I/O behind the keyboard and display registers.
///
/// Both methods run inline during a memory access, so neither may block.
pub trait Console {
    /// Emit one character. Display writes are assumed never to fail.
    fn write_byte(&mut self, byte: u8);

    /// Next pending input character, or `None` straight away if no key
    /// is waiting.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Console on the process's stdin and stdout.
///
/// A keyboard status read never waits for input. When stdin is a terminal,
/// keys come from its event queue through a zero-timeout poll. In line mode
/// they only arrive after Enter; [`StdConsole::raw`] delivers them as they
/// are typed. Otherwise a reader thread feeds stdin bytes into a channel
/// that is drained without blocking.
#[derive(Debug, Default)]
pub struct StdConsole {
    keys: KeySource,
    raw: bool,
    /// Set after the first failed poll so a missing terminal is reported once.
    input_failed: bool,
}

#[derive(Debug, Default)]
enum KeySource {
    /// Picked on the first read.
    #[default]
    Unopened,
    Terminal,
    Pipe(Receiver<u8>),
    Closed,
}

impl KeySource {
    fn open() -> Self {
        if io::stdin().is_terminal() {
            return KeySource::Terminal;
        }

        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new().name("stdin-keys".into()).spawn(move || {
            for byte in io::stdin().lock().bytes() {
                match byte {
                    Ok(b) => {
                        if tx.send(b).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("keyboard read failed: {}", e);
                        break;
                    }
                }
            }
        });
        match reader {
            Ok(_) => KeySource::Pipe(rx),
            Err(e) => {
                warn!("cannot start stdin reader: {}", e);
                KeySource::Closed
            }
        }
    }
}

impl StdConsole {
    /// A console that leaves the terminal in line mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// A console that switches the terminal to raw mode until dropped.
    ///
    /// Raw mode turns off echo and line buffering. It also stops Ctrl-C
    /// from raising a signal, so that key reaches the program as 0x03.
    pub fn raw() -> io::Result<Self> {
        if !io::stdin().is_terminal() {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "stdin is not a terminal"));
        }
        terminal::enable_raw_mode()?;
        Ok(Self {
            keys: KeySource::Terminal,
            raw: true,
            input_failed: false,
        })
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    fn poll_terminal(&mut self) -> Option<u8> {
        loop {
            match event::poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return self.input_error(e),
            }
            match event::read() {
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                    if let Some(byte) = key_byte(key) {
                        return Some(byte);
                    }
                }
                // Mouse, resize and focus events carry no character.
                Ok(_) => {}
                Err(e) => return self.input_error(e),
            }
        }
    }

    fn input_error(&mut self, e: io::Error) -> Option<u8> {
        if !self.input_failed {
            warn!("keyboard unavailable: {}", e);
            self.input_failed = true;
        }
        None
    }
}

impl Drop for StdConsole {
    fn drop(&mut self) {
        if self.raw {
            if let Err(e) = terminal::disable_raw_mode() {
                warn!("failed to restore terminal: {}", e);
            }
        }
    }
}

impl Console for StdConsole {
    fn write_byte(&mut self, byte: u8) {
        let mut out = io::stdout().lock();
        // Raw mode does not turn LF into CR LF.
        let written = if self.raw && byte == b'\n' {
            out.write_all(b"\r\n")
        } else {
            out.write_all(&[byte])
        };
        if let Err(e) = written.and_then(|_| out.flush()) {
            warn!("display write failed: {}", e);
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        if let KeySource::Unopened = self.keys {
            self.keys = KeySource::open();
        }

        let received = match &self.keys {
            KeySource::Pipe(rx) => rx.try_recv(),
            KeySource::Terminal => return self.poll_terminal(),
            KeySource::Unopened | KeySource::Closed => return None,
        };
        match received {
            Ok(byte) => Some(byte),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                debug!("end of keyboard input");
                self.keys = KeySource::Closed;
                None
            }
        }
    }
}

/// The ASCII code a key press stands for, if any.
pub fn key_byte(key: KeyEvent) -> Option<u8> {
    match key.code {
        KeyCode::Char(c) if c.is_ascii() => {
            let byte = c as u8;
            if key.modifiers.contains(KeyModifiers::CONTROL) && byte.is_ascii_alphabetic() {
                Some(byte.to_ascii_lowercase() & 0x1F)
            } else {
                Some(byte)
            }
        }
        KeyCode::Enter => Some(b'\n'),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}

/// In-memory console: queued input, captured output.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// A console whose keyboard will deliver `input`.
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    pub fn push_input(&mut self, input: &[u8]) {
        self.input.extend(input);
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for BufferConsole {
    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }
}

/// The standard LC-3 device set.
#[derive(Debug)]
pub struct Devices<C> {
    console: C,
    control: u16,
    /// Key read from the console but not yet consumed through KBDR.
    pending_key: Option<u8>,
}

impl<C: Console> Devices<C> {
    pub fn new(console: C) -> Self {
        Self {
            console,
            control: 0,
            pending_key: None,
        }
    }

    /// Clear MCR and drop any latched key.
    pub fn reset(&mut self) {
        self.control = 0;
        self.pending_key = None;
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Machine control register.
    pub fn control(&self) -> u16 {
        self.control
    }

    pub fn clock_enabled(&self) -> bool {
        self.control & CLOCK_ENABLE != 0
    }

    pub fn enable_clock(&mut self) {
        self.control |= CLOCK_ENABLE;
    }

    pub fn disable_clock(&mut self) {
        self.control &= !CLOCK_ENABLE;
    }

    fn poll_key(&mut self) -> Option<u8> {
        if self.pending_key.is_none() {
            self.pending_key = self.console.read_byte();
        }
        self.pending_key
    }
}

impl<C: Console> DeviceBus for Devices<C> {
    fn read(&mut self, addr: u16) -> u16 {
        match addr {
            KEYBOARD_STATUS => {
                if self.poll_key().is_some() {
                    READY
                } else {
                    0
                }
            }
            KEYBOARD_DATA => {
                self.poll_key();
                self.pending_key.take().map_or(0, u16::from)
            }
            // No display backpressure is modelled.
            DISPLAY_STATUS => READY,
            MACHINE_CONTROL => self.control,
            _ => 0,
        }
    }

    fn write(&mut self, addr: u16, value: u16) {
        match addr {
            MACHINE_CONTROL => {
                if self.clock_enabled() && value & CLOCK_ENABLE == 0 {
                    debug!("clock disabled through MCR");
                }
                self.control = value;
            }
            DISPLAY_DATA => {
                let byte = (value & 0xFF) as u8;
                debug!(ch = %byte.escape_ascii(), word = value, "display output");
                self.console.write_byte(byte);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_clock_bit() {
        let mut dev = Devices::new(BufferConsole::new());
        assert!(!dev.clock_enabled());

        dev.enable_clock();
        assert_eq!(dev.control(), 0b1000_0000_0000_0000);
        assert!(dev.clock_enabled());

        dev.write(MACHINE_CONTROL, 0xFFFF);
        dev.disable_clock();
        assert_eq!(dev.control(), 0b0111_1111_1111_1111);
        assert!(!dev.clock_enabled());
    }

    #[test]
    fn test_control_register_read_write() {
        let mut dev = Devices::new(BufferConsole::new());
        dev.write(MACHINE_CONTROL, 0x8123);
        assert_eq!(dev.read(MACHINE_CONTROL), 0x8123);
        assert!(dev.clock_enabled());
    }

    #[test]
    fn test_display_always_ready() {
        let mut dev = Devices::new(BufferConsole::new());
        assert_eq!(dev.read(DISPLAY_STATUS), READY);
    }

    #[test]
    fn test_display_data_writes_low_byte() {
        let mut dev = Devices::new(BufferConsole::new());
        dev.write(DISPLAY_DATA, 0x4148);
        dev.write(DISPLAY_DATA, u16::from(b'i'));
        assert_eq!(dev.console().output(), b"Hi");
    }

    #[test]
    fn test_keyboard() {
        let mut dev = Devices::new(BufferConsole::with_input(b"ab"));

        assert_eq!(dev.read(KEYBOARD_STATUS), READY);
        assert_eq!(dev.read(KEYBOARD_STATUS), READY);
        assert_eq!(dev.read(KEYBOARD_DATA), u16::from(b'a'));
        assert_eq!(dev.read(KEYBOARD_DATA), u16::from(b'b'));

        assert_eq!(dev.read(KEYBOARD_STATUS), 0);
        assert_eq!(dev.read(KEYBOARD_DATA), 0);
    }

    #[test]
    fn test_keyboard_status_without_input() {
        let mut dev = Devices::new(BufferConsole::new());
        assert_eq!(dev.read(KEYBOARD_STATUS), 0);
        assert_eq!(dev.read(KEYBOARD_DATA), 0);

        dev.console_mut().push_input(b"k");
        assert_eq!(dev.read(KEYBOARD_STATUS), READY);
        assert_eq!(dev.read(KEYBOARD_DATA), u16::from(b'k'));
    }

    #[test]
    fn test_std_keyboard_status_does_not_wait() {
        // Whether stdin is an idle terminal, an open pipe or closed, no key
        // is pending and the status reads "not ready" at once.
        let mut dev = Devices::new(StdConsole::new());
        let start = Instant::now();

        for _ in 0..100 {
            assert_eq!(dev.read(KEYBOARD_STATUS), 0);
        }

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!dev.console().is_raw());
    }

    #[test]
    fn test_key_byte() {
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(key_byte(press(KeyCode::Char('a'))), Some(b'a'));
        assert_eq!(key_byte(press(KeyCode::Enter)), Some(b'\n'));
        assert_eq!(key_byte(press(KeyCode::Backspace)), Some(0x08));
        assert_eq!(key_byte(press(KeyCode::Char('é'))), None);
        assert_eq!(key_byte(press(KeyCode::Up)), None);
        assert_eq!(
            key_byte(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(0x03)
        );
        assert_eq!(
            key_byte(KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT)),
            Some(b'A')
        );
    }

    #[test]
    fn test_unmapped_device_addresses() {
        let mut dev = Devices::new(BufferConsole::new());
        dev.write(0xFE10, 0x1234);
        assert_eq!(dev.read(0xFE10), 0);
        assert!(dev.console().output().is_empty());
    }

    #[test]
    fn test_reset() {
        let mut dev = Devices::new(BufferConsole::with_input(b"x"));
        dev.enable_clock();
        dev.read(KEYBOARD_STATUS);
        dev.reset();
        assert_eq!(dev.control(), 0);
        assert_eq!(dev.read(KEYBOARD_STATUS), 0);
    }
}
