//! LC-3 memory subsystem.
//!
//! A flat 65536-word address space:
//!
//! | range           | use                      |
//! |-----------------|--------------------------|
//! | x0000 - x00FF   | trap vector table        |
//! | x0100 - x01FF   | interrupt vector table   |
//! | x0200 - x2FFF   | privileged code          |
//! | x3000 - xFDFF   | user code and stack      |
//! | xFE00 - xFFFF   | device registers         |
//!
//! Only the range below the device window is backed by storage. Every
//! access at or above [`DEVICE_START`] is routed to a [`DeviceBus`].

use std::io;
use thiserror::Error;

pub const TRAP_TABLE_START: u16 = 0x0000;
pub const TRAP_TABLE_END: u16 = 0x00FF;
pub const INTERRUPT_TABLE_START: u16 = 0x0100;
pub const INTERRUPT_TABLE_END: u16 = 0x01FF;
pub const PRIVILEGED_START: u16 = 0x0200;
pub const PRIVILEGED_END: u16 = 0x2FFF;
pub const USER_START: u16 = 0x3000;
pub const USER_END: u16 = 0xFDFF;
pub const DEVICE_START: u16 = 0xFE00;
pub const DEVICE_END: u16 = 0xFFFF;

/// Number of words backed by storage.
pub const BACKED_WORDS: usize = DEVICE_START as usize;

/// Handlers for the memory-mapped device window.
///
/// Called inline during a memory access, so implementations must not
/// block indefinitely.
pub trait DeviceBus {
    fn read(&mut self, addr: u16) -> u16;
    fn write(&mut self, addr: u16, value: u16);
}

/// A device window with nothing attached: reads return zero and writes
/// are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevices;

impl DeviceBus for NoDevices {
    fn read(&mut self, _addr: u16) -> u16 {
        0
    }

    fn write(&mut self, _addr: u16, _value: u16) {}
}

/// LC-3 memory: backing storage plus a device bus.
pub struct Memory<B = NoDevices> {
    cells: Box<[u16]>,
    bus: B,
}

impl Memory<NoDevices> {
    /// Create a zeroed memory with no devices attached.
    pub fn new() -> Self {
        Self::with_bus(NoDevices)
    }
}

impl Default for Memory<NoDevices> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: DeviceBus> Memory<B> {
    /// Create a zeroed memory whose device window is served by `bus`.
    pub fn with_bus(bus: B) -> Self {
        Self {
            cells: vec![0; BACKED_WORDS].into_boxed_slice(),
            bus,
        }
    }

    /// Read a word. Device addresses go through the bus.
    #[inline]
    pub fn read(&mut self, addr: u16) -> u16 {
        if addr >= DEVICE_START {
            return self.bus.read(addr);
        }
        self.cells[addr as usize]
    }

    /// Write a word. Device addresses go through the bus.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        if addr >= DEVICE_START {
            self.bus.write(addr, value);
            return;
        }
        self.cells[addr as usize] = value;
    }

    /// Read backing storage without touching devices.
    ///
    /// Returns `None` for device addresses.
    pub fn peek(&self, addr: u16) -> Option<u16> {
        self.cells.get(addr as usize).copied()
    }

    /// Copy a contiguous run of words into backing storage.
    ///
    /// # Panics
    /// Panics if the segment would extend into the device window.
    pub fn write_segment(&mut self, addr: u16, words: &[u16]) {
        let start = addr as usize;
        let end = start + words.len();
        assert!(
            end <= BACKED_WORDS,
            "segment x{:04X}..x{:04X} overlaps the device window",
            start,
            end
        );
        self.cells[start..end].copy_from_slice(words);
    }

    /// Dump backing storage (for debugging).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        let start = start as usize;
        let end = (start + count).min(BACKED_WORDS);
        (start..end).map(|i| (i as u16, self.cells[i])).collect()
    }

    /// Zero all backing storage. Devices are not touched.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// A byte-stream loader positioned at address zero.
    pub fn writer(&mut self) -> MemoryWriter<'_, B> {
        MemoryWriter { mem: self, pos: 0 }
    }
}

impl<B> std::fmt::Debug for Memory<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&w| w != 0).count();
        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("backed_cells", &BACKED_WORDS)
            .finish()
    }
}

/// Streams little-endian bytes into backing storage.
///
/// Each pair of bytes forms one word, low byte first. The writer keeps a
/// byte cursor, so a stream may be fed in chunks of any size, including
/// odd ones. It never writes into the device window.
pub struct MemoryWriter<'a, B = NoDevices> {
    mem: &'a mut Memory<B>,
    /// Cursor in bytes, not words.
    pos: usize,
}

impl<'a, B: DeviceBus> MemoryWriter<'a, B> {
    /// A loader positioned at word address `origin`.
    pub fn at(mem: &'a mut Memory<B>, origin: u16) -> Result<Self, LoadError> {
        if origin >= DEVICE_START {
            return Err(LoadError::OriginOutOfRange(origin));
        }
        Ok(Self { mem, pos: origin as usize * 2 })
    }

    /// Bytes written so far, counted from address zero.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes that still fit before the device window.
    pub fn remaining(&self) -> usize {
        BACKED_WORDS * 2 - self.pos
    }

    /// Write as many bytes as fit.
    ///
    /// Returns the byte count on success. If `buf` does not fit, the bytes
    /// that do fit are still written and [`LoadError::ShortWrite`] reports
    /// how many.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, LoadError> {
        let n = buf.len().min(self.remaining());
        for &byte in &buf[..n] {
            let cell = &mut self.mem.cells[self.pos / 2];
            *cell = if self.pos % 2 == 0 {
                (*cell & 0xFF00) | byte as u16
            } else {
                (*cell & 0x00FF) | ((byte as u16) << 8)
            };
            self.pos += 1;
        }

        if n < buf.len() {
            return Err(LoadError::ShortWrite { written: n, rejected: buf.len() - n });
        }
        Ok(n)
    }
}

impl<B: DeviceBus> io::Write for MemoryWriter<'_, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_bytes(buf) {
            Ok(n) => Ok(n),
            Err(LoadError::ShortWrite { written, .. }) if written > 0 => Ok(written),
            Err(e) => Err(io::Error::new(io::ErrorKind::WriteZero, e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Errors that can occur while loading a memory image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The image did not fit below the device window. The bytes that did
    /// fit were written.
    #[error("short write: {written} bytes written, {rejected} bytes did not fit below the device window")]
    ShortWrite { written: usize, rejected: usize },

    #[error("load origin x{0:04X} is inside the device window")]
    OriginOutOfRange(u16),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Records device traffic.
    #[derive(Default)]
    struct RecordingBus {
        reads: Vec<u16>,
        writes: Vec<(u16, u16)>,
    }

    impl DeviceBus for RecordingBus {
        fn read(&mut self, addr: u16) -> u16 {
            self.reads.push(addr);
            0xBEEF
        }

        fn write(&mut self, addr: u16, value: u16) {
            self.writes.push((addr, value));
        }
    }

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new();
        mem.write(256, 0x0BAD);
        assert_eq!(mem.read(256), 0x0BAD);
        assert_eq!(mem.peek(256), Some(0x0BAD));
    }

    #[test]
    fn test_device_window_routes_to_bus() {
        let mut mem = Memory::with_bus(RecordingBus::default());
        mem.write(DEVICE_START, 1);
        mem.write(DEVICE_END, 2);
        assert_eq!(mem.read(0xFE04), 0xBEEF);
        mem.write(USER_END, 3);

        assert_eq!(mem.bus().writes, vec![(DEVICE_START, 1), (DEVICE_END, 2)]);
        assert_eq!(mem.bus().reads, vec![0xFE04]);
        assert_eq!(mem.peek(USER_END), Some(3));
        assert_eq!(mem.peek(DEVICE_START), None);
    }

    #[test]
    fn test_write_segment() {
        let mut mem = Memory::new();
        mem.write_segment(0, &[0x0102, 0x0304]);
        assert_eq!(mem.read(0), 0x0102);
        assert_eq!(mem.read(1), 0x0304);
    }

    #[test]
    #[should_panic]
    fn test_write_segment_into_device_window_panics() {
        let mut mem = Memory::new();
        mem.write_segment(USER_END, &[1, 2]);
    }

    #[test]
    fn test_writer_empty() {
        let mut mem = Memory::new();
        assert_eq!(mem.writer().write_bytes(&[]), Ok(0));
        assert!(mem.dump(0, BACKED_WORDS).iter().all(|&(_, w)| w == 0));
    }

    #[test]
    fn test_writer_little_endian() {
        let mut mem = Memory::new();
        assert_eq!(mem.writer().write_bytes(&[0xFF, 0xFE]), Ok(2));
        assert_eq!(mem.read(0), 0xFEFF);
        assert!(mem.dump(1, BACKED_WORDS).iter().all(|&(_, w)| w == 0));
    }

    #[test]
    fn test_writer_keeps_cursor_across_chunks() {
        let mut mem = Memory::new();
        let mut w = mem.writer();
        w.write_bytes(&[0xFF, 0xFE]).unwrap();
        w.write_bytes(&[0xFD]).unwrap();
        w.write_bytes(&[0xFC]).unwrap();
        assert_eq!(w.position(), 4);

        assert_eq!(mem.read(0), 0xFEFF);
        assert_eq!(mem.read(1), 0xFCFD);
        assert_eq!(mem.read(2), 0);
    }

    #[test]
    fn test_writer_at_origin() {
        let mut mem = Memory::new();
        let mut w = MemoryWriter::at(&mut mem, USER_START).unwrap();
        w.write_bytes(&[0x02, 0xE0]).unwrap();
        assert_eq!(mem.read(USER_START), 0xE002);

        assert!(matches!(
            MemoryWriter::at(&mut mem, DEVICE_START),
            Err(LoadError::OriginOutOfRange(DEVICE_START))
        ));
    }

    #[test]
    fn test_writer_overflow() {
        let mut mem = Memory::with_bus(RecordingBus::default());
        let buf = vec![0xFE; 65536 * 2 * 2];

        let result = mem.writer().write_bytes(&buf);

        assert_eq!(
            result,
            Err(LoadError::ShortWrite {
                written: BACKED_WORDS * 2,
                rejected: buf.len() - BACKED_WORDS * 2,
            })
        );
        assert!(mem.dump(0, BACKED_WORDS).iter().all(|&(_, w)| w == 0xFEFE));
        assert!(mem.bus().writes.is_empty());
    }

    #[test]
    fn test_io_write_reports_write_zero_when_full() {
        let mut mem = Memory::new();
        let mut w = MemoryWriter::at(&mut mem, USER_END).unwrap();

        assert_eq!(w.write(&[1, 2, 3, 4]).unwrap(), 2);
        let err = w.write(&[5]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(mem.read(USER_END), 0x0201);
    }
}
