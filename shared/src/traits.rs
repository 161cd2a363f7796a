//! # Hardware Seam
//!
//! The bus protocol touches hardware through exactly four calls: a
//! full-duplex byte transfer, asserting and deasserting the selection line,
//! and reading a monotonic clock. They are split over three traits so a board
//! can mix and match implementations:
//!
//! - [`Transfer`]: the raw synchronous byte exchange
//! - [`SelectLine`]: the chip-select side-band signal
//! - [`Clock`]: the elapsed-time source for protocol timeouts
//!
//! [`LinkHal`] is implemented for anything providing all three, and [`Hal`]
//! glues three separate implementations together.

use core::time::Duration;

/// Byte sent when a transfer has nothing to clock out
pub const FILLER_BYTE: u8 = 0x00;

/// Full-duplex synchronous byte transfer
pub trait Transfer {
    /// Platform-specific error type
    type Error: core::fmt::Debug;

    /// Clock `len` bytes across the bus
    ///
    /// When `tx` is `None` the implementation clocks out filler bytes; when
    /// `rx` is `None` the bytes clocked in are discarded. Supplied buffers are
    /// at least `len` bytes long.
    fn transfer(
        &mut self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<(), Self::Error>;
}

/// Chip-select side-band signal
pub trait SelectLine {
    /// Select the peripheral (drive chip-select active)
    fn assert_select(&mut self);

    /// Release the peripheral
    fn deassert_select(&mut self);
}

/// Monotonic time source
pub trait Clock {
    /// Opaque timestamp
    type Instant: Copy;

    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`
    fn elapsed(&self, since: Self::Instant) -> Duration;

    /// Called on every iteration of a polling loop
    ///
    /// The default spins; preemptive targets should yield or sleep here.
    fn relax(&mut self) {
        core::hint::spin_loop();
    }
}

/// Everything the bus protocol needs from the platform
pub trait LinkHal: Transfer + SelectLine + Clock {}

impl<H: Transfer + SelectLine + Clock> LinkHal for H {}

/// Composes independent transfer, select and clock implementations
#[derive(Debug)]
pub struct Hal<T, S, C> {
    pub transfer: T,
    pub select: S,
    pub clock: C,
}

impl<T, S, C> Hal<T, S, C> {
    pub fn new(transfer: T, select: S, clock: C) -> Self {
        Self {
            transfer,
            select,
            clock,
        }
    }
}

impl<T: Transfer, S, C> Transfer for Hal<T, S, C> {
    type Error = T::Error;

    fn transfer(
        &mut self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<(), Self::Error> {
        self.transfer.transfer(tx, rx, len)
    }
}

impl<T, S: SelectLine, C> SelectLine for Hal<T, S, C> {
    fn assert_select(&mut self) {
        self.select.assert_select();
    }

    fn deassert_select(&mut self) {
        self.select.deassert_select();
    }
}

impl<T, S, C: Clock> Clock for Hal<T, S, C> {
    type Instant = C::Instant;

    fn now(&self) -> Self::Instant {
        self.clock.now()
    }

    fn elapsed(&self, since: Self::Instant) -> Duration {
        self.clock.elapsed(since)
    }

    fn relax(&mut self) {
        self.clock.relax();
    }
}

/// Errors from a [`StreamTransfer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<E> {
    /// The stream ended before the echoed bytes arrived
    UnexpectedEof,
    /// Underlying I/O error
    Io(E),
}

impl<E> From<embedded_io::ReadExactError<E>> for StreamError<E> {
    fn from(e: embedded_io::ReadExactError<E>) -> Self {
        match e {
            embedded_io::ReadExactError::UnexpectedEof => StreamError::UnexpectedEof,
            embedded_io::ReadExactError::Other(e) => StreamError::Io(e),
        }
    }
}

/// [`Transfer`] over a byte stream that returns one byte per byte written
///
/// Fits USB or UART bridges that tunnel a synchronous bus: every byte
/// written is clocked out and the byte clocked in comes back on the read
/// side.
#[derive(Debug)]
pub struct StreamTransfer<IO> {
    io: IO,
}

/// Bytes moved per write/read round trip
const STREAM_BLOCK: usize = 64;

impl<IO> StreamTransfer<IO> {
    pub fn new(io: IO) -> Self {
        Self { io }
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

impl<IO> Transfer for StreamTransfer<IO>
where
    IO: embedded_io::Read + embedded_io::Write,
{
    type Error = StreamError<IO::Error>;

    fn transfer(
        &mut self,
        tx: Option<&[u8]>,
        mut rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<(), Self::Error> {
        let filler = [FILLER_BYTE; STREAM_BLOCK];
        let mut sink = [0u8; STREAM_BLOCK];
        let mut done = 0;

        while done < len {
            let n = (len - done).min(STREAM_BLOCK);
            let out = match tx {
                Some(tx) => &tx[done..done + n],
                None => &filler[..n],
            };
            self.io.write_all(out).map_err(StreamError::Io)?;
            self.io.flush().map_err(StreamError::Io)?;

            match rx.as_deref_mut() {
                Some(rx) => self.io.read_exact(&mut rx[done..done + n])?,
                None => self.io.read_exact(&mut sink[..n])?,
            }
            done += n;
        }
        Ok(())
    }
}
