//! # Bus Framing Protocol
//!
//! [`BusLink`] owns the link session with the network processor and runs
//! every request/acknowledge exchange over the [`LinkHal`] seam.
//!
//! ## Link States
//!
//! ```text
//!                 init()             ack SUCCESS
//! Uninitialized ─────────► BringUp ──────────────► Ready ◄──┐
//!                             │                      │      │ exchange done
//!                             │ FAIL / timeout       ▼      │
//!                             └──────► Faulted ◄── Busy ────┘
//!                                         ▲    transfer error
//!                                         └──── (any state)
//! ```
//!
//! ## Selection Line
//!
//! Each exchange runs inside a [`Transaction`], which asserts the selection
//! line when it is opened and deasserts it when dropped. Early returns
//! through `?` therefore always release the line.
//!
//! ## Serialisation
//!
//! `BusLink` is not a lock. Methods take `&mut self`; callers sharing a link
//! between contexts must serialise access so that one exchange completes
//! before the next begins.

use core::time::Duration;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::protocol::{
    align4, Ack, ControlWord, Frame, FrameDescriptor, Opcode, RegisterWidth, ACK_WORKING,
    DESCRIPTOR_LEN, INT_STATUS_REG, MAX_FRAME_PAYLOAD, MEMORY_CHUNK_SIZE, MEMORY_LEAD_IN_LEN,
    START_TOKEN,
};
use crate::status::{LinkError, LinkResult};
use crate::traits::LinkHal;

/// Timeouts governing the protocol's polling loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bring-up handshake window
    pub bringup_timeout_ms: u32,
    /// Window for re-sending a command while its acknowledge reads "working"
    pub ack_timeout_ms: u32,
    /// Wait for the start token before a read's data phase
    pub start_token_timeout_ms: u32,
    /// Interrupt status polling window
    pub interrupt_poll_timeout_ms: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bringup_timeout_ms: 10,
            ack_timeout_ms: 10,
            start_token_timeout_ms: 10_000,
            interrupt_poll_timeout_ms: 1_000,
        }
    }
}

fn millis(ms: u32) -> Duration {
    Duration::from_millis(ms as u64)
}

/// Link session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Uninitialized,
    BringUp,
    Ready,
    Busy,
    Faulted,
}

/// Counters kept by the link session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Selection-line assert/deassert pairs
    pub transactions: u32,
    /// Control words re-sent because the peer was still working
    pub control_retries: u32,
    /// Acknowledge bytes that were neither a sentinel nor the working value
    pub unexpected_acks: u32,
    /// Reads abandoned because no start token arrived
    pub token_timeouts: u32,
    /// Bytes clocked out with data
    pub bytes_out: u64,
    /// Bytes clocked in and kept
    pub bytes_in: u64,
    /// Transport-level failures
    pub faults: u32,
}

/// Data phase of a basic exchange
enum Phase<'b> {
    Write(&'b [u8]),
    Read(&'b mut [u8]),
}

/// One selection-line-bracketed exchange
///
/// Asserts on creation, deasserts on drop.
struct Transaction<'a, H: LinkHal> {
    hal: &'a mut H,
    config: &'a BusConfig,
    stats: &'a mut LinkStats,
    control: Option<ControlWord>,
    fault: bool,
}

impl<'a, H: LinkHal> Transaction<'a, H> {
    fn begin(hal: &'a mut H, config: &'a BusConfig, stats: &'a mut LinkStats) -> Self {
        hal.assert_select();
        stats.transactions += 1;
        Self {
            hal,
            config,
            stats,
            control: None,
            fault: false,
        }
    }

    fn xfer(&mut self, tx: Option<&[u8]>, rx: Option<&mut [u8]>, len: usize) -> LinkResult<()> {
        let sending = tx.is_some();
        let keeping = rx.is_some();
        if self.hal.transfer(tx, rx, len).is_err() {
            error!("bus transfer of {} bytes failed", len);
            self.fault = true;
            self.stats.faults += 1;
            return Err(LinkError::Fail);
        }
        if sending {
            self.stats.bytes_out += len as u64;
        }
        if keeping {
            self.stats.bytes_in += len as u64;
        }
        Ok(())
    }

    /// Send `word` until the peer answers SUCCESS or FAIL, or `timeout` runs out
    fn control(&mut self, word: ControlWord, timeout: Duration) -> LinkResult<()> {
        let mut tx = [0u8; 4];
        let len = word.encode(&mut tx);
        self.control = Some(word);

        let start = self.hal.now();
        loop {
            let mut rx = [0u8; 4];
            self.xfer(Some(&tx[..len]), Some(&mut rx[..len]), len)?;
            match Ack::from(rx[len - 1]) {
                Ack::Success => return Ok(()),
                Ack::Fail => {
                    warn!("control word {:?} rejected by peer", word);
                    return Err(LinkError::Fail);
                }
                Ack::Pending(byte) => {
                    if byte != ACK_WORKING {
                        self.stats.unexpected_acks += 1;
                        warn!("unexpected acknowledge byte {:#x}", byte);
                    }
                }
            }
            if self.hal.elapsed(start) >= timeout {
                debug!("no acknowledge for {:?} within window", word);
                return Err(LinkError::Busy);
            }
            self.stats.control_retries += 1;
            self.hal.relax();
        }
    }

    /// Send a non-init control word within the acknowledge window
    fn command(&mut self, word: ControlWord) -> LinkResult<()> {
        let timeout = millis(self.config.ack_timeout_ms);
        self.control(word, timeout)
    }

    fn length(&mut self, len: u16) -> LinkResult<()> {
        self.xfer(Some(&len.to_le_bytes()), None, 2)
    }

    fn address(&mut self, addr: u32) -> LinkResult<()> {
        self.xfer(Some(&addr.to_le_bytes()), None, 4)
    }

    /// Poll single bytes until the start token shows up
    fn wait_start_token(&mut self) -> LinkResult<()> {
        let timeout = millis(self.config.start_token_timeout_ms);
        let start = self.hal.now();
        loop {
            let mut byte = [0u8; 1];
            self.xfer(None, Some(&mut byte), 1)?;
            if byte[0] == START_TOKEN {
                return Ok(());
            }
            if self.hal.elapsed(start) >= timeout {
                self.stats.token_timeouts += 1;
                warn!("start token not seen within {} ms", self.config.start_token_timeout_ms);
                return Err(LinkError::Busy);
            }
            self.hal.relax();
        }
    }

    fn write(&mut self, data: &[u8]) -> LinkResult<()> {
        self.xfer(Some(data), None, data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> LinkResult<()> {
        let len = buf.len();
        self.xfer(None, Some(buf), len)
    }

    /// Clock in `len` bytes and throw them away
    fn discard(&mut self, len: usize) -> LinkResult<()> {
        self.xfer(None, None, len)
    }

    /// Control word, 2-byte length, start token (reads only), data phase
    fn exchange(&mut self, word: ControlWord, length: u16, data: Phase<'_>) -> LinkResult<()> {
        self.command(word)?;
        self.length(length)?;
        match data {
            Phase::Write(tx) => self.write(tx),
            Phase::Read(rx) => {
                self.wait_start_token()?;
                self.read(rx)
            }
        }
    }
}

impl<H: LinkHal> Drop for Transaction<'_, H> {
    fn drop(&mut self) {
        self.hal.deassert_select();
    }
}

/// Link session with the network processor
///
/// # Example
///
/// ```ignore
/// let mut bus = BusLink::new(board_hal, BusConfig::default());
/// bus.init()?;
/// let chip_id = bus.read_register(0x00, RegisterWidth::Word)?;
/// bus.write_frame(FrameDescriptor::new(0x01, 0, cmd.len()).unwrap(), &cmd)?;
/// ```
pub struct BusLink<H: LinkHal> {
    hal: H,
    config: BusConfig,
    state: LinkState,
    stats: LinkStats,
    last_control: Option<ControlWord>,
}

impl<H: LinkHal> BusLink<H> {
    pub fn new(hal: H, config: BusConfig) -> Self {
        Self {
            hal,
            config,
            state: LinkState::Uninitialized,
            stats: LinkStats::default(),
            last_control: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Control word of the most recent exchange
    pub fn last_control(&self) -> Option<ControlWord> {
        self.last_control
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Forget the session, as after a device reset
    pub fn reset(&mut self) {
        self.set_state(LinkState::Uninitialized);
        self.last_control = None;
    }

    /// Tear down the session and hand back the platform layer
    pub fn release(self) -> H {
        self.hal
    }

    /// Bring the link up
    ///
    /// Sends the 32-bit init word until the peer acknowledges it. A FAIL
    /// acknowledge ends the handshake at once; running out the bring-up
    /// window returns `Busy`. Either failure leaves the link `Faulted`.
    /// Calling this on a link that is already `Ready` does nothing.
    pub fn init(&mut self) -> LinkResult<()> {
        if self.state == LinkState::Ready {
            debug!("link already up");
            return Ok(());
        }

        self.set_state(LinkState::BringUp);
        let timeout = millis(self.config.bringup_timeout_ms);
        let result = {
            let mut txn = Transaction::begin(&mut self.hal, &self.config, &mut self.stats);
            let result = txn.control(ControlWord::Init, timeout);
            self.last_control = txn.control;
            result
        };

        match result {
            Ok(()) => {
                info!("link up");
                self.set_state(LinkState::Ready);
                Ok(())
            }
            Err(e) => {
                error!("bring-up failed: {:?}", e);
                self.set_state(LinkState::Faulted);
                Err(e)
            }
        }
    }

    /// Read a 1- or 2-byte register
    pub fn read_register(&mut self, address: u8, width: RegisterWidth) -> LinkResult<u16> {
        self.transact(|txn| {
            let mut buf = [0u8; 2];
            let word = ControlWord::register(Opcode::RegisterRead, address, width);
            txn.exchange(word, width.len() as u16, Phase::Read(&mut buf[..width.len()]))?;
            Ok(u16::from_le_bytes(buf))
        })
    }

    /// Write a 1- or 2-byte register
    pub fn write_register(&mut self, address: u8, width: RegisterWidth, value: u16) -> LinkResult<()> {
        if width == RegisterWidth::Byte && value > 0xFF {
            return Err(LinkError::InvalidParameter);
        }
        self.transact(|txn| {
            let bytes = value.to_le_bytes();
            let word = ControlWord::register(Opcode::RegisterWrite, address, width);
            txn.exchange(word, width.len() as u16, Phase::Write(&bytes[..width.len()]))
        })
    }

    /// Read `buf.len()` bytes of peer memory starting at `address`
    pub fn read_memory(&mut self, address: u32, buf: &mut [u8]) -> LinkResult<()> {
        let length = bulk_length(buf.len())?;
        self.transact(|txn| {
            txn.command(ControlWord::command(Opcode::MemoryRead))?;
            txn.length(length)?;
            txn.address(address)?;
            txn.wait_start_token()?;
            txn.read(buf)
        })
    }

    /// Write `data` into peer memory starting at `address`
    ///
    /// Writes longer than [`MEMORY_CHUNK_SIZE`] are preceded by a
    /// [`MEMORY_LEAD_IN_LEN`]-byte zero lead-in and sent chunk by chunk.
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> LinkResult<()> {
        let length = bulk_length(data.len())?;
        self.transact(|txn| {
            txn.command(ControlWord::command(Opcode::MemoryWrite))?;
            txn.length(length)?;
            txn.address(address)?;
            if data.len() <= MEMORY_CHUNK_SIZE {
                return txn.write(data);
            }
            txn.write(&[0u8; MEMORY_LEAD_IN_LEN])?;
            for chunk in data.chunks(MEMORY_CHUNK_SIZE) {
                txn.write(chunk)?;
            }
            Ok(())
        })
    }

    /// Send one frame: the descriptor, then the payload padded to 4 bytes
    ///
    /// `descriptor` must announce exactly `payload.len()` bytes. An empty
    /// payload sends the descriptor alone. The payload is clocked out as
    /// given, followed by a zero tail up to the next 4-byte boundary.
    pub fn write_frame(&mut self, descriptor: FrameDescriptor, payload: &[u8]) -> LinkResult<()> {
        if descriptor.payload_len() != payload.len() {
            return Err(LinkError::InvalidParameter);
        }
        let pad = align4(payload.len()) - payload.len();

        self.transact(|txn| {
            let header = descriptor.to_bytes();
            txn.exchange(
                ControlWord::command(Opcode::FrameWrite),
                DESCRIPTOR_LEN as u16,
                Phase::Write(&header),
            )?;
            if !payload.is_empty() {
                txn.write(payload)?;
            }
            if pad > 0 {
                txn.write(&[0u8; 3][..pad])?;
            }
            Ok(())
        })
    }

    /// Receive one frame
    ///
    /// Reads the 4-byte descriptor, sizes a receive buffer to the 4-aligned
    /// payload, skips any dummy bytes the descriptor announces and returns
    /// the payload trimmed to its logical length. A payload larger than
    /// [`MAX_FRAME_PAYLOAD`] fails with `NoMoreResource`.
    pub fn read_frame(&mut self) -> LinkResult<Frame> {
        self.transact(|txn| {
            let mut raw = [0u8; DESCRIPTOR_LEN];
            txn.exchange(
                ControlWord::command(Opcode::FrameRead),
                DESCRIPTOR_LEN as u16,
                Phase::Read(&mut raw),
            )?;

            let descriptor = FrameDescriptor::from_bytes(raw);
            if (descriptor.total_len as usize) < DESCRIPTOR_LEN {
                warn!("malformed frame descriptor, total length {}", descriptor.total_len);
                return Err(LinkError::Fail);
            }

            let wire_len = descriptor.wire_payload_len();
            let mut payload: Vec<u8, MAX_FRAME_PAYLOAD> = Vec::new();
            if payload.resize(wire_len, 0).is_err() {
                error!("frame payload of {} bytes exceeds receive buffer", wire_len);
                return Err(LinkError::NoMoreResource);
            }

            if wire_len > 0 {
                if descriptor.skip > 0 {
                    txn.discard(descriptor.skip as usize)?;
                }
                txn.read(&mut payload)?;
            }
            payload.truncate(descriptor.payload_len());
            trace!("frame type {:#x}, {} bytes", descriptor.frame_type, payload.len());
            Ok(Frame { descriptor, payload })
        })
    }

    /// Poll the interrupt status register until it answers
    ///
    /// `Busy` reads are retried until the interrupt poll window elapses, which
    /// yields `Timeout`. Any other error is returned as is.
    pub fn read_interrupt_status(&mut self) -> LinkResult<u16> {
        let timeout = millis(self.config.interrupt_poll_timeout_ms);
        let start = self.hal.now();
        loop {
            match self.read_register(INT_STATUS_REG, RegisterWidth::Word) {
                Err(LinkError::Busy) => {}
                other => return other,
            }
            if self.hal.elapsed(start) >= timeout {
                warn!("interrupt status poll timed out");
                return Err(LinkError::Timeout);
            }
            self.hal.relax();
        }
    }

    /// Run `f` as one transaction on a ready link
    fn transact<R, F>(&mut self, f: F) -> LinkResult<R>
    where
        F: FnOnce(&mut Transaction<'_, H>) -> LinkResult<R>,
    {
        if self.state != LinkState::Ready {
            return Err(LinkError::InvalidMode);
        }
        self.set_state(LinkState::Busy);

        let (result, fault) = {
            let mut txn = Transaction::begin(&mut self.hal, &self.config, &mut self.stats);
            let result = f(&mut txn);
            self.last_control = txn.control;
            (result, txn.fault)
        };

        self.set_state(if fault {
            LinkState::Faulted
        } else {
            LinkState::Ready
        });
        result
    }

    fn set_state(&mut self, next: LinkState) {
        if self.state != next {
            trace!("link state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Validate a bulk transfer length against the 16-bit length field
fn bulk_length(len: usize) -> LinkResult<u16> {
    match u16::try_from(len) {
        Ok(0) | Err(_) => Err(LinkError::InvalidParameter),
        Ok(len) => Ok(len),
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::protocol::{ACK_FAIL, ACK_SUCCESS, INIT_CONTROL_WORD, INT_FRAME_PENDING};
    use crate::testing::SimNwp;

    fn ready_link(sim: SimNwp) -> BusLink<SimNwp> {
        let mut bus = BusLink::new(sim, BusConfig::default());
        bus.init().unwrap();
        bus.hal_mut().log.clear();
        bus
    }

    fn quick_config() -> BusConfig {
        BusConfig {
            start_token_timeout_ms: 1,
            interrupt_poll_timeout_ms: 5,
            ..BusConfig::default()
        }
    }

    fn assert_released(bus: &BusLink<SimNwp>) {
        let sim = bus.hal();
        assert!(!sim.is_selected());
        assert_eq!(sim.asserts, sim.deasserts);
        assert!(sim.log.iter().all(|rec| rec.selected));
    }

    #[test]
    fn test_bringup_after_working_polls() {
        let mut sim = SimNwp::new();
        sim.acks.extend([ACK_WORKING, ACK_WORKING, ACK_WORKING, ACK_SUCCESS]);
        let mut bus = BusLink::new(sim, BusConfig::default());

        assert_eq!(bus.init(), Ok(()));
        assert_eq!(bus.state(), LinkState::Ready);
        assert_eq!(bus.stats().control_retries, 3);
        assert_eq!(bus.hal().control_words(), [INIT_CONTROL_WORD; 4]);
        assert_eq!((bus.hal().asserts, bus.hal().deasserts), (1, 1));
    }

    #[test]
    fn test_bringup_fail_is_immediate() {
        let mut sim = SimNwp::new();
        sim.acks.extend([ACK_FAIL, ACK_SUCCESS]);
        let mut bus = BusLink::new(sim, BusConfig::default());

        assert_eq!(bus.init(), Err(LinkError::Fail));
        assert_eq!(bus.state(), LinkState::Faulted);
        assert_eq!(bus.hal().log.len(), 1);
        assert_released(&bus);
    }

    #[test]
    fn test_bringup_times_out_busy() {
        let mut sim = SimNwp::new();
        sim.acks.extend(core::iter::repeat(ACK_WORKING).take(1_000));
        let mut bus = BusLink::new(sim, BusConfig::default());

        assert_eq!(bus.init(), Err(LinkError::Busy));
        assert_eq!(bus.state(), LinkState::Faulted);
        assert!(bus.hal().time_us >= 10_000);
        assert_released(&bus);

        // A later bring-up may recover the link.
        bus.hal_mut().acks.clear();
        assert_eq!(bus.init(), Ok(()));
        assert_eq!(bus.state(), LinkState::Ready);
    }

    #[test]
    fn test_unexpected_ack_is_counted_and_retried() {
        let mut sim = SimNwp::new();
        sim.acks.extend([0x77, ACK_SUCCESS]);
        let mut bus = BusLink::new(sim, BusConfig::default());

        assert_eq!(bus.init(), Ok(()));
        assert_eq!(bus.stats().unexpected_acks, 1);
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut bus = BusLink::new(SimNwp::new(), BusConfig::default());
        bus.init().unwrap();
        bus.init().unwrap();
        assert_eq!(bus.state(), LinkState::Ready);
        assert_eq!((bus.hal().asserts, bus.hal().deasserts), (1, 1));
        assert_eq!(bus.hal().log.len(), 1);
    }

    #[test]
    fn test_operations_need_ready_link() {
        let mut bus = BusLink::new(SimNwp::new(), BusConfig::default());
        assert_eq!(bus.read_register(0x01, RegisterWidth::Byte), Err(LinkError::InvalidMode));
        assert_eq!(bus.read_frame().map(|_| ()), Err(LinkError::InvalidMode));
        assert_eq!(bus.hal().asserts, 0);
    }

    #[test]
    fn test_register_write_then_read() {
        let mut bus = ready_link(SimNwp::new());
        bus.write_register(0x20, RegisterWidth::Word, 0xBEEF).unwrap();
        bus.write_register(0x21, RegisterWidth::Byte, 0x5A).unwrap();

        assert_eq!(bus.read_register(0x20, RegisterWidth::Word), Ok(0xBEEF));
        assert_eq!(bus.read_register(0x21, RegisterWidth::Byte), Ok(0x5A));
        assert_eq!(
            bus.last_control(),
            Some(ControlWord::register(Opcode::RegisterRead, 0x21, RegisterWidth::Byte))
        );
        assert_released(&bus);
    }

    #[test]
    fn test_register_write_has_no_token_wait() {
        let mut bus = ready_link(SimNwp::new());
        bus.write_register(0x30, RegisterWidth::Byte, 1).unwrap();
        // control, length, data
        let lens: std::vec::Vec<usize> = bus.hal().log.iter().map(|r| r.len).collect();
        assert_eq!(lens, [2, 2, 1]);
        assert_eq!(bus.hal().log[1].tx.as_deref(), Some(&[1u8, 0][..]));
    }

    #[test]
    fn test_byte_register_rejects_wide_value() {
        let mut bus = ready_link(SimNwp::new());
        assert_eq!(
            bus.write_register(0x30, RegisterWidth::Byte, 0x100),
            Err(LinkError::InvalidParameter)
        );
        assert!(bus.hal().log.is_empty());
    }

    #[test]
    fn test_register_read_without_token_is_busy() {
        let mut bus = BusLink::new(SimNwp::new(), quick_config());
        bus.init().unwrap();
        bus.hal_mut().stalled_reads = 1;

        assert_eq!(bus.read_register(0x01, RegisterWidth::Byte), Err(LinkError::Busy));
        assert_eq!(bus.state(), LinkState::Ready);
        assert_eq!(bus.stats().token_timeouts, 1);
        assert_released(&bus);

        // The whole operation can be retried.
        bus.hal_mut().registers[0x01] = 9;
        assert_eq!(bus.read_register(0x01, RegisterWidth::Byte), Ok(9));
    }

    #[test]
    fn test_token_after_filler_bytes() {
        let mut sim = SimNwp::new();
        sim.token_delay = 5;
        sim.registers[0x02] = 0x1234;
        let mut bus = ready_link(sim);
        assert_eq!(bus.read_register(0x02, RegisterWidth::Word), Ok(0x1234));
    }

    #[test]
    fn test_command_fail_ack_is_terminal() {
        let mut bus = ready_link(SimNwp::new());
        bus.hal_mut().acks.extend([ACK_WORKING, ACK_FAIL]);
        assert_eq!(bus.write_register(0x10, RegisterWidth::Byte, 1), Err(LinkError::Fail));
        assert_eq!(bus.hal().log.len(), 2);
        assert_eq!(bus.state(), LinkState::Ready);
        assert_released(&bus);
    }

    #[test]
    fn test_transfer_error_faults_link() {
        let mut bus = ready_link(SimNwp::new());
        bus.hal_mut().fail_at = Some(1);
        assert_eq!(bus.write_register(0x10, RegisterWidth::Byte, 1), Err(LinkError::Fail));
        assert_eq!(bus.state(), LinkState::Faulted);
        assert_eq!(bus.stats().faults, 1);
        assert_released(&bus);
        assert_eq!(bus.write_register(0x10, RegisterWidth::Byte, 1), Err(LinkError::InvalidMode));
    }

    #[test]
    fn test_small_memory_write_and_read() {
        let mut bus = ready_link(SimNwp::new());
        let data: std::vec::Vec<u8> = (0..100u8).collect();
        bus.write_memory(0x400, &data).unwrap();
        assert!(bus.hal().lead_ins.is_empty());

        let mut back = [0u8; 100];
        bus.read_memory(0x400, &mut back).unwrap();
        assert_eq!(&back[..], &data[..]);
        assert_released(&bus);
    }

    #[test]
    fn test_large_memory_write_is_chunked_with_lead_in() {
        let mut bus = ready_link(SimNwp::new());
        let data: std::vec::Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        bus.write_memory(0x1000, &data).unwrap();

        let sim = bus.hal();
        assert_eq!(sim.lead_ins, [MEMORY_LEAD_IN_LEN]);
        // control, length, address, lead-in, 3 chunks
        let lens: std::vec::Vec<usize> = sim.log.iter().map(|r| r.len).collect();
        assert_eq!(lens, [2, 2, 4, 12, 1024, 1024, 452]);
        assert_eq!(&sim.memory[0x1000..0x1000 + 2500], &data[..]);
    }

    #[test]
    fn test_memory_length_bounds() {
        let mut bus = ready_link(SimNwp::new());
        assert_eq!(bus.write_memory(0, &[]), Err(LinkError::InvalidParameter));
        let big = std::vec![0u8; 70_000];
        assert_eq!(bus.write_memory(0, &big), Err(LinkError::InvalidParameter));
        assert!(bus.hal().log.is_empty());
    }

    #[test]
    fn test_empty_frame_sends_descriptor_only() {
        let mut bus = ready_link(SimNwp::new());
        let descriptor = FrameDescriptor::new(0x07, 1, 0).unwrap();
        bus.write_frame(descriptor, &[]).unwrap();

        let sim = bus.hal();
        let lens: std::vec::Vec<usize> = sim.log.iter().map(|r| r.len).collect();
        assert_eq!(lens, [2, 2, DESCRIPTOR_LEN]);
        assert_eq!(sim.inbound.len(), 1);
        assert!(sim.inbound[0].payload.is_empty());
    }

    #[test]
    fn test_frame_payload_is_padded_on_wire() {
        let mut bus = ready_link(SimNwp::new());
        let payload = [1u8, 2, 3, 4, 5];
        let descriptor = FrameDescriptor::new(0x11, 2, payload.len()).unwrap();
        bus.write_frame(descriptor, &payload).unwrap();

        let sim = bus.hal();
        let wire: std::vec::Vec<u8> = sim.log[3..]
            .iter()
            .flat_map(|r| r.tx.clone().unwrap_or_default())
            .collect();
        assert_eq!(wire, [1u8, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(sim.inbound[0].payload, payload);
        assert_eq!(sim.inbound[0].descriptor, descriptor);
        assert_released(&bus);
    }

    #[test]
    fn test_aligned_frame_has_no_pad_leg() {
        let mut bus = ready_link(SimNwp::new());
        let payload = [7u8; 8];
        bus.write_frame(FrameDescriptor::new(0x11, 0, 8).unwrap(), &payload).unwrap();
        let lens: std::vec::Vec<usize> = bus.hal().log.iter().map(|r| r.len).collect();
        assert_eq!(lens, [2, 2, DESCRIPTOR_LEN, 8]);
    }

    #[test]
    fn test_frame_write_larger_than_receive_buffer() {
        let mut bus = ready_link(SimNwp::new());
        let payload: std::vec::Vec<u8> = (0..3_001u32).map(|i| i as u8).collect();
        let descriptor = FrameDescriptor::new(0x12, 0, payload.len()).unwrap();
        bus.write_frame(descriptor, &payload).unwrap();

        let sim = bus.hal();
        assert_eq!(sim.inbound[0].payload, payload);
        assert_eq!(sim.log.last().map(|r| r.len), Some(3));
        assert_released(&bus);
    }

    #[test]
    fn test_frame_descriptor_must_match_payload() {
        let mut bus = ready_link(SimNwp::new());
        let descriptor = FrameDescriptor::new(0x11, 0, 3).unwrap();
        assert_eq!(bus.write_frame(descriptor, &[1, 2]), Err(LinkError::InvalidParameter));
        assert!(bus.hal().log.is_empty());
    }

    #[test]
    fn test_frame_loopback_round_trip() {
        let mut sim = SimNwp::new();
        sim.loopback = true;
        let mut bus = ready_link(sim);

        let payload = *b"hello nwp";
        let descriptor = FrameDescriptor::new(0x42, 3, payload.len()).unwrap();
        bus.write_frame(descriptor, &payload).unwrap();

        let frame = bus.read_frame().unwrap();
        assert_eq!(frame.descriptor, descriptor);
        assert_eq!(&frame.payload[..], &payload[..]);
        assert_released(&bus);
    }

    #[test]
    fn test_read_frame_skips_dummy_bytes() {
        let mut sim = SimNwp::new();
        sim.push_outbound(0x30, 0, 3, &[9, 8, 7, 6, 5, 4]);
        let mut bus = ready_link(sim);

        let frame = bus.read_frame().unwrap();
        assert_eq!(frame.descriptor.skip, 3);
        assert_eq!(&frame.payload[..], &[9, 8, 7, 6, 5, 4]);

        let sim = bus.hal();
        let tail: std::vec::Vec<(usize, bool)> = sim
            .log
            .iter()
            .rev()
            .take(2)
            .map(|r| (r.len, r.rx.is_some()))
            .collect();
        // discard leg then 8-byte aligned payload leg
        assert_eq!(tail, [(8, true), (3, false)]);
    }

    #[test]
    fn test_read_frame_with_empty_payload() {
        let mut sim = SimNwp::new();
        sim.push_outbound(0x31, 0, 0, &[]);
        let mut bus = ready_link(sim);
        let frame = bus.read_frame().unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(bus.hal().log.last().map(|r| r.len), Some(DESCRIPTOR_LEN));
    }

    #[test]
    fn test_oversized_frame_fails_and_releases_select() {
        let mut sim = SimNwp::new();
        sim.push_outbound(0x30, 0, 0, &std::vec![0xAB; MAX_FRAME_PAYLOAD + 1]);
        let mut bus = ready_link(sim);

        assert_eq!(bus.read_frame().map(|_| ()), Err(LinkError::NoMoreResource));
        assert_eq!(bus.state(), LinkState::Ready);
        assert_released(&bus);
    }

    #[test]
    fn test_interrupt_status_reports_pending_frame() {
        let mut sim = SimNwp::new();
        sim.push_outbound(0x30, 0, 0, &[1]);
        let mut bus = ready_link(sim);
        assert_eq!(bus.read_interrupt_status(), Ok(INT_FRAME_PENDING));
    }

    #[test]
    fn test_interrupt_status_retries_busy_reads() {
        let mut bus = BusLink::new(SimNwp::new(), quick_config());
        bus.init().unwrap();
        bus.hal_mut().stalled_reads = 2;
        bus.hal_mut().registers[INT_STATUS_REG as usize] = 0x0080;

        assert_eq!(bus.read_interrupt_status(), Ok(0x0080));
        assert_eq!(bus.stats().token_timeouts, 2);
    }

    #[test]
    fn test_interrupt_status_times_out() {
        let mut bus = BusLink::new(SimNwp::new(), quick_config());
        bus.init().unwrap();
        bus.hal_mut().stalled_reads = u32::MAX;

        assert_eq!(bus.read_interrupt_status(), Err(LinkError::Timeout));
        assert_eq!(bus.state(), LinkState::Ready);
        assert_released(&bus);
    }

    #[test]
    fn test_config_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.bringup_timeout_ms, 10);
        assert_eq!(config.start_token_timeout_ms, 10_000);
        assert_eq!(config.interrupt_poll_timeout_ms, 1_000);
    }
}
