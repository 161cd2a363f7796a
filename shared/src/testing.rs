//! Simulated network processor for exercising the bus protocol.
//!
//! [`SimNwp`] implements [`LinkHal`](crate::traits::LinkHal) and answers the
//! host the way the peer firmware does: it acknowledges control words from a
//! script, produces start tokens, keeps a register file and a flat memory,
//! and accepts and serves frames. Time is virtual, so protocol timeouts run
//! instantly.
//!
//! ```ignore
//! use nwp_shared::bus::{BusConfig, BusLink};
//! use nwp_shared::testing::SimNwp;
//!
//! let mut sim = SimNwp::new();
//! sim.loopback = true;
//! let mut bus = BusLink::new(sim, BusConfig::default());
//! bus.init().unwrap();
//! bus.write_register(0x10, nwp_shared::RegisterWidth::Byte, 0x42).unwrap();
//! assert_eq!(bus.hal().registers[0x10], 0x42);
//! ```

use std::collections::VecDeque;
use std::time::Duration;
use std::vec::Vec;

use crate::protocol::{
    align4, ControlWord, FrameDescriptor, Opcode, RegisterWidth, ACK_SUCCESS, DESCRIPTOR_LEN,
    INIT_CONTROL_WORD, INT_FRAME_PENDING, INT_STATUS_REG, MEMORY_CHUNK_SIZE, MEMORY_LEAD_IN_LEN,
    START_TOKEN,
};
use crate::traits::{Clock, SelectLine, Transfer};

/// Size of the simulated memory
pub const SIM_MEMORY_LEN: usize = 64 * 1024;

/// Injected transfer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimFault;

/// One call to `transfer`, as seen by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Bytes the host clocked out, `None` for filler
    pub tx: Option<Vec<u8>>,
    /// Bytes returned to the host, `None` if the host discarded them
    pub rx: Option<Vec<u8>>,
    pub len: usize,
    /// Whether the selection line was asserted during the transfer
    pub selected: bool,
}

/// A frame the host wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub descriptor: FrameDescriptor,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Control,
    Length { op: Opcode, reg: u8, width: RegisterWidth },
    Address { op: Opcode, len: usize },
    Token { op: Opcode, reg: u8, width: RegisterWidth, addr: usize },
    Data { op: Opcode, reg: u8, width: RegisterWidth, addr: usize, len: usize, leg: usize },
    Done,
}

/// Scripted network processor
#[derive(Debug)]
pub struct SimNwp {
    /// Virtual time in microseconds
    pub time_us: u64,
    /// Virtual time consumed per byte transferred
    pub byte_time_us: u64,
    /// Virtual time consumed per `relax()` call
    pub relax_us: u64,

    pub asserts: u32,
    pub deasserts: u32,
    selected: bool,

    /// Every transfer, in order
    pub log: Vec<TransferRecord>,

    /// Acknowledge bytes for upcoming control words; empty means success
    pub acks: VecDeque<u8>,
    /// Filler bytes produced before each start token
    pub token_delay: u32,
    /// Number of upcoming read transactions that never produce a start token
    pub stalled_reads: u32,
    /// Index into `log` at which `transfer` fails
    pub fail_at: Option<usize>,

    pub registers: [u16; 256],
    pub memory: Vec<u8>,
    /// Length of every memory-write lead-in leg seen
    pub lead_ins: Vec<usize>,

    /// Frames written by the host
    pub inbound: Vec<ReceivedFrame>,
    /// Wire images waiting to be read by the host
    pub outbound: VecDeque<Vec<u8>>,
    /// Queue every written frame for reading back
    pub loopback: bool,

    phase: Phase,
    token_countdown: u32,
    serving: Vec<u8>,
    serve_pos: usize,
    pending_descriptor: Option<FrameDescriptor>,
}

impl SimNwp {
    pub fn new() -> Self {
        Self {
            time_us: 0,
            byte_time_us: 1,
            relax_us: 100,
            asserts: 0,
            deasserts: 0,
            selected: false,
            log: Vec::new(),
            acks: VecDeque::new(),
            token_delay: 0,
            stalled_reads: 0,
            fail_at: None,
            registers: [0; 256],
            memory: vec![0; SIM_MEMORY_LEN],
            lead_ins: Vec::new(),
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            loopback: false,
            phase: Phase::Done,
            token_countdown: 0,
            serving: Vec::new(),
            serve_pos: 0,
            pending_descriptor: None,
        }
    }

    /// Whether the selection line is currently asserted
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Queue a frame for the host to read
    pub fn push_outbound(&mut self, frame_type: u8, queue: u8, skip: u8, payload: &[u8]) {
        let mut descriptor = FrameDescriptor {
            frame_type,
            queue: queue & 0x0F,
            skip: skip & 0x0F,
            total_len: (DESCRIPTOR_LEN + payload.len()) as u16,
        };
        if payload.is_empty() {
            descriptor.skip = 0;
        }
        self.outbound.push_back(wire_image(&descriptor, payload));
    }

    /// Control words the host sent, in order, including repeats
    pub fn control_words(&self) -> Vec<u32> {
        self.log
            .iter()
            .filter_map(|rec| {
                let tx = rec.tx.as_ref()?;
                match (rec.len, rec.rx.is_some()) {
                    (4, true) => Some(u32::from_le_bytes([tx[0], tx[1], tx[2], tx[3]])),
                    (2, true) => Some(u16::from_le_bytes([tx[0], tx[1]]) as u32),
                    _ => None,
                }
            })
            .collect()
    }

    fn register_value(&self, reg: u8) -> u16 {
        let mut value = self.registers[reg as usize];
        if reg == INT_STATUS_REG && !self.outbound.is_empty() {
            value |= INT_FRAME_PENDING;
        }
        value
    }

    fn step(&mut self, tx: Option<&[u8]>, rx: &mut [u8], len: usize) {
        match self.phase {
            Phase::Control => self.on_control(tx, rx, len),
            Phase::Length { op, reg, width } => {
                let len = tx.map_or(0, |tx| u16::from_le_bytes([tx[0], tx[1]]) as usize);
                self.phase = match op {
                    Opcode::MemoryRead | Opcode::MemoryWrite => Phase::Address { op, len },
                    Opcode::RegisterRead | Opcode::FrameRead => self.token_phase(op, reg, width, 0),
                    Opcode::RegisterWrite | Opcode::FrameWrite => Phase::Data {
                        op,
                        reg,
                        width,
                        addr: 0,
                        len,
                        leg: 0,
                    },
                };
            }
            Phase::Address { op, len } => {
                let addr = tx.map_or(0, |tx| u32::from_le_bytes([tx[0], tx[1], tx[2], tx[3]]));
                let addr = addr as usize;
                self.phase = match op {
                    Opcode::MemoryRead => self.token_phase(op, 0, RegisterWidth::Byte, addr),
                    _ => Phase::Data {
                        op,
                        reg: 0,
                        width: RegisterWidth::Byte,
                        addr,
                        len,
                        leg: 0,
                    },
                };
            }
            Phase::Token { op, reg, width, addr } => {
                if self.stalled_reads > 0 || self.token_countdown > 0 {
                    self.token_countdown = self.token_countdown.saturating_sub(1);
                    rx[0] = 0x00;
                } else {
                    rx[0] = START_TOKEN;
                    self.phase = Phase::Data {
                        op,
                        reg,
                        width,
                        addr,
                        len: 0,
                        leg: 0,
                    };
                }
            }
            Phase::Data { .. } => self.on_data(tx, rx, len),
            Phase::Done => {}
        }
    }

    fn token_phase(&mut self, op: Opcode, reg: u8, width: RegisterWidth, addr: usize) -> Phase {
        self.token_countdown = self.token_delay;
        Phase::Token { op, reg, width, addr }
    }

    fn on_control(&mut self, tx: Option<&[u8]>, rx: &mut [u8], len: usize) {
        let Some(tx) = tx else { return };
        let ack = self.acks.pop_front().unwrap_or(ACK_SUCCESS);
        if len > 0 {
            rx[len - 1] = ack;
        }
        if ack != ACK_SUCCESS {
            if ack == crate::protocol::ACK_FAIL {
                self.phase = Phase::Done;
            }
            return;
        }

        if len == 4 {
            let word = u32::from_le_bytes([tx[0], tx[1], tx[2], tx[3]]);
            if word == INIT_CONTROL_WORD {
                self.phase = Phase::Done;
            }
            return;
        }

        let raw = u16::from_le_bytes([tx[0], tx[1]]);
        self.phase = match ControlWord::parse(raw) {
            Some((op, reg, width)) => Phase::Length { op, reg, width },
            None => Phase::Done,
        };
    }

    fn on_data(&mut self, tx: Option<&[u8]>, rx: &mut [u8], len: usize) {
        let Phase::Data {
            op,
            reg,
            width,
            addr,
            len: declared,
            leg,
        } = self.phase
        else {
            return;
        };

        match op {
            Opcode::RegisterRead => {
                let bytes = self.register_value(reg).to_le_bytes();
                let n = len.min(width.len());
                rx[..n].copy_from_slice(&bytes[..n]);
                self.phase = Phase::Done;
            }
            Opcode::RegisterWrite => {
                if let Some(tx) = tx {
                    let value = match width {
                        RegisterWidth::Byte => tx[0] as u16,
                        RegisterWidth::Word => u16::from_le_bytes([tx[0], tx[1]]),
                    };
                    if reg == INT_STATUS_REG {
                        self.registers[reg as usize] &= !value;
                    } else {
                        self.registers[reg as usize] = value;
                    }
                }
                self.phase = Phase::Done;
            }
            Opcode::MemoryRead => {
                let end = (addr + len).min(self.memory.len());
                let n = end.saturating_sub(addr);
                rx[..n].copy_from_slice(&self.memory[addr..end]);
                self.phase = Phase::Done;
            }
            Opcode::MemoryWrite => {
                let Some(tx) = tx else { return };
                let mut next_addr = addr;
                if leg == 0 && declared > MEMORY_CHUNK_SIZE && len == MEMORY_LEAD_IN_LEN {
                    self.lead_ins.push(len);
                } else {
                    let end = (addr + len).min(self.memory.len());
                    let n = end.saturating_sub(addr);
                    self.memory[addr..end].copy_from_slice(&tx[..n]);
                    next_addr = addr + len;
                }
                self.phase = Phase::Data {
                    op,
                    reg,
                    width,
                    addr: next_addr,
                    len: declared,
                    leg: leg + 1,
                };
            }
            Opcode::FrameWrite => {
                let Some(tx) = tx else { return };
                match self.pending_descriptor.take() {
                    None => {
                        let descriptor =
                            FrameDescriptor::from_bytes([tx[0], tx[1], tx[2], tx[3]]);
                        if descriptor.payload_len() == 0 {
                            self.accept_frame(descriptor, Vec::new());
                        } else {
                            self.pending_descriptor = Some(descriptor);
                        }
                    }
                    Some(descriptor) => {
                        let n = descriptor.payload_len().min(tx.len());
                        self.accept_frame(descriptor, tx[..n].to_vec());
                    }
                }
            }
            Opcode::FrameRead => {
                if leg == 0 {
                    self.serving = self.outbound.pop_front().unwrap_or_else(|| {
                        wire_image(&FrameDescriptor::default(), &[])
                    });
                    self.serve_pos = 0;
                }
                let end = (self.serve_pos + len).min(self.serving.len());
                let n = end - self.serve_pos;
                rx[..n].copy_from_slice(&self.serving[self.serve_pos..end]);
                self.serve_pos = end;
                self.phase = Phase::Data {
                    op,
                    reg,
                    width,
                    addr,
                    len: declared,
                    leg: leg + 1,
                };
            }
        }
    }

    fn accept_frame(&mut self, descriptor: FrameDescriptor, payload: Vec<u8>) {
        if self.loopback {
            self.outbound.push_back(wire_image(&descriptor, &payload));
        }
        self.inbound.push(ReceivedFrame { descriptor, payload });
        self.phase = Phase::Done;
    }
}

impl Default for SimNwp {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor, `skip` dummy bytes, then the payload padded to four bytes
fn wire_image(descriptor: &FrameDescriptor, payload: &[u8]) -> Vec<u8> {
    let mut image = descriptor.to_bytes().to_vec();
    image.extend(core::iter::repeat(0xEE).take(descriptor.skip as usize));
    image.extend_from_slice(payload);
    image.resize(DESCRIPTOR_LEN + descriptor.skip as usize + align4(payload.len()), 0);
    image
}

impl Transfer for SimNwp {
    type Error = SimFault;

    fn transfer(
        &mut self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<(), Self::Error> {
        if self.fail_at == Some(self.log.len()) {
            return Err(SimFault);
        }
        self.time_us += self.byte_time_us * len as u64;

        let mut reply = vec![0u8; len];
        if self.selected {
            self.step(tx.map(|tx| &tx[..len]), &mut reply, len);
        }

        let returned = match rx {
            Some(rx) => {
                rx[..len].copy_from_slice(&reply);
                Some(reply)
            }
            None => None,
        };
        self.log.push(TransferRecord {
            tx: tx.map(|tx| tx[..len].to_vec()),
            rx: returned,
            len,
            selected: self.selected,
        });
        Ok(())
    }
}

impl SelectLine for SimNwp {
    fn assert_select(&mut self) {
        self.asserts += 1;
        self.selected = true;
        self.phase = Phase::Control;
        self.pending_descriptor = None;
    }

    fn deassert_select(&mut self) {
        self.deasserts += 1;
        self.selected = false;
        if let Phase::Token { .. } = self.phase {
            self.stalled_reads = self.stalled_reads.saturating_sub(1);
        }
        self.phase = Phase::Done;
    }
}

impl Clock for SimNwp {
    type Instant = u64;

    fn now(&self) -> u64 {
        self.time_us
    }

    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_micros(self.time_us.saturating_sub(since))
    }

    fn relax(&mut self) {
        self.time_us += self.relax_us;
    }
}
