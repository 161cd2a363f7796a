//! # Wire Protocol Definitions
//!
//! Control words, acknowledge sentinels and the frame descriptor exchanged
//! with the network processor. Everything on the wire is little-endian.
//!
//! ## Transaction Legs
//!
//! ```text
//! ┌──────────────┬──────────┬───────────┬───────────────┬──────────────┐
//! │ Control word │  Length  │  Address  │  Start token  │  Data phase  │
//! │ 2 or 4 bytes │ 2 bytes  │  4 bytes  │ (reads only)  │   N bytes    │
//! └──────────────┴──────────┴───────────┴───────────────┴──────────────┘
//! ```
//!
//! The acknowledge byte is the last byte clocked in while the control word is
//! clocked out. Only memory transactions carry an address leg.
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────┬─────────────────────┬────────────────┬──────────────────────┐
//! │  Type  │ Skip(4) │ Queue(4)  │  Total length  │  Payload (4-aligned)  │
//! │ 1 byte │       1 byte        │  2 bytes (LE)  │   0..N bytes          │
//! └────────┴─────────────────────┴────────────────┴──────────────────────┘
//! ```
//!
//! `Total length` counts the descriptor plus the logical payload; the wire
//! carries the payload rounded up to a multiple of four.

use heapless::Vec;

/// 32-bit control word that opens the link during bring-up
pub const INIT_CONTROL_WORD: u32 = 0x5A5A_0001;

/// Acknowledge byte meaning the control word was accepted
pub const ACK_SUCCESS: u8 = 0xC3;

/// Acknowledge byte meaning the control word was rejected
pub const ACK_FAIL: u8 = 0x3C;

/// Acknowledge byte the peer drives while it is still processing
pub const ACK_WORKING: u8 = 0x00;

/// Byte the peer drives once read data is ready to be clocked out
pub const START_TOKEN: u8 = 0xF3;

/// Interrupt status register address
pub const INT_STATUS_REG: u8 = 0x04;

/// Interrupt status bit: a frame is waiting to be read
pub const INT_FRAME_PENDING: u16 = 0x0001;

/// Size of the frame descriptor on the wire
pub const DESCRIPTOR_LEN: usize = 4;

/// Largest frame payload the host will buffer
pub const MAX_FRAME_PAYLOAD: usize = 2048;

/// Memory writes above this size are split into chunks of this size
pub const MEMORY_CHUNK_SIZE: usize = 1024;

/// Zero bytes sent ahead of a chunked memory write; the receiving
/// bootloader's DMA descriptor expects exactly this many
pub const MEMORY_LEAD_IN_LEN: usize = 12;

/// Operation classes carried in the low byte of a control word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    RegisterRead = 0x10,
    RegisterWrite = 0x20,
    MemoryRead = 0x30,
    MemoryWrite = 0x40,
    FrameRead = 0x50,
    FrameWrite = 0x60,
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & !OPCODE_WIDE {
            0x10 => Ok(Self::RegisterRead),
            0x20 => Ok(Self::RegisterWrite),
            0x30 => Ok(Self::MemoryRead),
            0x40 => Ok(Self::MemoryWrite),
            0x50 => Ok(Self::FrameRead),
            0x60 => Ok(Self::FrameWrite),
            _ => Err(()),
        }
    }
}

/// Opcode bit selecting a two-byte register access
pub const OPCODE_WIDE: u8 = 0x01;

/// Register access width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterWidth {
    Byte,
    Word,
}

impl RegisterWidth {
    /// Number of data bytes moved by an access of this width
    pub const fn len(self) -> usize {
        match self {
            RegisterWidth::Byte => 1,
            RegisterWidth::Word => 2,
        }
    }
}

/// Opcode exchanged at the start of every bus transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlWord {
    /// The 32-bit bring-up word
    Init,
    /// A 16-bit command word: opcode in the low byte, address in the high byte
    Command(u16),
}

impl ControlWord {
    /// Register access: `opcode | address << 8`, wide bit set for 2 bytes
    pub const fn register(op: Opcode, address: u8, width: RegisterWidth) -> Self {
        let mut code = op as u8;
        if let RegisterWidth::Word = width {
            code |= OPCODE_WIDE;
        }
        ControlWord::Command(code as u16 | (address as u16) << 8)
    }

    /// Memory or frame command without an embedded address
    pub const fn command(op: Opcode) -> Self {
        ControlWord::Command(op as u16)
    }

    /// Decode a 16-bit command word received on the wire
    pub fn parse(raw: u16) -> Option<(Opcode, u8, RegisterWidth)> {
        let [code, address] = raw.to_le_bytes();
        let op = Opcode::try_from(code).ok()?;
        let width = if code & OPCODE_WIDE != 0 {
            RegisterWidth::Word
        } else {
            RegisterWidth::Byte
        };
        Some((op, address, width))
    }

    /// Serialize into `buf`, returning the number of bytes used
    pub fn encode(&self, buf: &mut [u8; 4]) -> usize {
        match self {
            ControlWord::Init => {
                *buf = INIT_CONTROL_WORD.to_le_bytes();
                4
            }
            ControlWord::Command(word) => {
                buf[..2].copy_from_slice(&word.to_le_bytes());
                2
            }
        }
    }
}

/// How the peer answered a control word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    Success,
    Fail,
    /// Anything else: the peer has not finished processing yet
    Pending(u8),
}

impl From<u8> for Ack {
    fn from(value: u8) -> Self {
        match value {
            ACK_SUCCESS => Ack::Success,
            ACK_FAIL => Ack::Fail,
            other => Ack::Pending(other),
        }
    }
}

/// Round a byte count up to the next multiple of four
#[inline]
pub const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Fixed 4-byte header preceding every frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameDescriptor {
    /// Frame type (command, response or event class)
    pub frame_type: u8,
    /// Queue identifier on the peer (4 bits)
    pub queue: u8,
    /// Leading dummy bytes the peer inserts before the payload (4 bits)
    pub skip: u8,
    /// Descriptor plus logical payload length
    pub total_len: u16,
}

impl FrameDescriptor {
    /// Descriptor for a payload of `payload_len` bytes
    ///
    /// Returns `None` if the total length does not fit the 16-bit field.
    pub fn new(frame_type: u8, queue: u8, payload_len: usize) -> Option<Self> {
        let total = DESCRIPTOR_LEN.checked_add(payload_len)?;
        Some(Self {
            frame_type,
            queue: queue & 0x0F,
            skip: 0,
            total_len: u16::try_from(total).ok()?,
        })
    }

    /// Logical (unpadded) payload length announced by the descriptor
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(DESCRIPTOR_LEN)
    }

    /// Payload length as clocked on the wire
    pub fn wire_payload_len(&self) -> usize {
        align4(self.payload_len())
    }

    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_LEN] {
        let [lo, hi] = self.total_len.to_le_bytes();
        [
            self.frame_type,
            (self.queue & 0x0F) | (self.skip & 0x0F) << 4,
            lo,
            hi,
        ]
    }

    pub fn from_bytes(raw: [u8; DESCRIPTOR_LEN]) -> Self {
        Self {
            frame_type: raw[0],
            queue: raw[1] & 0x0F,
            skip: raw[1] >> 4,
            total_len: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }
}

/// A received frame: its descriptor and the logical payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub descriptor: FrameDescriptor,
    pub payload: Vec<u8, MAX_FRAME_PAYLOAD>,
}

impl Frame {
    pub fn frame_type(&self) -> u8 {
        self.descriptor.frame_type
    }
}
