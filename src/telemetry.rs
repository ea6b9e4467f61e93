//! Downlink framing.
//!
//! A frame is the registration-order concatenation of every downlinked
//! field's compact representation, split into fixed 70-byte packets. Each
//! packet starts with a 32-bit downlink number and an 8-bit packet number.
//! Fields are never split across packets; the tail of each packet is zero.
//! The layout depends only on registrations, so the ground derives the same
//! one from a mirror bus.

use crate::bitstream::{BitStream, SeekFrom};
use crate::bus::StateFieldBus;
use crate::error::{ConfigError, ConfigResult, DownlinkError};
use crate::field::{AnyField, AnyWritableField, WritableField};
use crate::scheduler::ControlTask;
use crate::serializer::IntegerSerializer;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use std::sync::Arc;
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tracing::{debug, warn};

pub const PACKET_SIZE_BYTES: usize = 70;
pub const PACKET_SIZE_BITS: usize = PACKET_SIZE_BYTES * 8;
pub const DOWNLINK_NO_BITS: usize = 32;
pub const PACKET_NO_BITS: usize = 8;
pub const PACKET_HEADER_BITS: usize = DOWNLINK_NO_BITS + PACKET_NO_BITS;
pub const PACKET_PAYLOAD_BITS: usize = PACKET_SIZE_BITS - PACKET_HEADER_BITS;
pub const MAX_PACKETS_PER_FRAME: usize = 1 << PACKET_NO_BITS;

const_assert!(PACKET_HEADER_BITS < PACKET_SIZE_BITS);
const_assert!(PACKET_HEADER_BITS % 8 == 0);

/// Where one field lands in the frame.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSlot {
    pub name: &'static str,
    pub packet: usize,
    /// Bit offset inside the packet, header included.
    pub bit_offset: usize,
    pub bits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkPacket {
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl DownlinkPacket {
    fn header(&self) -> (u32, u8) {
        let mut bytes = self.bytes.clone();
        let mut stream = BitStream::new(&mut bytes);
        let downlink_no = stream.read(DOWNLINK_NO_BITS) as u32;
        let packet_no = stream.read(PACKET_NO_BITS) as u8;
        (downlink_no, packet_no)
    }

    pub fn downlink_no(&self) -> u32 {
        self.header().0
    }

    pub fn packet_no(&self) -> u8 {
        self.header().1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkFrame {
    pub downlink_no: u32,
    pub packets: Vec<DownlinkPacket>,
}

impl DownlinkFrame {
    pub fn len_bytes(&self) -> usize {
        self.packets.iter().map(|p| p.bytes.len()).sum()
    }
}

pub struct DownlinkLayout {
    fields: Vec<Arc<dyn AnyField>>,
    sinks: Option<Vec<Arc<dyn AnyWritableField>>>,
    slots: Vec<FieldSlot>,
    packets: usize,
}

impl DownlinkLayout {
    /// Packs the bus's downlinked fields greedily into packets.
    pub fn new(bus: &StateFieldBus) -> ConfigResult<Self> {
        let fields = bus.telemetry_fields();
        let mut slots = Vec::with_capacity(fields.len());
        let mut packet = 0;
        let mut used = 0;

        for field in &fields {
            let bits = field.bit_width();
            if bits > PACKET_PAYLOAD_BITS {
                return Err(ConfigError::FieldTooWide {
                    name: field.name().to_string(),
                    bits,
                    payload_bits: PACKET_PAYLOAD_BITS,
                });
            }
            if used + bits > PACKET_PAYLOAD_BITS {
                packet += 1;
                used = 0;
            }
            slots.push(FieldSlot {
                name: field.name(),
                packet,
                bit_offset: PACKET_HEADER_BITS + used,
                bits,
            });
            used += bits;
        }

        let packets = packet + 1;
        if packets > MAX_PACKETS_PER_FRAME {
            return Err(ConfigError::Invalid(format!(
                "downlink frame needs {packets} packets, at most {MAX_PACKETS_PER_FRAME} are addressable"
            )));
        }

        Ok(Self {
            fields,
            sinks: bus.mirror_sinks(),
            slots,
            packets,
        })
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn packet_count(&self) -> usize {
        self.packets
    }

    pub fn frame_bytes(&self) -> usize {
        self.packets * PACKET_SIZE_BYTES
    }

    pub fn field_bits(&self) -> usize {
        self.slots.iter().map(|s| s.bits).sum()
    }

    /// Snapshot of every downlinked field. Each field is read under its own
    /// lock; fields are not sampled atomically with respect to each other.
    pub fn encode(&self, downlink_no: u32) -> DownlinkFrame {
        let mut packets: Vec<DownlinkPacket> = (0..self.packets)
            .map(|index| {
                let mut bytes = vec![0u8; PACKET_SIZE_BYTES];
                let mut stream = BitStream::new(&mut bytes);
                stream.write(u64::from(downlink_no), DOWNLINK_NO_BITS);
                stream.write(index as u64, PACKET_NO_BITS);
                DownlinkPacket { bytes }
            })
            .collect();

        for (field, slot) in self.fields.iter().zip(&self.slots) {
            let mut stream = BitStream::new(&mut packets[slot.packet].bytes);
            stream.seek_write(SeekFrom::Start(slot.bit_offset));
            field.pack_into(&mut stream);
        }

        DownlinkFrame {
            downlink_no,
            packets,
        }
    }

    /// Writes a received frame into the ground mirror bus this layout was
    /// built from. Every packet is checked before any field is touched.
    pub fn decode(&self, frame: &DownlinkFrame) -> Result<(), DownlinkError> {
        let sinks = self.sinks.as_ref().ok_or(DownlinkError::NotMirror)?;
        if frame.packets.len() != self.packets {
            return Err(DownlinkError::PacketCount {
                expected: self.packets,
                got: frame.packets.len(),
            });
        }
        for (index, packet) in frame.packets.iter().enumerate() {
            if packet.bytes.len() != PACKET_SIZE_BYTES {
                return Err(DownlinkError::PacketSize {
                    index,
                    len: packet.bytes.len(),
                    expected: PACKET_SIZE_BYTES,
                });
            }
            let (downlink_no, packet_no) = packet.header();
            if downlink_no != frame.downlink_no || usize::from(packet_no) != index {
                return Err(DownlinkError::BadHeader {
                    index,
                    downlink_no,
                    packet_no,
                });
            }
        }

        let mut packets: Vec<Vec<u8>> = frame.packets.iter().map(|p| p.bytes.clone()).collect();
        for (field, slot) in sinks.iter().zip(&self.slots) {
            let mut stream = BitStream::new(&mut packets[slot.packet]);
            stream.seek(SeekFrom::Start(slot.bit_offset));
            field.unpack_from(&mut stream);
        }
        Ok(())
    }
}

/// Last task of the cycle: every `period_cycles` cycles, snapshots the
/// downlinked fields into a frame for the radio thread.
pub struct DownlinkProducer {
    layout: DownlinkLayout,
    tx: Sender<DownlinkFrame>,
    period_cycles: u32,
    countdown: u32,
    downlink_no: u32,
    frames: WritableField<u32>,
    dropped: WritableField<u32>,
}

impl DownlinkProducer {
    /// Must be constructed after every other downlinked field is registered.
    pub fn new(
        bus: &mut StateFieldBus,
        tx: Sender<DownlinkFrame>,
        period_cycles: u32,
    ) -> ConfigResult<Self> {
        let frames = bus.register_readable("downlink.frames", 0u32, IntegerSerializer::<u32>::full_range())?;
        let dropped = bus.register_readable(
            "downlink.dropped",
            0u32,
            IntegerSerializer::<u32>::new(0, u32::from(u16::MAX))?,
        )?;
        let layout = DownlinkLayout::new(bus)?;
        debug!(
            packets = layout.packet_count(),
            field_bits = layout.field_bits(),
            "downlink layout"
        );

        Ok(Self {
            layout,
            tx,
            period_cycles: period_cycles.max(1),
            countdown: 0,
            downlink_no: 0,
            frames,
            dropped,
        })
    }

    pub fn layout(&self) -> &DownlinkLayout {
        &self.layout
    }
}

impl ControlTask for DownlinkProducer {
    fn name(&self) -> &'static str {
        "downlink_producer"
    }

    fn execute(&mut self) {
        if self.countdown > 0 {
            self.countdown -= 1;
            return;
        }
        self.countdown = self.period_cycles - 1;

        let frame = self.layout.encode(self.downlink_no);
        self.downlink_no = self.downlink_no.wrapping_add(1);

        match self.tx.try_send(frame) {
            Ok(()) => self.frames.update(|n| *n = n.wrapping_add(1)),
            Err(TrySendError::Full(frame)) => {
                warn!(downlink_no = frame.downlink_no, "radio queue full, frame dropped");
                self.dropped.update(|n| *n = n.saturating_add(1));
            }
            Err(TrySendError::Closed(_)) => {
                debug!("radio queue closed");
                self.dropped.update(|n| *n = n.saturating_add(1));
            }
        }
    }
}
