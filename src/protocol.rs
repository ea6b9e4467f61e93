//! Uplink command packets.
//!
//! A packet is a run of `[index][value]` entries. `index` is the 1-based
//! position of the target among the bus's ground-writable fields, in
//! `bits_for(count)` bits; `value` is the field's compact representation.
//! An index of zero, or fewer bits left than an index needs, ends the
//! packet. Packets are validated as a whole before any write is applied.

use crate::bitstream::{bits_for, BitStream, SeekFrom};
use crate::bus::StateFieldBus;
use crate::error::{ConfigError, ConfigResult, UplinkError};
use crate::field::{AnyWritableField, WritableField};
use crate::scheduler::ControlTask;
use crate::serializer::IntegerSerializer;
use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{error::TryRecvError, Receiver};
use tracing::{debug, info, warn};

pub const MAX_UPLINK_PACKET_BYTES: usize = 70;
pub const MAX_UPLINK_ENTRIES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplinkPacket {
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

/// Entry that passed validation: target field and the bit where its value
/// starts.
#[derive(Debug, Clone, Copy)]
struct ValidatedEntry {
    field: usize,
    value_offset: usize,
}

/// Index table shared by the flight consumer and the ground encoder.
pub struct UplinkLayout {
    fields: Vec<Arc<dyn AnyWritableField>>,
    index_bits: usize,
}

impl UplinkLayout {
    pub fn new(bus: &StateFieldBus) -> Self {
        let fields = bus.writable_fields();
        let index_bits = bits_for(fields.len() as u64);
        Self { fields, index_bits }
    }

    pub fn index_bits(&self) -> usize {
        self.index_bits
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name())
    }

    /// 1-based wire index of a writable field.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name).map(|i| i + 1)
    }

    fn validate(&self, bytes: &mut [u8]) -> Result<ArrayVec<ValidatedEntry, MAX_UPLINK_ENTRIES>, UplinkError> {
        let mut entries = ArrayVec::new();
        if self.index_bits == 0 {
            return Ok(entries);
        }

        let mut stream = BitStream::new(bytes);
        while stream.remaining_read() >= self.index_bits {
            let index = stream.read(self.index_bits) as usize;
            if index == 0 {
                break;
            }
            let field = self
                .fields
                .get(index - 1)
                .ok_or(UplinkError::UnknownIndex(index))?;

            let needed = field.bit_width();
            let remaining = stream.remaining_read();
            if needed > remaining {
                return Err(UplinkError::Truncated {
                    field: field.name(),
                    needed,
                    remaining,
                });
            }

            entries
                .try_push(ValidatedEntry {
                    field: index - 1,
                    value_offset: stream.read_position(),
                })
                .map_err(|_| UplinkError::TooManyEntries(MAX_UPLINK_ENTRIES))?;
            stream.seek(SeekFrom::Current(needed as isize));
        }
        Ok(entries)
    }

    /// Validates the packet, then applies every entry in order. Returns the
    /// number of field writes. Nothing is written if validation fails.
    pub fn apply(&self, packet: &UplinkPacket) -> Result<usize, UplinkError> {
        if packet.bytes.len() > MAX_UPLINK_PACKET_BYTES {
            return Err(UplinkError::Oversized {
                len: packet.bytes.len(),
                max: MAX_UPLINK_PACKET_BYTES,
            });
        }

        let mut bytes = packet.bytes.clone();
        let entries = self.validate(&mut bytes)?;

        let mut stream = BitStream::new(&mut bytes);
        for entry in &entries {
            stream.seek(SeekFrom::Start(entry.value_offset));
            let field = &self.fields[entry.field];
            field.unpack_from(&mut stream);
            debug!(field = field.name(), "uplink write");
        }
        Ok(entries.len())
    }
}

/// Ground-side packet builder. Values are taken from the fields of the bus
/// the layout was built from, so the ground sets them on its mirror bus
/// first and then pushes the names.
pub struct UplinkEncoder<'a> {
    layout: &'a UplinkLayout,
    bytes: Vec<u8>,
    write_bits: usize,
}

impl<'a> UplinkEncoder<'a> {
    pub fn new(layout: &'a UplinkLayout) -> Self {
        Self {
            layout,
            bytes: vec![0u8; MAX_UPLINK_PACKET_BYTES],
            write_bits: 0,
        }
    }

    pub fn push(&mut self, name: &str) -> ConfigResult<()> {
        let index = self
            .layout
            .index_of(name)
            .ok_or_else(|| ConfigError::NotWritable(name.to_string()))?;
        let field = &self.layout.fields[index - 1];

        let needed = self.layout.index_bits + field.bit_width();
        if self.write_bits + needed > MAX_UPLINK_PACKET_BYTES * 8 {
            return Err(ConfigError::Invalid(format!(
                "uplink packet full, cannot add `{name}`"
            )));
        }

        let mut stream = BitStream::new(&mut self.bytes);
        stream.seek_write(SeekFrom::Start(self.write_bits));
        stream.write(index as u64, self.layout.index_bits);
        field.pack_into(&mut stream);
        self.write_bits = stream.write_position();
        Ok(())
    }

    /// Trims the packet to whole bytes; trailing zero bits read as the end
    /// marker.
    pub fn finish(mut self) -> UplinkPacket {
        self.bytes.truncate(self.write_bits.div_ceil(8));
        UplinkPacket { bytes: self.bytes }
    }
}

/// Drains the uplink queue and applies well-formed packets.
pub struct UplinkConsumer {
    layout: UplinkLayout,
    rx: Receiver<UplinkPacket>,
    max_packets_per_cycle: usize,
    accepted: WritableField<u32>,
    rejected: WritableField<u32>,
}

impl UplinkConsumer {
    /// Must be constructed after every ground-writable field is registered.
    pub fn new(
        bus: &mut StateFieldBus,
        rx: Receiver<UplinkPacket>,
        max_packets_per_cycle: usize,
    ) -> ConfigResult<Self> {
        let accepted = bus.register_readable(
            "uplink.accepted",
            0u32,
            IntegerSerializer::<u32>::new(0, u32::from(u16::MAX))?,
        )?;
        let rejected = bus.register_readable(
            "uplink.rejected",
            0u32,
            IntegerSerializer::<u32>::new(0, u32::from(u16::MAX))?,
        )?;

        Ok(Self {
            layout: UplinkLayout::new(bus),
            rx,
            max_packets_per_cycle: max_packets_per_cycle.max(1),
            accepted,
            rejected,
        })
    }

    pub fn layout(&self) -> &UplinkLayout {
        &self.layout
    }
}

impl ControlTask for UplinkConsumer {
    fn name(&self) -> &'static str {
        "uplink_consumer"
    }

    fn execute(&mut self) {
        for _ in 0..self.max_packets_per_cycle {
            let packet = match self.rx.try_recv() {
                Ok(packet) => packet,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };

            match self.layout.apply(&packet) {
                Ok(writes) => {
                    info!(writes, "uplink packet applied");
                    self.accepted.update(|n| *n = n.saturating_add(1));
                }
                Err(error) => {
                    warn!(%error, "uplink packet rejected");
                    self.rejected.update(|n| *n = n.saturating_add(1));
                }
            }
        }
    }
}
