use super::{drain, Drain, Staleness};
use crate::bitstream::BitStream;
use crate::bus::StateFieldBus;
use crate::error::ConfigResult;
use crate::field::WritableField;
use crate::mission::DeviceHealth;
use crate::scheduler::ControlTask;
use crate::serializer::{EnumSerializer, IntegerSerializer, Serializer, VectorSerializer};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, warn};

/// GPS time: week number, time of week in milliseconds and a nanosecond
/// correction in `[-500000, 500000]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpsTime {
    pub wn: u16,
    pub tow: u32,
    pub ns: i32,
}

/// 68 bits: week 16, time of week 32, nanoseconds 20.
#[derive(Debug, Clone, Copy)]
pub struct GpsTimeSerializer {
    wn: IntegerSerializer<u16>,
    tow: IntegerSerializer<u32>,
    ns: IntegerSerializer<i32>,
}

impl GpsTimeSerializer {
    pub fn new() -> ConfigResult<Self> {
        Ok(Self {
            wn: IntegerSerializer::full_range(),
            tow: IntegerSerializer::full_range(),
            ns: IntegerSerializer::new(-500_000, 500_000)?,
        })
    }
}

impl Serializer<GpsTime> for GpsTimeSerializer {
    fn bit_width(&self) -> usize {
        self.wn.bit_width() + self.tow.bit_width() + self.ns.bit_width()
    }

    fn pack(&self, value: &GpsTime, stream: &mut BitStream<'_>) {
        self.wn.pack(&value.wn, stream);
        self.tow.pack(&value.tow, stream);
        self.ns.pack(&value.ns, stream);
    }

    fn unpack(&self, stream: &mut BitStream<'_>) -> GpsTime {
        GpsTime {
            wn: self.wn.unpack(stream),
            tow: self.tow.unpack(stream),
            ns: self.ns.unpack(stream),
        }
    }
}

/// Decoded receiver output, one variant per message the driver forwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GpsMessage {
    Time(GpsTime),
    Position { ecef: [f64; 3], tow: u32, nsats: u8 },
    Velocity { ecef: [f64; 3], tow: u32 },
    Heartbeat { healthy: bool },
}

pub struct GpsMonitor {
    rx: Receiver<GpsMessage>,
    time: WritableField<GpsTime>,
    pos: WritableField<[f64; 3]>,
    vel: WritableField<[f64; 3]>,
    nsats: WritableField<u8>,
    health: WritableField<DeviceHealth>,
    staleness: Staleness,
}

impl GpsMonitor {
    pub fn new(
        bus: &mut StateFieldBus,
        rx: Receiver<GpsMessage>,
        stale_cycles: u32,
    ) -> ConfigResult<Self> {
        Ok(Self {
            rx,
            time: bus.register_readable("piksi.time", GpsTime::default(), GpsTimeSerializer::new()?)?,
            pos: bus.register_readable(
                "piksi.pos",
                [0.0; 3],
                VectorSerializer::<f64, 3>::new(-1.0e7, 1.0e7, 32)?,
            )?,
            vel: bus.register_readable(
                "piksi.vel",
                [0.0; 3],
                VectorSerializer::<f64, 3>::new(-1.0e4, 1.0e4, 24)?,
            )?,
            nsats: bus.register_readable("piksi.nsats", 0u8, IntegerSerializer::<u8>::new(0, 32)?)?,
            health: bus.register_readable(
                "piksi.functional",
                DeviceHealth::Unknown,
                EnumSerializer::new(),
            )?,
            staleness: Staleness::new(stale_cycles),
        })
    }

    /// Health follows the receiver's heartbeat only; solutions never
    /// override a reported fault.
    fn handle(&mut self, message: GpsMessage) {
        match message {
            GpsMessage::Time(time) => self.time.set(time),
            GpsMessage::Position { ecef, nsats, .. } => {
                self.pos.set(ecef);
                self.nsats.set(nsats);
            }
            GpsMessage::Velocity { ecef, .. } => self.vel.set(ecef),
            GpsMessage::Heartbeat { healthy } => self.health.set(if healthy {
                DeviceHealth::Functional
            } else {
                DeviceHealth::Faulted
            }),
        }
    }
}

impl ControlTask for GpsMonitor {
    fn name(&self) -> &'static str {
        "gps_monitor"
    }

    fn execute(&mut self) {
        let mut batch: heapless::Vec<GpsMessage, 32> = heapless::Vec::new();
        let outcome = drain(&mut self.rx, |message| {
            if batch.is_full() {
                batch.remove(0);
            }
            let _ = batch.push(message);
        });

        match outcome {
            Drain::Received(_) => {
                self.staleness.heard();
                for message in batch {
                    self.handle(message);
                }
            }
            Drain::Empty | Drain::Disconnected => {
                if outcome == Drain::Disconnected {
                    debug!("GPS queue disconnected");
                }
                if self.staleness.silent() {
                    warn!("GPS silent, health unknown");
                    self.health.set(DeviceHealth::Unknown);
                }
            }
        }
    }
}
