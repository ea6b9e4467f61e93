use super::{drain, Drain, Staleness};
use crate::bus::StateFieldBus;
use crate::error::ConfigResult;
use crate::field::WritableField;
use crate::mission::DeviceHealth;
use crate::scheduler::ControlTask;
use crate::serializer::{EnumSerializer, VectorSerializer};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, warn};

/// Largest body rate component the downlink can represent, rad/s.
pub const MAX_BODY_RATE: f64 = 10.0;

/// Decoded sample from the attitude estimator box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdcsReading {
    pub w_body: [f32; 3],
    pub functional: bool,
}

pub struct AdcsMonitor {
    rx: Receiver<AdcsReading>,
    w_body: WritableField<[f32; 3]>,
    health: WritableField<DeviceHealth>,
    staleness: Staleness,
    received: u64,
}

impl AdcsMonitor {
    pub fn new(
        bus: &mut StateFieldBus,
        rx: Receiver<AdcsReading>,
        stale_cycles: u32,
    ) -> ConfigResult<Self> {
        Ok(Self {
            rx,
            w_body: bus.register_readable(
                "adcs.w_body",
                [0.0f32; 3],
                VectorSerializer::<f32, 3>::new(-MAX_BODY_RATE, MAX_BODY_RATE, 16)?,
            )?,
            health: bus.register_readable(
                "adcs.functional",
                DeviceHealth::Unknown,
                EnumSerializer::new(),
            )?,
            staleness: Staleness::new(stale_cycles),
            received: 0,
        })
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

impl ControlTask for AdcsMonitor {
    fn name(&self) -> &'static str {
        "adcs_monitor"
    }

    fn execute(&mut self) {
        let mut latest = None;
        match drain(&mut self.rx, |reading| latest = Some(reading)) {
            Drain::Received(n) => self.received += n as u64,
            Drain::Empty => {}
            Drain::Disconnected => debug!("ADCS queue disconnected"),
        }

        if let Some(reading) = latest {
            self.staleness.heard();
            self.w_body.set(reading.w_body);
            self.health.set(if reading.functional {
                DeviceHealth::Functional
            } else {
                DeviceHealth::Faulted
            });
        } else if self.staleness.silent() {
            warn!("ADCS silent, health unknown");
            self.health.set(DeviceHealth::Unknown);
        }
    }
}
