use crate::bus::StateFieldBus;
use crate::clock::Clock;
use crate::config::FlightConfig;
use crate::console::DebugConsole;
use crate::error::FlightError;
use crate::mission::MissionStatus;
use crate::persistence::{MemoryStore, PersistentStore};
use crate::protocol::{UplinkConsumer, UplinkPacket};
use crate::scheduler::{CycleProfile, CyclicScheduler, SchedulerBuilder, SchedulerStats};
use crate::supervisor::{MissionContext, MissionSupervisor};
use crate::tasks::{device_queue, AdcsMonitor, AdcsReading, ClockManager, GpsMessage, GpsMonitor};
use crate::telemetry::{DownlinkFrame, DownlinkProducer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::info;

const CONSOLE_QUEUE_DEPTH: usize = 16;

/// Queue endpoints handed to the I/O threads.
#[derive(Debug)]
pub struct DeviceLinks {
    pub adcs: Sender<AdcsReading>,
    pub gps: Sender<GpsMessage>,
    pub uplink: Sender<UplinkPacket>,
    pub downlink: Receiver<DownlinkFrame>,
    pub console_requests: Sender<String>,
    pub console_responses: Receiver<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveState {
    pub profile: String,
    pub cycles: u64,
    pub status: MissionStatus,
    pub boot_count: u8,
    pub scheduler: SchedulerStats,
}

/// Fully wired flight software: every task constructed against one bus,
/// the bus sealed, and the scheduler ready to run.
pub struct FlightExecutive<C: Clock> {
    bus: StateFieldBus,
    ctx: Arc<MissionContext>,
    scheduler: CyclicScheduler<C>,
    profile: CycleProfile,
}

impl<C: Clock + Clone + 'static> FlightExecutive<C> {
    /// Builds with the cadence selected at compile time.
    pub fn new(
        config: &FlightConfig,
        store: Box<dyn PersistentStore>,
        clock: C,
    ) -> Result<(Self, DeviceLinks), FlightError> {
        Self::with_profile(config, store, clock, CycleProfile::active())
    }

    /// Runs the whole registration pass. Any configuration error aborts
    /// here, before the first cycle.
    pub fn with_profile(
        config: &FlightConfig,
        store: Box<dyn PersistentStore>,
        clock: C,
        profile: CycleProfile,
    ) -> Result<(Self, DeviceLinks), FlightError> {
        Self::assemble(config, store, clock, profile, StateFieldBus::new())
    }

    /// Same registrations on a ground mirror bus, so downlink frames from
    /// the flight side decode into it. The mirror is never meant to run.
    pub fn ground_mirror(
        config: &FlightConfig,
        clock: C,
        profile: CycleProfile,
    ) -> Result<Self, FlightError> {
        let store = Box::new(MemoryStore::new());
        Self::assemble(config, store, clock, profile, StateFieldBus::ground_mirror())
            .map(|(executive, _links)| executive)
    }

    fn assemble(
        config: &FlightConfig,
        store: Box<dyn PersistentStore>,
        clock: C,
        profile: CycleProfile,
        mut bus: StateFieldBus,
    ) -> Result<(Self, DeviceLinks), FlightError> {
        config.validate()?;
        let offsets = profile.offsets;
        let mut builder = SchedulerBuilder::from_profile(&mut bus, &profile)?;

        let clock_manager = ClockManager::new(&mut bus, clock.clone())?;
        let ctx = MissionContext::new(&mut bus, store)?;

        let (adcs_tx, adcs_rx) = device_queue(config.devices.queue_depth);
        let (gps_tx, gps_rx) = device_queue(config.devices.queue_depth);
        let adcs = AdcsMonitor::new(&mut bus, adcs_rx, config.devices.stale_cycles)?;
        let gps = GpsMonitor::new(&mut bus, gps_rx, config.devices.stale_cycles)?;

        let supervisor = MissionSupervisor::new(
            &mut bus,
            Arc::clone(&ctx),
            config.supervisor.clone(),
            profile.cycle_us,
        )?;

        let (uplink_tx, uplink_rx) = device_queue(config.uplink.queue_depth);
        let uplink = UplinkConsumer::new(&mut bus, uplink_rx, config.uplink.max_packets_per_cycle)?;

        let (downlink_tx, downlink_rx) = device_queue(config.downlink.queue_depth);
        let downlink = DownlinkProducer::new(&mut bus, downlink_tx, config.downlink.period_cycles)?;

        let (console_req_tx, console_req_rx) = device_queue(CONSOLE_QUEUE_DEPTH);
        let (console_resp_tx, console_resp_rx) = device_queue(CONSOLE_QUEUE_DEPTH);
        let console = DebugConsole::new(&bus, console_req_rx, console_resp_tx);

        builder.add_task(offsets.clock_manager, Box::new(clock_manager));
        builder.add_task(offsets.adcs_monitor, Box::new(adcs));
        builder.add_task(offsets.gps_monitor, Box::new(gps));
        builder.add_task(offsets.debug_console, Box::new(console));
        builder.add_task(offsets.mission_manager, Box::new(supervisor));
        builder.add_task(offsets.uplink_consumer, Box::new(uplink));
        builder.add_task(offsets.downlink_producer, Box::new(downlink));
        let scheduler = builder.build(&mut bus, clock)?;

        info!(
            profile = profile.name,
            mirror = bus.is_mirror(),
            cycle_us = profile.cycle_us,
            fields = bus.len(),
            telemetry_bits = bus.telemetry_bits(),
            "flight executive ready"
        );

        let links = DeviceLinks {
            adcs: adcs_tx,
            gps: gps_tx,
            uplink: uplink_tx,
            downlink: downlink_rx,
            console_requests: console_req_tx,
            console_responses: console_resp_rx,
        };
        Ok((
            Self {
                bus,
                ctx,
                scheduler,
                profile,
            },
            links,
        ))
    }
}

impl<C: Clock> FlightExecutive<C> {
    pub fn run_cycle(&mut self) {
        self.scheduler.run_cycle();
    }

    pub fn run(&mut self, cycles: u64) {
        self.scheduler.run(cycles);
    }

    /// Sealed bus; lookups still work for ground tooling and tests.
    pub fn bus(&self) -> &StateFieldBus {
        &self.bus
    }

    pub fn context(&self) -> &Arc<MissionContext> {
        &self.ctx
    }

    pub fn scheduler(&self) -> &CyclicScheduler<C> {
        &self.scheduler
    }

    pub fn profile(&self) -> &CycleProfile {
        &self.profile
    }

    pub fn get_state(&self) -> ExecutiveState {
        ExecutiveState {
            profile: self.profile.name.to_string(),
            cycles: self.scheduler.cycle_no(),
            status: self.ctx.status(),
            boot_count: self.ctx.boot_record().boot_count,
            scheduler: self.scheduler.get_stats().clone(),
        }
    }
}
