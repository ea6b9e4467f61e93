use satcore::config::SupervisorConfig;
use satcore::fault::FaultKind;
use satcore::field::WritableField;
use satcore::mission::{AdcsMode, DeviceHealth, HoldReason, MissionMode, ModeCommand};
use satcore::persistence::{MemoryStore, StoreKey};
use satcore::serializer::{EnumSerializer, VectorSerializer};
use satcore::supervisor::{MissionContext, MissionSupervisor};
use satcore::{ControlTask, StateFieldBus};
use std::sync::Arc;

const CYCLE_US: u64 = 120_000;
const TUMBLING: [f32; 3] = [1.0, 0.0, 0.0];
const STILL: [f32; 3] = [0.0, 0.0, 0.0];

struct Harness {
    bus: StateFieldBus,
    store: MemoryStore,
    ctx: Arc<MissionContext>,
    supervisor: MissionSupervisor,
    w_body: WritableField<[f32; 3]>,
    adcs: WritableField<DeviceHealth>,
    gps: WritableField<DeviceHealth>,
}

impl Harness {
    fn new(store: MemoryStore) -> Self {
        let config = SupervisorConfig {
            startup_wait_cycles: 2,
            // 3 cycles at 120 ms
            detumble_timeout_s: 0.3,
            // 2 cycles at 120 ms
            init_hold_detumble_wait_s: 0.2,
            ..SupervisorConfig::default()
        };

        let mut bus = StateFieldBus::new();
        let w_body = bus
            .register_readable(
                "adcs.w_body",
                STILL,
                VectorSerializer::<f32, 3>::new(-10.0, 10.0, 16).unwrap(),
            )
            .unwrap();
        let adcs = bus
            .register_readable("adcs.functional", DeviceHealth::Unknown, EnumSerializer::new())
            .unwrap();
        let gps = bus
            .register_readable("piksi.functional", DeviceHealth::Unknown, EnumSerializer::new())
            .unwrap();

        let ctx = MissionContext::new(&mut bus, Box::new(store.clone())).unwrap();
        let supervisor =
            MissionSupervisor::new(&mut bus, Arc::clone(&ctx), config, CYCLE_US).unwrap();

        Self {
            bus,
            store,
            ctx,
            supervisor,
            w_body,
            adcs,
            gps,
        }
    }

    fn healthy(store: MemoryStore) -> Self {
        let harness = Self::new(store);
        harness.adcs.set(DeviceHealth::Functional);
        harness.gps.set(DeviceHealth::Functional);
        harness
    }

    fn step(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.supervisor.execute();
        }
    }

    fn mode(&self) -> MissionMode {
        self.ctx.mode()
    }

    fn reason(&self) -> HoldReason {
        self.ctx.status().hold_reason
    }

    fn adcs_state(&self) -> AdcsMode {
        self.bus.find_readable::<AdcsMode>("adcs.state").unwrap().get()
    }

    fn command(&self, cmd: ModeCommand) {
        self.bus
            .find_writable::<ModeCommand>("pan.mode_cmd")
            .unwrap()
            .set(cmd);
    }

    fn rearm(&self) {
        self.bus.find_writable::<bool>("pan.rearm").unwrap().set(true);
    }

    fn flag(&self, key: StoreKey) -> u8 {
        self.store.snapshot()[key.address()]
    }
}

#[test]
fn test_startup_waits_then_standby() {
    let mut h = Harness::healthy(MemoryStore::new());
    assert_eq!(h.mode(), MissionMode::Startup);
    assert_eq!(h.adcs_state(), AdcsMode::Startup);

    h.step(1);
    assert_eq!(h.mode(), MissionMode::Startup);
    h.step(1);
    assert_eq!(h.mode(), MissionMode::Standby);
    assert_eq!(h.adcs_state(), AdcsMode::Limited);
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 0);
}

#[test]
fn test_initialization_hold_entry_requests_detumble() {
    let mut h = Harness::new(MemoryStore::new());
    h.adcs.set(DeviceHealth::Functional);
    h.gps.set(DeviceHealth::Faulted);
    h.w_body.set(TUMBLING);

    h.step(2);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert_eq!(h.reason(), HoldReason::GpsUnhealthy);
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 1);
    assert_eq!(h.ctx.read_persisted(StoreKey::InitializationHoldFlag).unwrap(), 1);
    assert_eq!(h.adcs_state(), AdcsMode::Detumble);
    assert!(h.supervisor.hold_detumble_pending());

    // Stable again: the bounded wait completes
    h.w_body.set(STILL);
    h.step(1);
    assert!(!h.supervisor.hold_detumble_pending());
    assert_eq!(h.adcs_state(), AdcsMode::Limited);
    assert_eq!(h.mode(), MissionMode::InitializationHold);

    h.rearm();
    h.step(1);
    assert_eq!(h.mode(), MissionMode::Standby);
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 0);
    assert!(!h.bus.find_readable::<bool>("pan.rearm").unwrap().get());
}

#[test]
fn test_no_detumble_request_when_adcs_unhealthy() {
    let mut h = Harness::new(MemoryStore::new());
    h.gps.set(DeviceHealth::Functional);
    h.w_body.set(TUMBLING);

    h.step(2);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert_eq!(h.reason(), HoldReason::AdcsUnhealthy);
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 1);
    assert_eq!(h.adcs_state(), AdcsMode::Limited);
    assert!(!h.supervisor.hold_detumble_pending());

    // Nothing has detumbled, so re-arming is refused and consumed
    h.rearm();
    h.step(1);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert!(!h.bus.find_readable::<bool>("pan.rearm").unwrap().get());
}

#[test]
fn test_early_rearm_ignored() {
    let mut h = Harness::new(MemoryStore::new());
    h.adcs.set(DeviceHealth::Functional);
    h.w_body.set(TUMBLING);
    h.step(2);
    assert!(h.supervisor.hold_detumble_pending());

    h.rearm();
    h.step(1);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 1);
}

#[test]
fn test_hold_detumble_wait_times_out() {
    let mut h = Harness::new(MemoryStore::new());
    h.adcs.set(DeviceHealth::Functional);
    h.w_body.set(TUMBLING);
    h.step(2);

    h.step(1);
    assert!(h.supervisor.hold_detumble_pending());
    h.step(1);
    assert!(!h.supervisor.hold_detumble_pending());
    assert_eq!(h.adcs_state(), AdcsMode::ZeroTorque);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert_eq!(h.supervisor.get_faults().count(FaultKind::DetumbleTimeout), 1);
}

#[test]
fn test_store_failure_keeps_transition() {
    let store = MemoryStore::new();
    let mut h = Harness::new(store.clone());
    store.set_fail_writes(true);

    h.step(2);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 0);
    assert_eq!(h.supervisor.get_faults().count(FaultKind::StoreWriteFailed), 1);
    assert_eq!(
        h.bus.find_readable::<u32>("pan.store_faults").unwrap().get(),
        1
    );
}

#[test]
fn test_restored_initialization_hold() {
    let store = MemoryStore::with_contents(&[(StoreKey::InitializationHoldFlag, 1)]);
    let mut h = Harness::healthy(store);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert_eq!(h.reason(), HoldReason::RestoredAtBoot);
    assert_eq!(h.ctx.boot_record().boot_count, 1);

    // Sensor-dependent entry actions rerun on the first cycle
    h.w_body.set(TUMBLING);
    h.step(1);
    assert_eq!(h.adcs_state(), AdcsMode::Detumble);
    assert!(h.supervisor.hold_detumble_pending());
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 1);
}

#[test]
fn test_restored_hold_rearms_once_adcs_reports() {
    let store = MemoryStore::with_contents(&[(StoreKey::InitializationHoldFlag, 1)]);
    let mut h = Harness::new(store);

    // First cycle after reboot runs before the ADCS has reported
    h.step(1);
    assert_eq!(h.mode(), MissionMode::InitializationHold);
    assert!(!h.supervisor.hold_detumble_pending());

    h.adcs.set(DeviceHealth::Functional);
    h.gps.set(DeviceHealth::Functional);
    h.step(3);
    assert_eq!(h.mode(), MissionMode::InitializationHold);

    h.rearm();
    h.step(1);
    assert_eq!(h.mode(), MissionMode::Standby);
    assert_eq!(h.flag(StoreKey::InitializationHoldFlag), 0);
}

#[test]
fn test_adcs_recovery_in_hold_requests_detumble() {
    let mut h = Harness::new(MemoryStore::new());
    h.gps.set(DeviceHealth::Functional);
    h.w_body.set(TUMBLING);
    h.step(2);
    assert_eq!(h.reason(), HoldReason::AdcsUnhealthy);
    assert!(!h.supervisor.hold_detumble_pending());

    h.adcs.set(DeviceHealth::Functional);
    h.step(1);
    assert!(h.supervisor.hold_detumble_pending());
    assert_eq!(h.adcs_state(), AdcsMode::Detumble);

    h.w_body.set(STILL);
    h.step(1);
    assert!(!h.supervisor.hold_detumble_pending());
    assert_eq!(h.adcs_state(), AdcsMode::Limited);

    h.rearm();
    h.step(1);
    assert_eq!(h.mode(), MissionMode::Standby);
}

#[test]
fn test_safe_hold_flag_wins_at_boot() {
    let store = MemoryStore::with_contents(&[
        (StoreKey::InitializationHoldFlag, 1),
        (StoreKey::SafeHoldFlag, 1),
        (StoreKey::BootCount, 41),
    ]);
    let h = Harness::healthy(store);
    assert_eq!(h.mode(), MissionMode::SafeHold);
    assert_eq!(h.ctx.boot_record().boot_count, 42);
    assert_eq!(h.flag(StoreKey::BootCount), 42);
    assert_eq!(h.adcs_state(), AdcsMode::ZeroTorque);
}

#[test]
fn test_ground_commands_and_pointing_loss() {
    let mut h = Harness::healthy(MemoryStore::new());
    h.step(2);
    assert_eq!(h.mode(), MissionMode::Standby);

    h.command(ModeCommand::PointingStandby);
    h.step(1);
    assert_eq!(h.mode(), MissionMode::PointingStandby);
    assert_eq!(h.adcs_state(), AdcsMode::PointStandby);
    assert_eq!(
        h.bus.find_readable::<ModeCommand>("pan.mode_cmd").unwrap().get(),
        ModeCommand::None
    );

    h.adcs.set(DeviceHealth::Faulted);
    h.step(1);
    assert_eq!(h.mode(), MissionMode::SafeHold);
    assert_eq!(h.reason(), HoldReason::AdcsUnhealthy);
    assert_eq!(h.flag(StoreKey::SafeHoldFlag), 1);
    assert_eq!(h.adcs_state(), AdcsMode::ZeroTorque);

    // Detumble needs ADCS data
    h.command(ModeCommand::Detumble);
    h.step(1);
    assert_eq!(h.mode(), MissionMode::SafeHold);

    h.command(ModeCommand::Standby);
    h.step(1);
    assert_eq!(h.mode(), MissionMode::Standby);
    assert_eq!(h.reason(), HoldReason::None);
    assert_eq!(h.flag(StoreKey::SafeHoldFlag), 0);
}

#[test]
fn test_detumble_completes_and_resumes() {
    let mut h = Harness::healthy(MemoryStore::new());
    h.w_body.set(TUMBLING);
    h.step(2);
    assert_eq!(h.mode(), MissionMode::Detumble);
    assert_eq!(h.adcs_state(), AdcsMode::Detumble);

    h.w_body.set(STILL);
    h.step(1);
    assert_eq!(h.mode(), MissionMode::Standby);
}

#[test]
fn test_detumble_timeout_enters_safe_hold() {
    let mut h = Harness::healthy(MemoryStore::new());
    h.w_body.set(TUMBLING);
    h.step(2);
    assert_eq!(h.mode(), MissionMode::Detumble);

    h.step(2);
    assert_eq!(h.mode(), MissionMode::Detumble);
    h.step(1);
    assert_eq!(h.mode(), MissionMode::SafeHold);
    assert_eq!(h.reason(), HoldReason::DetumbleTimeout);
    assert_eq!(h.supervisor.get_faults().count(FaultKind::DetumbleTimeout), 1);
}

#[test]
fn test_non_finite_rate_counts_as_tumbling() {
    let mut h = Harness::healthy(MemoryStore::new());
    h.w_body.set([f32::NAN, 0.0, 0.0]);
    h.step(2);
    assert_eq!(h.mode(), MissionMode::Detumble);
}

#[test]
fn test_cycles_in_mode_resets_on_change() {
    let mut h = Harness::healthy(MemoryStore::new());
    let counter = h.bus.find_readable::<u32>("pan.cycles_in_mode").unwrap();

    h.step(1);
    assert_eq!(counter.get(), 1);
    h.step(1);
    assert_eq!(counter.get(), 0);
    h.step(3);
    assert_eq!(counter.get(), 3);
}
