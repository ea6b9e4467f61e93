//! Mission mode arbitration.
//!
//! [`MissionContext`] owns the satellite-wide mode and the non-volatile
//! flags. The mode group lives in a single bus field so that mode and hold
//! reason change under one write lock; the store sits behind its own mutex.
//! Neither lock is ever taken while the other is held.
//!
//! [`MissionSupervisor`] is the task that drives the state machine once per
//! cycle from the mission manager slot.

use crate::bus::StateFieldBus;
use crate::config::SupervisorConfig;
use crate::error::{ConfigResult, StoreError};
use crate::fault::{FaultKind, FaultLog};
use crate::field::{Access, ReadableField, Telemetry, WritableField};
use crate::mission::{
    AdcsMode, DeviceHealth, HoldReason, MissionMode, MissionStatus, MissionStatusSerializer,
    ModeCommand,
};
use crate::persistence::{PersistentStore, StoreKey};
use crate::scheduler::{ControlTask, CycleTimeout, WaitStatus};
use crate::serializer::{BoolSerializer, EnumSerializer, IntegerSerializer};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Persisted state as read once at boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootRecord {
    pub initialization_hold: bool,
    pub safe_hold: bool,
    pub boot_count: u8,
}

pub struct MissionContext {
    status: WritableField<MissionStatus>,
    store: Mutex<Box<dyn PersistentStore>>,
    boot: BootRecord,
}

impl MissionContext {
    /// Reads the persisted flags, bumps the boot counter and registers the
    /// `pan.state` group. A store that cannot be read is treated as blank.
    pub fn new(
        bus: &mut StateFieldBus,
        mut store: Box<dyn PersistentStore>,
    ) -> ConfigResult<Arc<Self>> {
        let read_flag = |store: &dyn PersistentStore, key: StoreKey| {
            store.read_flag(key).unwrap_or_else(|error| {
                warn!(?key, %error, "store read failed at boot, assuming clear");
                false
            })
        };

        let mut boot = BootRecord {
            initialization_hold: read_flag(store.as_ref(), StoreKey::InitializationHoldFlag),
            safe_hold: read_flag(store.as_ref(), StoreKey::SafeHoldFlag),
            boot_count: store.read(StoreKey::BootCount).unwrap_or(0),
        };
        boot.boot_count = boot.boot_count.wrapping_add(1);
        if let Err(error) = store.write(StoreKey::BootCount, boot.boot_count) {
            warn!(%error, "could not record boot count");
        }

        let initial = if boot.safe_hold {
            MissionStatus {
                mode: MissionMode::SafeHold,
                hold_reason: HoldReason::RestoredAtBoot,
            }
        } else if boot.initialization_hold {
            MissionStatus {
                mode: MissionMode::InitializationHold,
                hold_reason: HoldReason::RestoredAtBoot,
            }
        } else {
            MissionStatus::default()
        };
        info!(mode = ?initial.mode, boot_count = boot.boot_count, "mission context restored");

        let status = bus.register_readable("pan.state", initial, MissionStatusSerializer::default())?;
        bus.register_readable(
            "pan.boot_count",
            boot.boot_count,
            IntegerSerializer::<u8>::full_range(),
        )?;

        Ok(Arc::new(Self {
            status,
            store: Mutex::new(store),
            boot,
        }))
    }

    pub fn status(&self) -> MissionStatus {
        self.status.get()
    }

    pub fn mode(&self) -> MissionMode {
        self.status.get().mode
    }

    pub fn status_field(&self) -> ReadableField<MissionStatus> {
        self.status.readable()
    }

    pub fn boot_record(&self) -> BootRecord {
        self.boot
    }

    /// Updates mode and hold reason in one write-lock section. Returns the
    /// previous status.
    pub fn transition(&self, mode: MissionMode, hold_reason: HoldReason) -> MissionStatus {
        self.status.update(|status| {
            let previous = *status;
            status.mode = mode;
            status.hold_reason = hold_reason;
            previous
        })
    }

    pub fn persist_flag(&self, key: StoreKey, value: bool) -> Result<(), StoreError> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.write_flag(key, value)
    }

    pub fn read_persisted(&self, key: StoreKey) -> Result<u8, StoreError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.read(key)
    }
}

impl core::fmt::Debug for MissionContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MissionContext")
            .field("status", &self.status())
            .field("boot", &self.boot)
            .finish()
    }
}

pub struct MissionSupervisor {
    ctx: Arc<MissionContext>,
    config: SupervisorConfig,
    cycle_us: u64,

    mode_cmd: WritableField<ModeCommand>,
    rearm: WritableField<bool>,
    adcs_state: WritableField<AdcsMode>,
    cycles_in_mode: WritableField<u32>,
    store_faults: WritableField<u32>,

    w_body: ReadableField<[f32; 3]>,
    adcs_health: ReadableField<DeviceHealth>,
    gps_health: ReadableField<DeviceHealth>,

    faults: FaultLog,
    cycle: u64,
    last_mode: MissionMode,
    startup_cycles: u32,
    resume_mode: MissionMode,
    detumble_timeout: Option<CycleTimeout>,
    hold_wait: Option<CycleTimeout>,
    hold_stable: bool,
    // Hold entry checks ran with ADCS data available
    hold_evaluated: bool,
    restored_hold: bool,
}

impl MissionSupervisor {
    /// Registers the supervisor's own fields and resolves the sensor fields
    /// it depends on. Fails if any of those is missing or mistyped.
    pub fn new(
        bus: &mut StateFieldBus,
        ctx: Arc<MissionContext>,
        config: SupervisorConfig,
        cycle_us: u64,
    ) -> ConfigResult<Self> {
        let mode_cmd = bus.register_readable_writable(
            "pan.mode_cmd",
            ModeCommand::None,
            EnumSerializer::new(),
        )?;
        let rearm = bus.register_readable_writable("pan.rearm", false, BoolSerializer)?;
        let adcs_state = bus.register_readable_writable(
            "adcs.state",
            ctx.mode().adcs_request(),
            EnumSerializer::new(),
        )?;
        let cycles_in_mode = bus.register(
            "pan.cycles_in_mode",
            0u32,
            IntegerSerializer::<u32>::full_range(),
            Access::ReadOnly,
            Telemetry::Downlinked,
        )?;
        let store_faults =
            bus.register_readable("pan.store_faults", 0u32, IntegerSerializer::<u32>::new(0, 255)?)?;

        let w_body = bus.find_readable("adcs.w_body")?;
        let adcs_health = bus.find_readable("adcs.functional")?;
        let gps_health = bus.find_readable("piksi.functional")?;

        let mode = ctx.mode();
        Ok(Self {
            restored_hold: mode == MissionMode::InitializationHold,
            last_mode: mode,
            ctx,
            config,
            cycle_us,
            mode_cmd,
            rearm,
            adcs_state,
            cycles_in_mode,
            store_faults,
            w_body,
            adcs_health,
            gps_health,
            faults: FaultLog::new(),
            cycle: 0,
            startup_cycles: 0,
            resume_mode: MissionMode::Standby,
            detumble_timeout: None,
            hold_wait: None,
            hold_stable: false,
            hold_evaluated: false,
        })
    }

    pub fn context(&self) -> &Arc<MissionContext> {
        &self.ctx
    }

    pub fn get_faults(&self) -> &FaultLog {
        &self.faults
    }

    /// True while initialization hold is waiting on a requested detumble.
    pub fn hold_detumble_pending(&self) -> bool {
        self.hold_wait.is_some()
    }

    /// Body rate magnitude. A non-finite reading counts as tumbling.
    fn angular_rate(&self) -> f32 {
        let w = self.w_body.get();
        let rate = (w[0] * w[0] + w[1] * w[1] + w[2] * w[2]).sqrt();
        if rate.is_finite() {
            rate
        } else {
            f32::INFINITY
        }
    }

    fn tumbling(&self) -> bool {
        self.angular_rate() >= self.config.max_stable_rate
    }

    fn adcs_ok(&self) -> bool {
        self.adcs_health.get().can_get_data()
    }

    fn track_health(&mut self, kind: FaultKind, healthy: bool) {
        if !healthy && !self.faults.is_active(kind) {
            warn!(?kind, cycle = self.cycle, "device cannot provide data");
            self.faults.record(kind, self.cycle);
        } else if healthy && self.faults.resolve(kind, self.cycle) > 0 {
            info!(?kind, cycle = self.cycle, "device recovered");
        }
    }

    fn persist(&mut self, key: StoreKey, value: bool) {
        if let Err(error) = self.ctx.persist_flag(key, value) {
            warn!(?key, value, %error, "persisting flag failed, keeping in-memory transition");
            self.faults.record(FaultKind::StoreWriteFailed, self.cycle);
            self.store_faults.update(|n| *n = n.saturating_add(1));
        }
    }

    fn set_mode(&mut self, mode: MissionMode, reason: HoldReason) {
        let previous = self.ctx.transition(mode, reason);
        if previous.mode != mode {
            info!(from = ?previous.mode, to = ?mode, ?reason, cycle = self.cycle, "mission mode change");
        }
        self.detumble_timeout = None;
        self.hold_wait = None;
        self.hold_stable = false;
        self.hold_evaluated = false;
    }

    fn enter_mode(&mut self, mode: MissionMode) {
        self.set_mode(mode, HoldReason::None);
        self.adcs_state.set(mode.adcs_request());
    }

    fn enter_detumble(&mut self, resume: MissionMode) {
        self.set_mode(MissionMode::Detumble, HoldReason::None);
        self.adcs_state.set(AdcsMode::Detumble);
        self.resume_mode = resume;
        self.detumble_timeout = Some(CycleTimeout::from_seconds(
            self.config.detumble_timeout_s,
            self.cycle_us,
        ));
    }

    /// Entry into initialization hold: mode group first, then the persisted
    /// flag, then the optional detumble request.
    fn enter_initialization_hold(&mut self, reason: HoldReason) {
        self.set_mode(MissionMode::InitializationHold, reason);
        self.adcs_state.set(AdcsMode::Limited);
        self.persist(StoreKey::InitializationHoldFlag, true);
        self.request_hold_detumble();
    }

    fn request_hold_detumble(&mut self) {
        self.hold_wait = None;
        self.hold_stable = false;

        if !self.adcs_ok() {
            debug!("ADCS health unknown, no detumble request from hold");
            self.hold_evaluated = false;
            return;
        }
        self.hold_evaluated = true;
        if self.tumbling() {
            self.adcs_state.set(AdcsMode::Detumble);
            self.hold_wait = Some(CycleTimeout::from_seconds(
                self.config.init_hold_detumble_wait_s,
                self.cycle_us,
            ));
            info!(rate = self.angular_rate(), "detumble requested from initialization hold");
        } else {
            self.hold_stable = true;
        }
    }

    fn enter_safe_hold(&mut self, reason: HoldReason) {
        warn!(?reason, cycle = self.cycle, "entering safe hold");
        self.set_mode(MissionMode::SafeHold, reason);
        self.adcs_state.set(AdcsMode::ZeroTorque);
        self.persist(StoreKey::SafeHoldFlag, true);
    }

    /// Applies a pending ground override. Returns true if one was consumed.
    fn apply_ground_command(&mut self) -> bool {
        let command = self
            .mode_cmd
            .update(|cmd| core::mem::replace(cmd, ModeCommand::None));
        let Some(target) = command.target() else {
            return false;
        };

        let current = self.ctx.mode();
        info!(?current, ?target, "ground mode command");

        if target == MissionMode::Detumble && !self.adcs_ok() {
            warn!("detumble command refused, ADCS cannot provide data");
            return true;
        }

        if current == MissionMode::InitializationHold && target != current {
            self.persist(StoreKey::InitializationHoldFlag, false);
        }
        if current == MissionMode::SafeHold && target != current {
            self.persist(StoreKey::SafeHoldFlag, false);
        }

        match target {
            MissionMode::InitializationHold => {
                self.enter_initialization_hold(HoldReason::GroundCommand);
            }
            MissionMode::SafeHold => self.enter_safe_hold(HoldReason::GroundCommand),
            MissionMode::Detumble => self.enter_detumble(MissionMode::Standby),
            other => self.enter_mode(other),
        }
        self.restored_hold = false;
        true
    }

    fn dispatch_startup(&mut self) {
        self.startup_cycles = self.startup_cycles.saturating_add(1);
        if self.startup_cycles < self.config.startup_wait_cycles {
            return;
        }

        if !self.adcs_health.get().can_get_data() {
            self.enter_initialization_hold(HoldReason::AdcsUnhealthy);
        } else if !self.gps_health.get().can_get_data() {
            self.enter_initialization_hold(HoldReason::GpsUnhealthy);
        } else if self.tumbling() {
            self.enter_detumble(MissionMode::Standby);
        } else {
            self.enter_mode(MissionMode::Standby);
        }
    }

    fn dispatch_nominal(&mut self, mode: MissionMode) {
        let adcs_ok = self.adcs_ok();
        if mode.is_pointing() && !adcs_ok {
            self.enter_safe_hold(HoldReason::AdcsUnhealthy);
        } else if adcs_ok && self.tumbling() {
            self.enter_detumble(mode);
        }
    }

    fn dispatch_detumble(&mut self) {
        if !self.adcs_ok() {
            self.enter_safe_hold(HoldReason::AdcsUnhealthy);
            return;
        }
        if !self.tumbling() {
            let resume = self.resume_mode;
            info!(?resume, "detumble complete");
            self.enter_mode(resume);
            return;
        }

        let (limit_s, cycle_us) = (self.config.detumble_timeout_s, self.cycle_us);
        let status = self
            .detumble_timeout
            .get_or_insert_with(|| CycleTimeout::from_seconds(limit_s, cycle_us))
            .poll(false);
        if status == WaitStatus::TimedOut {
            self.faults.record(FaultKind::DetumbleTimeout, self.cycle);
            self.enter_safe_hold(HoldReason::DetumbleTimeout);
        }
    }

    fn dispatch_initialization_hold(&mut self) {
        if self.restored_hold {
            // Flag is already persisted, only the sensor-dependent entry actions rerun
            self.restored_hold = false;
            self.adcs_state.set(AdcsMode::Limited);
            self.request_hold_detumble();
        }

        if let Some(mut wait) = self.hold_wait.take() {
            let adcs_ok = self.adcs_ok();
            let status = wait.poll(adcs_ok && !self.tumbling());
            match status {
                WaitStatus::Satisfied => {
                    info!(cycles = wait.elapsed_cycles(), "detumble complete in initialization hold");
                    self.adcs_state.set(AdcsMode::Limited);
                    self.hold_stable = true;
                }
                WaitStatus::TimedOut => {
                    warn!(cycles = wait.elapsed_cycles(), "detumble wait timed out, holding");
                    self.faults.record(FaultKind::DetumbleTimeout, self.cycle);
                    self.adcs_state.set(AdcsMode::ZeroTorque);
                }
                WaitStatus::Pending if !adcs_ok => {
                    warn!("ADCS lost during detumble wait, abandoning request");
                    self.adcs_state.set(AdcsMode::ZeroTorque);
                    self.hold_evaluated = false;
                }
                WaitStatus::Pending => self.hold_wait = Some(wait),
            }
        }

        // ADCS came back after entry: rerun the checks that needed it
        if !self.hold_evaluated && self.hold_wait.is_none() && self.adcs_ok() {
            info!("ADCS reporting in initialization hold, re-evaluating body rate");
            self.adcs_state.set(AdcsMode::Limited);
            self.request_hold_detumble();
        }

        if self.rearm.get() {
            self.rearm.set(false);
            if self.hold_stable && self.adcs_ok() {
                info!("re-armed after detumble, leaving initialization hold");
                self.persist(StoreKey::InitializationHoldFlag, false);
                self.enter_mode(MissionMode::Standby);
            } else {
                warn!("re-arm ignored, detumble has not completed");
            }
        }
    }

    fn dispatch_safe_hold(&mut self) {
        if self.adcs_state.get() != AdcsMode::ZeroTorque {
            self.adcs_state.set(AdcsMode::ZeroTorque);
        }
    }

    fn update_mode_counter(&mut self) {
        let mode = self.ctx.mode();
        if mode == self.last_mode {
            self.cycles_in_mode.update(|n| *n = n.saturating_add(1));
        } else {
            self.last_mode = mode;
            self.cycles_in_mode.set(0);
        }
    }
}

impl ControlTask for MissionSupervisor {
    fn name(&self) -> &'static str {
        "mission_manager"
    }

    fn execute(&mut self) {
        self.cycle += 1;

        let adcs_ok = self.adcs_ok();
        let gps_ok = self.gps_health.get().can_get_data();
        self.track_health(FaultKind::AdcsUnhealthy, adcs_ok);
        self.track_health(FaultKind::GpsUnhealthy, gps_ok);

        if !self.apply_ground_command() {
            match self.ctx.mode() {
                MissionMode::Startup => self.dispatch_startup(),
                MissionMode::Detumble => self.dispatch_detumble(),
                MissionMode::InitializationHold => self.dispatch_initialization_hold(),
                MissionMode::SafeHold => self.dispatch_safe_hold(),
                mode => self.dispatch_nominal(mode),
            }
        }

        self.update_mode_counter();
    }
}
