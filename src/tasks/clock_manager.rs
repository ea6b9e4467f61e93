use crate::bus::StateFieldBus;
use crate::clock::Clock;
use crate::error::ConfigResult;
use crate::field::{Access, Telemetry, WritableField};
use crate::scheduler::ControlTask;
use crate::serializer::IntegerSerializer;

/// First task of every cycle: publishes the cycle counter and the time the
/// cycle actually started.
pub struct ClockManager<C: Clock> {
    clock: C,
    cycle_no: WritableField<u32>,
    cycle_start_us: WritableField<u64>,
}

impl<C: Clock> ClockManager<C> {
    pub fn new(bus: &mut StateFieldBus, clock: C) -> ConfigResult<Self> {
        Ok(Self {
            clock,
            cycle_no: bus.register_readable(
                "pan.cycle_no",
                0u32,
                IntegerSerializer::<u32>::full_range(),
            )?,
            cycle_start_us: bus.register(
                "pan.cycle_start_us",
                0u64,
                IntegerSerializer::<u64>::full_range(),
                Access::ReadOnly,
                Telemetry::Internal,
            )?,
        })
    }
}

impl<C: Clock> ControlTask for ClockManager<C> {
    fn name(&self) -> &'static str {
        "clock_manager"
    }

    fn execute(&mut self) {
        self.cycle_start_us.set(self.clock.now_us());
        self.cycle_no.update(|n| *n = n.wrapping_add(1));
    }
}
