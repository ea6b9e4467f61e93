use crate::bus::StateFieldBus;
use crate::clock::Clock;
use crate::error::{ConfigError, ConfigResult};
use crate::field::{Access, Telemetry, WritableField};
use crate::serializer::IntegerSerializer;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const MAX_TASKS: usize = 16;
const MAX_OVERRUN_RECORDS: usize = 32;

/// One schedulable unit. Field handles are acquired when the task is
/// constructed; `execute` runs to completion once per cycle.
pub trait ControlTask: Send {
    fn name(&self) -> &'static str;
    fn execute(&mut self);
}

/// Slot of every task in the control cycle, microseconds from cycle start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOffsets {
    pub clock_manager: u64,
    pub adcs_monitor: u64,
    pub gps_monitor: u64,
    pub debug_console: u64,
    pub mission_manager: u64,
    pub uplink_consumer: u64,
    pub downlink_producer: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleProfile {
    pub name: &'static str,
    pub cycle_us: u64,
    pub offsets: TaskOffsets,
}

impl CycleProfile {
    /// Flight cadence.
    pub const FLIGHT: Self = Self {
        name: "flight",
        cycle_us: 120_000,
        offsets: TaskOffsets {
            clock_manager: 0,
            adcs_monitor: 500,
            gps_monitor: 800,
            debug_console: 1_000,
            mission_manager: 1_010,
            uplink_consumer: 1_110,
            downlink_producer: 21_110,
        },
    };

    /// Hardware-out-of-the-loop cadence. The mission manager and radio slots
    /// move late in the cycle to leave room for the simulator exchange.
    pub const HOOTL: Self = Self {
        name: "hootl",
        cycle_us: 170_000,
        offsets: TaskOffsets {
            clock_manager: 0,
            adcs_monitor: 500,
            gps_monitor: 800,
            debug_console: 1_000,
            mission_manager: 51_000,
            uplink_consumer: 51_100,
            downlink_producer: 53_100,
        },
    };

    /// Profile selected by the `hootl` cargo feature.
    pub const fn active() -> Self {
        if cfg!(feature = "hootl") {
            Self::HOOTL
        } else {
            Self::FLIGHT
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverrunRecord {
    pub cycle: u64,
    pub task: &'static str,
    pub overrun_us: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub task_runs: u64,
    pub overruns: u32,
    pub late_cycles: u32,
    pub max_overrun_us: u64,
}

struct ScheduledTask {
    offset_us: u64,
    task: Box<dyn ControlTask>,
}

pub struct SchedulerBuilder {
    cycle_us: u64,
    tasks: std::vec::Vec<ScheduledTask>,
    overrun_field: WritableField<u32>,
}

impl SchedulerBuilder {
    /// Starts a schedule table and publishes the overrun counter, so tasks
    /// constructed afterwards see it on the bus.
    pub fn new(bus: &mut StateFieldBus, cycle_us: u64) -> ConfigResult<Self> {
        let overrun_field = bus.register(
            "scheduler.overruns",
            0u32,
            IntegerSerializer::<u32>::new(0, u32::from(u16::MAX))?,
            Access::ReadOnly,
            Telemetry::Downlinked,
        )?;
        Ok(Self {
            cycle_us,
            tasks: std::vec::Vec::new(),
            overrun_field,
        })
    }

    pub fn from_profile(bus: &mut StateFieldBus, profile: &CycleProfile) -> ConfigResult<Self> {
        Self::new(bus, profile.cycle_us)
    }

    #[must_use]
    pub fn task(mut self, offset_us: u64, task: impl ControlTask + 'static) -> Self {
        self.add_task(offset_us, Box::new(task));
        self
    }

    /// Tasks may be added in any order; they run sorted by offset.
    pub fn add_task(&mut self, offset_us: u64, task: Box<dyn ControlTask>) {
        self.tasks.push(ScheduledTask { offset_us, task });
    }

    /// Validates the schedule table and seals the bus. Nothing can be
    /// registered on the bus afterwards.
    pub fn build<C: Clock>(
        mut self,
        bus: &mut StateFieldBus,
        clock: C,
    ) -> ConfigResult<CyclicScheduler<C>> {
        if self.cycle_us == 0 || self.tasks.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        if self.tasks.len() > MAX_TASKS {
            return Err(ConfigError::TooManyTasks(MAX_TASKS));
        }
        self.tasks.sort_by_key(|entry| entry.offset_us);

        let mut previous: Option<(&'static str, u64)> = None;
        let mut names: Vec<&'static str, MAX_TASKS> = Vec::new();
        for entry in &self.tasks {
            let name = entry.task.name();
            if entry.offset_us >= self.cycle_us {
                return Err(ConfigError::OffsetOutOfCycle {
                    task: name.to_string(),
                    offset_us: entry.offset_us,
                    cycle_us: self.cycle_us,
                });
            }
            if let Some((other, offset_us)) = previous {
                if entry.offset_us == offset_us {
                    return Err(ConfigError::OffsetCollision {
                        task: name.to_string(),
                        other: other.to_string(),
                        offset_us,
                    });
                }
            }
            if names.contains(&name) {
                return Err(ConfigError::DuplicateTask(name.to_string()));
            }
            // Bounded by the MAX_TASKS check above
            let _ = names.push(name);
            previous = Some((name, entry.offset_us));
        }

        bus.seal();

        let mut tasks = Vec::new();
        for entry in self.tasks {
            debug!(task = entry.task.name(), offset_us = entry.offset_us, "scheduled task");
            if tasks.push(entry).is_err() {
                return Err(ConfigError::TooManyTasks(MAX_TASKS));
            }
        }

        info!(cycle_us = self.cycle_us, tasks = tasks.len(), "scheduler built");
        Ok(CyclicScheduler {
            clock,
            cycle_us: self.cycle_us,
            tasks,
            next_cycle_start_us: None,
            cycle_no: 0,
            overruns: Vec::new(),
            stats: SchedulerStats::default(),
            overrun_field: self.overrun_field,
        })
    }
}

/// Runs every task once per cycle at its fixed offset, in offset order.
/// A task's deadline is the next task's offset (the cycle length for the
/// last one). Tasks are never preempted; finishing past the deadline is
/// recorded as an overrun.
pub struct CyclicScheduler<C: Clock> {
    clock: C,
    cycle_us: u64,
    tasks: Vec<ScheduledTask, MAX_TASKS>,
    next_cycle_start_us: Option<u64>,
    cycle_no: u64,
    overruns: Vec<OverrunRecord, MAX_OVERRUN_RECORDS>,
    stats: SchedulerStats,
    overrun_field: WritableField<u32>,
}

impl<C: Clock> CyclicScheduler<C> {
    pub fn run_cycle(&mut self) {
        let start = self
            .next_cycle_start_us
            .unwrap_or_else(|| self.clock.now_us());
        self.clock.sleep_until(start);

        for i in 0..self.tasks.len() {
            let offset = self.tasks[i].offset_us;
            let deadline_offset = self
                .tasks
                .get(i + 1)
                .map_or(self.cycle_us, |next| next.offset_us);

            self.clock.sleep_until(start + offset);
            self.tasks[i].task.execute();
            self.stats.task_runs += 1;

            let finished = self.clock.now_us();
            let deadline = start + deadline_offset;
            if finished > deadline {
                let task = self.tasks[i].task.name();
                self.record_overrun(task, finished - deadline);
            }
        }

        let next = start + self.cycle_us;
        let end = self.clock.now_us();
        if end > next {
            // Start the next cycle right away and re-anchor the grid on it
            self.stats.late_cycles += 1;
            warn!(cycle = self.cycle_no, late_us = end - next, "control cycle ran late");
            self.next_cycle_start_us = Some(end);
        } else {
            self.next_cycle_start_us = Some(next);
        }

        self.cycle_no += 1;
        self.stats.cycles += 1;
    }

    pub fn run(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.run_cycle();
        }
    }

    fn record_overrun(&mut self, task: &'static str, overrun_us: u64) {
        warn!(task, cycle = self.cycle_no, overrun_us, "task overran its deadline");

        if self.overruns.is_full() {
            self.overruns.remove(0);
        }
        let _ = self.overruns.push(OverrunRecord {
            cycle: self.cycle_no,
            task,
            overrun_us,
        });

        self.stats.overruns = self.stats.overruns.saturating_add(1);
        self.stats.max_overrun_us = self.stats.max_overrun_us.max(overrun_us);
        self.overrun_field.set(self.stats.overruns);
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Most recent overruns, oldest first.
    pub fn get_overruns(&self) -> &[OverrunRecord] {
        &self.overruns
    }

    pub fn cycle_us(&self) -> u64 {
        self.cycle_us
    }

    pub fn cycle_no(&self) -> u64 {
        self.cycle_no
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn task_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tasks.iter().map(|t| t.task.name())
    }

    pub fn task_offsets(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.tasks.iter().map(|t| (t.task.name(), t.offset_us))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitStatus {
    Pending,
    Satisfied,
    TimedOut,
}

/// Bounded wait on a condition checked once per cycle. The waiter polls
/// from its own slot and never blocks the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTimeout {
    limit_cycles: u32,
    elapsed_cycles: u32,
}

impl CycleTimeout {
    pub fn new(limit_cycles: u32) -> Self {
        Self {
            limit_cycles: limit_cycles.max(1),
            elapsed_cycles: 0,
        }
    }

    /// Wait lasting at least `seconds` at the given cycle length.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_seconds(seconds: f64, cycle_us: u64) -> Self {
        let cycles = (seconds.max(0.0) * 1_000_000.0 / cycle_us.max(1) as f64).ceil();
        let cycles = if cycles >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            cycles as u32
        };
        Self::new(cycles)
    }

    /// Counts one cycle unless `condition` already holds.
    pub fn poll(&mut self, condition: bool) -> WaitStatus {
        if condition {
            return WaitStatus::Satisfied;
        }
        self.elapsed_cycles = self.elapsed_cycles.saturating_add(1);
        if self.elapsed_cycles >= self.limit_cycles {
            WaitStatus::TimedOut
        } else {
            WaitStatus::Pending
        }
    }

    pub fn elapsed_cycles(&self) -> u32 {
        self.elapsed_cycles
    }

    pub fn limit_cycles(&self) -> u32 {
        self.limit_cycles
    }
}
