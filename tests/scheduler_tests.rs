use satcore::error::ConfigError;
use satcore::field::{ReadableField, WritableField};
use satcore::scheduler::*;
use satcore::serializer::IntegerSerializer;
use satcore::{Clock, SimulatedClock, StateFieldBus};

struct Producer {
    counter: WritableField<u32>,
}

impl ControlTask for Producer {
    fn name(&self) -> &'static str {
        "producer"
    }

    fn execute(&mut self) {
        self.counter.update(|n| *n += 1);
    }
}

struct Consumer {
    counter: ReadableField<u32>,
    seen: WritableField<u32>,
}

impl ControlTask for Consumer {
    fn name(&self) -> &'static str {
        "consumer"
    }

    fn execute(&mut self) {
        self.seen.set(self.counter.get());
    }
}

struct Idle(&'static str);

impl ControlTask for Idle {
    fn name(&self) -> &'static str {
        self.0
    }

    fn execute(&mut self) {}
}

#[test]
fn test_later_slot_sees_same_cycle_write() {
    let mut bus = StateFieldBus::new();
    let builder = SchedulerBuilder::new(&mut bus, 10_000).unwrap();
    let counter = bus
        .register_readable("test.counter", 0u32, IntegerSerializer::<u32>::full_range())
        .unwrap();
    let seen = bus
        .register_readable("test.seen", 0u32, IntegerSerializer::<u32>::full_range())
        .unwrap();
    let consumer = Consumer {
        counter: bus.find_readable("test.counter").unwrap(),
        seen: seen.clone(),
    };

    // Registered out of order on purpose
    let clock = SimulatedClock::new();
    let mut scheduler = builder
        .task(5_000, consumer)
        .task(1_000, Producer { counter })
        .build(&mut bus, clock.clone())
        .unwrap();

    assert_eq!(scheduler.task_names().collect::<Vec<_>>(), vec!["producer", "consumer"]);

    for cycle in 1..=5 {
        scheduler.run_cycle();
        assert_eq!(seen.get(), cycle);
    }
    assert_eq!(clock.now_us(), 45_000);
}

#[test]
fn test_empty_schedule_rejected() {
    let mut bus = StateFieldBus::new();
    let result = SchedulerBuilder::new(&mut bus, 1_000)
        .unwrap()
        .build(&mut bus, SimulatedClock::new());
    assert!(matches!(result, Err(ConfigError::EmptySchedule)));
    assert!(!bus.is_sealed());
}

#[test]
fn test_offset_outside_cycle_rejected() {
    let mut bus = StateFieldBus::new();
    let result = SchedulerBuilder::new(&mut bus, 1_000)
        .unwrap()
        .task(0, Idle("a"))
        .task(1_000, Idle("b"))
        .build(&mut bus, SimulatedClock::new());
    match result {
        Err(ConfigError::OffsetOutOfCycle {
            task,
            offset_us,
            cycle_us,
        }) => {
            assert_eq!(task, "b");
            assert_eq!(offset_us, 1_000);
            assert_eq!(cycle_us, 1_000);
        }
        _ => panic!("expected offset error"),
    }
}

#[test]
fn test_offset_collision_rejected() {
    let mut bus = StateFieldBus::new();
    let result = SchedulerBuilder::new(&mut bus, 1_000)
        .unwrap()
        .task(200, Idle("a"))
        .task(200, Idle("b"))
        .build(&mut bus, SimulatedClock::new());
    assert!(matches!(
        result,
        Err(ConfigError::OffsetCollision { offset_us: 200, .. })
    ));
}

#[test]
fn test_duplicate_task_rejected() {
    let mut bus = StateFieldBus::new();
    let result = SchedulerBuilder::new(&mut bus, 1_000)
        .unwrap()
        .task(0, Idle("a"))
        .task(500, Idle("a"))
        .build(&mut bus, SimulatedClock::new());
    assert!(matches!(result, Err(ConfigError::DuplicateTask(name)) if name == "a"));
}

#[test]
fn test_too_many_tasks_rejected() {
    const NAMES: [&str; MAX_TASKS + 1] = [
        "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8", "t9", "t10", "t11", "t12", "t13",
        "t14", "t15", "t16",
    ];
    let mut bus = StateFieldBus::new();
    let mut builder = SchedulerBuilder::new(&mut bus, 100_000).unwrap();
    for (i, name) in NAMES.iter().enumerate() {
        builder.add_task(i as u64 * 100, Box::new(Idle(*name)));
    }
    let result = builder.build(&mut bus, SimulatedClock::new());
    assert!(matches!(result, Err(ConfigError::TooManyTasks(MAX_TASKS))));
}

#[test]
fn test_overrun_counter_registered_before_tasks() {
    let mut bus = StateFieldBus::new();
    let _builder = SchedulerBuilder::from_profile(&mut bus, &CycleProfile::FLIGHT).unwrap();
    let overruns = bus.find_readable::<u32>("scheduler.overruns").unwrap();
    assert_eq!(overruns.get(), 0);
}

#[test]
fn test_active_profile_matches_feature() {
    let profile = CycleProfile::active();
    if cfg!(feature = "hootl") {
        assert_eq!(profile, CycleProfile::HOOTL);
        assert_eq!(profile.cycle_us, 170_000);
    } else {
        assert_eq!(profile, CycleProfile::FLIGHT);
        assert_eq!(profile.cycle_us, 120_000);
    }
}
