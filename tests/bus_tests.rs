use proptest::prelude::*;
use satcore::bitstream::BitStream;
use satcore::error::ConfigError;
use satcore::field::{Access, Telemetry};
use satcore::serializer::*;
use satcore::StateFieldBus;

fn test_bus() -> StateFieldBus {
    let mut bus = StateFieldBus::new();
    bus.register_readable("sensor.temp", 20i16, IntegerSerializer::<i16>::new(-40, 85).unwrap())
        .unwrap();
    bus.register_readable_writable("ctrl.enable", false, BoolSerializer)
        .unwrap();
    bus.register(
        "ctrl.gain",
        0.5f32,
        QuantizedSerializer::<f32>::new(0.0, 1.0, 10).unwrap(),
        Access::ReadWrite,
        Telemetry::Internal,
    )
    .unwrap();
    bus
}

#[test]
fn test_handles_share_storage() {
    let mut bus = StateFieldBus::new();
    let writer = bus
        .register_readable("pan.counter", 0u32, IntegerSerializer::<u32>::full_range())
        .unwrap();
    let reader = bus.find_readable::<u32>("pan.counter").unwrap();

    writer.set(41);
    writer.update(|n| *n += 1);
    assert_eq!(reader.get(), 42);
    assert_eq!(reader.name(), "pan.counter");

    // A later reader sees the same value
    let another = writer.readable();
    assert_eq!(another.get(), 42);
}

#[test]
fn test_duplicate_registration_rejected() {
    let mut bus = test_bus();
    let result = bus.register_readable("sensor.temp", 0i16, IntegerSerializer::<i16>::full_range());
    assert!(matches!(result, Err(ConfigError::DuplicateField(name)) if name == "sensor.temp"));
    assert_eq!(bus.len(), 3);
}

#[test]
fn test_missing_field() {
    let bus = test_bus();
    let result = bus.find_readable::<u8>("nope");
    assert!(matches!(result, Err(ConfigError::MissingField(_))));
}

#[test]
fn test_type_mismatch_names_both_types() {
    let bus = test_bus();
    match bus.find_readable::<u32>("sensor.temp") {
        Err(ConfigError::TypeMismatch {
            name,
            actual,
            requested,
        }) => {
            assert_eq!(name, "sensor.temp");
            assert_eq!(actual, "i16");
            assert_eq!(requested, "u32");
        }
        other => panic!("expected type mismatch, got {other:?}"),
    }
}

#[test]
fn test_read_only_field_not_writable() {
    let bus = test_bus();
    assert!(matches!(
        bus.find_writable::<i16>("sensor.temp"),
        Err(ConfigError::NotWritable(_))
    ));
    let enable = bus.find_writable::<bool>("ctrl.enable").unwrap();
    enable.set(true);
    assert!(bus.find_readable::<bool>("ctrl.enable").unwrap().get());
}

#[test]
fn test_sealed_bus_rejects_registration() {
    let mut bus = test_bus();
    bus.seal();
    let result = bus.register_readable("late", 0u8, IntegerSerializer::<u8>::full_range());
    assert!(matches!(result, Err(ConfigError::BusSealed(_))));

    // Lookups keep working
    assert!(bus.find_readable::<i16>("sensor.temp").is_ok());
}

#[test]
fn test_telemetry_and_writable_views() {
    let bus = test_bus();
    let telemetry: Vec<_> = bus.telemetry_fields().iter().map(|f| f.name()).collect();
    assert_eq!(telemetry, vec!["sensor.temp", "ctrl.enable"]);

    let writable: Vec<_> = bus.writable_fields().iter().map(|f| f.name()).collect();
    assert_eq!(writable, vec!["ctrl.enable", "ctrl.gain"]);

    // 7 bits for [-40, 85] plus 1 for the flag
    assert_eq!(bus.telemetry_bits(), 8);
}

#[test]
fn test_json_access() {
    let bus = test_bus();
    let temp = bus.field("sensor.temp").unwrap();
    assert_eq!(temp.value_json(), serde_json::json!(20));

    let gain = bus.writable_field("ctrl.gain").unwrap();
    gain.set_json(serde_json::json!(0.25)).unwrap();
    assert_eq!(bus.find_readable::<f32>("ctrl.gain").unwrap().get(), 0.25);
    assert!(gain.set_json(serde_json::json!("high")).is_err());
}

#[test]
fn test_read_only_field_has_no_erased_writer() {
    let bus = test_bus();
    assert!(bus.writable_field("sensor.temp").is_none());
    assert!(bus.writable_field("nope").is_none());
    assert!(bus
        .writable_fields()
        .iter()
        .all(|f| f.access() == Access::ReadWrite));

    // Only a ground mirror accepts writes into read-only fields
    let mut ground = StateFieldBus::ground_mirror();
    ground
        .register_readable("sensor.temp", 20i16, IntegerSerializer::<i16>::new(-40, 85).unwrap())
        .unwrap();
    assert!(ground.is_mirror());
    assert!(!bus.is_mirror());
    assert!(ground.writable_field("sensor.temp").is_none());
}

#[test]
fn test_pack_and_unpack_through_erased_field() {
    let bus = test_bus();
    bus.find_writable::<bool>("ctrl.enable").unwrap().set(true);
    let temp = bus.field("sensor.temp").unwrap();
    let enable = bus.field("ctrl.enable").unwrap();

    let mut buf = [0u8; 2];
    let mut stream = BitStream::new(&mut buf);
    temp.pack_into(&mut stream);
    enable.pack_into(&mut stream);
    assert_eq!(stream.write_position(), 8);
    // 20 - (-40) = 60 in 7 bits, then the flag
    assert_eq!(buf[0], 60 | 0x80);
}

#[test]
fn test_integer_serializer_clamps() {
    let serializer = IntegerSerializer::<i32>::new(-10, 10).unwrap();
    assert_eq!(serializer.bit_width(), 5);

    let mut buf = [0u8; 4];
    let mut stream = BitStream::new(&mut buf);
    serializer.pack(&100, &mut stream);
    serializer.pack(&-100, &mut stream);
    assert_eq!(serializer.unpack(&mut stream), 10);
    assert_eq!(serializer.unpack(&mut stream), -10);
}

#[test]
fn test_invalid_serializer_parameters() {
    assert!(matches!(
        IntegerSerializer::<u8>::new(10, 2),
        Err(ConfigError::InvalidSerializer(_))
    ));
    assert!(QuantizedSerializer::<f32>::new(1.0, 1.0, 8).is_err());
    assert!(QuantizedSerializer::<f64>::new(0.0, f64::INFINITY, 8).is_err());
    assert!(QuantizedSerializer::<f64>::new(0.0, 1.0, 0).is_err());
}

#[test]
fn test_quantized_nan_packs_as_min() {
    let serializer = QuantizedSerializer::<f32>::new(-2.0, 2.0, 8).unwrap();
    let mut buf = [0u8; 1];
    let mut stream = BitStream::new(&mut buf);
    serializer.pack(&f32::NAN, &mut stream);
    assert_eq!(serializer.unpack(&mut stream), -2.0);
}

proptest! {
    #[test]
    fn quantization_error_within_half_step(value in -5.0f64..5.0, bits in 2usize..24) {
        let serializer = QuantizedSerializer::<f64>::new(-5.0, 5.0, bits).unwrap();
        let mut buf = [0u8; 4];
        let mut stream = BitStream::new(&mut buf);
        serializer.pack(&value, &mut stream);
        let decoded = serializer.unpack(&mut stream);
        prop_assert!((decoded - value).abs() <= serializer.step() / 2.0 + 1e-12);
    }

    #[test]
    fn out_of_range_values_clamp(value in prop_oneof![-1e6f64..-5.0, 5.0f64..1e6]) {
        let serializer = QuantizedSerializer::<f64>::new(-5.0, 5.0, 12).unwrap();
        let mut buf = [0u8; 2];
        let mut stream = BitStream::new(&mut buf);
        serializer.pack(&value, &mut stream);
        let expected = if value < 0.0 { -5.0 } else { 5.0 };
        prop_assert!((serializer.unpack(&mut stream) - expected).abs() < 1e-9);
    }

    #[test]
    fn integer_values_in_range_survive(value in -1000i32..=1000) {
        let serializer = IntegerSerializer::<i32>::new(-1000, 1000).unwrap();
        let mut buf = [0u8; 2];
        let mut stream = BitStream::new(&mut buf);
        serializer.pack(&value, &mut stream);
        prop_assert_eq!(serializer.unpack(&mut stream), value);
    }
}
