use thiserror::Error;

/// Build-time defects surfaced during initialization. Never recoverable:
/// the executive refuses to enter its control cycle while one is pending.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("field `{0}` registered twice")]
    DuplicateField(String),

    #[error("required field `{0}` is not registered")]
    MissingField(String),

    #[error("field `{name}` holds `{actual}`, requested as `{requested}`")]
    TypeMismatch {
        name: String,
        actual: &'static str,
        requested: &'static str,
    },

    #[error("field `{0}` is read-only")]
    NotWritable(String),

    #[error("bus is sealed, cannot register `{0}` after scheduling started")]
    BusSealed(String),

    #[error("invalid serializer: {0}")]
    InvalidSerializer(String),

    #[error("schedule table is empty")]
    EmptySchedule,

    #[error("task `{task}` offset {offset_us}us lies outside the {cycle_us}us cycle")]
    OffsetOutOfCycle {
        task: String,
        offset_us: u64,
        cycle_us: u64,
    },

    #[error("tasks `{task}` and `{other}` share offset {offset_us}us")]
    OffsetCollision {
        task: String,
        other: String,
        offset_us: u64,
    },

    #[error("task `{0}` scheduled twice")]
    DuplicateTask(String),

    #[error("schedule table has more than {0} tasks")]
    TooManyTasks(usize),

    #[error("telemetry field `{name}` is {bits} bits wide, packet payload holds {payload_bits}")]
    FieldTooWide {
        name: String,
        bits: usize,
        payload_bits: usize,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Non-volatile store failures. Absorbed by the supervisor.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("address {address:#04x} outside {capacity}-byte store")]
    OutOfRange { address: usize, capacity: usize },

    #[error("store rejected write to {address:#04x}")]
    WriteRejected { address: usize },
}

/// Reasons an uplink packet is refused as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UplinkError {
    #[error("unknown field index {0}")]
    UnknownIndex(usize),

    #[error("entry for `{field}` needs {needed} bits, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("packet holds more than {0} entries")]
    TooManyEntries(usize),

    #[error("packet is {len} bytes, limit is {max}")]
    Oversized { len: usize, max: usize },
}

/// Ground-side frame decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownlinkError {
    #[error("frames decode only into a ground mirror bus")]
    NotMirror,

    #[error("frame has {got} packets, layout expects {expected}")]
    PacketCount { expected: usize, got: usize },

    #[error("packet {index} is {len} bytes, expected {expected}")]
    PacketSize {
        index: usize,
        len: usize,
        expected: usize,
    },

    #[error("packet {index} header says downlink {downlink_no} packet {packet_no}")]
    BadHeader {
        index: usize,
        downlink_no: u32,
        packet_no: u8,
    },
}

#[derive(Debug, Error)]
pub enum FlightError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
