//! Mission-level enumerations carried on the bus.

use crate::bitstream::BitStream;
use crate::field_enum;
use crate::serializer::{EnumSerializer, Serializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionMode {
    Startup,
    Standby,
    Detumble,
    PointingStandby,
    PointingDocking,
    PointingManual,
    InitializationHold,
    SafeHold,
}

impl MissionMode {
    pub fn is_hold(self) -> bool {
        matches!(self, Self::InitializationHold | Self::SafeHold)
    }

    pub fn is_pointing(self) -> bool {
        matches!(
            self,
            Self::PointingStandby | Self::PointingDocking | Self::PointingManual
        )
    }

    /// ADCS sub-mode this mission mode asks for.
    pub fn adcs_request(self) -> AdcsMode {
        match self {
            Self::Startup => AdcsMode::Startup,
            Self::Standby => AdcsMode::Limited,
            Self::Detumble => AdcsMode::Detumble,
            Self::PointingStandby => AdcsMode::PointStandby,
            Self::PointingDocking => AdcsMode::PointDocking,
            Self::PointingManual => AdcsMode::PointManual,
            Self::InitializationHold => AdcsMode::Limited,
            Self::SafeHold => AdcsMode::ZeroTorque,
        }
    }
}

field_enum!(
    MissionMode,
    fallback = MissionMode::SafeHold,
    [
        MissionMode::Startup,
        MissionMode::Standby,
        MissionMode::Detumble,
        MissionMode::PointingStandby,
        MissionMode::PointingDocking,
        MissionMode::PointingManual,
        MissionMode::InitializationHold,
        MissionMode::SafeHold,
    ]
);

/// Attitude control sub-mode requested by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdcsMode {
    Startup,
    Detumble,
    Limited,
    ZeroTorque,
    ZeroL,
    PointStandby,
    PointDocking,
    PointManual,
}

field_enum!(
    AdcsMode,
    fallback = AdcsMode::ZeroTorque,
    [
        AdcsMode::Startup,
        AdcsMode::Detumble,
        AdcsMode::Limited,
        AdcsMode::ZeroTorque,
        AdcsMode::ZeroL,
        AdcsMode::PointStandby,
        AdcsMode::PointDocking,
        AdcsMode::PointManual,
    ]
);

/// Whether a device can currently produce data. Anything other than
/// `Functional` is treated as unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceHealth {
    Unknown,
    Functional,
    Faulted,
}

impl DeviceHealth {
    pub fn can_get_data(self) -> bool {
        self == Self::Functional
    }
}

field_enum!(
    DeviceHealth,
    fallback = DeviceHealth::Unknown,
    [DeviceHealth::Unknown, DeviceHealth::Functional, DeviceHealth::Faulted]
);

/// Ground override of the mission mode. `None` means no pending command.
/// Startup cannot be commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeCommand {
    None,
    Standby,
    Detumble,
    PointingStandby,
    PointingDocking,
    PointingManual,
    InitializationHold,
    SafeHold,
}

impl ModeCommand {
    pub fn target(self) -> Option<MissionMode> {
        match self {
            Self::None => None,
            Self::Standby => Some(MissionMode::Standby),
            Self::Detumble => Some(MissionMode::Detumble),
            Self::PointingStandby => Some(MissionMode::PointingStandby),
            Self::PointingDocking => Some(MissionMode::PointingDocking),
            Self::PointingManual => Some(MissionMode::PointingManual),
            Self::InitializationHold => Some(MissionMode::InitializationHold),
            Self::SafeHold => Some(MissionMode::SafeHold),
        }
    }
}

field_enum!(
    ModeCommand,
    fallback = ModeCommand::None,
    [
        ModeCommand::None,
        ModeCommand::Standby,
        ModeCommand::Detumble,
        ModeCommand::PointingStandby,
        ModeCommand::PointingDocking,
        ModeCommand::PointingManual,
        ModeCommand::InitializationHold,
        ModeCommand::SafeHold,
    ]
);

/// Why the spacecraft is in a hold. Downlinked next to the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldReason {
    None,
    AdcsUnhealthy,
    GpsUnhealthy,
    DetumbleTimeout,
    GroundCommand,
    RestoredAtBoot,
}

field_enum!(
    HoldReason,
    fallback = HoldReason::None,
    [
        HoldReason::None,
        HoldReason::AdcsUnhealthy,
        HoldReason::GpsUnhealthy,
        HoldReason::DetumbleTimeout,
        HoldReason::GroundCommand,
        HoldReason::RestoredAtBoot,
    ]
);

/// Mode group updated as one unit under a single write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionStatus {
    pub mode: MissionMode,
    pub hold_reason: HoldReason,
}

impl Default for MissionStatus {
    fn default() -> Self {
        Self {
            mode: MissionMode::Startup,
            hold_reason: HoldReason::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MissionStatusSerializer {
    mode: EnumSerializer<MissionMode>,
    reason: EnumSerializer<HoldReason>,
}

impl Serializer<MissionStatus> for MissionStatusSerializer {
    fn bit_width(&self) -> usize {
        self.mode.bit_width() + self.reason.bit_width()
    }

    fn pack(&self, value: &MissionStatus, stream: &mut BitStream<'_>) {
        self.mode.pack(&value.mode, stream);
        self.reason.pack(&value.hold_reason, stream);
    }

    fn unpack(&self, stream: &mut BitStream<'_>) -> MissionStatus {
        MissionStatus {
            mode: self.mode.unpack(stream),
            hold_reason: self.reason.unpack(stream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::FieldEnum;

    #[test]
    fn test_status_width() {
        // 8 modes + 6 reasons
        assert_eq!(MissionStatusSerializer::default().bit_width(), 3 + 3);
        assert_eq!(MissionMode::VARIANTS, 8);
        assert_eq!(DeviceHealth::VARIANTS, 3);
    }

    #[test]
    fn test_unknown_health_is_unhealthy() {
        assert!(!DeviceHealth::Unknown.can_get_data());
        assert!(!DeviceHealth::Faulted.can_get_data());
        assert!(DeviceHealth::Functional.can_get_data());
    }

    #[test]
    fn test_mode_command_targets() {
        assert_eq!(ModeCommand::None.target(), None);
        assert_eq!(ModeCommand::SafeHold.target(), Some(MissionMode::SafeHold));
        assert_eq!(MissionMode::SafeHold.adcs_request(), AdcsMode::ZeroTorque);
    }
}
