//! Typed arguments for the climate convenience commands.
//!
//! The control channel is stringly typed (`Attr ID="..." Value="..."`); the
//! enums here pin down the values the targeted appliance actually accepts so
//! callers cannot send a typo.

/// Attribute id controlling the power relay.
pub const ATTR_POWER: &str = "AC_FUN_POWER";

/// Attribute id controlling the temperature setpoint (degrees Celsius).
pub const ATTR_TEMPERATURE_SET: &str = "AC_FUN_TEMPSET";

/// Attribute id controlling the operation mode.
pub const ATTR_OPERATION_MODE: &str = "AC_FUN_OPMODE";

/// Attribute id controlling the fan level.
pub const ATTR_WIND_LEVEL: &str = "AC_FUN_WINDLEVEL";

/// Operation modes understood by the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Auto,
    Cool,
    Dry,
    Wind,
    Heat,
}

impl OperationMode {
    /// The wire value for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationMode::Auto => "Auto",
            OperationMode::Cool => "Cool",
            OperationMode::Dry => "Dry",
            OperationMode::Wind => "Wind",
            OperationMode::Heat => "Heat",
        }
    }
}

/// Fan levels understood by the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanLevel {
    Auto,
    Low,
    Mid,
    High,
    Turbo,
}

impl FanLevel {
    /// The wire value for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            FanLevel::Auto => "Auto",
            FanLevel::Low => "Low",
            FanLevel::Mid => "Mid",
            FanLevel::High => "High",
            FanLevel::Turbo => "Turbo",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values_match_vendor_spelling() {
        assert_eq!(OperationMode::Cool.as_str(), "Cool");
        assert_eq!(FanLevel::Turbo.as_str(), "Turbo");
    }
}
