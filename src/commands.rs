//! Device endpoints and convenience commands.
//!
//! Thin wrappers over [`Client::get`] and [`Client::put`] for the common
//! thermostat operations. Payloads use the device's `{"value": ...}` shape.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::Client;
use crate::context::CallContext;
use crate::error::{NefitError, Result};

/// Endpoint URIs.
pub mod uris {
    /// Combined UI status.
    pub const STATUS: &str = "/ecus/rrc/uiStatus";
    /// Outdoor temperature sensor.
    pub const OUTDOOR_TEMP: &str = "/system/sensors/temperatures/outdoor_t1";

    /// System water pressure.
    pub const PRESSURE: &str = "/system/appliance/systemPressure";

    /// Hot water operation while in clock mode.
    pub const HOT_WATER_CLOCK_MODE: &str = "/dhwCircuits/dhwA/dhwOperationClockMode";
    /// Hot water operation while in manual mode.
    pub const HOT_WATER_MANUAL_MODE: &str = "/dhwCircuits/dhwA/dhwOperationManualMode";

    /// Heating user mode (`manual` / `clock`).
    pub const USER_MODE: &str = "/heatingCircuits/hc1/usermode";

    /// Manual room setpoint.
    pub const MANUAL_SETPOINT: &str = "/heatingCircuits/hc1/temperatureRoomManual";
    /// Manual override on/off.
    pub const MANUAL_TEMP_OVERRIDE_STATUS: &str = "/heatingCircuits/hc1/manualTempOverride/status";
    /// Manual override temperature.
    pub const MANUAL_TEMP_OVERRIDE_TEMP: &str =
        "/heatingCircuits/hc1/manualTempOverride/temperature";

    /// Active clock program.
    pub const ACTIVE_PROGRAM: &str = "/ecus/rrc/userprogram/activeprogram";
    /// Clock program 1.
    pub const PROGRAM_1: &str = "/ecus/rrc/userprogram/program1";
    /// Clock program 2.
    pub const PROGRAM_2: &str = "/ecus/rrc/userprogram/program2";

    /// Installation latitude.
    pub const LOCATION_LATITUDE: &str = "/system/location/latitude";
    /// Installation longitude.
    pub const LOCATION_LONGITUDE: &str = "/system/location/longitude";

    /// Appliance display code.
    pub const DISPLAY_CODE: &str = "/system/appliance/displaycode";
    /// Appliance cause code.
    pub const CAUSE_CODE: &str = "/system/appliance/causecode";

    /// Gas usage recordings.
    pub const GAS_USAGE: &str = "/ecus/rrc/recordings/gasusage";

    /// Fireplace function.
    pub const FIREPLACE_MODE: &str = "/ecus/rrc/userprogram/fireplacefunction";

    /// Actual supply temperature.
    pub const SUPPLY_TEMP: &str = "/heatingCircuits/hc1/actualSupplyTemperature";
}

/// Heating schedule mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserMode {
    /// Fixed manual setpoint.
    Manual,
    /// Follow the clock program.
    Clock,
}

impl UserMode {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserMode::Manual => "manual",
            UserMode::Clock => "clock",
        }
    }

    /// Hot water endpoint that applies in this mode.
    pub fn hot_water_uri(&self) -> &'static str {
        match self {
            UserMode::Manual => uris::HOT_WATER_MANUAL_MODE,
            UserMode::Clock => uris::HOT_WATER_CLOCK_MODE,
        }
    }
}

impl std::str::FromStr for UserMode {
    type Err = NefitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(UserMode::Manual),
            "clock" => Ok(UserMode::Clock),
            other => Err(NefitError::Protocol(format!(
                "invalid user mode: {} (must be 'manual' or 'clock')",
                other
            ))),
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

impl Client {
    /// Set the room temperature and switch on the manual override.
    ///
    /// Issues three PUTs in order: manual setpoint, override status `on`,
    /// override temperature. Stops at the first failure.
    pub async fn set_temperature(&self, ctx: &CallContext, temperature: f64) -> Result<()> {
        let setpoint = json!({ "value": temperature });

        self.put(ctx, uris::MANUAL_SETPOINT, &setpoint).await?;
        self.put(ctx, uris::MANUAL_TEMP_OVERRIDE_STATUS, &json!({ "value": "on" }))
            .await?;
        self.put(ctx, uris::MANUAL_TEMP_OVERRIDE_TEMP, &setpoint)
            .await
    }

    /// Current heating user mode.
    pub async fn user_mode(&self, ctx: &CallContext) -> Result<UserMode> {
        let payload = self.get(ctx, uris::USER_MODE).await?;
        let mode = payload
            .value()
            .and_then(|v| v.as_str())
            .ok_or_else(|| NefitError::Protocol("user mode response missing 'value'".to_string()))?;
        mode.parse()
    }

    /// Switch the heating user mode.
    pub async fn set_user_mode(&self, ctx: &CallContext, mode: UserMode) -> Result<()> {
        self.put(ctx, uris::USER_MODE, &json!({ "value": mode })).await
    }

    /// Whether hot water supply is on for the current user mode.
    pub async fn hot_water_supply(&self, ctx: &CallContext) -> Result<bool> {
        let mode = self.user_mode(ctx).await?;
        let payload = self.get(ctx, mode.hot_water_uri()).await?;
        Ok(payload.value().and_then(|v| v.as_str()) == Some("on"))
    }

    /// Switch hot water supply on or off for the current user mode.
    pub async fn set_hot_water_supply(&self, ctx: &CallContext, enabled: bool) -> Result<()> {
        let mode = self.user_mode(ctx).await?;
        self.put(ctx, mode.hot_water_uri(), &json!({ "value": on_off(enabled) }))
            .await
    }
}
