//! Downmix configuration and property access.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channels::ChannelArrangement;
use crate::primitive::AccelFlags;
use crate::types::ChannelFlags;
use crate::{DownmixError, Result, DEFAULT_MAX_ERRORS};

/// Property name for dynamic range compression.
pub const PROP_DRC: &str = "drc";

/// Property name for the forced output channel mask.
pub const PROP_REQUEST_CHANNELS: &str = "request-channels";

/// Arrangement code that means "no request" in the raw flags convention.
const NO_REQUEST_CODE: i64 = 1;

/// DTS downmix configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownmixConfig {
    /// Apply the stream's dynamic range compression.
    pub drc: bool,
    /// Forced output channel mask; `None` negotiates with downstream.
    pub request_channels: Option<ChannelFlags>,
    /// Decode error budget; negative disables the limit.
    pub max_errors: i32,
    /// CPU acceleration flags handed to the decode primitive.
    pub accel: AccelFlags,
}

impl DownmixConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable dynamic range compression.
    pub fn with_drc(mut self, drc: bool) -> Self {
        self.drc = drc;
        self
    }

    /// Force the output channel mask.
    pub fn with_request_channels(mut self, flags: ChannelFlags) -> Self {
        self.request_channels = Some(flags);
        self
    }

    /// Set the decode error budget.
    pub fn with_max_errors(mut self, max_errors: i32) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Set the acceleration flags.
    pub fn with_accel(mut self, accel: AccelFlags) -> Self {
        self.accel = accel;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(flags) = self.request_channels {
            if ChannelArrangement::from_flags(flags).is_none() {
                return Err(DownmixError::InvalidPropertyValue(PROP_REQUEST_CHANNELS.into()));
            }
        }
        Ok(())
    }

    /// Set a property by name.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match (name, value) {
            (PROP_DRC, PropertyValue::Bool(drc)) => {
                self.drc = drc;
                Ok(())
            }
            (PROP_REQUEST_CHANNELS, PropertyValue::Int(raw)) => {
                self.request_channels = request_from_raw(raw)?;
                Ok(())
            }
            (PROP_DRC | PROP_REQUEST_CHANNELS, _) => {
                Err(DownmixError::InvalidPropertyValue(name.to_string()))
            }
            _ => Err(DownmixError::UnknownProperty(name.to_string())),
        }
    }

    /// Read a property by name.
    pub fn property(&self, name: &str) -> Result<PropertyValue> {
        match name {
            PROP_DRC => Ok(PropertyValue::Bool(self.drc)),
            PROP_REQUEST_CHANNELS => Ok(PropertyValue::Int(
                self.request_channels.map_or(-1, |flags| i64::from(flags.bits())),
            )),
            _ => Err(DownmixError::UnknownProperty(name.to_string())),
        }
    }
}

impl Default for DownmixConfig {
    fn default() -> Self {
        Self {
            drc: false,
            request_channels: None,
            max_errors: DEFAULT_MAX_ERRORS,
            accel: AccelFlags::detect(),
        }
    }
}

fn request_from_raw(raw: i64) -> Result<Option<ChannelFlags>> {
    if raw < 0 || raw == NO_REQUEST_CODE {
        return Ok(None);
    }
    let bits = u32::try_from(raw)
        .map_err(|_| DownmixError::InvalidPropertyValue(PROP_REQUEST_CHANNELS.into()))?;
    let flags = ChannelFlags::from_bits(bits).layout();
    if flags.bits() != bits || ChannelArrangement::from_flags(flags).is_none() {
        return Err(DownmixError::InvalidPropertyValue(PROP_REQUEST_CHANNELS.into()));
    }
    Ok(Some(flags))
}

/// Dynamically typed property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue {
    /// Boolean property.
    Bool(bool),
    /// Integer property.
    Int(i64),
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(i64::from(value))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(value) => write!(f, "{}", value),
            PropertyValue::Int(value) => write!(f, "{}", value),
        }
    }
}

/// External switch consulted when a stream starts.
pub trait SettingsGate {
    /// Check whether downmixing is allowed.
    fn downmix_enabled(&self) -> bool;
}

impl SettingsGate for bool {
    fn downmix_enabled(&self) -> bool {
        *self
    }
}

impl<F> SettingsGate for F
where
    F: Fn() -> bool,
{
    fn downmix_enabled(&self) -> bool {
        self()
    }
}
