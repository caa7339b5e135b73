// Clock configuration files
// RON documents mirroring ClockConfig, e.g. `(bpm: 120, signature: (numerator: 4, denominator: 4))`

use crate::sequencer::{ClockConfig, ClockError, ClockResult};
use ron::{from_str as ron_from_str, ser::PrettyConfig};
use std::path::Path;

/// Parse a clock configuration from RON text
/// Out-of-range values are reported as InvalidConfiguration
pub fn parse_config(ron_data: &str) -> ClockResult<ClockConfig> {
    ron_from_str::<ClockConfig>(ron_data).map_err(|e| match e.code {
        ron::Error::Message(message) => ClockError::InvalidConfiguration(message),
        _ => ClockError::Serialization(format!("Failed to parse clock config: {}", e)),
    })
}

/// Load a clock configuration file
pub fn load_config(path: &Path) -> ClockResult<ClockConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config = parse_config(&contents)?;
    log::info!("Loaded clock config {} from {}", config, path.display());
    Ok(config)
}

/// Serialize a clock configuration to RON text
pub fn serialize_config(config: &ClockConfig) -> ClockResult<String> {
    ron::ser::to_string_pretty(config, PrettyConfig::default()).map_err(|e| {
        ClockError::Serialization(format!("Failed to serialize clock config: {}", e))
    })
}
