//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `node.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - PollingConfig: how often the main loop polls the radio.
//!     - RadioConfig: nRF24L01+ channel, CE pin, and pipe address.
//!     - SensorsConfig: where the kernel exposes the 1-wire probes.
//!     - IndicatorConfig: GPIO pin for the indicator LED.
//!     - IdentityConfig: the static [node_id, reply_counter] pair.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub polling: PollingConfig,
    pub radio: RadioConfig,
    pub sensors: SensorsConfig,
    pub indicator: IndicatorConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    /// RF channel - must match the command unit
    pub channel: u8,
    /// chip-enable GPIO pin
    pub ce_pin: u8,
    /// 5-byte reading-pipe address - matches the command unit's tx pipe
    pub pipe_address: [u8; 5],
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorsConfig {
    /// directory where the w1_therm driver exposes probe devices
    pub devices_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndicatorConfig {
    pub gpio_pin: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    pub node_id: i32,
    pub reply_counter: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl NodeConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: NodeConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("node.toml"),
            std::path::PathBuf::from("..").join("config").join("node.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           NODE CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Node ID: {}                              │", self.identity.node_id);
        println!("│ Poll Interval: {}ms                    │", self.polling.interval_ms);
        println!("│ Radio Channel: 0x{:02X}                     │", self.radio.channel);
        println!("│ Pipe Address: {:02X?}        │", self.radio.pipe_address);
        println!("│ CE Pin: {} | LED Pin: {}                │", self.radio.ce_pin, self.indicator.gpio_pin);
        println!("│ 1-Wire Dir: {}      │", self.sensors.devices_dir);
        println!("│ Log Level: {}                         │", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            polling: PollingConfig { interval_ms: 250 },
            radio: RadioConfig {
                channel: 0x66,
                ce_pin: 25,
                // 'N', 'O', 'D', 0, 2 - node 2's pipe on the command unit
                pipe_address: [0x4E, 0x4F, 0x44, 0x00, 0x02],
            },
            sensors: SensorsConfig { devices_dir: "/sys/bus/w1/devices".to_string() },
            indicator: IndicatorConfig { gpio_pin: 17 },
            identity: IdentityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { node_id: 1, reply_counter: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}
