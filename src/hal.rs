//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the node's three peripherals: the
//!     1-wire temperature bus, the nRF24L01+ radio transceiver, and the
//!     indicator LED. abstracts away the difference between running on a
//!     real Raspberry Pi (using `rppal` + sysfs) and a development machine
//!     (using simulated peripherals).
//!
//! design philosophy:
//!     - "Compile Anywhere": The host should compile on Windows/Mac/Linux.
//!     - "Single Writer": The core is the only writer of staged payloads;
//!       the transceiver is expected to latch a staged payload atomically
//!       when it generates an acknowledgment. stage_outgoing only
//!       overwrites the pending buffer, it never transmits by itself.
//!     - "Non-Blocking": every call completes immediately; message_available
//!       is a poll, never a wait.
//!
//! relationships:
//!     - used by: aggregator.rs and responder.rs (protocol core)
//!     - used by: runtime.rs (owns the concrete implementations)
//!     - uses: rppal + /sys/bus/w1 (on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;

use crate::domain::DiagnosticEvent;

/// opaque handle for one temperature channel discovered on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle {
    index: usize,
}

impl ChannelHandle {
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// the temperature bus capability: N sensor channels, each of which may
/// or may not answer on any given query. readings are degrees celsius;
/// conversion to the wire unit happens in the aggregator.
///
/// contract: both calls are bounded-time and synchronous. a channel
/// missing from enumeration and a channel that enumerates but returns
/// `None` are both "no response".
pub trait TemperatureBus {
    fn enumerate_channels(&mut self) -> Vec<ChannelHandle>;
    fn read(&mut self, channel: ChannelHandle) -> Option<f32>;
}

/// the radio transceiver capability.
///
/// contract: `stage_outgoing` overwrites the payload the transceiver
/// will attach to the acknowledgment of the *next* inbound message, not
/// the current one. the hardware must copy the staged buffer atomically
/// when it acknowledges; the core relies on that and does not enforce it.
pub trait RadioTransceiver {
    /// non-blocking poll for an inbound message
    fn message_available(&mut self) -> bool;
    /// read one inbound message into `buf`, returning its actual length
    fn read_inbound(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// preload the next automatic reply, overwriting whatever was staged
    fn stage_outgoing(&mut self, payload: &[u8]) -> Result<()>;
}

/// the actuator/diagnostic output capability: one indicator LED plus a
/// sink for loggable protocol events.
pub trait NodeIndicator {
    fn set_indicator(&mut self, on: bool);
    fn log_event(&mut self, event: DiagnosticEvent);
}

/// nRF24L01+ payloads are at most 32 bytes; inbound reads are buffered
/// at this size regardless of the expected command layout.
pub const MAX_PAYLOAD_SIZE: usize = 32;

// ==============================================================================
// SIMULATED IMPLEMENTATION (For Non-Hardware Build)
// ==============================================================================

#[cfg(not(feature = "hardware"))]
pub use simulated::{SimulatedBus, SimulatedIndicator, SimulatedRadio};

#[cfg(not(feature = "hardware"))]
mod simulated {
    use super::*;
    use crate::domain::NUM_TEMP_CHANNELS;

    /// three synthetic channels wobbling around room temperature.
    /// channel 2 periodically drops off the bus so the stale-carry path
    /// gets exercised in dry runs.
    pub struct SimulatedBus {
        tick: u32,
    }

    impl SimulatedBus {
        pub fn new() -> Self {
            tracing::info!("Using SIMULATED temperature bus (no hardware access)");
            Self { tick: 0 }
        }
    }

    impl TemperatureBus for SimulatedBus {
        fn enumerate_channels(&mut self) -> Vec<ChannelHandle> {
            self.tick = self.tick.wrapping_add(1);
            (0..NUM_TEMP_CHANNELS).map(ChannelHandle::new).collect()
        }

        fn read(&mut self, channel: ChannelHandle) -> Option<f32> {
            if channel.index() == 2 && self.tick % 7 == 0 {
                tracing::debug!("[SIM BUS] channel {} not responding", channel.index());
                return None;
            }
            // triangle wobble, +-1.5C around a per-channel base
            let base = [21.0, 23.5, 19.0][channel.index() % NUM_TEMP_CHANNELS];
            let phase = (self.tick % 12) as f32;
            let wobble = (phase - 6.0).abs() / 4.0;
            let celsius = base + wobble;
            tracing::debug!("[SIM BUS] channel {} -> {:.2} C", channel.index(), celsius);
            Some(celsius)
        }
    }

    /// loopback radio that fabricates a request from the command unit
    /// every few polls, with an occasional shutdown command mixed in.
    pub struct SimulatedRadio {
        polls: u32,
        requests: u32,
        staged: Vec<u8>,
    }

    impl SimulatedRadio {
        pub fn new() -> Self {
            tracing::info!("Using SIMULATED radio transceiver (no hardware access)");
            Self { polls: 0, requests: 0, staged: Vec::new() }
        }

        /// the payload the fake transceiver would attach to its next ack
        pub fn staged(&self) -> &[u8] {
            &self.staged
        }
    }

    impl RadioTransceiver for SimulatedRadio {
        fn message_available(&mut self) -> bool {
            self.polls = self.polls.wrapping_add(1);
            self.polls % 8 == 0
        }

        fn read_inbound(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.requests = self.requests.wrapping_add(1);
            // every sixth request asks for shutdown, then the command
            // unit "changes its mind" on the next one
            let shutdown = self.requests % 6 == 0;
            buf[0] = shutdown as u8;
            tracing::debug!("[SIM RADIO] inbound request (shutdown={})", shutdown);
            Ok(1)
        }

        fn stage_outgoing(&mut self, payload: &[u8]) -> Result<()> {
            self.staged = payload.to_vec();
            tracing::debug!("[SIM RADIO] staged {} byte ack payload: {:02X?}", payload.len(), payload);
            Ok(())
        }
    }

    /// logs indicator changes and events instead of driving a pin
    pub struct SimulatedIndicator {
        on: bool,
    }

    impl SimulatedIndicator {
        pub fn new() -> Self {
            Self { on: false }
        }
    }

    impl NodeIndicator for SimulatedIndicator {
        fn set_indicator(&mut self, on: bool) {
            if self.on != on {
                tracing::info!("[SIM LED] indicator {}", if on { "ON" } else { "OFF" });
            }
            self.on = on;
        }

        fn log_event(&mut self, event: DiagnosticEvent) {
            tracing::warn!("[EVENT] {}", event);
        }
    }
}

// ==============================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================

#[cfg(feature = "hardware")]
pub use hardware::{GpioIndicator, Nrf24Radio, W1TemperatureBus};

#[cfg(feature = "hardware")]
mod hardware {
    use super::*;
    use crate::config::{IndicatorConfig, RadioConfig, SensorsConfig};
    use anyhow::{anyhow, Context};
    use rppal::gpio::{Gpio, OutputPin};
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
    use std::path::PathBuf;

    /// DS18B20 sensors on the kernel 1-wire bus. the w1_therm driver
    /// exposes each probe as a `28-*` device directory with a
    /// `temperature` file holding millidegrees celsius.
    pub struct W1TemperatureBus {
        devices_dir: PathBuf,
        device_paths: Vec<PathBuf>,
    }

    impl W1TemperatureBus {
        pub fn new(config: &SensorsConfig) -> Self {
            tracing::info!("Using 1-wire temperature bus at {}", config.devices_dir);
            Self { devices_dir: PathBuf::from(&config.devices_dir), device_paths: Vec::new() }
        }
    }

    impl TemperatureBus for W1TemperatureBus {
        fn enumerate_channels(&mut self) -> Vec<ChannelHandle> {
            // re-scan every refresh: probes can drop off the bus and
            // come back without a restart
            let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.devices_dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| {
                            p.file_name()
                                .and_then(|n| n.to_str())
                                .map(|n| n.starts_with("28-"))
                                .unwrap_or(false)
                        })
                        .collect()
                })
                .unwrap_or_default();
            dirs.sort();
            dirs.truncate(crate::domain::NUM_TEMP_CHANNELS);
            self.device_paths = dirs;
            (0..self.device_paths.len()).map(ChannelHandle::new).collect()
        }

        fn read(&mut self, channel: ChannelHandle) -> Option<f32> {
            let path = self.device_paths.get(channel.index())?.join("temperature");
            std::fs::read_to_string(path)
                .ok()
                .and_then(|s| s.trim().parse::<f32>().ok())
                .map(|millidegrees| millidegrees / 1000.0)
        }
    }

    // nRF24L01+ SPI commands and registers (the subset this host needs)
    const CMD_R_REGISTER: u8 = 0x00;
    const CMD_W_REGISTER: u8 = 0x20;
    const CMD_R_RX_PL_WID: u8 = 0x60;
    const CMD_R_RX_PAYLOAD: u8 = 0x61;
    const CMD_FLUSH_RX: u8 = 0xE2;
    const CMD_W_ACK_PAYLOAD_P1: u8 = 0xA9;
    const CMD_NOP: u8 = 0xFF;

    const REG_CONFIG: u8 = 0x00;
    const REG_EN_AA: u8 = 0x01;
    const REG_RF_CH: u8 = 0x05;
    const REG_RF_SETUP: u8 = 0x06;
    const REG_STATUS: u8 = 0x07;
    const REG_RX_ADDR_P1: u8 = 0x0B;
    const REG_FIFO_STATUS: u8 = 0x17;
    const REG_DYNPD: u8 = 0x1C;
    const REG_FEATURE: u8 = 0x1D;

    const CONFIG_PWR_UP_PRIM_RX: u8 = 0b0000_0011; // PWR_UP | PRIM_RX
    const RF_SETUP_250KBPS_PA_LOW: u8 = 0b0010_0010; // RF_DR_LOW | PA -12dBm
    const FEATURE_ACK_PAYLOAD: u8 = 0b0000_0110; // EN_DPL | EN_ACK_PAY
    const STATUS_RX_DR: u8 = 0b0100_0000;
    const FIFO_RX_EMPTY: u8 = 0b0000_0001;

    /// nRF24L01+ in primary-receive mode with acknowledgment payloads
    /// enabled, matching the command unit's transmit configuration:
    /// 250 kbps for range, low PA, one reading pipe on the node address.
    pub struct Nrf24Radio {
        spi: Spi,
        ce: OutputPin,
    }

    impl Nrf24Radio {
        pub fn new(config: &RadioConfig) -> Result<Self> {
            let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_000_000, Mode::Mode0)
                .context("failed to open SPI bus for nRF24L01+")?;
            let gpio = Gpio::new().context("failed to open GPIO for radio CE line")?;
            let mut ce = gpio.get(config.ce_pin)?.into_output();
            // keep the radio listening if this handle is dropped mid-run
            ce.set_reset_on_drop(false);
            ce.set_low();

            let mut radio = Self { spi, ce };
            radio.write_register(REG_RF_SETUP, RF_SETUP_250KBPS_PA_LOW)?;
            radio.write_register(REG_RF_CH, config.channel)?;
            radio.write_bytes(CMD_W_REGISTER | REG_RX_ADDR_P1, &config.pipe_address)?;
            radio.write_register(REG_EN_AA, 0b0000_0011)?; // auto-ack pipes 0+1
            radio.write_register(REG_FEATURE, FEATURE_ACK_PAYLOAD)?;
            radio.write_register(REG_DYNPD, 0b0000_0010)?; // dynamic payload on pipe 1
            radio.write_register(REG_CONFIG, CONFIG_PWR_UP_PRIM_RX)?;
            radio.command(CMD_FLUSH_RX)?;

            // CE high = start listening
            radio.ce.set_high();
            tracing::info!(
                "nRF24L01+ listening on channel 0x{:02X}, pipe address {:02X?}",
                config.channel,
                config.pipe_address
            );
            Ok(radio)
        }

        fn transfer(&mut self, write: &[u8]) -> Result<Vec<u8>> {
            let mut read = vec![0u8; write.len()];
            self.spi.transfer(&mut read, write)?;
            Ok(read)
        }

        fn command(&mut self, cmd: u8) -> Result<()> {
            self.transfer(&[cmd])?;
            Ok(())
        }

        fn read_register(&mut self, reg: u8) -> Result<u8> {
            let response = self.transfer(&[CMD_R_REGISTER | reg, CMD_NOP])?;
            Ok(response[1])
        }

        fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
            self.transfer(&[CMD_W_REGISTER | reg, value])?;
            Ok(())
        }

        fn write_bytes(&mut self, cmd: u8, bytes: &[u8]) -> Result<()> {
            let mut frame = Vec::with_capacity(1 + bytes.len());
            frame.push(cmd);
            frame.extend_from_slice(bytes);
            self.transfer(&frame)?;
            Ok(())
        }
    }

    impl RadioTransceiver for Nrf24Radio {
        fn message_available(&mut self) -> bool {
            self.read_register(REG_FIFO_STATUS)
                .map(|fifo| fifo & FIFO_RX_EMPTY == 0)
                .unwrap_or(false)
        }

        fn read_inbound(&mut self, buf: &mut [u8]) -> Result<usize> {
            let width = self.transfer(&[CMD_R_RX_PL_WID, CMD_NOP])?[1] as usize;
            if width == 0 || width > MAX_PAYLOAD_SIZE {
                // corrupt width marks a garbled packet; flush and bail
                self.command(CMD_FLUSH_RX)?;
                return Err(anyhow!("invalid RX payload width {}", width));
            }
            let mut frame = vec![CMD_NOP; width + 1];
            frame[0] = CMD_R_RX_PAYLOAD;
            let response = self.transfer(&frame)?;
            let n = width.min(buf.len());
            buf[..n].copy_from_slice(&response[1..n + 1]);
            // clear the data-ready flag
            self.write_register(REG_STATUS, STATUS_RX_DR)?;
            Ok(n)
        }

        fn stage_outgoing(&mut self, payload: &[u8]) -> Result<()> {
            if payload.len() > MAX_PAYLOAD_SIZE {
                return Err(anyhow!("ack payload too large: {} bytes", payload.len()));
            }
            self.write_bytes(CMD_W_ACK_PAYLOAD_P1, payload)
        }
    }

    /// indicator LED on a GPIO pin
    pub struct GpioIndicator {
        pin: OutputPin,
    }

    impl GpioIndicator {
        pub fn new(config: &IndicatorConfig) -> Result<Self> {
            let gpio = Gpio::new().context("failed to open GPIO for indicator LED")?;
            let mut pin = gpio.get(config.gpio_pin)?.into_output();
            pin.set_reset_on_drop(false);
            Ok(Self { pin })
        }
    }

    impl NodeIndicator for GpioIndicator {
        fn set_indicator(&mut self, on: bool) {
            if on {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
        }

        fn log_event(&mut self, event: DiagnosticEvent) {
            tracing::warn!("[EVENT] {}", event);
        }
    }
}
