//! ==============================================================================
//! main.rs - remote sensor node entry point
//! ==============================================================================
//!
//! purpose:
//!     this host operates a remote-node slave device that reports
//!     temperature readings to a command unit on request over an
//!     nRF24L01+ radio link.
//!
//! responsibilities:
//!     - load configuration (radio tuning, pins, node identity)
//!     - initialize logging and the hardware abstraction layer
//!     - run the polling loop that services controller requests
//!
//! the reply protocol is pipelined by design: the node never transmits
//! on its own. each inbound request is acknowledged by the transceiver
//! with the payload staged *before* that request arrived, and servicing
//! the request stages the refreshed snapshot for the next one.
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                   node host (this file)                  │
//!     │                                                          │
//!     │   poll loop ──> RequestResponder ──> SensorAggregator    │
//!     │      (tick)       │         │              │             │
//!     │                   │         │              │             │
//!     └───────────────────┼─────────┼──────────────┼─────────────┘
//!                         │         │              │
//!                         ▼         ▼              ▼
//!                  nRF24L01+     LED pin     1-wire DS18B20 x3
//!                  (ack payload)             (temperature bus)
//!
//! hardware model:
//!     the default build runs entirely against simulated peripherals so
//!     the protocol can be exercised on any machine; the "hardware"
//!     feature swaps in rppal-backed implementations for a Raspberry Pi.
//!
//! ==============================================================================

use anyhow::Result;
use sensor_node_host::{config, hal, runtime};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Remote Sensor Node - nRF24L01+ slave device host");
    println!("===========================================================");

    // step 1: load configuration
    let config = config::NodeConfig::load_or_default();
    config.print_summary();

    // step 2: initialize logging from the configured level
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 3: bring up the peripherals
    println!("\n[STARTUP] Initializing peripherals...");
    let (bus, radio, indicator) = build_hal(&config)?;
    println!("[STARTUP] ✓ Temperature bus ready");
    println!("[STARTUP] ✓ Radio listening for command unit requests");

    // step 4: run the polling loop
    println!("\n[RUNTIME] Starting radio polling ({}ms interval)", config.polling.interval_ms);
    println!("────────────────────────────────────────────────────────────");
    runtime::NodeRuntime::new(&config, bus, radio, indicator).run().await
}

#[cfg(not(feature = "hardware"))]
fn build_hal(
    _config: &config::NodeConfig,
) -> Result<(hal::SimulatedBus, hal::SimulatedRadio, hal::SimulatedIndicator)> {
    Ok((
        hal::SimulatedBus::new(),
        hal::SimulatedRadio::new(),
        hal::SimulatedIndicator::new(),
    ))
}

#[cfg(feature = "hardware")]
fn build_hal(
    config: &config::NodeConfig,
) -> Result<(hal::W1TemperatureBus, hal::Nrf24Radio, hal::GpioIndicator)> {
    Ok((
        hal::W1TemperatureBus::new(&config.sensors),
        hal::Nrf24Radio::new(&config.radio)?,
        hal::GpioIndicator::new(&config.indicator)?,
    ))
}
