//! ==============================================================================
//! runtime.rs - node runtime and polling loop
//! ==============================================================================
//!
//! purpose:
//!     owns all node state explicitly - the two protocol components and
//!     the three peripheral capabilities - and drives the cooperative
//!     polling loop. there is exactly one execution context: every tick
//!     performs one non-blocking radio poll and returns, so no locking
//!     is needed anywhere in the core.
//!
//! relationships:
//!     - used by: main.rs (creates the runtime, calls run)
//!     - uses: responder.rs, aggregator.rs, hal.rs
//!
//! ==============================================================================

use anyhow::Result;
use std::time::Duration;

use crate::aggregator::SensorAggregator;
use crate::config::NodeConfig;
use crate::domain::NodeIdentity;
use crate::hal::{NodeIndicator, RadioTransceiver, TemperatureBus};
use crate::responder::{RequestResponder, TickOutcome};

/// all mutable node state, owned here and passed by reference into each
/// component call - no module-level globals
pub struct NodeRuntime<B, R, I>
where
    B: TemperatureBus,
    R: RadioTransceiver,
    I: NodeIndicator,
{
    bus: B,
    radio: R,
    indicator: I,
    aggregator: SensorAggregator,
    responder: RequestResponder,
    interval: Duration,
    show_sensor_data: bool,
}

impl<B, R, I> NodeRuntime<B, R, I>
where
    B: TemperatureBus,
    R: RadioTransceiver,
    I: NodeIndicator,
{
    pub fn new(config: &NodeConfig, bus: B, radio: R, indicator: I) -> Self {
        let identity = NodeIdentity {
            node_id: config.identity.node_id,
            reply_counter: config.identity.reply_counter,
        };
        Self {
            bus,
            radio,
            indicator,
            aggregator: SensorAggregator::new(),
            responder: RequestResponder::new(identity),
            interval: Duration::from_millis(config.polling.interval_ms),
            show_sensor_data: config.logging.show_sensor_data,
        }
    }

    /// run until Ctrl-C. the loop never blocks on the radio: each tick
    /// is one poll, serviced or not, then back to sleep.
    pub async fn run(mut self) -> Result<()> {
        // the command unit's very first request is answered with the
        // identity pair staged here, before any temperatures exist
        self.responder.stage_identity(&mut self.radio)?;

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("\n[RUNTIME] Ctrl-C received - stopping node");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
        Ok(())
    }

    fn tick(&mut self) {
        let outcome = self.responder.tick(
            &mut self.aggregator,
            &mut self.bus,
            &mut self.radio,
            &mut self.indicator,
        );

        if let TickOutcome::Serviced { shutdown } = outcome {
            if self.show_sensor_data {
                let [t1, t2, t3] = self.aggregator.reading().values();
                println!(
                    "[NODE] T1: {:.1}°F | T2: {:.1}°F | T3: {:.1}°F | latch: {:?}{}",
                    t1,
                    t2,
                    t3,
                    self.aggregator.overheat().latch,
                    if shutdown { " | SHUTDOWN" } else { "" }
                );
            }
        }
    }
}
