//! ==============================================================================
//! aggregator.rs - temperature aggregation and overheat hysteresis
//! ==============================================================================
//!
//! purpose:
//!     owns the node's temperature snapshot and the overheat latch.
//!     each refresh queries every channel on the bus, converts responding
//!     readings to fahrenheit, carries the previous value for channels
//!     that stay silent, and re-evaluates the hysteresis latch from this
//!     refresh's readings alone.
//!
//! relationships:
//!     - used by: responder.rs (refreshed once per serviced request)
//!     - uses: hal.rs (TemperatureBus capability)
//!
//! ==============================================================================

use crate::domain::{celsius_to_fahrenheit, ChannelReading, NodeReading, OverheatState, NUM_TEMP_CHANNELS};
use crate::hal::TemperatureBus;

/// what one refresh observed, for the caller's diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    /// channels that answered this refresh
    pub fresh_channels: usize,
    /// responding channels at or above the active threshold
    pub broken_thresholds: usize,
}

pub struct SensorAggregator {
    reading: NodeReading,
    overheat: OverheatState,
}

impl SensorAggregator {
    pub fn new() -> Self {
        Self { reading: NodeReading::new(), overheat: OverheatState::new() }
    }

    /// query every channel once and update the snapshot in place.
    ///
    /// a channel that does not respond keeps its previous value - the
    /// caller cannot tell "unchanged reading" from "no response" through
    /// the snapshot itself, only through the freshness tags and the
    /// returned summary. sensor non-response never raises an error.
    pub fn refresh(&mut self, bus: &mut dyn TemperatureBus) -> RefreshSummary {
        let threshold = self.overheat.active_threshold_f;
        let handles = bus.enumerate_channels();

        let mut fresh_channels = 0;
        let mut broken_thresholds = 0;

        for slot in 0..NUM_TEMP_CHANNELS {
            let response = handles
                .iter()
                .find(|h| h.index() == slot)
                .and_then(|&h| bus.read(h));

            match response {
                Some(celsius) => {
                    let fahrenheit = celsius_to_fahrenheit(celsius);
                    self.reading.channels[slot] = ChannelReading::Fresh(fahrenheit);
                    fresh_channels += 1;
                    // only readings taken this refresh count toward the
                    // latch; stale carries are sensor history, not heat
                    if fahrenheit >= threshold {
                        broken_thresholds += 1;
                    }
                }
                None => {
                    self.reading.channels[slot] = self.reading.channels[slot].degrade();
                    tracing::debug!("temperature channel {} did not respond, carrying last value", slot);
                }
            }
        }

        self.overheat.apply(broken_thresholds);
        tracing::trace!(
            "refresh: {:?} F, latch {:?}, threshold {}",
            self.reading.values(),
            self.overheat.latch,
            self.overheat.active_threshold_f
        );

        RefreshSummary { fresh_channels, broken_thresholds }
    }

    pub fn reading(&self) -> &NodeReading {
        &self.reading
    }

    pub fn overheat(&self) -> &OverheatState {
        &self.overheat
    }
}

impl Default for SensorAggregator {
    fn default() -> Self {
        Self::new()
    }
}
