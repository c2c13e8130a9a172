use thiserror::Error;

/// number of temperature channels on the 1-wire bus.
/// the controller-side wire layout is sized for exactly this many
/// readings, so it is a compile-time constant rather than config.
pub const NUM_TEMP_CHANNELS: usize = 3;

/// convert a bus reading (celsius) to the wire unit (fahrenheit).
/// the command unit expects fahrenheit; do not change this silently.
pub fn celsius_to_fahrenheit(c: f32) -> f32 {
    c * 9.0 / 5.0 + 32.0
}

// ==============================================================================
// per-channel readings
// ==============================================================================

/// one temperature slot, tagged with its freshness.
///
/// a channel that fails to answer keeps its last known value instead of
/// being zero-filled, so a partial sensor failure degrades gracefully.
/// the tag makes that staleness observable without changing the value
/// the wire payload carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelReading {
    Fresh(f32),
    Stale { last: f32, ticks_since_fresh: u32 },
}

impl ChannelReading {
    /// the fahrenheit value this slot currently reports, fresh or not
    pub fn value(&self) -> f32 {
        match *self {
            ChannelReading::Fresh(v) => v,
            ChannelReading::Stale { last, .. } => last,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, ChannelReading::Fresh(_))
    }

    /// degrade this slot after a missed read, carrying the value forward
    pub fn degrade(&self) -> ChannelReading {
        match *self {
            ChannelReading::Fresh(v) => ChannelReading::Stale { last: v, ticks_since_fresh: 1 },
            ChannelReading::Stale { last, ticks_since_fresh } => ChannelReading::Stale {
                last,
                ticks_since_fresh: ticks_since_fresh.saturating_add(1),
            },
        }
    }
}

/// snapshot of all temperature channels, in fahrenheit
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReading {
    pub channels: [ChannelReading; NUM_TEMP_CHANNELS],
}

impl NodeReading {
    /// wire size: three f32 little-endian values, no length prefix,
    /// no versioning - the command unit does a raw struct copy
    pub const WIRE_SIZE: usize = NUM_TEMP_CHANNELS * 4;

    pub fn new() -> Self {
        // channels start stale at zero until the first successful read
        Self {
            channels: [ChannelReading::Stale { last: 0.0, ticks_since_fresh: 0 }; NUM_TEMP_CHANNELS],
        }
    }

    pub fn values(&self) -> [f32; NUM_TEMP_CHANNELS] {
        let mut out = [0.0; NUM_TEMP_CHANNELS];
        for (slot, ch) in out.iter_mut().zip(self.channels.iter()) {
            *slot = ch.value();
        }
        out
    }

    /// packed serialization for the ack payload
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        for (i, ch) in self.channels.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&ch.value().to_le_bytes());
        }
        buf
    }
}

impl Default for NodeReading {
    fn default() -> Self {
        Self::new()
    }
}

// ==============================================================================
// overheat hysteresis latch
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverheatLatch {
    Normal,
    Overheat,
}

/// two-valued overheat latch with a shifting trigger threshold.
///
/// while latched, the active threshold drops to the lower value so the
/// node can confirm an overheat with cooler readings; once fewer than
/// two channels break the threshold the latch releases on the very next
/// evaluation. there is deliberately no minimum dwell time - a node with
/// one or two faulty channels recovers on its own instead of needing a
/// full power cycle, at the cost of possible tick-to-tick flapping near
/// the thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverheatState {
    pub latch: OverheatLatch,
    pub active_threshold_f: f32,
}

impl OverheatState {
    /// threshold while the latch is NORMAL (also the entry threshold)
    pub const NORMAL_THRESHOLD_F: f32 = 90.0;
    /// threshold while the latch is OVERHEAT
    pub const OVERHEAT_THRESHOLD_F: f32 = 85.0;
    /// channels that must break the active threshold to latch
    pub const TRIP_COUNT: usize = 2;

    pub fn new() -> Self {
        Self {
            latch: OverheatLatch::Normal,
            active_threshold_f: Self::NORMAL_THRESHOLD_F,
        }
    }

    /// re-evaluate the latch from this tick's broken-threshold count.
    /// uses only the current count - no history, no dwell time.
    pub fn apply(&mut self, broken_thresholds: usize) {
        if broken_thresholds >= Self::TRIP_COUNT {
            self.latch = OverheatLatch::Overheat;
            self.active_threshold_f = Self::OVERHEAT_THRESHOLD_F;
        } else {
            self.latch = OverheatLatch::Normal;
            self.active_threshold_f = Self::NORMAL_THRESHOLD_F;
        }
    }
}

impl Default for OverheatState {
    fn default() -> Self {
        Self::new()
    }
}

// ==============================================================================
// wire payloads
// ==============================================================================

/// length mismatch on a fixed-layout wire payload
#[derive(Debug, Error, PartialEq, Eq)]
#[error("payload length mismatch: expected {expected} bytes, got {actual}")]
pub struct WireLengthError {
    pub expected: usize,
    pub actual: usize,
}

/// inbound command from the command unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPayload {
    pub shutdown: bool,
}

impl CommandPayload {
    pub const WIRE_SIZE: usize = 1;

    /// decode with raw-struct semantics: exactly one byte, any nonzero
    /// value reads as true. anything but an exact-size frame is
    /// rejected so the responder can fail closed.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, WireLengthError> {
        if bytes.len() != Self::WIRE_SIZE {
            return Err(WireLengthError { expected: Self::WIRE_SIZE, actual: bytes.len() });
        }
        Ok(Self { shutdown: bytes[0] != 0 })
    }
}

/// static node identity staged as the very first ack payload:
/// [node_id, reply_counter]. the counter is a dormant seed - it is
/// staged once at startup and never incremented afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_id: i32,
    pub reply_counter: i32,
}

impl NodeIdentity {
    pub const WIRE_SIZE: usize = 8;

    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..4].copy_from_slice(&self.node_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.reply_counter.to_le_bytes());
        buf
    }
}

/// the outgoing snapshot held ready for the radio's automatic reply.
///
/// the temperature fields are overwritten on every serviced request;
/// the identity pair keeps its startup value. the transceiver hands the
/// staged bytes back with the acknowledgment it generates for the next
/// inbound message, so a request is always answered with the snapshot
/// staged before it arrived - one tick stale by design.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedReply {
    pub temperatures: NodeReading,
    pub identity: NodeIdentity,
}

impl StagedReply {
    pub fn new(identity: NodeIdentity) -> Self {
        Self { temperatures: NodeReading::new(), identity }
    }
}

// the command unit's structs are fixed-layout; a drift in these sizes
// is a wire-contract break, caught at compile time
const _: () = assert!(NodeReading::WIRE_SIZE == 12);
const _: () = assert!(NodeIdentity::WIRE_SIZE == 8);
const _: () = assert!(CommandPayload::WIRE_SIZE == 1);

// ==============================================================================
// diagnostic events
// ==============================================================================

/// loggable events emitted by the protocol core.
/// operator visibility is limited to these plus the indicator level -
/// there is no structured error channel back to the command unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// the command unit requested shutdown
    ShutdownRequested,
    /// a refresh completed with zero responding channels
    AllChannelsDown,
    /// an inbound frame did not match the command layout and was dropped
    PayloadSizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticEvent::ShutdownRequested => write!(f, "shutdown requested by command unit"),
            DiagnosticEvent::AllChannelsDown => write!(f, "no temperature channels responded"),
            DiagnosticEvent::PayloadSizeMismatch { expected, actual } => {
                write!(f, "inbound payload size mismatch (expected {expected}, got {actual})")
            }
        }
    }
}
