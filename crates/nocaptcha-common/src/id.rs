//! Monotonic, time-ordered 128-bit identifiers.
//!
//! Layout (most significant bit first):
//! ```text
//! | 48 bits unix millis | 4 bits version | 12 bits subsec | 2 bits variant | 62 bits random |
//! ```
//! The version nibble sits where RFC 9562 puts it for UUIDv7, so every
//! identifier is also a valid v7 UUID. Since it is constant, ordering by the
//! raw value is ordering by `(timestamp, subsec)`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Version tag stored in every identifier
pub const VERSION: u8 = 0x7;

/// Variant pattern stored in the top two bits of the low half
pub const VARIANT: u8 = 0b10;

/// Number of distinct subsec values per millisecond (2^12)
pub const MAX_SUBSEC: u64 = 4096;

const TIMESTAMP_MASK: u64 = 0xFFFF_FFFF_FFFF;
const SEQUENCE_BITS: u32 = 16;
const SEQUENCE_MASK: u64 = 0xFFFF;
const RANDOM_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

/// A generated identifier. Immutable and `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(u128);

impl Identifier {
    /// Pack the four logical fields into an identifier.
    fn pack(timestamp_ms: u64, subsec: u16, random: u64) -> Self {
        let msb = ((timestamp_ms & TIMESTAMP_MASK) << 16)
            | (u64::from(VERSION) << 12)
            | (u64::from(subsec) & 0x0FFF);
        let lsb = (u64::from(VARIANT) << 62) | (random & RANDOM_MASK);

        Self((u128::from(msb) << 64) | u128::from(lsb))
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    fn msb(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    fn lsb(&self) -> u64 {
        self.0 as u64
    }

    /// Milliseconds since the unix epoch (48 bits)
    pub fn timestamp_ms(&self) -> u64 {
        self.msb() >> 16
    }

    /// Intra-millisecond sequence (12 bits)
    pub fn subsec(&self) -> u16 {
        (self.msb() & 0x0FFF) as u16
    }

    pub fn version(&self) -> u8 {
        ((self.msb() >> 12) & 0xF) as u8
    }

    pub fn variant(&self) -> u8 {
        (self.lsb() >> 62) as u8
    }

    /// The 62 random bits
    pub fn random_bits(&self) -> u64 {
        self.lsb() & RANDOM_MASK
    }

    /// Big-endian byte representation
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// URL-safe, unpadded base64 of the big-endian bytes.
    ///
    /// This is the form handed to clients as the WebAuthn user handle and
    /// used as the session key.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            ((v >> 80) & 0xFFFF) as u16,
            ((v >> 64) & 0xFFFF) as u16,
            ((v >> 48) & 0xFFFF) as u16,
            (v & 0xFFFF_FFFF_FFFF) as u64,
        )
    }
}

impl From<Identifier> for u128 {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

/// Generates strictly ordered identifiers.
///
/// The last timestamp and the sequence counter live in one atomic word
/// (`timestamp << 16 | sequence`) and move together through a CAS loop,
/// so two callers can never be handed the same pair. A clock that steps
/// backwards is clamped to the last seen timestamp.
pub struct IdGenerator {
    state: AtomicU64,
    clock: Clock,
}

impl IdGenerator {
    /// Generator backed by the system wall clock
    pub fn new() -> Self {
        Self::with_clock(system_millis)
    }

    /// Generator backed by a custom millisecond clock
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        Self {
            state: AtomicU64::new(0),
            clock: Box::new(clock),
        }
    }

    /// Mint the next identifier. Never blocks, never fails.
    pub fn next(&self) -> Identifier {
        let (timestamp_ms, sequence) = self.advance((self.clock)() & TIMESTAMP_MASK);
        let subsec = (sequence % MAX_SUBSEC) as u16;
        let random: u64 = rand::rng().random();

        Identifier::pack(timestamp_ms, subsec, random)
    }

    /// Returns the `(timestamp, sequence)` pair reserved for this call.
    fn advance(&self, now: u64) -> (u64, u64) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let last = current >> SEQUENCE_BITS;
            let sequence = current & SEQUENCE_MASK;

            let next = if now > last {
                now << SEQUENCE_BITS
            } else {
                (last << SEQUENCE_BITS) | ((sequence + 1) & SEQUENCE_MASK)
            };

            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (next >> SEQUENCE_BITS, next & SEQUENCE_MASK),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Relaxed);
        f.debug_struct("IdGenerator")
            .field("last_timestamp_ms", &(state >> SEQUENCE_BITS))
            .field("sequence", &(state & SEQUENCE_MASK))
            .finish()
    }
}

fn system_millis() -> u64 {
    // Pre-epoch clocks clamp to zero; the generator then holds its last value.
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
