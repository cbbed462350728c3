//! Unix timestamp type shared by acceptance messages, deposit claims, and oracle queries.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::time::{SystemTime, SystemTimeError};

/// A Unix timestamp represented as a `u64`, used for `payment_ts`, `closure_time`,
/// and the block-time conversion windows Bankster hands to the chain oracle.
///
/// Serialized as a stringified integer to avoid precision loss in JSON.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(pub u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl From<UnixTimestamp> for U256 {
    fn from(value: UnixTimestamp) -> Self {
        U256::from(value.0)
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0 + rhs)
    }
}

impl Sub for UnixTimestamp {
    type Output = i64;

    fn sub(self, rhs: Self) -> i64 {
        self.0 as i64 - rhs.0 as i64
    }
}

impl UnixTimestamp {
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        Ok(Self(now))
    }

    pub fn seconds_since_epoch(&self) -> u64 {
        self.0
    }

    /// Converts a timestamp window into an oracle block-range window, given the
    /// chain's average block time. Used by `settle_overdue_acceptances` to turn
    /// `payment_ts` bounds into `from_block`/`to_block` for `get_batch_transfers`
    /// and `get_forced_payments`.
    ///
    /// `current_time` is supplied by the caller rather than read from the wall clock here,
    /// so the block-window computation stays deterministic and testable.
    pub fn blocks_before(
        &self,
        average_block_time: u64,
        reference_block: u64,
        current_time: UnixTimestamp,
    ) -> u64 {
        if average_block_time == 0 {
            return reference_block;
        }
        let elapsed = current_time.0.saturating_sub(self.0);
        let blocks_elapsed = elapsed / average_block_time;
        reference_block.saturating_sub(blocks_elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_string() {
        let ts = UnixTimestamp(1_700_000_000);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"1700000000\"");
    }

    #[test]
    fn round_trips_through_json() {
        let ts = UnixTimestamp(42);
        let json = serde_json::to_string(&ts).unwrap();
        let back: UnixTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, back);
    }

    #[test]
    fn ordering_matches_integer_ordering() {
        assert!(UnixTimestamp(100) < UnixTimestamp(200));
    }

    #[test]
    fn blocks_before_steps_back_by_elapsed_time_over_block_time() {
        let t0 = UnixTimestamp(1_000);
        let now = UnixTimestamp(1_120);
        // 120s elapsed at 12s/block is 10 blocks.
        assert_eq!(t0.blocks_before(12, 500, now), 490);
    }

    #[test]
    fn blocks_before_saturates_at_zero() {
        let t0 = UnixTimestamp(1_000);
        let now = UnixTimestamp(100_000);
        assert_eq!(t0.blocks_before(12, 5, now), 0);
    }

    #[test]
    fn blocks_before_returns_reference_block_when_average_block_time_is_zero() {
        let t0 = UnixTimestamp(1_000);
        let now = UnixTimestamp(2_000);
        assert_eq!(t0.blocks_before(0, 42, now), 42);
    }
}
