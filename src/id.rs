//! Request id generators used by the client side.

use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{Rng, RngCore, rngs::OsRng};

use crate::RequestId;

pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> RequestId;
}

impl<F> IdGenerator for F
where
    F: Fn() -> RequestId + Send + Sync,
{
    fn generate(&self) -> RequestId {
        self()
    }
}

/// Strictly increasing ids starting at 1.
#[derive(Debug)]
pub struct CounterIdGenerator(AtomicU64);

impl CounterIdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }
}
impl Default for CounterIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
impl IdGenerator for CounterIdGenerator {
    fn generate(&self) -> RequestId {
        let id = self.0.fetch_add(1, Ordering::Relaxed);
        RequestId::Number(id as i64)
    }
}

/// Milliseconds since the Unix epoch.
///
/// Two calls within the same millisecond return the same id.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIdGenerator;

impl IdGenerator for TimestampIdGenerator {
    fn generate(&self) -> RequestId {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        RequestId::Number(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

/// Ids drawn uniformly from `[0, limit)` by the OS random source.
#[derive(Debug, Clone, Copy)]
pub struct SecureRandomIntIdGenerator {
    limit: NonZeroU32,
}

impl SecureRandomIntIdGenerator {
    pub const DEFAULT_LIMIT: NonZeroU32 = NonZeroU32::new(65536).unwrap();

    pub fn new(limit: NonZeroU32) -> Self {
        Self { limit }
    }
    pub fn limit(&self) -> NonZeroU32 {
        self.limit
    }
}
impl Default for SecureRandomIntIdGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}
impl IdGenerator for SecureRandomIntIdGenerator {
    fn generate(&self) -> RequestId {
        RequestId::Number(OsRng.gen_range(0..self.limit.get()).into())
    }
}

/// Non-negative 63-bit ids from the OS random source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureRandomLongIdGenerator;

impl IdGenerator for SecureRandomLongIdGenerator {
    fn generate(&self) -> RequestId {
        RequestId::Number((OsRng.next_u64() >> 1) as i64)
    }
}
