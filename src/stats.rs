//! Pool accounting snapshots.

/// Point-in-time view of a pool's accounting counters.
///
/// Obtained from [`Pool::stats`](crate::Pool::stats).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    /// Bytes handed out since creation or the last clear.
    pub allocated_bytes: usize,
    /// Bytes returned through the large-block freelist.
    pub returned_bytes: usize,
    /// Debug tag attached at creation.
    pub tag: Option<&'static str>,
    /// Containers currently leasing memory from the pool.
    pub lease_count: usize,
}
