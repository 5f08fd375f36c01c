//! Short-lived cache of channel member lists.
//!
//! Write paths (message send, member add/remove) push the full active member
//! list with [`ChannelMembershipCache::put`]. Readers never touch a backing
//! store: an absent or expired snapshot reads as an empty list, and fan-out
//! then relies on the channel's group broadcast alone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::metrics::CacheMetrics;

/// Default snapshot lifetime
pub const DEFAULT_MEMBERSHIP_TTL: Duration = Duration::from_secs(30 * 60);

/// Longer lifetimes are clamped to this
pub const MAX_MEMBERSHIP_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct MemberSnapshot {
    members: Arc<Vec<String>>,
    expires_at: Instant,
}

impl MemberSnapshot {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct ChannelMembershipCache {
    snapshots: DashMap<i64, MemberSnapshot>,
    default_ttl: Duration,
}

impl ChannelMembershipCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            snapshots: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Members recorded by the latest `put`, or empty when absent or expired
    pub fn get(&self, channel_id: i64) -> Vec<String> {
        let now = Instant::now();

        if let Some(snapshot) = self.snapshots.get(&channel_id) {
            if !snapshot.is_expired(now) {
                CacheMetrics::record_hit();
                return snapshot.members.as_ref().clone();
            }
        }

        // Expired entries are dropped lazily on read
        self.snapshots
            .remove_if(&channel_id, |_, snapshot| snapshot.is_expired(now));
        CacheMetrics::record_miss();
        Vec::new()
    }

    /// Replace the snapshot for a channel
    pub fn put(&self, channel_id: i64, member_ids: Vec<String>, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl).min(MAX_MEMBERSHIP_TTL);
        let count = member_ids.len();
        let now = Instant::now();

        self.snapshots.insert(
            channel_id,
            MemberSnapshot {
                members: Arc::new(member_ids),
                expires_at: now.checked_add(ttl).unwrap_or(now),
            },
        );

        tracing::debug!(
            channel_id = channel_id,
            members = count,
            ttl_secs = ttl.as_secs(),
            "Channel membership cached"
        );
    }

    /// Forget a channel's snapshot. Unknown channels are ignored.
    pub fn invalidate(&self, channel_id: i64) {
        if self.snapshots.remove(&channel_id).is_some() {
            tracing::debug!(channel_id = channel_id, "Channel membership invalidated");
        }
    }

    /// Number of stored snapshots, expired or not
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl Default for ChannelMembershipCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMBERSHIP_TTL)
    }
}
