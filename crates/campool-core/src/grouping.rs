//! Pool grouping rules.
//!
//! A [`GroupingRule`] partitions waiting riders into fixed-capacity pool
//! drafts. The dispatch store turns drafts into pools (ids, colors, codes)
//! and updates the riders. Rules are pluggable so that fixture-specific
//! conveniences such as the overflow mixing of [`RouteAffinity`] are not
//! baked into the store.
//!
//! Every rule upholds two guarantees:
//!
//! - Each draft has exactly `capacity` riders.
//! - A rider appears in at most one draft. Riders that cannot fill a whole
//!   pool are left out and stay waiting.

use campool_types::{HotspotId, Rider, RiderId};
use serde::{Deserialize, Serialize};

/// Errors produced by grouping rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupingError {
    /// Pools must hold at least one rider.
    #[error("pool capacity must be at least 1")]
    CapacityZero,
}

/// A pool before it has an id, color, or code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDraft {
    /// Members in boarding order.
    pub rider_ids: Vec<RiderId>,
    /// Nominal pickup, taken from the first member.
    pub pickup: HotspotId,
    /// Nominal drop, taken from the first member.
    pub drop: HotspotId,
    /// Distinct pickups of later members that differ from `pickup`.
    pub extra_pickups: Vec<HotspotId>,
}

impl PoolDraft {
    /// Build a draft from its members; `None` when `members` is empty.
    pub fn from_members(members: &[&Rider]) -> Option<Self> {
        let (first, rest) = members.split_first()?;
        let mut extra_pickups: Vec<HotspotId> = Vec::new();
        for rider in rest {
            if rider.pickup != first.pickup && !extra_pickups.contains(&rider.pickup) {
                extra_pickups.push(rider.pickup.clone());
            }
        }
        Some(Self {
            rider_ids: members.iter().map(|r| r.id.clone()).collect(),
            pickup: first.pickup.clone(),
            drop: first.drop.clone(),
            extra_pickups,
        })
    }
}

/// Strategy for partitioning waiting riders into pools.
pub trait GroupingRule: Send + Sync + core::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Partition `riders` (in seed order) into drafts of exactly `capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`GroupingError::CapacityZero`] if `capacity` is 0.
    fn group(&self, riders: &[Rider], capacity: usize) -> Result<Vec<PoolDraft>, GroupingError>;
}

/// Selects a built-in [`GroupingRule`] from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingRuleKind {
    /// [`RouteAffinity`].
    #[default]
    RouteAffinity,
    /// [`InOrder`].
    InOrder,
}

impl GroupingRuleKind {
    /// Instantiate the selected rule.
    pub fn build(self) -> Box<dyn GroupingRule> {
        match self {
            Self::RouteAffinity => Box::new(RouteAffinity),
            Self::InOrder => Box::new(InOrder),
        }
    }
}

// ---------------------------------------------------------------------------
// RouteAffinity
// ---------------------------------------------------------------------------

/// Groups riders who share both pickup and drop, then merges the leftovers.
///
/// 1. Bucket riders by `(pickup, drop)` in order of first appearance.
/// 2. Cut as many full pools as possible from each bucket.
/// 3. Merge partial buckets, largest first. The anchor bucket is topped up
///    with riders heading to the same drop, then with anyone else. This is
///    how an overflow rider ends up in a pool whose nominal drop differs
///    from their own.
///
/// Pools are returned in the seed order of their first member.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteAffinity;

/// Riders sharing one `(pickup, drop)` pair, with their seed indices.
struct Bucket<'a> {
    pickup: &'a HotspotId,
    drop: &'a HotspotId,
    first_index: usize,
    riders: Vec<(usize, &'a Rider)>,
}

impl GroupingRule for RouteAffinity {
    fn name(&self) -> &'static str {
        "route_affinity"
    }

    fn group(&self, riders: &[Rider], capacity: usize) -> Result<Vec<PoolDraft>, GroupingError> {
        if capacity == 0 {
            return Err(GroupingError::CapacityZero);
        }

        let mut buckets: Vec<Bucket<'_>> = Vec::new();
        for (index, rider) in riders.iter().enumerate() {
            match buckets
                .iter_mut()
                .find(|b| *b.pickup == rider.pickup && *b.drop == rider.drop)
            {
                Some(bucket) => bucket.riders.push((index, rider)),
                None => buckets.push(Bucket {
                    pickup: &rider.pickup,
                    drop: &rider.drop,
                    first_index: index,
                    riders: vec![(index, rider)],
                }),
            }
        }

        let mut pools: Vec<Vec<(usize, &Rider)>> = Vec::new();
        let mut leftovers: Vec<Bucket<'_>> = Vec::new();
        for mut bucket in buckets {
            while bucket.riders.len() >= capacity {
                let rest = bucket.riders.split_off(capacity);
                pools.push(core::mem::replace(&mut bucket.riders, rest));
            }
            if !bucket.riders.is_empty() {
                leftovers.push(bucket);
            }
        }

        // Largest partial bucket anchors the next merged pool.
        leftovers.sort_by(|a, b| {
            b.riders
                .len()
                .cmp(&a.riders.len())
                .then(a.first_index.cmp(&b.first_index))
        });
        let mut remaining: usize = leftovers.iter().map(|b| b.riders.len()).sum();
        while remaining >= capacity && !leftovers.is_empty() {
            let anchor = leftovers.remove(0);
            let drop = anchor.drop;
            let mut members = anchor.riders;
            top_up(&mut members, &mut leftovers, capacity, |b| b.drop == drop);
            top_up(&mut members, &mut leftovers, capacity, |_| true);
            remaining = remaining.saturating_sub(members.len());
            pools.push(members);
        }

        pools.sort_by_key(|members| members.first().map_or(usize::MAX, |&(index, _)| index));
        Ok(pools
            .iter()
            .filter_map(|members| {
                let riders: Vec<&Rider> = members.iter().map(|&(_, rider)| rider).collect();
                PoolDraft::from_members(&riders)
            })
            .collect())
    }
}

/// Move riders from matching buckets into `members` until it is full.
fn top_up<'a>(
    members: &mut Vec<(usize, &'a Rider)>,
    leftovers: &mut Vec<Bucket<'a>>,
    capacity: usize,
    matches: impl Fn(&Bucket<'a>) -> bool,
) {
    for bucket in leftovers.iter_mut() {
        let needed = capacity.saturating_sub(members.len());
        if needed == 0 {
            break;
        }
        if !matches(bucket) {
            continue;
        }
        let take = needed.min(bucket.riders.len());
        members.extend(bucket.riders.drain(..take));
    }
    leftovers.retain(|b| !b.riders.is_empty());
}

// ---------------------------------------------------------------------------
// InOrder
// ---------------------------------------------------------------------------

/// Chunks riders in seed order with no regard for pickup or drop.
#[derive(Debug, Clone, Copy, Default)]
pub struct InOrder;

impl GroupingRule for InOrder {
    fn name(&self) -> &'static str {
        "in_order"
    }

    fn group(&self, riders: &[Rider], capacity: usize) -> Result<Vec<PoolDraft>, GroupingError> {
        if capacity == 0 {
            return Err(GroupingError::CapacityZero);
        }
        Ok(riders
            .chunks_exact(capacity)
            .filter_map(|chunk| {
                let members: Vec<&Rider> = chunk.iter().collect();
                PoolDraft::from_members(&members)
            })
            .collect())
    }
}
