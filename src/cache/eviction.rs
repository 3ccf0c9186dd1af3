//! Oldest-first eviction planning.
//!
//! Eviction is purely age based: candidates are ordered by creation
//! timestamp and removed until the remaining size is at or below the
//! floor. Remaining TTL and access frequency play no part.

/// Slot considered by an eviction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub key: String,
    pub timestamp: i64,
    pub size: usize,
}

/// Outcome of [`plan_eviction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Keys to delete, oldest first.
    pub evict: Vec<String>,
    /// Surviving keys in timestamp order.
    pub keep: Vec<String>,
    pub freed_size: usize,
    pub remaining_size: usize,
}

/// Decides which candidates to drop so the total falls to `floor` or below.
pub fn plan_eviction(mut candidates: Vec<EvictionCandidate>, floor: usize) -> EvictionPlan {
    // stable: equal timestamps keep index order
    candidates.sort_by_key(|c| c.timestamp);

    let mut plan = EvictionPlan {
        remaining_size: candidates.iter().map(|c| c.size).sum(),
        ..Default::default()
    };

    for candidate in candidates {
        if plan.remaining_size > floor {
            plan.remaining_size -= candidate.size;
            plan.freed_size += candidate.size;
            plan.evict.push(candidate.key);
        } else {
            plan.keep.push(candidate.key);
        }
    }

    plan
}

/// Resultado de una pasada de evicción
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub evicted: usize,
    pub corrupted: usize,
    pub freed_size: usize,
    pub remaining_size: usize,
}
