//! Field-level merge policies
//!
//! Every policy here is commutative and idempotent on its own, which is what
//! makes whole-entity merges order-independent.

use std::collections::HashSet;
use std::hash::Hash;

/// Monotonic lifetime counter: the larger value wins
pub fn max_wins<T: Ord + Copy>(local: T, remote: T) -> T {
    local.max(remote)
}

/// Spendable balance: the lower known value is the only one that cannot be
/// inflated by a stale replay
pub fn min_wins<T: Ord + Copy>(local: T, remote: T) -> T {
    local.min(remote)
}

/// Earliest timestamp wins
pub fn earliest_wins<T: Ord + Copy>(local: T, remote: T) -> T {
    local.min(remote)
}

/// Monotonic flag: once true, stays true
pub fn or_wins(local: bool, remote: bool) -> bool {
    local || remote
}

/// Most recent timestamp wins; a missing timestamp is older than any present one
pub fn latest_wins<T: Ord + Copy>(local: Option<T>, remote: Option<T>) -> Option<T> {
    local.max(remote)
}

/// True if `remote` should replace `local` for a group of fields gated by a
/// timestamp. The timestamp decides; on equal timestamps the rest of the
/// group (`tiebreak`) decides, so the choice never depends on arrival order.
pub fn remote_is_newer<T: Ord, K: Ord>(
    local_stamp: &Option<T>,
    local_tiebreak: K,
    remote_stamp: &Option<T>,
    remote_tiebreak: K,
) -> bool {
    match remote_stamp.cmp(local_stamp) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => remote_tiebreak > local_tiebreak,
    }
}

/// Set union by element identity: local elements keep their order, unseen
/// remote elements are appended in arrival order
pub fn union_by_id<T, K, F>(local: &[T], remote: &[T], id: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = HashSet::with_capacity(local.len() + remote.len());
    let mut merged = Vec::with_capacity(local.len() + remote.len());

    for item in local.iter().chain(remote.iter()) {
        if seen.insert(id(item)) {
            merged.push(item.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_balance_policies() {
        assert_eq!(max_wins(12, 30), 30);
        assert_eq!(min_wins(2, 0), 0);
        assert_eq!(earliest_wins(5, 3), 3);
        assert!(or_wins(false, true));
        assert!(!or_wins(false, false));
    }

    #[test]
    fn test_latest_wins_treats_none_as_oldest() {
        assert_eq!(latest_wins(None, Some(3)), Some(3));
        assert_eq!(latest_wins(Some(4), None), Some(4));
        assert_eq!(latest_wins::<i32>(None, None), None);
    }

    #[test]
    fn test_remote_is_newer() {
        assert!(remote_is_newer(&Some(1), 9, &Some(2), 0));
        assert!(!remote_is_newer(&Some(2), 0, &Some(1), 9));
        // Equal stamps fall back to the tiebreak
        assert!(remote_is_newer(&Some(2), 3, &Some(2), 4));
        assert!(!remote_is_newer(&Some(2), 4, &Some(2), 4));
        assert!(!remote_is_newer::<i32, u8>(&None, 0, &None, 0));
    }

    #[test]
    fn test_union_dedups_and_appends_in_arrival_order() {
        let local = vec!["a", "b"];
        let remote = vec!["c", "a", "d", "c"];
        assert_eq!(union_by_id(&local, &remote, |s| *s), vec!["a", "b", "c", "d"]);
    }
}
