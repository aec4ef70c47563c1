//! Rank helpers for sibling ordering
//!
//! Ranks are only compared within one container. Ties are broken by id so
//! every client sorts a container the same way.

use crate::model::{Folder, Item};

/// Anything that carries a sibling rank
pub trait Ranked {
    fn rank(&self) -> i64;
    fn tie_break(&self) -> &str;
}

impl Ranked for Item {
    fn rank(&self) -> i64 {
        self.order
    }

    fn tie_break(&self) -> &str {
        self.id.as_str()
    }
}

impl Ranked for Folder {
    fn rank(&self) -> i64 {
        self.order
    }

    fn tie_break(&self) -> &str {
        self.id.as_str()
    }
}

impl<T: Ranked> Ranked for &T {
    fn rank(&self) -> i64 {
        (**self).rank()
    }

    fn tie_break(&self) -> &str {
        (**self).tie_break()
    }
}

/// Sort siblings ascending by `(order, id)`
pub fn sort_ranked<T: Ranked>(siblings: &mut [T]) {
    siblings.sort_by(|a, b| {
        a.rank()
            .cmp(&b.rank())
            .then_with(|| a.tie_break().cmp(b.tie_break()))
    });
}

/// Largest rank a backend accepts (2^53 - 1, exact as a JSON double)
pub const MAX_ORDER: i64 = (1 << 53) - 1;
pub const MIN_ORDER: i64 = -MAX_ORDER;

pub const fn order_in_range(order: i64) -> bool {
    order >= MIN_ORDER && order <= MAX_ORDER
}

/// Rank that places a new sibling after all others (0 for an empty container)
///
/// Saturates at `i64::MAX`; callers check the result with [`order_in_range`].
pub fn next_order<I: IntoIterator<Item = i64>>(orders: I) -> i64 {
    orders.into_iter().max().map_or(0, |max| max.saturating_add(1))
}

/// Rank that places a sibling before all others (0 for an empty container)
pub fn front_order<I: IntoIterator<Item = i64>>(orders: I) -> i64 {
    orders.into_iter().min().map_or(0, |min| min.saturating_sub(1))
}

pub fn is_strictly_increasing(orders: &[i64]) -> bool {
    orders.windows(2).all(|pair| pair[0] < pair[1])
}

/// Remove the element at `from` and reinsert it at `to`
///
/// `to` is an index into the original list, clamped to the shortened one.
pub fn list_move<T>(list: &mut Vec<T>, from: usize, to: usize) {
    if from >= list.len() || from == to {
        return;
    }
    let moved = list.remove(from);
    let to = to.min(list.len());
    list.insert(to, moved);
}

/// Ranks for the members of a deleted folder once they land in root
///
/// Members keep their relative order (index `i` of the folder's sorted
/// members gets the `i`-th rank) and are appended after the root items.
pub fn reparent_orders<I>(root_orders: I, member_count: usize) -> Vec<i64>
where
    I: IntoIterator<Item = i64>,
{
    let base = next_order(root_orders);
    (0_i64..).take(member_count).map(|offset| base.saturating_add(offset)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    fn item(id: &str, order: i64) -> Item {
        Item {
            id: ItemId::from(id),
            title: id.to_string(),
            icon: String::new(),
            folder_id: None,
            order,
        }
    }

    #[test]
    fn next_and_front_order_handle_empty_containers() {
        assert_eq!(next_order(Vec::new()), 0);
        assert_eq!(front_order(Vec::new()), 0);
        assert_eq!(next_order([4, 1, 9]), 10);
        assert_eq!(front_order([4, 1, 9]), 0);
        assert_eq!(front_order([-2, 5]), -3);
    }

    #[test]
    fn rank_helpers_saturate_at_the_extremes() {
        assert_eq!(next_order([i64::MAX]), i64::MAX);
        assert_eq!(front_order([i64::MIN, 3]), i64::MIN);
        assert_eq!(reparent_orders([i64::MAX - 1], 3), vec![i64::MAX; 3]);

        assert!(order_in_range(MAX_ORDER));
        assert!(order_in_range(MIN_ORDER));
        assert!(!order_in_range(next_order([MAX_ORDER])));
        assert!(!order_in_range(front_order([MIN_ORDER])));
    }

    #[test]
    fn sort_breaks_ties_by_id() {
        let mut siblings = vec![item("b", 1), item("c", 0), item("a", 1)];
        sort_ranked(&mut siblings);
        let ids: Vec<_> = siblings.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn list_move_matches_array_move() {
        let mut ids = vec!["A", "B", "C"];
        list_move(&mut ids, 2, 0);
        assert_eq!(ids, ["C", "A", "B"]);

        let mut ids = vec!["A", "B", "C"];
        list_move(&mut ids, 0, 2);
        assert_eq!(ids, ["B", "C", "A"]);

        let mut ids = vec!["A", "B", "C"];
        list_move(&mut ids, 1, 1);
        assert_eq!(ids, ["A", "B", "C"]);
    }

    #[test]
    fn reparented_members_follow_root_items() {
        assert_eq!(reparent_orders([0, 1, 5], 3), vec![6, 7, 8]);
        assert_eq!(reparent_orders(Vec::new(), 2), vec![0, 1]);
        assert!(reparent_orders([3], 0).is_empty());
    }

    #[test]
    fn strictly_increasing_rejects_ties() {
        assert!(is_strictly_increasing(&[]));
        assert!(is_strictly_increasing(&[-1, 0, 7]));
        assert!(!is_strictly_increasing(&[0, 0, 1]));
    }
}
