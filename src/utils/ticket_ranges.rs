//! 票号区间压缩
//!
//! 订单不按单张票存储，而是存储闭区间 `[s, e]` 列表。`TicketSet` 维护
//! 排序且互不重叠的区间，用于可用性检查、计数和按序号取票（开奖）。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 闭区间 [s, e]，s <= e
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TicketRange {
    pub s: i64,
    pub e: i64,
}

impl TicketRange {
    pub fn new(s: i64, e: i64) -> Self {
        if s <= e { Self { s, e } } else { Self { s: e, e: s } }
    }

    pub fn single(index: i64) -> Self {
        Self { s: index, e: index }
    }

    pub fn len(&self) -> i64 {
        self.e - self.s + 1
    }

    pub fn contains(&self, index: i64) -> bool {
        self.s <= index && index <= self.e
    }
}

/// 将离散下标压缩为区间：排序、去重、合并连续段
pub fn compress_indices(indices: &[i64]) -> Vec<TicketRange> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<TicketRange> = Vec::new();
    for idx in sorted {
        match ranges.last_mut() {
            Some(last) if last.e + 1 == idx => last.e = idx,
            _ => ranges.push(TicketRange::single(idx)),
        }
    }
    ranges
}

/// 规范化后的区间集合（升序、不重叠、不相邻）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketSet {
    ranges: Vec<TicketRange>,
}

impl TicketSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = TicketRange>,
    {
        let mut set = Self::new();
        set.extend(ranges);
        set
    }

    pub fn from_indices(indices: &[i64]) -> Self {
        Self {
            ranges: compress_indices(indices),
        }
    }

    /// 合并更多区间，保持规范化
    pub fn extend<I>(&mut self, ranges: I)
    where
        I: IntoIterator<Item = TicketRange>,
    {
        self.ranges.extend(ranges);
        self.normalize();
    }

    pub fn extend_indices(&mut self, indices: &[i64]) {
        self.extend(indices.iter().map(|&i| TicketRange::single(i)));
    }

    fn normalize(&mut self) {
        if self.ranges.len() < 2 {
            return;
        }
        self.ranges.sort_unstable_by_key(|r| (r.s, r.e));
        let mut merged: Vec<TicketRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if r.s <= last.e.saturating_add(1) => {
                    last.e = last.e.max(r.e);
                }
                _ => merged.push(r),
            }
        }
        self.ranges = merged;
    }

    pub fn ranges(&self) -> &[TicketRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// 票数（不展开区间）
    pub fn len(&self) -> i64 {
        self.ranges.iter().map(TicketRange::len).sum()
    }

    pub fn contains(&self, index: i64) -> bool {
        // 第一个 e >= index 的区间
        let pos = self.ranges.partition_point(|r| r.e < index);
        self.ranges.get(pos).is_some_and(|r| r.s <= index)
    }

    /// 返回请求中已被占用的下标（升序去重）
    pub fn conflicts(&self, requested: &[i64]) -> Vec<i64> {
        let mut taken: Vec<i64> = requested
            .iter()
            .copied()
            .filter(|&i| self.contains(i))
            .collect();
        taken.sort_unstable();
        taken.dedup();
        taken
    }

    /// 升序第 k 个（从 0 开始）下标；k 越界返回 None
    pub fn nth(&self, k: i64) -> Option<i64> {
        if k < 0 {
            return None;
        }
        let mut remaining = k;
        for r in &self.ranges {
            let len = r.len();
            if remaining < len {
                return Some(r.s + remaining);
            }
            remaining -= len;
        }
        None
    }

    /// 逐个展开被占用的下标（升序）
    pub fn iter_indices(&self) -> impl Iterator<Item = i64> + '_ {
        self.ranges.iter().flat_map(|r| r.s..=r.e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_contiguous() {
        assert_eq!(compress_indices(&[5, 6, 7]), vec![TicketRange::new(5, 7)]);
    }

    #[test]
    fn test_compress_unsorted_with_duplicates() {
        let ranges = compress_indices(&[9, 1, 2, 2, 3, 7, 8]);
        assert_eq!(
            ranges,
            vec![TicketRange::new(1, 3), TicketRange::new(7, 9)]
        );
    }

    #[test]
    fn test_compress_empty() {
        assert!(compress_indices(&[]).is_empty());
    }

    #[test]
    fn test_set_merges_overlapping_and_adjacent() {
        let set = TicketSet::from_ranges(vec![
            TicketRange::new(10, 12),
            TicketRange::new(0, 3),
            TicketRange::new(4, 5),
            TicketRange::new(11, 20),
        ]);
        assert_eq!(
            set.ranges(),
            &[TicketRange::new(0, 5), TicketRange::new(10, 20)]
        );
        assert_eq!(set.len(), 6 + 11);
    }

    #[test]
    fn test_contains_boundaries() {
        let set = TicketSet::from_ranges(vec![TicketRange::new(5, 7), TicketRange::new(20, 20)]);
        assert!(!set.contains(4));
        assert!(set.contains(5));
        assert!(set.contains(7));
        assert!(!set.contains(8));
        assert!(set.contains(20));
        assert!(!set.contains(21));
    }

    #[test]
    fn test_second_reservation_conflicts_on_shared_index() {
        // 100 张票，先占 [5,6,7]，再请求 [7,8] 必须冲突在 7
        let first = compress_indices(&[5, 6, 7]);
        assert_eq!(first, vec![TicketRange { s: 5, e: 7 }]);

        let held = TicketSet::from_ranges(first);
        assert_eq!(held.conflicts(&[7, 8]), vec![7]);
        assert!(held.conflicts(&[8, 9]).is_empty());
    }

    #[test]
    fn test_nth_walks_ranges_in_order() {
        let set = TicketSet::from_ranges(vec![TicketRange::new(2, 4), TicketRange::new(10, 11)]);
        let all: Vec<i64> = (0..set.len()).filter_map(|k| set.nth(k)).collect();
        assert_eq!(all, vec![2, 3, 4, 10, 11]);
        assert_eq!(set.nth(5), None);
        assert_eq!(set.nth(-1), None);
    }

    #[test]
    fn test_iter_indices_matches_nth() {
        let mut set = TicketSet::from_indices(&[1, 3, 4]);
        set.extend_indices(&[2, 9]);
        let via_iter: Vec<i64> = set.iter_indices().collect();
        assert_eq!(via_iter, vec![1, 2, 3, 4, 9]);
    }

    #[test]
    fn test_range_new_swaps_reversed_bounds() {
        let r = TicketRange::new(9, 3);
        assert_eq!((r.s, r.e), (3, 9));
        assert_eq!(r.len(), 7);
    }
}
