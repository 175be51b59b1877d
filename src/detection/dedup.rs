//! Geometric clustering of near-duplicate candidate rectangles.
//!
//! Two policies are supported:
//! - center distance: candidates whose centers fall within a tolerance on
//!   both axes are the same element, the higher-scoring one survives
//! - overlap: intersecting candidates are replaced by their union
//!
//! Both re-check a merged winner against the remaining output, so the result
//! never contains a pair the policy would still merge. Running either policy
//! on its own output returns it unchanged.

use crate::config::Tolerance;
use crate::geometry::Rect;

/// Anything with a bounding rectangle that can be deduplicated.
pub trait Region {
    fn bounds(&self) -> Rect;

    /// Ranking used to pick the survivor of a collision.
    /// `None` means the most recent candidate wins.
    fn score(&self) -> Option<f64> {
        None
    }
}

/// Regions that can be combined into one covering region.
pub trait Mergeable: Region {
    fn union(&self, other: &Self) -> Self;
}

impl Region for Rect {
    fn bounds(&self) -> Rect {
        *self
    }
}

impl Mergeable for Rect {
    fn union(&self, other: &Self) -> Self {
        Rect::union(self, other)
    }
}

fn centers_collide(a: &Rect, b: &Rect, tolerance: Tolerance) -> bool {
    let (ca, cb) = (a.center(), b.center());
    ca.x.abs_diff(cb.x) < tolerance.x && ca.y.abs_diff(cb.y) < tolerance.y
}

/// Picks the survivor of a collision between an already-kept item and a new
/// candidate. Ties keep the kept item; unscored pairs keep the candidate.
fn survivor<T: Region>(kept: T, candidate: T) -> T {
    match (kept.score(), candidate.score()) {
        (Some(k), Some(c)) => {
            if c > k {
                candidate
            } else {
                kept
            }
        }
        _ => candidate,
    }
}

fn sort_reading_order<T: Region>(items: &mut [T]) {
    items.sort_by_key(|item| {
        let b = item.bounds();
        (b.y, b.x)
    });
}

/// Merges candidates whose centers lie within `tolerance` on both axes.
pub fn by_center<T: Region>(items: Vec<T>, tolerance: Tolerance) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        let mut current = item;
        while let Some(idx) = kept
            .iter()
            .position(|k| centers_collide(&k.bounds(), &current.bounds(), tolerance))
        {
            let existing = kept.swap_remove(idx);
            current = survivor(existing, current);
        }
        kept.push(current);
    }

    sort_reading_order(&mut kept);
    kept
}

/// Replaces every group of intersecting candidates with its union.
pub fn by_overlap<T: Mergeable>(items: Vec<T>) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        let mut current = item;
        while let Some(idx) = kept
            .iter()
            .position(|k| k.bounds().intersects(&current.bounds()))
        {
            let existing = kept.swap_remove(idx);
            current = existing.union(&current);
        }
        kept.push(current);
    }

    sort_reading_order(&mut kept);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Scored {
        rect: Rect,
        score: Option<f64>,
    }

    impl Region for Scored {
        fn bounds(&self) -> Rect {
            self.rect
        }
        fn score(&self) -> Option<f64> {
            self.score
        }
    }

    fn rect(x: u32, y: u32, w: u32, h: u32) -> Rect {
        Rect::new(x, y, w, h).unwrap()
    }

    fn scored(x: u32, y: u32, score: Option<f64>) -> Scored {
        Scored {
            rect: rect(x, y, 40, 40),
            score,
        }
    }

    const TOL: Tolerance = Tolerance { x: 30, y: 30 };

    #[test]
    fn test_center_keeps_larger_score() {
        let items = vec![scored(100, 100, Some(500.0)), scored(110, 105, Some(900.0))];
        let out = by_center(items, TOL);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, Some(900.0));
    }

    #[test]
    fn test_center_tie_keeps_first() {
        let items = vec![scored(100, 100, Some(500.0)), scored(110, 105, Some(500.0))];
        let out = by_center(items, TOL);
        assert_eq!(out, vec![scored(100, 100, Some(500.0))]);
    }

    #[test]
    fn test_center_without_score_keeps_most_recent() {
        let items = vec![scored(100, 100, None), scored(110, 105, None)];
        let out = by_center(items, TOL);
        assert_eq!(out, vec![scored(110, 105, None)]);
    }

    #[test]
    fn test_center_distinct_items_survive_in_order() {
        let items = vec![scored(100, 300, None), scored(100, 100, None), scored(300, 100, None)];
        let out = by_center(items, TOL);
        let positions: Vec<(u32, u32)> = out.iter().map(|s| (s.rect.x, s.rect.y)).collect();
        assert_eq!(positions, vec![(100, 100), (300, 100), (100, 300)]);
    }

    #[test]
    fn test_center_winner_rechecked_against_others() {
        // b replaces a and lands within tolerance of c, which must then merge too
        let a = scored(100, 100, Some(1.0));
        let c = scored(150, 100, Some(3.0));
        let b = scored(125, 100, Some(2.0));
        let out = by_center(vec![a, c, b], TOL);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, Some(3.0));
    }

    #[test]
    fn test_center_is_idempotent() {
        let items = vec![
            scored(0, 0, Some(10.0)),
            scored(20, 10, Some(30.0)),
            scored(45, 25, Some(20.0)),
            scored(200, 200, None),
            scored(215, 190, None),
            scored(400, 0, Some(1.0)),
        ];
        let once = by_center(items, TOL);
        let twice = by_center(once.clone(), TOL);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_overlap_merges_into_union() {
        let out = by_overlap(vec![rect(0, 0, 50, 20), rect(40, 10, 50, 20)]);
        assert_eq!(out, vec![rect(0, 0, 90, 30)]);
    }

    #[test]
    fn test_overlap_outputs_never_intersect() {
        // c overlaps a but not b; a naive "merge with last" pass leaves a and c apart
        let a = rect(0, 0, 300, 20);
        let b = rect(400, 5, 50, 20);
        let c = rect(100, 10, 50, 20);
        let d = rect(320, 12, 100, 5);
        let out = by_overlap(vec![a, b, c, d]);
        for (i, r) in out.iter().enumerate() {
            for other in out.iter().skip(i + 1) {
                assert!(!r.intersects(other), "{:?} intersects {:?}", r, other);
            }
        }
        assert_eq!(out, vec![rect(0, 0, 300, 30), rect(320, 5, 130, 20)]);
    }

    #[test]
    fn test_overlap_is_idempotent() {
        let items = vec![
            rect(0, 0, 30, 30),
            rect(20, 20, 30, 30),
            rect(100, 0, 10, 10),
            rect(0, 100, 10, 10),
            rect(5, 105, 10, 10),
        ];
        let once = by_overlap(items);
        let twice = by_overlap(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(by_overlap(Vec::<Rect>::new()).is_empty());
        assert!(by_center(Vec::<Rect>::new(), TOL).is_empty());
    }
}
