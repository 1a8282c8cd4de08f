//! Approximate minimum distance between two region boundaries.
//!
//! Instead of scanning every vertex pair, each boundary is walked greedily
//! from its first vertex while the cross distance keeps shrinking. The
//! result is the distance between a pair of vertices near the closest edges,
//! not the true minimum, which is close enough for merge decisions.

use geo::Coord;

use super::shape::Shape;
use crate::geo_utils::coord_distance;

/// Greedy walker over one shape's vertex ring.
struct Walker {
    len: usize,
    pointer: usize,
    /// +1, -1, or 0 once stopped
    direction: isize,
    /// Last improving (or turning) vertex; revisiting it ends the walk
    lap_start: Option<usize>,
    steps: usize,
}

impl Walker {
    fn new(len: usize) -> Self {
        Self {
            len,
            pointer: 0,
            direction: if len > 1 { 1 } else { 0 },
            lap_start: None,
            steps: 0,
        }
    }

    fn active(&self) -> bool {
        self.direction != 0
    }

    fn advance(&mut self) {
        self.pointer = (self.pointer as isize + self.direction).rem_euclid(self.len as isize) as usize;
        self.steps += 1;
        if Some(self.pointer) == self.lap_start || self.steps >= self.len {
            self.direction = 0;
        }
    }

    /// React to the distance at the new position; returns true on improvement.
    fn observe(&mut self, new_dist: f64, best: f64) -> bool {
        if new_dist > best {
            if self.lap_start.is_none() {
                self.direction = -self.direction;
                self.lap_start = Some(self.pointer);
            } else {
                self.direction = 0;
            }
            false
        } else if new_dist < best {
            self.lap_start = Some(self.pointer);
            true
        } else {
            false
        }
    }
}

/// Approximate boundary distance in meters between two shapes.
///
/// When the centroids are further apart than `centroid_threshold` meters,
/// the centroid distance is returned directly.
pub fn boundary_distance(
    a: &Shape,
    a_centroid: Coord,
    b: &Shape,
    b_centroid: Coord,
    centroid_threshold: f64,
) -> f64 {
    let centroid_dist = coord_distance(a_centroid, b_centroid);
    if centroid_dist > centroid_threshold {
        return centroid_dist;
    }

    let av = a.vertices();
    let bv = b.vertices();
    let mut wa = Walker::new(av.len());
    let mut wb = Walker::new(bv.len());

    let mut dist = coord_distance(av[0], bv[0]);
    while wa.active() || wb.active() {
        if wa.active() {
            wa.advance();
            let new_dist = coord_distance(av[wa.pointer], bv[wb.pointer]);
            if wa.observe(new_dist, dist) {
                dist = new_dist;
            }
        }
        if wb.active() {
            wb.advance();
            let new_dist = coord_distance(av[wa.pointer], bv[wb.pointer]);
            if wb.observe(new_dist, dist) {
                dist = new_dist;
            }
        }
    }

    dist
}
