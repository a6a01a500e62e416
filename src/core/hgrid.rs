//! Hierarchical hash grid used by the broad phase.
//!
//! Objects are sorted into levels by size: level `l` holds objects whose
//! diameter (times the over-size ratio) fits strictly inside one cell of
//! `cell_sizes[l]`. Cells of every level are hashed into a single table of
//! buckets. Each bucket is a doubly-linked list threaded through the objects
//! themselves via their [`HGridLink`], so the grid stores only arena indices
//! into the owning object slice.

use crate::core::vector::Vec3;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of spatial dimensions the grid resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dimension {
    Two,
    #[default]
    Three,
}

/// Forward half of the 8 neighbours of a 2D cell.
const HALF_STENCIL_2D: [[i32; 3]; 4] = [[1, -1, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0]];

/// Forward half of the 26 neighbours of a 3D cell.
const HALF_STENCIL_3D: [[i32; 3]; 13] = [
    [1, -1, 0],
    [1, 0, 0],
    [1, 1, 0],
    [1, -1, 1],
    [1, 0, 1],
    [1, 1, 1],
    [1, -1, -1],
    [1, 0, -1],
    [1, 1, -1],
    [0, 1, 0],
    [0, 0, -1],
    [0, 1, -1],
    [0, 1, 1],
];

impl Dimension {
    /// Number of resolved axes (2 or 3).
    pub fn count(self) -> usize {
        match self {
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }

    /// Offsets of the neighbouring cells a cell is paired with at its own
    /// level. Together with the opposite offsets (visited from the other
    /// side) this covers every neighbour exactly once.
    pub fn half_stencil(self) -> &'static [[i32; 3]] {
        match self {
            Dimension::Two => &HALF_STENCIL_2D,
            Dimension::Three => &HALF_STENCIL_3D,
        }
    }
}

/// Direction of the cross-level search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HGridMethod {
    /// Each object searches its own level and all coarser ones.
    BottomUp,
    /// Each object searches its own level and all finer ones.
    #[default]
    TopDown,
}

/// How cell sizes are spread between the smallest and largest object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HGridDistribution {
    Linear,
    #[default]
    Exponential,
    /// Sizes given in the configuration.
    User,
    /// Sizes minimising the modelled broad-phase cost.
    Optimised,
}

/// Integer cell coordinate at a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HGridCell {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub level: usize,
}

impl HGridCell {
    /// The cell displaced by `offset` at the same level.
    pub fn offset(&self, offset: [i32; 3]) -> Self {
        Self {
            x: self.x.wrapping_add(offset[0]),
            y: self.y.wrapping_add(offset[1]),
            z: self.z.wrapping_add(offset[2]),
            level: self.level,
        }
    }
}

/// Per-object grid state, stored on the object itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HGridLink {
    /// Level assigned at insertion; `None` until inserted.
    pub level: Option<usize>,
    /// Cell the object is currently linked into; `None` while unlinked.
    pub cell: Option<HGridCell>,
    /// Next object in the same bucket.
    pub next: Option<usize>,
    /// Previous object in the same bucket; `None` at the bucket head.
    pub prev: Option<usize>,
}

impl HGridLink {
    pub fn is_linked(&self) -> bool {
        self.cell.is_some()
    }
}

/// Anything the grid can sort into cells.
pub trait HGridObject {
    fn position(&self) -> Vec3;
    fn interaction_radius(&self) -> f64;
    fn hgrid(&self) -> &HGridLink;
    fn hgrid_mut(&mut self) -> &mut HGridLink;
}

const H1: i32 = 0x8da6_b343_u32 as i32;
const H2: i32 = 0xd816_3841_u32 as i32;
const H3: i32 = 0xcb1a_b31f_u32 as i32;
const H4: i32 = 0x1656_67b1_u32 as i32;

/// Widest level count the occupancy mask can describe.
pub const MAX_LEVELS: usize = 32;

/// The hierarchical grid itself: cell sizes per level and the bucket table.
#[derive(Debug, Clone)]
pub struct HGrid {
    dimension: Dimension,
    cell_sizes: Vec<f64>,
    inv_cell_sizes: Vec<f64>,
    cell_over_size_ratio: f64,
    buckets: Vec<Option<usize>>,
    bucket_is_checked: Vec<bool>,
    occupied_levels_mask: u32,
    needs_rebuilding: bool,
}

impl HGrid {
    /// Create an empty grid.
    ///
    /// `cell_sizes` must be increasing; at most [`MAX_LEVELS`] are kept. A zero
    /// bucket count is raised to one.
    pub fn new(
        dimension: Dimension,
        number_of_buckets: usize,
        cell_over_size_ratio: f64,
        mut cell_sizes: Vec<f64>,
    ) -> Self {
        if cell_sizes.len() > MAX_LEVELS {
            warn!(
                "HGrid: {} levels requested, keeping the {} coarsest",
                cell_sizes.len(),
                MAX_LEVELS
            );
            let excess = cell_sizes.len() - MAX_LEVELS;
            cell_sizes.drain(..excess);
        }
        let inv_cell_sizes = cell_sizes.iter().map(|s| 1.0 / s).collect();
        let n = number_of_buckets.max(1);
        Self {
            dimension,
            cell_sizes,
            inv_cell_sizes,
            cell_over_size_ratio,
            buckets: vec![None; n],
            bucket_is_checked: vec![false; n],
            occupied_levels_mask: 0,
            needs_rebuilding: false,
        }
    }

    /// Hash a cell coordinate into `[0, number_of_buckets)`.
    ///
    /// Uses 32-bit wrapping arithmetic so the mapping is identical on every
    /// platform. The z coordinate is ignored in 2D.
    pub fn compute_bucket_index(&self, x: i32, y: i32, z: i32, level: usize) -> usize {
        let mut n = H1.wrapping_mul(x).wrapping_add(H2.wrapping_mul(y));
        if self.dimension == Dimension::Three {
            n = n.wrapping_add(H3.wrapping_mul(z));
        }
        n = n.wrapping_add(H4.wrapping_mul(level as i32));
        let buckets = self.buckets.len() as i64;
        let mut b = i64::from(n) % buckets;
        if b < 0 {
            b += buckets;
        }
        b as usize
    }

    pub fn bucket_of(&self, cell: &HGridCell) -> usize {
        self.compute_bucket_index(cell.x, cell.y, cell.z, cell.level)
    }

    /// Cell containing `position` at `level`.
    pub fn cell_of(&self, position: Vec3, level: usize) -> HGridCell {
        let inv = self.inv_cell_sizes[level];
        let z = match self.dimension {
            Dimension::Two => 0,
            Dimension::Three => (position[2] * inv).floor() as i32,
        };
        HGridCell {
            x: (position[0] * inv).floor() as i32,
            y: (position[1] * inv).floor() as i32,
            z,
            level,
        }
    }

    /// Lowest level whose cells are strictly larger than the object's
    /// scaled diameter.
    pub fn level_for(&self, interaction_radius: f64) -> Option<usize> {
        let size = 2.0 * interaction_radius * self.cell_over_size_ratio;
        self.cell_sizes.iter().position(|&cell| cell > size)
    }

    /// Assign a level to `objects[index]` and link it into its cell.
    ///
    /// An object that is already linked is unlinked first. Returns `false`
    /// when the object is too large for every level; the grid is then flagged
    /// for rebuilding and the object stays unlinked until the rebuild.
    pub fn insert<P: HGridObject>(&mut self, objects: &mut [P], index: usize) -> bool {
        if objects[index].hgrid().is_linked() {
            self.unlink(objects, index);
        }
        let radius = objects[index].interaction_radius();
        let Some(level) = self.level_for(radius) else {
            warn!(
                "HGrid: object {} with radius {} does not fit the top level (cell size {:?}); rebuild scheduled",
                index,
                radius,
                self.cell_sizes.last()
            );
            self.needs_rebuilding = true;
            return false;
        };
        *objects[index].hgrid_mut() = HGridLink {
            level: Some(level),
            ..HGridLink::default()
        };
        self.occupied_levels_mask |= 1 << level;
        let cell = self.cell_of(objects[index].position(), level);
        self.link(objects, index, cell);
        true
    }

    /// Move `objects[index]` to the cell matching its current position.
    pub fn update<P: HGridObject>(&mut self, objects: &mut [P], index: usize) {
        let link = *objects[index].hgrid();
        let Some(level) = link.level else {
            return;
        };
        let cell = self.cell_of(objects[index].position(), level);
        if link.cell == Some(cell) {
            return;
        }
        if link.is_linked() {
            self.unlink(objects, index);
        }
        self.link(objects, index, cell);
    }

    /// Unlink `objects[index]` and forget its level.
    pub fn remove<P: HGridObject>(&mut self, objects: &mut [P], index: usize) {
        if objects[index].hgrid().is_linked() {
            self.unlink(objects, index);
        }
        *objects[index].hgrid_mut() = HGridLink::default();
    }

    /// Repair links after the object stored at `from` was moved to `to`.
    ///
    /// The moved object's own link is already correct; its neighbours (or
    /// the bucket head) still point at `from`.
    pub fn relocate<P: HGridObject>(&mut self, objects: &mut [P], from: usize, to: usize) {
        let link = *objects[to].hgrid();
        let Some(cell) = link.cell else {
            return;
        };
        match link.prev {
            Some(p) => objects[p].hgrid_mut().next = Some(to),
            None => {
                let bucket = self.bucket_of(&cell);
                if self.buckets[bucket] == Some(from) {
                    self.buckets[bucket] = Some(to);
                }
            }
        }
        if let Some(n) = link.next {
            objects[n].hgrid_mut().prev = Some(to);
        }
    }

    fn link<P: HGridObject>(&mut self, objects: &mut [P], index: usize, cell: HGridCell) {
        let bucket = self.bucket_of(&cell);
        let head = self.buckets[bucket];
        {
            let link = objects[index].hgrid_mut();
            link.cell = Some(cell);
            link.prev = None;
            link.next = head;
        }
        if let Some(h) = head {
            objects[h].hgrid_mut().prev = Some(index);
        }
        self.buckets[bucket] = Some(index);
    }

    fn unlink<P: HGridObject>(&mut self, objects: &mut [P], index: usize) {
        let link = *objects[index].hgrid();
        let Some(cell) = link.cell else {
            return;
        };
        match link.prev {
            Some(p) => objects[p].hgrid_mut().next = link.next,
            None => {
                let bucket = self.bucket_of(&cell);
                self.buckets[bucket] = link.next;
            }
        }
        if let Some(n) = link.next {
            objects[n].hgrid_mut().prev = link.prev;
        }
        let own = objects[index].hgrid_mut();
        own.cell = None;
        own.next = None;
        own.prev = None;
    }

    pub fn first_in_bucket(&self, bucket: usize) -> Option<usize> {
        self.buckets[bucket]
    }

    /// Walk the objects linked into `bucket`, head first.
    pub fn bucket_iter<'a, P: HGridObject>(
        &self,
        objects: &'a [P],
        bucket: usize,
    ) -> BucketIter<'a, P> {
        BucketIter {
            objects,
            current: self.buckets[bucket],
        }
    }

    pub fn clear_bucket_is_checked(&mut self) {
        self.bucket_is_checked.fill(false);
    }

    pub fn is_bucket_checked(&self, bucket: usize) -> bool {
        self.bucket_is_checked[bucket]
    }

    pub fn set_bucket_checked(&mut self, bucket: usize) {
        self.bucket_is_checked[bucket] = true;
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn number_of_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn number_of_levels(&self) -> usize {
        self.cell_sizes.len()
    }

    pub fn cell_size(&self, level: usize) -> f64 {
        self.cell_sizes[level]
    }

    pub fn inv_cell_size(&self, level: usize) -> f64 {
        self.inv_cell_sizes[level]
    }

    pub fn cell_sizes(&self) -> &[f64] {
        &self.cell_sizes
    }

    pub fn cell_over_size_ratio(&self) -> f64 {
        self.cell_over_size_ratio
    }

    /// Bit `l` is set once anything was inserted at level `l`.
    ///
    /// Bits are never cleared by removals, so the mask can report a level as
    /// occupied after it emptied. A rebuild starts from a clean mask.
    pub fn occupied_levels_mask(&self) -> u32 {
        self.occupied_levels_mask
    }

    pub fn needs_rebuilding(&self) -> bool {
        self.needs_rebuilding
    }
}

impl fmt::Display for HGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HGrid({:?}, {} buckets, ratio {}, mask {:#b}, cell sizes [",
            self.dimension,
            self.buckets.len(),
            self.cell_over_size_ratio,
            self.occupied_levels_mask
        )?;
        for (l, s) in self.cell_sizes.iter().enumerate() {
            if l > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{s:.6e}")?;
        }
        write!(f, "])")
    }
}

/// Iterator over the object indices linked into one bucket.
pub struct BucketIter<'a, P> {
    objects: &'a [P],
    current: Option<usize>,
}

impl<P: HGridObject> Iterator for BucketIter<'_, P> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.current?;
        self.current = self.objects[index].hgrid().next;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Default)]
    struct Dot {
        position: Vec3,
        radius: f64,
        link: HGridLink,
    }

    impl HGridObject for Dot {
        fn position(&self) -> Vec3 {
            self.position
        }
        fn interaction_radius(&self) -> f64 {
            self.radius
        }
        fn hgrid(&self) -> &HGridLink {
            &self.link
        }
        fn hgrid_mut(&mut self) -> &mut HGridLink {
            &mut self.link
        }
    }

    fn dot(position: Vec3, radius: f64) -> Dot {
        Dot {
            position,
            radius,
            link: HGridLink::default(),
        }
    }

    fn grid(dimension: Dimension) -> HGrid {
        HGrid::new(dimension, 7, 1.0, vec![1.0, 2.0, 4.0])
    }

    fn bucket_members(g: &HGrid, objects: &[Dot], cell: &HGridCell) -> Vec<usize> {
        g.bucket_iter(objects, g.bucket_of(cell)).collect()
    }

    #[test]
    fn level_choice_is_strict() {
        let g = grid(Dimension::Three);
        assert_eq!(g.level_for(0.25), Some(0));
        // diameter equal to the cell size does not fit
        assert_eq!(g.level_for(0.5), Some(1));
        assert_eq!(g.level_for(0.99), Some(1));
        assert_eq!(g.level_for(1.5), Some(2));
        assert_eq!(g.level_for(2.0), None);
    }

    #[test]
    fn over_size_ratio_scales_levels() {
        let g = HGrid::new(Dimension::Three, 7, 2.0, vec![1.0, 2.0, 4.0]);
        assert_eq!(g.level_for(0.2), Some(0));
        assert_eq!(g.level_for(0.3), Some(1));
    }

    #[test]
    fn cells_floor_negative_coordinates() {
        let g = grid(Dimension::Three);
        let c = g.cell_of([-0.5, 1.5, -2.0], 1);
        assert_eq!((c.x, c.y, c.z, c.level), (-1, 0, -1, 1));
        let g2 = grid(Dimension::Two);
        assert_eq!(g2.cell_of([0.5, 0.5, 99.0], 0).z, 0);
    }

    #[test]
    fn two_d_hash_ignores_z() {
        let g = grid(Dimension::Two);
        assert_eq!(
            g.compute_bucket_index(3, -4, 0, 1),
            g.compute_bucket_index(3, -4, 17, 1)
        );
    }

    #[test]
    fn insert_links_and_sets_mask() {
        let mut g = grid(Dimension::Three);
        let mut objects = vec![dot([0.1, 0.1, 0.1], 0.2), dot([0.3, 0.2, 0.4], 0.3)];
        assert!(g.insert(&mut objects, 0));
        assert!(g.insert(&mut objects, 1));
        assert_eq!(g.occupied_levels_mask(), 0b001);
        let cell = objects[0].link.cell.unwrap();
        assert_eq!(objects[1].link.cell, Some(cell));
        let members = bucket_members(&g, &objects, &cell);
        assert_eq!(members, vec![1, 0]);
        assert_eq!(objects[0].link.prev, Some(1));
        assert_eq!(objects[1].link.next, Some(0));
    }

    #[test]
    fn second_insert_relinks_once() {
        let mut g = grid(Dimension::Two);
        let mut objects = vec![dot([0.1, 0.1, 0.0], 0.2), dot([0.2, 0.1, 0.0], 0.2)];
        g.insert(&mut objects, 0);
        g.insert(&mut objects, 1);
        objects[0].position = [2.5, 0.1, 0.0];
        assert!(g.insert(&mut objects, 0));
        let old = objects[1].link.cell.unwrap();
        let new = objects[0].link.cell.unwrap();
        assert_ne!(old, new);
        let in_old: Vec<usize> = bucket_members(&g, &objects, &old)
            .into_iter()
            .filter(|&i| objects[i].link.cell == Some(old))
            .collect();
        assert_eq!(in_old, vec![1]);
        let copies = bucket_members(&g, &objects, &new)
            .into_iter()
            .filter(|&i| i == 0)
            .count();
        assert_eq!(copies, 1);
    }

    #[test]
    fn oversized_insert_flags_rebuild() {
        let mut g = grid(Dimension::Three);
        let mut objects = vec![dot([0.0; 3], 3.0)];
        assert!(!g.insert(&mut objects, 0));
        assert!(g.needs_rebuilding());
        assert!(!objects[0].link.is_linked());
        assert_eq!(g.occupied_levels_mask(), 0);
    }

    #[test]
    fn update_moves_between_cells() {
        let mut g = grid(Dimension::Three);
        let mut objects = vec![dot([0.5, 0.5, 0.5], 0.2), dot([0.6, 0.5, 0.5], 0.2)];
        g.insert(&mut objects, 0);
        g.insert(&mut objects, 1);
        let old = objects[0].link.cell.unwrap();
        objects[0].position = [1.5, 0.5, 0.5];
        g.update(&mut objects, 0);
        let new = objects[0].link.cell.unwrap();
        assert_eq!(new.x, 1);
        assert!(bucket_members(&g, &objects, &new).contains(&0));
        assert!(!bucket_members(&g, &objects, &old).contains(&0));
        assert!(bucket_members(&g, &objects, &old).contains(&1));
    }

    #[test]
    fn remove_clears_link_but_keeps_mask() {
        let mut g = grid(Dimension::Three);
        let mut objects = vec![dot([0.5; 3], 0.2)];
        g.insert(&mut objects, 0);
        let cell = objects[0].link.cell.unwrap();
        g.remove(&mut objects, 0);
        assert_eq!(objects[0].link, HGridLink::default());
        assert!(bucket_members(&g, &objects, &cell).is_empty());
        assert_eq!(g.occupied_levels_mask(), 1);
    }

    #[test]
    fn relocate_repairs_neighbours() {
        let mut g = grid(Dimension::Three);
        let mut objects = vec![
            dot([0.5; 3], 0.2),
            dot([0.5; 3], 0.2),
            dot([0.5; 3], 0.2),
        ];
        for i in 0..3 {
            g.insert(&mut objects, i);
        }
        // bucket order is 2 -> 1 -> 0; remove 0 the way the handler does
        g.remove(&mut objects, 0);
        objects.swap_remove(0);
        g.relocate(&mut objects, 2, 0);
        let cell = objects[0].link.cell.unwrap();
        assert_eq!(bucket_members(&g, &objects, &cell), vec![0, 1]);
        assert_eq!(objects[1].link.prev, Some(0));
    }

    #[test]
    fn checked_flags_reset() {
        let mut g = grid(Dimension::Two);
        g.set_bucket_checked(3);
        assert!(g.is_bucket_checked(3));
        g.clear_bucket_is_checked();
        assert!(!g.is_bucket_checked(3));
    }

    #[test]
    fn display_lists_levels() {
        let g = grid(Dimension::Two);
        let text = g.to_string();
        assert!(text.contains("7 buckets"));
        assert!(text.contains("Two"));
    }

    proptest! {
        #[test]
        fn hash_is_deterministic_and_in_range(
            x in any::<i32>(),
            y in any::<i32>(),
            z in any::<i32>(),
            level in 0usize..32,
            buckets in 1usize..100_000,
        ) {
            let g = HGrid::new(Dimension::Three, buckets, 1.0, vec![1.0]);
            let a = g.compute_bucket_index(x, y, z, level);
            let b = g.compute_bucket_index(x, y, z, level);
            prop_assert_eq!(a, b);
            prop_assert!(a < buckets);
        }
    }
}
