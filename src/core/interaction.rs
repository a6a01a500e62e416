//! Contact history between pairs of real particles.
//!
//! Entries are keyed by the unordered pair of handler indices of the two
//! *real* particles involved. Ghost contacts are resolved to their origins
//! before lookup, so the history survives the per-step ghost recreation and a
//! particle crossing a periodic seam.

use crate::core::vector::{self, Vec3};
use log::trace;
use std::collections::HashMap;

/// History of one contact.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// Lower particle index of the pair.
    pub p: usize,
    /// Higher particle index of the pair.
    pub i: usize,
    /// Accumulated tangential spring elongation.
    pub tangential_spring: Vec3,
    /// Overlap at the last evaluation.
    pub overlap: f64,
    /// Step at which the contact was last active.
    pub time_stamp: u64,
}

fn key(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// All live contacts.
#[derive(Debug, Clone, Default)]
pub struct InteractionHandler {
    map: HashMap<(usize, usize), Interaction>,
}

impl InteractionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: usize, b: usize) -> Option<&Interaction> {
        self.map.get(&key(a, b))
    }

    /// Existing entry for the pair, or a fresh one stamped with `step`.
    pub fn get_or_insert(&mut self, a: usize, b: usize, step: u64) -> &mut Interaction {
        let (p, i) = key(a, b);
        self.map.entry((p, i)).or_insert_with(|| Interaction {
            p,
            i,
            tangential_spring: vector::ZERO,
            overlap: 0.0,
            time_stamp: step,
        })
    }

    /// Drop contacts that were not active during `step`.
    pub fn remove_old(&mut self, step: u64) {
        let before = self.map.len();
        self.map.retain(|_, c| c.time_stamp >= step);
        let dropped = before - self.map.len();
        if dropped > 0 {
            trace!("interactions: {dropped} contacts ended at step {step}");
        }
    }

    /// Drop every contact involving particle `index`.
    pub fn remove_for(&mut self, index: usize) {
        self.map.retain(|&(p, i), _| p != index && i != index);
    }

    /// Re-key contacts of the particle that moved from slot `from` to `to`.
    pub fn relocate(&mut self, from: usize, to: usize) {
        let moved: Vec<(usize, usize)> = self
            .map
            .keys()
            .filter(|&&(p, i)| p == from || i == from)
            .copied()
            .collect();
        for old in moved {
            let Some(mut c) = self.map.remove(&old) else {
                continue;
            };
            let other = if old.0 == from { old.1 } else { old.0 };
            let (p, i) = key(to, other);
            c.p = p;
            c.i = i;
            self.map.insert((p, i), c);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.map.values()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
