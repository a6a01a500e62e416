//! Generic owner of one kind of entity (particles, walls, boundaries, species).
//!
//! Every entity has two identities:
//! - an `id`, handed out from a counter that only ever increases and is
//!   never reused, even after removals;
//! - an `index`, its current slot in the handler. It changes whenever
//!   another entity is removed and the last one is swapped into the freed slot.
//!
//! Removal is O(1) swap-with-last. Anything keyed by index (grid links,
//! contact history) must be moved with the [`Removal::moved_from`] value
//! returned by [`EntityHandler::remove`].

use log::error;
use ordered_float::NotNan;
use std::ops::{Index, IndexMut};

/// Bookkeeping an entity needs in order to live inside an [`EntityHandler`].
pub trait HandlerObject {
    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);
    fn index(&self) -> usize;
    fn set_index(&mut self, index: usize);

    /// Called on the entity that was moved into a freed slot by swap-remove.
    fn move_in_handler(&mut self, new_index: usize) {
        self.set_index(new_index);
    }

    /// Scalar used to track the smallest and largest entity; `None` opts out.
    fn size_key(&self) -> Option<f64> {
        None
    }
}

/// Result of a successful [`EntityHandler::remove`].
#[derive(Debug)]
pub struct Removal<T> {
    /// The entity that was taken out.
    pub removed: T,
    /// Old index of the entity that now occupies the freed slot, if one moved.
    pub moved_from: Option<usize>,
}

/// Dense, insertion-ordered storage with stable ids and swap-remove.
#[derive(Debug, Clone)]
pub struct EntityHandler<T> {
    name: &'static str,
    objects: Vec<T>,
    next_id: u64,
    smallest: Option<usize>,
    largest: Option<usize>,
}

impl<T: HandlerObject> EntityHandler<T> {
    /// Create an empty handler. `name` only appears in log messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            objects: Vec::new(),
            next_id: 0,
            smallest: None,
            largest: None,
        }
    }

    /// Append `object`, assigning the next id and the last index. Returns the id.
    pub fn add(&mut self, object: T) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.push_with_id(object, id);
        id
    }

    /// Append `object` keeping a previously issued `id` (restart loading).
    ///
    /// The id counter is advanced past `id` so later insertions never collide.
    pub fn add_with_id(&mut self, object: T, id: u64) {
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.push_with_id(object, id);
    }

    fn push_with_id(&mut self, mut object: T, id: u64) {
        let index = self.objects.len();
        object.set_id(id);
        object.set_index(index);
        self.objects.push(object);
        self.track_extremes(index);
    }

    /// Remove the entity at `index` by swapping the last entity into its slot.
    ///
    /// Returns `None` (and logs) when `index` is out of range; the handler is
    /// left untouched in that case.
    pub fn remove(&mut self, index: usize) -> Option<Removal<T>> {
        let len = self.objects.len();
        if index >= len {
            error!(
                "{}: cannot remove index {} from a handler holding {} objects",
                self.name, index, len
            );
            return None;
        }
        let last = len - 1;
        let removed = self.objects.swap_remove(index);
        let moved_from = if index != last {
            self.objects[index].move_in_handler(index);
            Some(last)
        } else {
            None
        };

        let touches = |slot: Option<usize>| slot == Some(index) || slot == Some(last);
        if touches(self.smallest) || touches(self.largest) {
            self.refresh_extremes();
        }
        Some(Removal {
            removed,
            moved_from,
        })
    }

    /// Look up an entity by its permanent id.
    ///
    /// Ids and indices coincide until the first removal, so `objects[id]` is
    /// tried before falling back to a linear scan.
    pub fn get_by_id(&self, id: u64) -> Option<&T> {
        match self.position_of_id(id) {
            Some(i) => Some(&self.objects[i]),
            None => {
                error!("{}: no object with id {}", self.name, id);
                None
            }
        }
    }

    /// Mutable variant of [`Self::get_by_id`].
    pub fn get_by_id_mut(&mut self, id: u64) -> Option<&mut T> {
        match self.position_of_id(id) {
            Some(i) => Some(&mut self.objects[i]),
            None => {
                error!("{}: no object with id {}", self.name, id);
                None
            }
        }
    }

    fn position_of_id(&self, id: u64) -> Option<usize> {
        if let Ok(guess) = usize::try_from(id) {
            if self.objects.get(guess).is_some_and(|o| o.id() == id) {
                return Some(guess);
            }
        }
        self.objects.iter().position(|o| o.id() == id)
    }

    /// Object at `index`, or `None` when out of range.
    pub fn get(&self, index: usize) -> Option<&T> {
        let found = self.objects.get(index);
        if cfg!(debug_assertions) && found.is_none() {
            error!("{}: index {} out of range", self.name, index);
        }
        found
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let len = self.objects.len();
        let found = self.objects.get_mut(index);
        if cfg!(debug_assertions) && found.is_none() {
            error!("{}: index {} out of range (len {})", self.name, index, len);
        }
        found
    }

    /// Entity with the smallest [`HandlerObject::size_key`].
    pub fn smallest(&self) -> Option<&T> {
        self.smallest.and_then(|i| self.objects.get(i))
    }

    /// Entity with the largest [`HandlerObject::size_key`].
    pub fn largest(&self) -> Option<&T> {
        self.largest.and_then(|i| self.objects.get(i))
    }

    /// Recompute the smallest/largest cache from scratch.
    ///
    /// Needed after an entity's size is changed in place through `get_mut`.
    pub fn refresh_extremes(&mut self) {
        self.smallest = None;
        self.largest = None;
        for i in 0..self.objects.len() {
            self.track_extremes(i);
        }
    }

    fn track_extremes(&mut self, index: usize) {
        let Some(key) = self.key_at(index) else {
            return;
        };
        if self.smallest.and_then(|s| self.key_at(s)).is_none_or(|k| key < k) {
            self.smallest = Some(index);
        }
        if self.largest.and_then(|l| self.key_at(l)).is_none_or(|k| key > k) {
            self.largest = Some(index);
        }
    }

    fn key_at(&self, index: usize) -> Option<NotNan<f64>> {
        self.objects
            .get(index)
            .and_then(|o| o.size_key())
            .and_then(|k| NotNan::new(k).ok())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Next id that [`Self::add`] will hand out.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn last(&self) -> Option<&T> {
        self.objects.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.objects.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.objects
    }

    /// Mutable view of the storage. Entities must not be reordered through it.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.objects
    }

    /// Drop every entity. The id counter keeps its value.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.smallest = None;
        self.largest = None;
    }
}

impl<T> Index<usize> for EntityHandler<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.objects[index]
    }
}

impl<T> IndexMut<usize> for EntityHandler<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.objects[index]
    }
}

impl<'a, T> IntoIterator for &'a EntityHandler<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Token {
        id: u64,
        index: usize,
        size: f64,
        moves: usize,
    }

    impl Token {
        fn new(size: f64) -> Self {
            Self {
                id: u64::MAX,
                index: usize::MAX,
                size,
                moves: 0,
            }
        }
    }

    impl HandlerObject for Token {
        fn id(&self) -> u64 {
            self.id
        }
        fn set_id(&mut self, id: u64) {
            self.id = id;
        }
        fn index(&self) -> usize {
            self.index
        }
        fn set_index(&mut self, index: usize) {
            self.index = index;
        }
        fn move_in_handler(&mut self, new_index: usize) {
            self.moves += 1;
            self.set_index(new_index);
        }
        fn size_key(&self) -> Option<f64> {
            Some(self.size)
        }
    }

    fn filled(sizes: &[f64]) -> EntityHandler<Token> {
        let mut h = EntityHandler::new("tokens");
        for &s in sizes {
            h.add(Token::new(s));
        }
        h
    }

    #[test]
    fn add_assigns_sequential_ids_and_indices() {
        let h = filled(&[1.0, 2.0, 3.0]);
        for (i, t) in h.iter().enumerate() {
            assert_eq!(t.index, i);
            assert_eq!(t.id, i as u64);
        }
        assert_eq!(h.next_id(), 3);
    }

    #[test]
    fn remove_swaps_last_into_slot() {
        let mut h = filled(&[1.0, 2.0, 3.0, 4.0]);
        let removal = h.remove(1).unwrap();
        assert_eq!(removal.removed.id, 1);
        assert_eq!(removal.moved_from, Some(3));
        assert_eq!(h.len(), 3);
        assert_eq!(h[1].id, 3);
        assert_eq!(h[1].index, 1);
        assert_eq!(h[1].moves, 1);
    }

    #[test]
    fn removing_last_moves_nothing() {
        let mut h = filled(&[1.0, 2.0]);
        let removal = h.remove(1).unwrap();
        assert_eq!(removal.moved_from, None);
        assert_eq!(h[0].moves, 0);
    }

    #[test]
    fn out_of_range_remove_is_a_no_op() {
        let mut h = filled(&[1.0, 2.0]);
        assert!(h.remove(2).is_none());
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut h = filled(&[1.0, 2.0]);
        h.remove(0);
        h.remove(0);
        assert!(h.is_empty());
        let id = h.add(Token::new(5.0));
        assert_eq!(id, 2);
    }

    #[test]
    fn get_by_id_survives_reordering() {
        let mut h = filled(&[1.0, 2.0, 3.0, 4.0]);
        h.remove(0);
        // id 3 now lives at index 0, so the direct guess misses
        assert_eq!(h.get_by_id(3).map(|t| t.index), Some(0));
        assert_eq!(h.get_by_id(2).map(|t| t.index), Some(2));
        assert!(h.get_by_id(0).is_none());
    }

    #[test]
    fn get_by_id_mut_edits_in_place() {
        let mut h = filled(&[1.0, 2.0, 3.0]);
        h.remove(0);
        if let Some(t) = h.get_by_id_mut(2) {
            t.size = 7.5;
        }
        assert_eq!(h[0].size, 7.5);
        assert!(h.get_by_id_mut(0).is_none());
    }

    #[test]
    fn add_with_id_advances_counter() {
        let mut h: EntityHandler<Token> = EntityHandler::new("tokens");
        h.add_with_id(Token::new(1.0), 10);
        assert_eq!(h[0].id, 10);
        assert_eq!(h.add(Token::new(1.0)), 11);
    }

    #[test]
    fn extremes_follow_removals() {
        let mut h = filled(&[2.0, 0.5, 3.0, 1.0]);
        assert_eq!(h.smallest().map(|t| t.size), Some(0.5));
        assert_eq!(h.largest().map(|t| t.size), Some(3.0));
        h.remove(2);
        assert_eq!(h.largest().map(|t| t.size), Some(2.0));
        h.remove(1);
        assert_eq!(h.smallest().map(|t| t.size), Some(1.0));
        h[0].size = 0.1;
        h.refresh_extremes();
        assert_eq!(h.smallest().map(|t| t.size), Some(0.1));
    }

    #[test]
    fn get_out_of_range_returns_none() {
        let h = filled(&[1.0]);
        assert!(h.get(1).is_none());
        assert!(h.get(0).is_some());
    }

    proptest! {
        #[test]
        fn swap_remove_keeps_indices_dense(
            sizes in proptest::collection::vec(0.1f64..10.0, 1..40),
            removals in proptest::collection::vec(0usize..64, 0..40),
        ) {
            let mut h = filled(&sizes);
            let mut issued: Vec<u64> = h.iter().map(|t| t.id).collect();
            for r in removals {
                let before = h.len();
                match h.remove(r) {
                    Some(removal) => {
                        prop_assert!(r < before);
                        prop_assert_eq!(h.len(), before - 1);
                        prop_assert!(h.iter().all(|t| t.id != removal.removed.id));
                    }
                    None => prop_assert!(r >= before),
                }
                for (i, t) in h.iter().enumerate() {
                    prop_assert_eq!(t.index, i);
                }
                let new_id = h.add(Token::new(1.0));
                prop_assert!(!issued.contains(&new_id));
                issued.push(new_id);
            }
            let max = h.iter().map(|t| t.size).fold(f64::MIN, f64::max);
            prop_assert_eq!(h.largest().map(|t| t.size), Some(max));
        }
    }
}
