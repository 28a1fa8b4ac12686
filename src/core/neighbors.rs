//! Ordered, duplicate free list of known peers.

use std::slice::Iter;

use crate::common::PeerAddress;

#[derive(Debug, Clone, Default, PartialEq)]
/// Neighbor table of a node.
///
/// Insertion order is preserved, it determines listing indexes and the order
/// in which a depth-first search pushes its candidates.
pub struct NeighborTable {
    neighbors: Vec<PeerAddress>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    // === Public Methods ===

    /// Appends `address` and returns `true`, unless it is already present.
    pub fn add(&mut self, address: PeerAddress) -> bool {
        if self.contains(&address) {
            return false;
        }

        self.neighbors.push(address);
        true
    }

    /// Removes `address` and returns `true` if it was present.
    pub fn remove(&mut self, address: &PeerAddress) -> bool {
        match self.neighbors.iter().position(|neighbor| neighbor == address) {
            Some(index) => {
                self.neighbors.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.neighbors.contains(address)
    }

    pub fn get(&self, index: usize) -> Option<PeerAddress> {
        self.neighbors.get(index).copied()
    }

    /// Every neighbor except `excluded`, in table order.
    pub fn except(&self, excluded: &PeerAddress) -> Vec<PeerAddress> {
        self.neighbors
            .iter()
            .filter(|neighbor| *neighbor != excluded)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, PeerAddress> {
        self.neighbors.iter()
    }

    pub fn as_slice(&self) -> &[PeerAddress] {
        &self.neighbors
    }

    pub fn to_vec(&self) -> Vec<PeerAddress> {
        self.neighbors.clone()
    }
}

impl<'a> IntoIterator for &'a NeighborTable {
    type Item = &'a PeerAddress;
    type IntoIter = Iter<'a, PeerAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
