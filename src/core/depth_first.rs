//! Backtracking state of a depth-first search.
//!
//! The candidate stack plays the role of a call stack: `parent` is the
//! return address and `active` the neighbor currently being explored.

use crate::common::PeerAddress;

#[derive(Debug, Clone, Default, PartialEq)]
/// The single depth-first session a node holds.
///
/// A new depth-first search overwrites whatever session was in progress.
pub struct DepthFirstSession {
    parent: Option<PeerAddress>,
    candidates: Vec<PeerAddress>,
    active: Option<PeerAddress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What to do with a depth-first message after a [DepthFirstSession::step].
pub enum DepthFirstStep {
    /// The originator ran out of candidates, the key is unreachable.
    Exhausted,
    /// `from` is not the neighbor being probed, send the message straight back.
    Bounce(PeerAddress),
    /// No candidates left, return the message to the parent.
    Backtrack(PeerAddress),
    /// Descend into the next candidate.
    Descend(PeerAddress),
    /// Nothing left to explore and no parent to return to.
    Orphaned,
}

impl DepthFirstSession {
    /// Session of a node that was just reached from `parent`.
    pub fn relay(parent: PeerAddress, candidates: Vec<PeerAddress>) -> Self {
        DepthFirstSession {
            parent: Some(parent),
            candidates,
            active: None,
        }
    }

    /// Session of the node originating a search, already probing its first
    /// candidate. Returns `None` without neighbors.
    pub fn originate(own: PeerAddress, mut candidates: Vec<PeerAddress>) -> Option<Self> {
        let active = candidates.pop()?;

        Some(DepthFirstSession {
            parent: Some(own),
            candidates,
            active: Some(active),
        })
    }

    // === Getters ===

    pub fn parent(&self) -> Option<PeerAddress> {
        self.parent
    }

    pub fn active(&self) -> Option<PeerAddress> {
        self.active
    }

    /// Neighbors not yet probed, the last one is probed next.
    pub fn candidates(&self) -> &[PeerAddress] {
        &self.candidates
    }

    // === Public Methods ===

    /// Advances the session for a message that arrived from `from`.
    pub fn step(&mut self, own: PeerAddress, from: PeerAddress) -> DepthFirstStep {
        self.candidates.retain(|candidate| *candidate != from);

        if self.parent == Some(own) && self.active == Some(from) && self.candidates.is_empty() {
            return DepthFirstStep::Exhausted;
        }

        if let Some(active) = self.active {
            if active != from {
                return DepthFirstStep::Bounce(from);
            }
        }

        match self.candidates.pop() {
            Some(next) => {
                self.active = Some(next);
                DepthFirstStep::Descend(next)
            }
            None => match self.parent {
                Some(parent) => DepthFirstStep::Backtrack(parent),
                None => DepthFirstStep::Orphaned,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn address(port: u16) -> PeerAddress {
        PeerAddress::new([127, 0, 0, 1].into(), port)
    }

    #[test]
    fn descend_in_stack_order() {
        let (a, b, c, d) = (address(1), address(2), address(3), address(4));
        let mut session = DepthFirstSession::relay(a, vec![b, c, d]);

        assert_eq!(session.step(address(9), a), DepthFirstStep::Descend(d));
        assert_eq!(session.active(), Some(d));
        assert_eq!(session.candidates(), &[b, c]);
    }

    #[test]
    fn backtrack_when_candidates_are_exhausted() {
        let (a, b) = (address(1), address(2));
        let own = address(9);
        let mut session = DepthFirstSession::relay(a, vec![b]);

        assert_eq!(session.step(own, a), DepthFirstStep::Descend(b));
        assert_eq!(session.step(own, b), DepthFirstStep::Backtrack(a));
    }

    #[test]
    fn bounce_on_cycle() {
        // Ring A-B-C, probing B, message comes around from C.
        let (own, b, c) = (address(1), address(2), address(3));
        let mut session = DepthFirstSession::originate(own, vec![c, b]).unwrap();
        assert_eq!(session.active(), Some(b));

        assert_eq!(session.step(own, c), DepthFirstStep::Bounce(c));
        // C was dropped from the candidates and B is still being probed.
        assert_eq!(session.active(), Some(b));
        assert!(session.candidates().is_empty());
    }

    #[test]
    fn originator_exhausted() {
        let (own, b, c) = (address(1), address(2), address(3));
        let mut session = DepthFirstSession::originate(own, vec![b, c]).unwrap();

        assert_eq!(session.step(own, c), DepthFirstStep::Descend(b));
        assert_eq!(session.step(own, b), DepthFirstStep::Exhausted);
    }

    #[test]
    fn originate_without_neighbors() {
        assert_eq!(DepthFirstSession::originate(address(1), vec![]), None);
    }

    #[test]
    fn orphaned_without_parent() {
        let mut session = DepthFirstSession::default();

        assert_eq!(
            session.step(address(1), address(2)),
            DepthFirstStep::Orphaned
        );
    }
}
