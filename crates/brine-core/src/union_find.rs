// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Disjoint-set over monotonically allocated ids.
//!
//! Determinism contract
//! - The default tie-break is smaller-id-wins: `union(a, b)` always survives
//!   as `min(find(a), find(b))`.
//! - In seeded mode the survivor is chosen by a coin flip instead, and the
//!   generator is advanced exactly once per distinct union. Unions of ids that
//!   are already equivalent never touch the generator, so the consumed
//!   sequence is a pure function of the distinct-union history.
use crate::error::EngineError;
use crate::ident::ENodeId;
use crate::rng::SeededRng;

/// Result of a successful union of two distinct roots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Union {
    /// Canonical id that survives the union.
    pub winner: ENodeId,
    /// Root that now points at `winner`.
    pub loser: ENodeId,
}

/// Disjoint-set with path compression and a deterministic tie-break.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<u32>,
    rng: Option<SeededRng>,
}

impl Default for UnionFind {
    fn default() -> Self {
        Self::new()
    }
}

impl UnionFind {
    /// Creates an empty union-find with the default smaller-id-wins tie-break.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            rng: None,
        }
    }

    /// Creates an empty union-find whose survivors are chosen by a seeded
    /// coin flip.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            parent: Vec::new(),
            rng: Some(SeededRng::new(seed)),
        }
    }

    /// Number of allocated ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns `true` if no id has been allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Returns `true` if `id` has been allocated.
    #[must_use]
    pub fn contains(&self, id: ENodeId) -> bool {
        id.index() < self.parent.len()
    }

    /// Registers `id` as a fresh singleton set, growing the array if needed.
    ///
    /// Ids between the current length and `id` are also registered as
    /// singletons so the array stays dense.
    pub fn make_set(&mut self, id: ENodeId) {
        while self.parent.len() <= id.index() {
            #[allow(clippy::cast_possible_truncation)]
            let next = self.parent.len() as u32;
            self.parent.push(next);
        }
    }

    /// Returns the canonical representative of `id`, compressing the path.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if `id` was never allocated.
    pub fn find(&mut self, id: ENodeId) -> Result<ENodeId, EngineError> {
        if !self.contains(id) {
            return Err(EngineError::UnknownId(id));
        }
        let root = self.walk(id.0);
        // Second pass: point the whole chain at the root.
        let mut cur = id.0;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        Ok(ENodeId(root))
    }

    /// Returns the canonical representative of `id` without compressing.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if `id` was never allocated.
    pub fn resolve(&self, id: ENodeId) -> Result<ENodeId, EngineError> {
        if !self.contains(id) {
            return Err(EngineError::UnknownId(id));
        }
        Ok(ENodeId(self.walk(id.0)))
    }

    /// Returns `true` if `id` is its own canonical representative.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if `id` was never allocated.
    pub fn is_canonical(&self, id: ENodeId) -> Result<bool, EngineError> {
        if !self.contains(id) {
            return Err(EngineError::UnknownId(id));
        }
        Ok(self.parent[id.index()] == id.0)
    }

    /// Unions the sets of `a` and `b` and returns the outcome.
    ///
    /// Returns `None` when `a` and `b` are already equivalent; the generator
    /// is not consulted in that case.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if either id was never allocated.
    pub fn union(&mut self, a: ENodeId, b: ENodeId) -> Result<Option<Union>, EngineError> {
        let ra = self.find(a)?;
        let rb = self.find(b)?;
        if ra == rb {
            return Ok(None);
        }
        let (winner, loser) = match self.rng.as_mut() {
            // Default tie-break (U1): the smaller id survives.
            None => (ra.min(rb), ra.max(rb)),
            Some(rng) => {
                if rng.coin_flip() {
                    (ra, rb)
                } else {
                    (rb, ra)
                }
            }
        };
        self.parent[loser.index()] = winner.0;
        Ok(Some(Union { winner, loser }))
    }

    fn walk(&self, mut cur: u32) -> u32 {
        while self.parent[cur as usize] != cur {
            cur = self.parent[cur as usize];
        }
        cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ENodeId {
        ENodeId(n)
    }

    fn fresh(n: u32) -> UnionFind {
        let mut uf = UnionFind::new();
        uf.make_set(id(n - 1));
        uf
    }

    #[test]
    fn smaller_id_wins() {
        let mut uf = fresh(4);
        let u = uf.union(id(3), id(1)).unwrap().unwrap();
        assert_eq!(u.winner, id(1));
        assert_eq!(u.loser, id(3));
        assert_eq!(uf.find(id(3)).unwrap(), id(1));
    }

    #[test]
    fn union_of_equivalent_ids_is_a_no_op() {
        let mut uf = fresh(4);
        uf.union(id(0), id(2)).unwrap();
        assert!(uf.union(id(0), id(2)).unwrap().is_none());
    }

    #[test]
    fn path_compression_points_chains_at_the_root() {
        let mut uf = fresh(4);
        uf.union(id(2), id(3)).unwrap();
        uf.union(id(1), id(2)).unwrap();
        uf.union(id(0), id(1)).unwrap();
        assert_eq!(uf.find(id(3)).unwrap(), id(0));
        // After compression, the walk from 3 is a single hop.
        assert_eq!(uf.parent[3], 0);
    }

    #[test]
    fn unknown_id_is_rejected() {
        let mut uf = fresh(2);
        assert!(matches!(
            uf.find(id(9)),
            Err(EngineError::UnknownId(ENodeId(9)))
        ));
    }

    #[test]
    fn seeded_mode_is_reproducible() {
        let run = |seed: u64| {
            let mut uf = UnionFind::with_seed(seed);
            uf.make_set(id(7));
            let mut winners = Vec::new();
            for (a, b) in [(0, 1), (2, 3), (4, 5), (0, 2), (4, 6)] {
                if let Some(u) = uf.union(id(a), id(b)).unwrap() {
                    winners.push(u.winner);
                }
            }
            winners
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn seeded_no_op_union_does_not_advance_the_rng() {
        let mut a = UnionFind::with_seed(9);
        let mut b = UnionFind::with_seed(9);
        a.make_set(id(3));
        b.make_set(id(3));
        a.union(id(0), id(1)).unwrap();
        b.union(id(0), id(1)).unwrap();
        // Extra no-op union on `a` must not perturb the next flip.
        a.union(id(0), id(1)).unwrap();
        let ua = a.union(id(2), id(3)).unwrap().unwrap();
        let ub = b.union(id(2), id(3)).unwrap().unwrap();
        assert_eq!(ua.winner, ub.winner);
    }
}
