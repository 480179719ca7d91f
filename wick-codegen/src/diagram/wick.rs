//! Wick's theorem
//!
//! The expansion is a work-list over owned diagrams. Each round contracts the first
//! open creation operator of every live diagram with each possible partner,
//! so that the number of open creation operators decreases by one per round.

use super::Diagram;
use crate::{index::RangeClass, operator::State};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Fully contracted terms and the number of rounds it took
#[derive(Debug, Clone)]
pub struct Expansion {
    pub diagrams: Vec<Diagram>,
    pub rounds: usize,
}

impl Diagram {
    /// Resolve general indices into closed, active and virtual ones,
    /// dropping the combinations which cannot be fully contracted
    pub fn get_all(&self) -> Vec<Diagram> {
        let general: Vec<usize> = (0..self.classes.len())
            .filter(|&s| self.classes[s] == RangeClass::General)
            .collect();
        let mut out = vec![self.clone()];
        for slot in general {
            out = out
                .into_iter()
                .flat_map(|d| {
                    RangeClass::RESOLVED.iter().map(move |class| {
                        let mut d = d.clone();
                        d.classes[slot] = *class;
                        d
                    })
                })
                .collect();
        }
        out.retain(|d| d.valid());
        out
    }

    /// Contract the first open creation operator with the `i`-th open annihilation operator,
    /// both outside of the active space.
    ///
    /// Returns false when the pair cannot be contracted. Closed orbitals contract
    /// a creation operator with an annihilation operator on its right,
    /// virtual ones with an annihilation operator on its left.
    /// Operators are normal ordered, thus elements of the same operator never contract.
    pub fn reduce_one_noactive(&mut self, i: usize) -> bool {
        let positions = self.positions();
        let Some(e) = positions.iter().position(|&p| {
            let e = self.element(p);
            e.dagger && self.is_open_noactive(e)
        }) else {
            return false;
        };
        let Some(f) = positions
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                let f = self.element(**p);
                !f.dagger && self.is_open_noactive(f)
            })
            .map(|(n, _)| n)
            .nth(i)
        else {
            return false;
        };

        let (pe, pf) = (positions[e], positions[f]);
        let class = self.class(self.element(pe));
        if class != self.class(self.element(pf)) || pe.0 == pf.0 {
            return false;
        }
        let ordered = match class {
            RangeClass::Closed => e < f,
            RangeClass::Virtual => f < e,
            _ => false,
        };
        if !ordered {
            return false;
        }

        let (lo, hi) = if e < f { (e, f) } else { (f, e) };
        let between = positions[lo + 1..hi]
            .iter()
            .filter(|&&p| self.element(p).is_open())
            .count();
        if between % 2 == 1 {
            self.fac = -self.fac;
        }

        let (slot, spin_e, spin_f) = {
            let (ee, ff) = (self.element(pe), self.element(pf));
            (ee.slot, ee.spin, ff.spin)
        };
        self.element_mut(pe).state = State::Contracted;
        let ff = self.element_mut(pf);
        ff.state = State::Contracted;
        ff.slot = slot;
        self.union_spin(spin_e, spin_f);
        true
    }

    /// Leave the remaining open operators to the active space,
    /// and sum up closed spin loops, which contribute a factor of two each
    fn commit(&mut self) {
        for p in self.positions() {
            if self.element(p).is_open() {
                self.element_mut(p).state = State::Active;
            }
        }
        let active: HashSet<usize> = self
            .positions()
            .into_iter()
            .filter(|&p| self.element(p).state == State::Active)
            .map(|p| self.find_spin(self.element(p).spin))
            .collect();
        let mut loops: HashSet<usize> = HashSet::new();
        for p in self.positions() {
            let root = self.find_spin(self.element(p).spin);
            if !active.contains(&root) {
                loops.insert(root);
            }
        }
        self.fac *= 2f64.powi(loops.len() as i32);
    }

    /// Apply Wick's theorem until every term is fully contracted outside the active space
    ///
    /// ```
    /// use std::str::FromStr;
    /// use wick_codegen::diagram::Diagram;
    ///
    /// let d = Diagram::from_str("proj(c,a) f1(a,c)").unwrap();
    /// let expansion = d.expand();
    /// assert_eq!(expansion.diagrams.len(), 1);
    /// assert_eq!(expansion.rounds, 2);
    /// assert_eq!(expansion.diagrams[0].fac(), 2.0);
    /// ```
    pub fn expand(&self) -> Expansion {
        let mut live: Vec<Diagram> = self
            .get_all()
            .into_iter()
            .filter(|d| d.valid() || d.done())
            .collect();
        let mut diagrams = Vec::new();
        let mut rounds = 0;
        loop {
            let (done, rest): (Vec<Diagram>, Vec<Diagram>) =
                live.into_iter().partition(|d| d.done_noactive());
            for mut d in done {
                d.commit();
                // terms with bra or ket vanish unless they depend on the density
                if (d.bra || d.ket) && !d.gamma_derivative() {
                    trace!("drop vanishing overlap: {}", d);
                    continue;
                }
                diagrams.push(d);
            }
            if rest.is_empty() {
                break;
            }
            rounds += 1;
            let mut next = Vec::new();
            for d in &rest {
                for i in 0..d.dagger_count() {
                    let mut n = d.clone();
                    if !n.reduce_one_noactive(i) {
                        continue;
                    }
                    if n.valid() || n.done() {
                        next.push(n);
                    }
                }
            }
            debug!(round = rounds, live = next.len(), committed = diagrams.len());
            live = next;
        }
        Expansion { diagrams, rounds }
    }
}
