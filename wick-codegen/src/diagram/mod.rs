//! One term of the expansion: a product of operators with a factor
//!
//! Indices are not stored in the operators directly.
//! Each [Element] refers to a slot of the index arena owned by the diagram,
//! so that a contraction is just a rewrite of the slot, and a relabeling of
//! indices is a permutation of the arena.

mod identity;
mod wick;

pub use wick::Expansion;

use crate::{
    active::{Active, ActiveElement},
    error::{Error, Result},
    index::{index_str, Index, RangeClass},
    operator::{Element, Operator, State},
    parser::{RawDiagram, RawOperator},
};
use std::{collections::HashMap, fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq)]
pub struct Diagram {
    ops: Vec<Operator>,
    /// Range class of each index slot
    classes: Vec<RangeClass>,
    /// Union-find over spin slots
    spins: Vec<usize>,
    fac: f64,
    scalar: Option<String>,
    bra: bool,
    ket: bool,
    /// Marks that the term also stands for its projector-permuted copy
    dagger: bool,
}

impl FromStr for Diagram {
    type Err = Error;
    fn from_str(input: &str) -> Result<Self> {
        let raw = RawDiagram::from_str(input)?;
        Diagram::new(&raw.operators, raw.factor.unwrap_or(1.0))
    }
}

impl Diagram {
    pub fn new(operators: &[RawOperator], fac: f64) -> Result<Self> {
        let mut ops = Vec::with_capacity(operators.len());
        let mut classes = Vec::new();
        let mut nspin = 0;
        for raw in operators {
            if raw.classes.len() % 2 != 0 {
                return Err(Error::InvalidOperators(format!(
                    "{} has odd number of indices",
                    raw.label
                )));
            }
            ops.push(Operator::new(
                &raw.label,
                raw.classes.len(),
                classes.len(),
                nspin,
            ));
            classes.extend(raw.classes.iter().copied());
            nspin += raw.classes.len() / 2;
        }
        Ok(Diagram {
            ops,
            classes,
            spins: (0..nspin).collect(),
            fac,
            scalar: None,
            bra: false,
            ket: false,
            dagger: false,
        })
    }

    pub fn ops(&self) -> &[Operator] {
        &self.ops
    }

    pub fn fac(&self) -> f64 {
        self.fac
    }

    pub fn set_fac(&mut self, fac: f64) {
        self.fac = fac;
    }

    pub fn scalar(&self) -> Option<&str> {
        self.scalar.as_deref()
    }

    /// Attach a scalar such as the reference energy `e0` to this term
    pub fn set_scalar(&mut self, scalar: &str) {
        self.scalar = Some(scalar.to_string());
    }

    pub fn braket(&self) -> (bool, bool) {
        (self.bra, self.ket)
    }

    pub fn set_bra(&mut self, bra: bool) {
        self.bra = bra;
    }

    pub fn set_ket(&mut self, ket: bool) {
        self.ket = ket;
    }

    pub fn dagger(&self) -> bool {
        self.dagger
    }

    pub fn add_dagger(&mut self) {
        self.dagger = true;
    }

    pub fn index(&self, slot: usize) -> Index {
        Index::new(self.classes[slot], slot)
    }

    pub fn class(&self, e: &Element) -> RangeClass {
        self.classes[e.slot]
    }

    /// Indices of an operator in its tensor order
    pub fn op_indices(&self, op: &Operator) -> Vec<Index> {
        op.tensor_elements()
            .into_iter()
            .map(|e| self.index(e.slot))
            .collect()
    }

    pub(crate) fn find_spin(&self, mut s: usize) -> usize {
        while self.spins[s] != s {
            s = self.spins[s];
        }
        s
    }

    pub(crate) fn union_spin(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find_spin(a), self.find_spin(b));
        if ra != rb {
            self.spins[rb] = ra;
        }
    }

    /// All elements in the order of the operator string, as `(operator, element)` positions
    pub(crate) fn positions(&self) -> Vec<(usize, usize)> {
        self.ops
            .iter()
            .enumerate()
            .flat_map(|(i, op)| (0..op.elements().len()).map(move |j| (i, j)))
            .collect()
    }

    pub(crate) fn element(&self, (i, j): (usize, usize)) -> &Element {
        &self.ops[i].elements()[j]
    }

    pub(crate) fn element_mut(&mut self, (i, j): (usize, usize)) -> &mut Element {
        &mut self.ops[i].elements_mut()[j]
    }

    fn is_open_noactive(&self, e: &Element) -> bool {
        e.is_open() && !self.class(e).is_active()
    }

    /// Number of creation operators which are neither contracted nor left to the active space
    pub fn dagger_count(&self) -> usize {
        self.positions()
            .into_iter()
            .map(|p| self.element(p))
            .filter(|e| e.dagger && self.is_open_noactive(e))
            .count()
    }

    /// False if the term vanishes since some class has unbalanced open operators
    pub fn valid(&self) -> bool {
        RangeClass::RESOLVED.iter().all(|class| {
            let (mut creation, mut annihilation) = (0, 0);
            for p in self.positions() {
                let e = self.element(p);
                if e.is_open() && self.class(e) == *class {
                    if e.dagger {
                        creation += 1;
                    } else {
                        annihilation += 1;
                    }
                }
            }
            creation == annihilation
        })
    }

    /// Fully contracted, no active part remains
    pub fn done(&self) -> bool {
        self.positions()
            .into_iter()
            .all(|p| !self.element(p).is_open())
            && self.active_indices().is_empty()
    }

    /// Fully contracted except the active part
    pub fn done_noactive(&self) -> bool {
        self.positions()
            .into_iter()
            .all(|p| !self.is_open_noactive(self.element(p)))
    }

    pub fn has_target_index(&self) -> bool {
        self.ops
            .iter()
            .any(|op| op.is_projector() && !op.elements().is_empty())
    }

    /// Indices of the projector, i.e. the free indices of the term
    pub fn ex_target_index(&self) -> Vec<Index> {
        self.ops
            .iter()
            .filter(|op| op.is_projector())
            .flat_map(|op| self.op_indices(op))
            .collect()
    }

    fn active_elements(&self) -> Vec<&Element> {
        self.positions()
            .into_iter()
            .map(|p| self.element(p))
            .filter(|e| e.state == State::Active || (e.is_open() && self.class(e).is_active()))
            .collect()
    }

    /// Active indices in the order of the operator string
    pub fn active_indices(&self) -> Vec<Index> {
        self.active_elements()
            .into_iter()
            .map(|e| self.index(e.slot))
            .collect()
    }

    /// Whether this term still depends on the active-space density
    pub fn gamma_derivative(&self) -> bool {
        !self.active_indices().is_empty()
    }

    /// Spin of each active element, labeled by first appearance
    pub(crate) fn active_spin_labels(&self) -> Vec<usize> {
        let mut labels: HashMap<usize, usize> = HashMap::new();
        self.active_elements()
            .into_iter()
            .map(|e| {
                let root = self.find_spin(e.spin);
                let n = labels.len();
                *labels.entry(root).or_insert(n)
            })
            .collect()
    }

    /// The active part as a separated operator string, None if the term has no active index
    pub fn active(&self) -> Option<Active> {
        let elements = self.active_elements();
        if elements.is_empty() {
            return None;
        }
        let spins = self.active_spin_labels();
        let elements = elements
            .into_iter()
            .zip(spins)
            .map(|(e, spin)| ActiveElement {
                index: self.index(e.slot),
                dagger: e.dagger,
                spin,
            })
            .collect();
        Some(Active::new(elements, self.bra, self.ket))
    }

    /// Renumber index slots by their first appearance,
    /// scanning operators in order and each operator in its tensor order.
    ///
    /// Identical diagrams yield identical indices after this call.
    pub fn refresh_indices(&mut self) {
        let mut slot_map: HashMap<usize, usize> = HashMap::new();
        let mut classes = Vec::new();
        for op in &self.ops {
            for e in op.tensor_elements() {
                if !slot_map.contains_key(&e.slot) {
                    slot_map.insert(e.slot, classes.len());
                    classes.push(self.classes[e.slot]);
                }
            }
        }
        let mut spin_map: HashMap<usize, usize> = HashMap::new();
        for p in self.positions() {
            let root = self.find_spin(self.element(p).spin);
            let n = spin_map.len();
            spin_map.entry(root).or_insert(n);
        }
        for p in self.positions() {
            let root = self.find_spin(self.element(p).spin);
            let e = self.element_mut(p);
            e.slot = slot_map[&e.slot];
            e.spin = spin_map[&root];
        }
        self.classes = classes;
        self.spins = (0..spin_map.len()).collect();
    }
}

impl fmt::Display for Diagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fac)?;
        if let Some(scalar) = &self.scalar {
            write!(f, " {}", scalar)?;
        }
        for op in &self.ops {
            write!(f, " {}{}", op.label(), index_str(&self.op_indices(op)))?;
            if op.elements().is_empty() {
                write!(f, "()")?;
            }
        }
        if let Some(active) = self.active() {
            write!(f, " [{}]", active)?;
        }
        if self.dagger {
            write!(f, " *")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;

    #[test]
    fn counts() -> Result<()> {
        let d = Diagram::from_str("proj(c,c,a,a) f1(c,c) t2(a,a,c,c)")?;
        assert_eq!(d.dagger_count(), 5);
        assert!(d.valid());
        assert!(!d.done());
        assert!(!d.done_noactive());
        assert!(d.has_target_index());

        // one more closed creation than annihilation
        let d = Diagram::from_str("proj(c,c,a,a) f1(c,a) t2(a,a,c,c)")?;
        assert!(!d.valid());
        Ok(())
    }

    #[test]
    fn active_only() -> Result<()> {
        let d = Diagram::from_str("f1(x,x)")?;
        assert_eq!(d.dagger_count(), 0);
        assert!(d.done_noactive());
        assert!(!d.done());
        assert!(d.gamma_derivative());
        let active = d.active().unwrap();
        assert_eq!(active.elements().len(), 2);
        Ok(())
    }

    #[test]
    fn odd_operator() {
        assert!(Diagram::from_str("proj(c,c,a)").is_err());
    }

    #[test]
    fn ex_target_index() -> Result<()> {
        let d = Diagram::from_str("proj(c,a) f1(a,c)")?;
        let ex: Vec<String> = d.ex_target_index().iter().map(|i| i.to_string()).collect();
        assert_eq!(ex, vec!["c0", "a1"]);
        let d = Diagram::from_str("proj() v2(c,c,a,a)")?;
        assert!(!d.has_target_index());
        Ok(())
    }
}
