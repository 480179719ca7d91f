//! Contraction-ready operands

use crate::{
    active::Active,
    index::{index_str, Index},
};
use std::{collections::HashMap, fmt};

/// What a tensor refers to in the generated program
#[derive(Debug, Clone)]
pub enum TensorKind {
    /// Operator of the input diagram, e.g. `f1`, `t2` or the projector `proj`
    Operand(String),
    /// `I{n}`, introduced by the factorization
    Intermediate(usize),
    /// `Gamma{n}`, the active part of a term evaluated from density matrices
    Gamma { num: usize, active: Active },
}

#[derive(Debug, Clone)]
pub struct Tensor {
    kind: TensorKind,
    factor: f64,
    indices: Vec<Index>,
    /// e.g. `e0` for terms multiplied by the reference energy
    scalar: Option<String>,
    /// Operand absorbed into a Gamma, see [crate::list_tensor::ListTensor::absorb_all_internal]
    merged: Option<Box<Tensor>>,
    /// Label of the structurally equal Gamma computed instead of this one
    alias: Option<String>,
}

impl Tensor {
    pub fn operand(label: &str, indices: Vec<Index>) -> Self {
        Self::with_kind(TensorKind::Operand(label.to_string()), indices)
    }

    pub fn intermediate(num: usize, indices: Vec<Index>) -> Self {
        Self::with_kind(TensorKind::Intermediate(num), indices)
    }

    pub fn gamma(num: usize, active: Active) -> Self {
        let indices = active.indices();
        Self::with_kind(TensorKind::Gamma { num, active }, indices)
    }

    fn with_kind(kind: TensorKind, indices: Vec<Index>) -> Self {
        Tensor {
            kind,
            factor: 1.0,
            indices,
            scalar: None,
            merged: None,
            alias: None,
        }
    }

    pub fn kind(&self) -> &TensorKind {
        &self.kind
    }

    pub fn label(&self) -> String {
        match &self.kind {
            TensorKind::Operand(label) => label.clone(),
            TensorKind::Intermediate(n) => format!("I{}", n),
            TensorKind::Gamma { num, .. } => format!("Gamma{}", num),
        }
    }

    /// Label of the tensor actually computed, i.e. the alias if any
    pub fn effective_label(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.label())
    }

    pub fn is_projector(&self) -> bool {
        matches!(&self.kind, TensorKind::Operand(label) if label == "proj")
    }

    pub fn is_gamma(&self) -> bool {
        matches!(self.kind, TensorKind::Gamma { .. })
    }

    pub fn is_intermediate(&self) -> bool {
        matches!(self.kind, TensorKind::Intermediate(_))
    }

    pub fn active(&self) -> Option<&Active> {
        match &self.kind {
            TensorKind::Gamma { active, .. } => Some(active),
            _ => None,
        }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn set_factor(&mut self, factor: f64) {
        self.factor = factor;
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn set_indices(&mut self, indices: Vec<Index>) {
        self.indices = indices;
    }

    pub fn scalar(&self) -> Option<&str> {
        self.scalar.as_deref()
    }

    pub fn set_scalar(&mut self, scalar: Option<String>) {
        self.scalar = scalar;
    }

    pub fn merged(&self) -> Option<&Tensor> {
        self.merged.as_deref()
    }

    pub fn set_merged(&mut self, merged: Tensor) {
        self.merged = Some(Box::new(merged));
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn set_alias(&mut self, alias: &str) {
        self.alias = Some(alias.to_string());
    }

    /// Position of an index in this tensor
    pub fn position(&self, index: &Index) -> Option<usize> {
        self.indices.iter().position(|i| i.identical(index))
    }

    pub fn contains(&self, index: &Index) -> bool {
        self.position(index).is_some()
    }
}

/// Consistent relabeling of indices, preserving their classes
#[derive(Default)]
struct Relabel {
    forward: HashMap<Index, Index>,
    backward: HashMap<Index, Index>,
}

impl Relabel {
    fn bind(&mut self, a: Index, b: Index) -> bool {
        if a.class != b.class {
            return false;
        }
        match (self.forward.get(&a), self.backward.get(&b)) {
            (None, None) => {
                self.forward.insert(a, b);
                self.backward.insert(b, a);
                true
            }
            (Some(fb), Some(ba)) => *fb == b && *ba == a,
            _ => false,
        }
    }

    fn bind_all(&mut self, a: &[Index], b: &[Index]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(a, b)| self.bind(*a, *b))
    }
}

/// Gammas computing the same function of their exposed indices
fn same_gamma(a: &Tensor, b: &Tensor) -> bool {
    let (Some(aa), Some(ab)) = (a.active(), b.active()) else {
        return false;
    };
    if aa.braket() != ab.braket() || aa.elements().len() != ab.elements().len() {
        return false;
    }
    let mut map = Relabel::default();
    for (ea, eb) in aa.elements().iter().zip(ab.elements()) {
        if ea.dagger != eb.dagger || ea.spin != eb.spin || !map.bind(ea.index, eb.index) {
            return false;
        }
    }
    if !map.bind_all(&a.indices, &b.indices) {
        return false;
    }
    match (&a.merged, &b.merged) {
        (None, None) => true,
        (Some(ma), Some(mb)) => {
            ma.label() == mb.label()
                && ma.factor == mb.factor
                && map.bind_all(&ma.indices, &mb.indices)
        }
        _ => false,
    }
}

/// Two tensors are interchangeable in the generated program
///
/// - operands must agree in label, indices, factor and scalar
/// - intermediates are compared by their indices, since the number is only a name
/// - Gammas are compared by their active part, indices and merged companion
///   up to a consistent relabeling of the indices
///
/// Indices of operands and intermediates are compared positionwise,
/// which is the consistent relabeling once the diagrams are renumbered
/// by [crate::diagram::Diagram::refresh_indices].
impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (TensorKind::Operand(a), TensorKind::Operand(b)) => {
                a == b
                    && self.indices == other.indices
                    && self.factor == other.factor
                    && self.scalar == other.scalar
            }
            (TensorKind::Intermediate(_), TensorKind::Intermediate(_)) => {
                self.indices == other.indices
            }
            (TensorKind::Gamma { .. }, TensorKind::Gamma { .. }) => same_gamma(self, other),
            _ => false,
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.factor != 1.0 {
            write!(f, "{} ", self.factor)?;
        }
        if let Some(scalar) = &self.scalar {
            write!(f, "{} ", scalar)?;
        }
        write!(f, "{}{}", self.label(), index_str(&self.indices))?;
        if let Some(merged) = &self.merged {
            write!(f, " [{}]", merged)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        active::ActiveElement,
        index::{Index, RangeClass},
    };

    fn idx(class: RangeClass, num: usize) -> Index {
        Index::new(class, num)
    }

    fn active(nums: &[usize]) -> Active {
        let elements = nums
            .iter()
            .enumerate()
            .map(|(n, &num)| ActiveElement {
                index: idx(RangeClass::Active, num),
                dagger: n % 2 == 0,
                spin: n / 2,
            })
            .collect();
        Active::new(elements, false, false)
    }

    fn sample() -> Vec<Tensor> {
        let c0 = idx(RangeClass::Closed, 0);
        let a1 = idx(RangeClass::Virtual, 1);
        let a2 = idx(RangeClass::Virtual, 2);
        let mut scaled = Tensor::operand("t1", vec![a1, c0]);
        scaled.set_factor(2.0);
        let mut e0 = Tensor::operand("t1", vec![a1, c0]);
        e0.set_scalar(Some("e0".to_string()));
        let mut merged = Tensor::gamma(1, active(&[3, 4]));
        merged.set_merged(Tensor::operand("f1", vec![idx(RangeClass::Active, 3)]));
        let mut transposed = Tensor::gamma(4, active(&[3, 4]));
        transposed.set_indices(vec![idx(RangeClass::Active, 4), idx(RangeClass::Active, 3)]);
        vec![
            Tensor::operand("t1", vec![a1, c0]),
            Tensor::operand("t1", vec![a1, c0]),
            Tensor::operand("t1", vec![c0, a1]),
            Tensor::operand("f1", vec![a1, c0]),
            Tensor::operand("t1", vec![a2, c0]),
            scaled,
            e0,
            Tensor::intermediate(0, vec![a1, c0]),
            Tensor::intermediate(5, vec![a1, c0]),
            Tensor::intermediate(6, vec![c0, a1]),
            Tensor::gamma(0, active(&[3, 4])),
            Tensor::gamma(2, active(&[3, 4])),
            Tensor::gamma(3, active(&[5, 6])),
            merged,
            transposed,
        ]
    }

    #[test]
    fn equivalence_relation() {
        let tensors = sample();
        for a in &tensors {
            assert_eq!(a, a, "reflexive: {}", a);
            for b in &tensors {
                assert_eq!(a == b, b == a, "symmetric: {} {}", a, b);
                for c in &tensors {
                    if a == b && b == c {
                        assert_eq!(a, c, "transitive: {} {} {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn equality() {
        let t = sample();
        // operands
        assert_eq!(t[0], t[1]);
        assert_ne!(t[0], t[2]);
        assert_ne!(t[0], t[3]);
        assert_ne!(t[0], t[4]);
        assert_ne!(t[0], t[5]);
        assert_ne!(t[0], t[6]);
        // intermediates ignore their numbers, but never equal operands
        assert_eq!(t[7], t[8]);
        assert_ne!(t[7], t[9]);
        assert_ne!(t[0], t[7]);
        // Gammas are relabeled consistently
        assert_eq!(t[10], t[11]);
        assert_eq!(t[10], t[12]);
        assert_ne!(t[10], t[13]);
        assert_ne!(t[10], t[14]);
    }

    #[test]
    fn display() {
        let t = sample();
        assert_eq!(t[0].to_string(), "t1(a1, c0)");
        assert_eq!(t[5].to_string(), "2 t1(a1, c0)");
        assert_eq!(t[6].to_string(), "e0 t1(a1, c0)");
        assert_eq!(t[8].to_string(), "I5(a1, c0)");
        assert_eq!(t[13].to_string(), "Gamma1(x3, x4) [f1(x3)]");
        assert_eq!(t[11].effective_label(), "Gamma2");
    }
}
