//! Second-quantized operators
//!
//! An operator written `t2(a,a,c,c)` is the spin-free string
//! $a^\dagger_{p_1} a^\dagger_{p_2} a_{q_2} a_{q_1}$
//! whose amplitude is indexed as $t_{p_1 p_2 q_1 q_2}$.
//! The creation element $p_k$ shares its spin with the annihilation element $q_k$,
//! and we call $(p_k, q_k)$ the $k$-th pair.

/// Contraction state of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Open,
    Contracted,
    /// Left open in the active space, will be evaluated by an RDM
    Active,
}

/// One creation or annihilation operator in the string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Slot in the index arena of the owning diagram
    pub slot: usize,
    /// Creation operator if true
    pub dagger: bool,
    pub state: State,
    /// Slot in the spin union-find of the owning diagram
    pub spin: usize,
}

impl Element {
    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    /// Excitation projector `proj`, carries the target indices of the equation
    Projector,
    Tensor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    label: String,
    kind: OperatorKind,
    /// Elements in the order of the operator string
    elements: Vec<Element>,
    /// Current permutation of pairs, see [pair_permutations]
    perm: usize,
}

impl Operator {
    /// Create an operator whose `n` indices occupy index slots `first_slot..`
    /// in written order, and whose pairs occupy spin slots `first_spin..`
    pub fn new(label: &str, n: usize, first_slot: usize, first_spin: usize) -> Self {
        let m = n / 2;
        let mut elements = Vec::with_capacity(n);
        for k in 0..m {
            elements.push(Element {
                slot: first_slot + k,
                dagger: true,
                state: State::Open,
                spin: first_spin + k,
            });
        }
        for k in (0..m).rev() {
            elements.push(Element {
                slot: first_slot + m + k,
                dagger: false,
                state: State::Open,
                spin: first_spin + k,
            });
        }
        let kind = if label == "proj" {
            OperatorKind::Projector
        } else {
            OperatorKind::Tensor
        };
        Operator {
            label: label.to_string(),
            kind,
            elements,
            perm: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn is_projector(&self) -> bool {
        self.kind == OperatorKind::Projector
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [Element] {
        &mut self.elements
    }

    pub fn num_pairs(&self) -> usize {
        self.elements.len() / 2
    }

    /// Positions in [Operator::elements] ordered as the indices of the tensor,
    /// i.e. creation part then annihilation part, pairs permuted by the current permutation
    pub fn tensor_order(&self) -> Vec<usize> {
        let n = self.elements.len();
        let perm = &pair_permutations(self.num_pairs())[self.perm];
        let mut out: Vec<usize> = perm.iter().copied().collect();
        out.extend(perm.iter().map(|k| n - 1 - k));
        out
    }

    pub fn tensor_elements(&self) -> Vec<&Element> {
        self.tensor_order()
            .into_iter()
            .map(|i| &self.elements[i])
            .collect()
    }

    pub fn reset_perm(&mut self) {
        self.perm = 0;
    }

    /// Proceed to the next pair permutation.
    /// Returns false and wraps around to the identity after the last one.
    pub fn next_perm(&mut self) -> bool {
        self.perm += 1;
        if self.perm == factorial(self.num_pairs()) {
            self.perm = 0;
            false
        } else {
            true
        }
    }
}

fn factorial(m: usize) -> usize {
    (1..=m).product()
}

/// All permutations of `0..m` in lexicographic order, identity first
pub fn pair_permutations(m: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::with_capacity(factorial(m));
    let mut current: Vec<usize> = (0..m).collect();
    loop {
        out.push(current.clone());
        // next lexicographic permutation
        let Some(i) = (1..m).rev().find(|&i| current[i - 1] < current[i]) else {
            break;
        };
        let j = (i..m).rev().find(|&j| current[i - 1] < current[j]).unwrap_or(i);
        current.swap(i - 1, j);
        current[i..].reverse();
    }
    out
}
