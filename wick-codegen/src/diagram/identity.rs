//! Identity of diagrams under relabeling and permutation symmetries

use super::Diagram;
use std::collections::HashMap;

/// Partial bijection between index slots of two diagrams
#[derive(Default)]
struct SlotMap {
    forward: HashMap<usize, usize>,
    backward: HashMap<usize, usize>,
}

impl SlotMap {
    fn bind(&mut self, a: usize, b: usize) -> bool {
        match (self.forward.get(&a), self.backward.get(&b)) {
            (None, None) => {
                self.forward.insert(a, b);
                self.backward.insert(b, a);
                true
            }
            (Some(&fb), Some(&ba)) => fb == b && ba == a,
            _ => false,
        }
    }
}

impl Diagram {
    /// Whether `self` under its current permutation of pairs is `other` up to relabeling of indices
    ///
    /// Operators must match in label and arity, and the tensor positions must be related
    /// by a bijection of index slots that preserves range classes and contraction states.
    /// The active operator string and its spin structure must map onto each other as well.
    pub fn identical(&self, other: &Diagram) -> bool {
        if self.ops.len() != other.ops.len()
            || self.bra != other.bra
            || self.ket != other.ket
            || self.scalar != other.scalar
        {
            return false;
        }
        let mut map = SlotMap::default();
        for (a, b) in self.ops.iter().zip(other.ops.iter()) {
            if a.label() != b.label()
                || a.kind() != b.kind()
                || a.elements().len() != b.elements().len()
            {
                return false;
            }
            for (ea, eb) in a.tensor_elements().iter().zip(b.tensor_elements().iter()) {
                if ea.state != eb.state
                    || ea.dagger != eb.dagger
                    || self.class(ea) != other.class(eb)
                    || !map.bind(ea.slot, eb.slot)
                {
                    return false;
                }
            }
        }

        let (aa, ab) = (self.active_elements(), other.active_elements());
        if aa.len() != ab.len() {
            return false;
        }
        for (ea, eb) in aa.iter().zip(ab.iter()) {
            if ea.dagger != eb.dagger || map.forward.get(&ea.slot) != Some(&eb.slot) {
                return false;
            }
        }
        self.active_spin_labels() == other.active_spin_labels()
    }

    /// Proceed to the next permutation of operator pairs, like an odometer.
    ///
    /// The projector is kept fixed unless `proj` is true.
    /// Returns false after the last permutation, when every operator is back to the identity.
    pub fn permute(&mut self, proj: bool) -> bool {
        for op in self.ops.iter_mut() {
            if op.is_projector() && !proj {
                continue;
            }
            if op.next_perm() {
                return true;
            }
        }
        false
    }

    pub fn reset_perm(&mut self) {
        for op in self.ops.iter_mut() {
            op.reset_perm();
        }
    }
}
