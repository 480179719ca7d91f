//! Active part of a diagram, evaluated through reduced density matrices

use crate::index::Index;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveElement {
    pub index: Index,
    pub dagger: bool,
    /// Spin label, numbered by first appearance in the string
    pub spin: usize,
}

#[cfg_attr(all(doc, not(doctest)), katexit::katexit)]
/// Operator string remaining in the active space after the contraction
///
/// An `Active` corresponds to a density matrix
/// $\Gamma = \langle a^\dagger_{x_0} \cdots a_{x_n} \rangle$,
/// which is the `Gamma` tensor of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Active {
    elements: Vec<ActiveElement>,
    bra: bool,
    ket: bool,
}

impl Active {
    pub fn new(elements: Vec<ActiveElement>, bra: bool, ket: bool) -> Self {
        Active {
            elements,
            bra,
            ket,
        }
    }

    pub fn elements(&self) -> &[ActiveElement] {
        &self.elements
    }

    pub fn braket(&self) -> (bool, bool) {
        (self.bra, self.ket)
    }

    /// Indices in the order of the operator string
    pub fn indices(&self) -> Vec<Index> {
        self.elements.iter().map(|e| e.index).collect()
    }

    pub fn rank(&self) -> usize {
        self.elements.iter().filter(|e| e.dagger).count()
    }

    /// Ranks of the density matrices this string reduces to.
    ///
    /// Moving an annihilation operator to the right of a creation operator
    /// yields a term with one less rank, thus a string which is not normal ordered
    /// requires lower-rank matrices too.
    pub fn required_rdm(&self) -> Vec<usize> {
        let rank = self.rank();
        let last_creation = self.elements.iter().rposition(|e| e.dagger);
        let misordered = match last_creation {
            Some(last) => self.elements[..last].iter().filter(|e| !e.dagger).count(),
            None => 0,
        };
        let lowest = rank.saturating_sub(misordered).max(1);
        (lowest..=rank).collect()
    }
}

impl fmt::Display for Active {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, e) in self.elements.iter().enumerate() {
            if n > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}{}", e.index, if e.dagger { "+" } else { "" })?;
        }
        let spins: Vec<String> = self.elements.iter().map(|e| e.spin.to_string()).collect();
        write!(f, " |{}|", spins.join(" "))?;
        if self.bra {
            write!(f, " <I|")?;
        }
        if self.ket {
            write!(f, " |I>")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::RangeClass;

    fn element(num: usize, dagger: bool, spin: usize) -> ActiveElement {
        ActiveElement {
            index: Index::new(RangeClass::Active, num),
            dagger,
            spin,
        }
    }

    #[test]
    fn required_rdm() {
        // x0+ x1 is normal ordered
        let a = Active::new(vec![element(0, true, 0), element(1, false, 0)], false, false);
        assert_eq!(a.required_rdm(), vec![1]);

        // x0 x1+ x2+ x3 reduces to the first and second order
        let a = Active::new(
            vec![
                element(0, false, 0),
                element(1, true, 0),
                element(2, true, 1),
                element(3, false, 1),
            ],
            false,
            false,
        );
        assert_eq!(a.rank(), 2);
        assert_eq!(a.required_rdm(), vec![1, 2]);
    }

    #[test]
    fn display() {
        let a = Active::new(vec![element(0, true, 0), element(1, false, 0)], true, false);
        assert_eq!(a.to_string(), "x0+ x1 |0 0| <I|");
    }
}
