//! A named sum of fully contracted diagrams, e.g. the residual of MP2

use crate::{
    diagram::Diagram,
    error::{Error, Result},
    index::RangeClass,
};
use std::fmt;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct Equation {
    name: String,
    diagrams: Vec<Diagram>,
}

impl Equation {
    /// Expand the diagram by Wick's theorem
    ///
    /// Duplicated terms are kept as they are until [Equation::duplicates] is called.
    pub fn new(diagram: &Diagram, name: &str) -> Self {
        let expansion = diagram.expand();
        let mut diagrams = expansion.diagrams;
        for d in diagrams.iter_mut() {
            d.refresh_indices();
        }
        debug!(
            name,
            rounds = expansion.rounds,
            terms = diagrams.len(),
            "expanded"
        );
        Equation {
            name: name.to_string(),
            diagrams,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn diagrams(&self) -> &[Diagram] {
        &self.diagrams
    }

    pub fn len(&self) -> usize {
        self.diagrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagrams.is_empty()
    }

    /// True if some term has free indices given by the projector
    pub fn targets(&self) -> bool {
        self.diagrams.iter().any(|d| d.has_target_index())
    }

    /// Keep only the terms whose projector indices belong to the given classes
    pub fn term_select(&mut self, classes: &[RangeClass]) {
        self.diagrams.retain(|d| {
            d.ex_target_index()
                .iter()
                .all(|i| classes.contains(&i.class))
        });
    }

    /// Append the terms of another equation
    pub fn merge(&mut self, other: Equation) {
        self.diagrams.extend(other.diagrams);
    }

    /// Terms with ket but without active part are moved to bra
    pub fn absorb_ket(&mut self) {
        for d in self.diagrams.iter_mut() {
            let (_, ket) = d.braket();
            if ket && d.active_indices().is_empty() {
                d.set_ket(false);
                d.set_bra(true);
            }
        }
    }

    pub fn refresh_indices(&mut self) {
        for d in self.diagrams.iter_mut() {
            d.refresh_indices();
        }
    }

    /// Merge identical terms
    ///
    /// The first pass sums up the factors of terms identical under the permutations
    /// of non-projector operators. The second pass also permutes the projector,
    /// and marks the survivor by [Diagram::add_dagger] instead of summing up.
    /// The second pass is only valid for projectors up to doubles.
    pub fn duplicates(&mut self) -> Result<()> {
        let before = self.diagrams.len();
        self.duplicates_(false)?;
        self.refresh_indices();
        let merged = self.diagrams.len();
        self.duplicates_(true)?;
        debug!(
            name = self.name.as_str(),
            before,
            merged,
            after = self.diagrams.len(),
            "duplicates"
        );
        Ok(())
    }

    fn duplicates_(&mut self, proj: bool) -> Result<()> {
        let mut i = 0;
        while i < self.diagrams.len() {
            let mut found = None;
            // every permutation is tested before concluding no duplicate
            loop {
                let d = &self.diagrams[i];
                let later = i + 1..self.diagrams.len();
                if let Some(j) = later.into_iter().find(|&j| d.identical(&self.diagrams[j])) {
                    found = Some(j);
                    break;
                }
                if !self.diagrams[i].permute(proj) {
                    break;
                }
            }
            self.diagrams[i].reset_perm();

            let Some(j) = found else {
                i += 1;
                continue;
            };
            let fac = self.diagrams[i].fac();
            let survivor = &mut self.diagrams[j];
            if proj {
                if survivor.fac() != fac {
                    return Err(Error::FactorMismatch(survivor.fac(), fac));
                }
                survivor.add_dagger();
            } else {
                survivor.set_fac(survivor.fac() + fac);
                if survivor.fac() == 0.0 {
                    return Err(Error::ZeroFactor(survivor.to_string()));
                }
            }
            trace!(proj, "merge {} into {}", i, j);
            self.diagrams.remove(i);
        }
        Ok(())
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for d in &self.diagrams {
            writeln!(f, "  {}", d)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use std::str::FromStr;

    #[test]
    fn targets() -> Result<()> {
        let eq = Equation::new(&Diagram::from_str("proj(c,a) f1(a,c)")?, "residual");
        assert_eq!(eq.len(), 1);
        assert!(eq.targets());

        let eq = Equation::new(&Diagram::from_str("proj() f1(x,x)")?, "energy");
        assert_eq!(eq.len(), 1);
        assert!(!eq.targets());
        Ok(())
    }

    #[test]
    fn pair_symmetric_amplitude() -> Result<()> {
        let mut eq = Equation::new(&Diagram::from_str("proj(c,c,a,a) t2(a,a,c,c)")?, "r");
        assert_eq!(eq.len(), 4);
        eq.duplicates()?;
        // t2 pair symmetry halves the terms, r(ijab) += t(abij) and r(ijab) += t(abji) remain
        assert_eq!(eq.len(), 2);
        let mut facs: Vec<f64> = eq.diagrams().iter().map(|d| d.fac().abs()).collect();
        facs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        // two spin loops for t(abij), one for t(abji)
        assert_eq!(facs, vec![4.0, 8.0]);
        // both are symmetric under the projector permutation by themselves
        assert!(eq.diagrams().iter().all(|d| !d.dagger()));
        Ok(())
    }

    #[test]
    fn term_select() -> Result<()> {
        let mut eq = Equation::new(&Diagram::from_str("proj(g,g) f1(g,g)")?, "r");
        let n = eq.len();
        eq.term_select(&[RangeClass::Closed, RangeClass::Virtual]);
        assert!(eq.len() < n);
        for d in eq.diagrams() {
            for i in d.ex_target_index() {
                assert_ne!(i.class, RangeClass::Active);
            }
        }
        Ok(())
    }

    #[test]
    fn merge() -> Result<()> {
        let mut eq = Equation::new(&Diagram::from_str("proj(c,a) f1(a,c)")?, "r");
        let other = Equation::new(&Diagram::from_str("proj(c,a) h1(a,c)")?, "r");
        eq.merge(other);
        assert_eq!(eq.len(), 2);
        eq.duplicates()?;
        assert_eq!(eq.len(), 2);
        Ok(())
    }

    #[test]
    fn zero_factor() -> Result<()> {
        let mut eq = Equation::new(&Diagram::from_str("proj(c,a) f1(a,c)")?, "r");
        eq.merge(Equation::new(&Diagram::from_str("-1 proj(c,a) f1(a,c)")?, "r"));
        assert!(matches!(eq.duplicates(), Err(Error::ZeroFactor(_))));
        Ok(())
    }

    #[test]
    fn factor_mismatch() -> Result<()> {
        // f1 on the first or the second closed index, swapped by the projector permutation
        let mut eq = Equation::new(&Diagram::from_str("proj(c,c,a,a) f1(c,c) t2(a,a,c,c)")?, "r");
        eq.duplicates_(false)?;
        eq.refresh_indices();

        let mut symmetric = eq.clone();
        symmetric.duplicates_(true)?;
        assert!(symmetric.diagrams().iter().any(|d| d.dagger()));

        for (k, d) in eq.diagrams.iter_mut().enumerate() {
            d.set_fac(k as f64 + 1.0);
        }
        assert!(matches!(
            eq.duplicates_(true),
            Err(Error::FactorMismatch(..))
        ));
        Ok(())
    }

    #[test]
    fn absorb_ket() -> Result<()> {
        let mut d = Diagram::from_str("proj(x,a) f1(a,x)")?;
        d.set_ket(true);
        let mut eq = Equation::new(&d, "r");
        eq.absorb_ket();
        // the term depends on the density, thus stays in ket
        assert_eq!(eq.diagrams()[0].braket(), (false, true));
        Ok(())
    }
}
