//! One unfactorized term as a product of tensors

use crate::{diagram::Diagram, index::Index, namespace::Namespace, tensor::Tensor};
use std::fmt;

/// Product of tensors computing `target`
///
/// The factor and scalar of the term are kept here,
/// and moved onto the last tensor when the product is a single tensor.
#[derive(Debug, Clone)]
pub struct ListTensor {
    tensors: Vec<Tensor>,
    target: Option<Tensor>,
    fac: f64,
    scalar: Option<String>,
    dagger: bool,
    /// Excitation target, i.e. the projector indices of the diagram
    ex_target: Vec<Index>,
}

impl ListTensor {
    /// The projector comes first, then the other operators in order,
    /// and finally the Gamma tensor if the diagram has an active part.
    pub fn new(diagram: &Diagram, namespace: &mut Namespace) -> Self {
        let (proj, rest): (Vec<_>, Vec<_>) =
            diagram.ops().iter().partition(|op| op.is_projector());
        let mut tensors: Vec<Tensor> = proj
            .into_iter()
            .chain(rest)
            .map(|op| Tensor::operand(op.label(), diagram.op_indices(op)))
            .collect();
        if let Some(active) = diagram.active() {
            tensors.push(Tensor::gamma(namespace.new_gamma(), active));
        }
        ListTensor {
            tensors,
            target: None,
            fac: diagram.fac(),
            scalar: diagram.scalar().map(str::to_string),
            dagger: diagram.dagger(),
            ex_target: diagram.ex_target_index(),
        }
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn length(&self) -> usize {
        self.tensors.len()
    }

    pub fn front(&self) -> Option<&Tensor> {
        self.tensors.first()
    }

    pub fn target(&self) -> Option<&Tensor> {
        self.target.as_ref()
    }

    pub fn fac(&self) -> f64 {
        self.fac
    }

    pub fn scalar(&self) -> Option<&str> {
        self.scalar.as_deref()
    }

    pub fn dagger(&self) -> bool {
        self.dagger
    }

    pub fn ex_target(&self) -> &[Index] {
        &self.ex_target
    }

    /// Move the first operand living entirely in the active space into the Gamma tensor
    ///
    /// The product of the density matrix and such an operand is computed
    /// by the Gamma task, and the Gamma only exposes the remaining indices.
    pub fn absorb_all_internal(&mut self) {
        if !self.tensors.iter().any(|t| t.is_gamma()) {
            return;
        }
        let Some(k) = self.tensors.iter().position(|t| {
            !t.is_projector()
                && !t.is_gamma()
                && !t.indices().is_empty()
                && t.indices().iter().all(|i| i.class.is_active())
        }) else {
            return;
        };
        let companion = self.tensors.remove(k);
        if let Some(gamma) = self.tensors.iter_mut().find(|t| t.is_gamma()) {
            let exposed = gamma
                .indices()
                .iter()
                .filter(|i| !companion.contains(i))
                .copied()
                .collect();
            gamma.set_indices(exposed);
            gamma.set_merged(companion);
        }
    }

    /// The product without its front tensor, computing a new intermediate
    ///
    /// The intermediate carries the indices of the front tensor not in the current target,
    /// followed by the indices of the current target not in the front tensor.
    pub fn rest(&self, namespace: &mut Namespace) -> ListTensor {
        let current: Vec<Index> = self
            .target
            .as_ref()
            .map(|t| t.indices().to_vec())
            .unwrap_or_default();
        let mut indices = Vec::new();
        if let Some(front) = self.front() {
            indices.extend(front.indices().iter().filter(|i| !current.contains(i)));
            indices.extend(current.iter().filter(|i| !front.contains(i)));
        }
        ListTensor {
            tensors: self.tensors.iter().skip(1).cloned().collect(),
            target: Some(Tensor::intermediate(namespace.new_intermediate(), indices)),
            fac: self.fac,
            scalar: self.scalar.clone(),
            dagger: self.dagger,
            ex_target: self.ex_target.clone(),
        }
    }
}

impl fmt::Display for ListTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(target) = &self.target {
            write!(f, "{} = ", target)?;
        }
        write!(f, "{}", self.fac)?;
        if let Some(scalar) = &self.scalar {
            write!(f, " {}", scalar)?;
        }
        for t in &self.tensors {
            write!(f, " {}", t)?;
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
    use crate::equation::Equation;
    use anyhow::Result;
    use std::str::FromStr;

    fn single(input: &str) -> Result<Diagram> {
        let eq = Equation::new(&Diagram::from_str(input)?, "test");
        assert_eq!(eq.len(), 1);
        Ok(eq.diagrams()[0].clone())
    }

    #[test]
    fn front_rest() -> Result<()> {
        let mut ns = Namespace::init();
        let l = ListTensor::new(&single("proj(c,a) f1(a,a) t1(a,c)")?, &mut ns);
        assert_eq!(l.to_string(), "2 proj(c0, a1) f1(a1, a2) t1(a2, c0)");
        assert!(l.front().unwrap().is_projector());

        let r = l.rest(&mut ns);
        assert_eq!(r.to_string(), "I0(c0, a1) = 2 f1(a1, a2) t1(a2, c0)");
        let r = r.rest(&mut ns);
        // a1 is summed up in the contraction with f1
        assert_eq!(r.to_string(), "I1(a2, c0) = 2 t1(a2, c0)");
        assert_eq!(r.length(), 1);
        Ok(())
    }

    #[test]
    fn gamma() -> Result<()> {
        let mut ns = Namespace::init();
        let mut l = ListTensor::new(&single("proj(x,a) f1(a,a) t1(a,x)")?, &mut ns);
        assert_eq!(l.length(), 4);
        let gamma = &l.tensors()[3];
        assert!(gamma.is_gamma());
        assert_eq!(gamma.label(), "Gamma0");
        assert_eq!(gamma.indices().len(), 2);

        // no operands in the active space only
        l.absorb_all_internal();
        assert_eq!(l.length(), 4);
        Ok(())
    }

    #[test]
    fn absorb_all_internal() -> Result<()> {
        let mut ns = Namespace::init();
        let mut l = ListTensor::new(&single("proj(c,a) f1(x,x) t1(a,c)")?, &mut ns);
        assert_eq!(l.length(), 4);
        l.absorb_all_internal();
        assert_eq!(l.length(), 3);
        let gamma = &l.tensors()[2];
        assert_eq!(gamma.merged().unwrap().label(), "f1");
        assert!(gamma.indices().is_empty());
        Ok(())
    }
}
