//! Gamma tensors required by a tree
//!
//! Each term with an active part reads its own `Gamma{N}`.
//! The root keeps the list of distinct ones, and every other Gamma
//! is aliased to the structurally equal tensor of the list.

use super::{NodeId, Tree};
use crate::tensor::Tensor;

impl Tree {
    /// Positions `(node, op)` of the Gamma tensors below the root,
    /// deeper terms first
    pub fn gather_gamma(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        self.gather_gamma_node(Self::ROOT, &mut out);
        out
    }

    fn gather_gamma_node(&self, n: NodeId, out: &mut Vec<(NodeId, usize)>) {
        let node = &self.nodes[n.0];
        for &b in &node.bc {
            for &s in &self.bcs[b.0].subtree {
                self.gather_gamma_node(s, out);
            }
        }
        for (k, op) in node.op.iter().enumerate() {
            if op.is_gamma() {
                out.push((n, k));
            }
        }
    }

    /// Alias the tensor to an equal Gamma of the list, or register it as a new one
    ///
    /// Returns true if it is new.
    pub fn find_gamma(&mut self, gamma: &mut Tensor) -> bool {
        match self.gamma.iter().find(|g| *g == gamma) {
            Some(g) => {
                gamma.set_alias(&g.effective_label());
                false
            }
            None => {
                self.gamma.push(gamma.clone());
                true
            }
        }
    }

    /// Start from the given list of distinct Gammas,
    /// e.g. the list of the main tree when this tree is compiled along with it
    pub fn sort_gamma(&mut self, list: Vec<Tensor>) {
        self.gamma = list;
        for (n, k) in self.gather_gamma() {
            let mut gamma = self.nodes[n.0].op[k].clone();
            self.find_gamma(&mut gamma);
            self.nodes[n.0].op[k] = gamma;
        }
    }

    /// Ranks of the density matrices read by the Gammas below the root
    pub fn required_rdm(&self) -> Vec<usize> {
        let mut out: Vec<usize> = Vec::new();
        for (n, k) in self.gather_gamma() {
            if let Some(active) = self.nodes[n.0].op[k].active() {
                for rank in active.required_rdm() {
                    if !out.contains(&rank) {
                        out.push(rank);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod test {
    use crate::{
        diagram::Diagram,
        equation::Equation,
        namespace::Namespace,
        tree::{Tree, TreeKind},
    };
    use anyhow::Result;
    use std::str::FromStr;

    #[test]
    fn alias() -> Result<()> {
        // the same active part in two different terms
        let mut eq = Equation::new(&Diagram::from_str("proj(c,a) f1(a,a) t1(a,c) h1(x,x)")?, "r");
        eq.merge(Equation::new(
            &Diagram::from_str("proj(c,a) v1(a,a) t1(a,c) h1(x,x)")?,
            "r",
        ));
        let mut ns = Namespace::init();
        let tree = Tree::new(&eq, TreeKind::Residual, &mut ns)?;
        assert_eq!(tree.gamma().len(), 1);
        let labels: Vec<String> = tree
            .gather_gamma()
            .into_iter()
            .map(|(n, k)| tree.node(n).op()[k].effective_label())
            .collect();
        assert_eq!(labels, vec!["Gamma0", "Gamma0"]);
        assert_eq!(tree.required_rdm(), vec![1]);
        Ok(())
    }

    #[test]
    fn sort_against_other_tree() -> Result<()> {
        let eq = Equation::new(&Diagram::from_str("proj(c,a) f1(a,a) t1(a,c) h1(x,x)")?, "r");
        let mut ns = Namespace::init();
        let main = Tree::new(&eq, TreeKind::Residual, &mut ns)?;

        let eq = Equation::new(&Diagram::from_str("proj() t1(c,a) t1(a,c) h1(x,x)")?, "e");
        let mut energy = Tree::new(&eq, TreeKind::Energy, &mut ns)?;
        assert_eq!(energy.gamma()[0].label(), "Gamma1");
        energy.sort_gamma(main.gamma().to_vec());
        assert_eq!(energy.gamma().len(), 1);
        let (n, k) = energy.gather_gamma()[0];
        assert_eq!(energy.node(n).op()[k].effective_label(), "Gamma0");
        Ok(())
    }
}
