//! Merge identical contractions found in different terms
//!
//! Two rules are applied from the root downwards:
//!
//! - Binary contractions of a node with the same tensor, dagger flag and excitation target
//!   are merged into one, concatenating their subtrees.
//! - Subtrees of a binary contraction with the same target are merged,
//!   if they start with the same contraction or are plain sums of tensors.
//!
//! A node is visited after its siblings are merged,
//! so that every merge made above is already visible to it.

use super::{BcId, NodeId, Tree};
use crate::tensor::Tensor;
use tracing::trace;

impl Tree {
    pub fn factorize(&mut self) {
        self.factorize_node(Self::ROOT);
    }

    fn same_contraction(&self, a: BcId, b: BcId) -> bool {
        self.bcs[a.0].tensor == self.bcs[b.0].tensor
            && self.bc_dagger(a) == self.bc_dagger(b)
            && self.ex_target_index_str(a) == self.ex_target_index_str(b)
    }

    fn factorize_node(&mut self, n: NodeId) {
        let mut kept: Vec<BcId> = Vec::new();
        for b in self.nodes[n.0].bc.clone() {
            match kept.iter().copied().find(|&k| self.same_contraction(k, b)) {
                Some(k) => {
                    let moved = std::mem::take(&mut self.bcs[b.0].subtree);
                    trace!("merge contraction {} into {}", b.0, k.0);
                    self.bcs[k.0].subtree.extend(moved);
                }
                None => kept.push(b),
            }
        }
        self.nodes[n.0].bc = kept.clone();
        for b in kept {
            self.factorize_bc(b);
        }
    }

    fn factorize_bc(&mut self, b: BcId) {
        let mut kept: Vec<NodeId> = Vec::new();
        for s in self.bcs[b.0].subtree.clone() {
            if !kept.iter().any(|&k| self.merge(k, s)) {
                kept.push(s);
            }
        }
        self.bcs[b.0].subtree = kept.clone();
        for s in kept {
            self.factorize_node(s);
        }
    }

    /// Move the terms of `s` into `k`, false if they cannot be summed up together
    fn merge(&mut self, k: NodeId, s: NodeId) -> bool {
        let (kn, sn) = (&self.nodes[k.0], &self.nodes[s.0]);
        if kn.target != sn.target || kn.dagger != sn.dagger {
            return false;
        }
        if let Some(&sb) = sn.bc.first() {
            let Some(&kb) = kn.bc.first() else {
                return false;
            };
            if self.bcs[kb.0].tensor != self.bcs[sb.0].tensor {
                return false;
            }
            let target = kn.target.clone();
            let moved = std::mem::take(&mut self.nodes[s.0].bc);
            for &m in &moved {
                self.bcs[m.0].target = target.clone();
                self.bcs[m.0].parent = k;
            }
            self.nodes[k.0].bc.extend(moved);
        } else if sn.op.is_empty() {
            return false;
        }
        let ops = std::mem::take(&mut self.nodes[s.0].op);
        self.nodes[k.0].op.extend(ops);
        trace!("merge node {} into {}", s.0, k.0);
        true
    }

    /// Link every vertex reachable from the root to its parent
    pub fn set_parent_sub(&mut self) {
        let mut stack = vec![Self::ROOT];
        while let Some(n) = stack.pop() {
            for b in self.nodes[n.0].bc.clone() {
                self.bcs[b.0].parent = n;
                for s in self.bcs[b.0].subtree.clone() {
                    self.nodes[s.0].parent = Some(b);
                    stack.push(s);
                }
            }
        }
    }

    /// Let the subtrees of every contraction share the target of the first one
    pub fn set_target_rec(&mut self) {
        let mut stack = vec![Self::ROOT];
        while let Some(n) = stack.pop() {
            for b in self.nodes[n.0].bc.clone() {
                let subtree = self.bcs[b.0].subtree.clone();
                let Some(&first) = subtree.first() else {
                    continue;
                };
                let target = self.nodes[first.0].target.clone();
                for &s in &subtree[1..] {
                    self.set_node_target(s, target.clone());
                }
                stack.extend(subtree);
            }
        }
    }

    fn set_node_target(&mut self, n: NodeId, target: Option<Tensor>) {
        for b in self.nodes[n.0].bc.clone() {
            self.bcs[b.0].target = target.clone();
        }
        self.nodes[n.0].target = target;
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

    fn equation(terms: &[&str]) -> Result<Equation> {
        let mut eq = Equation::new(&Diagram::from_str(terms[0])?, "residual");
        for term in &terms[1..] {
            eq.merge(Equation::new(&Diagram::from_str(term)?, "residual"));
        }
        Ok(eq)
    }

    #[test]
    fn merge_contractions() -> Result<()> {
        let eq = equation(&["proj(c,a) f1(a,a) t1(a,c)", "proj(c,a) h1(a,a) t1(a,c)"])?;
        let mut ns = Namespace::init();
        let tree = Tree::new(&eq, TreeKind::Residual, &mut ns)?;

        // both terms are projected by one contraction
        let root = tree.node(Tree::ROOT);
        assert_eq!(root.bc().len(), 1);
        assert_eq!(tree.bc(root.bc()[0]).subtree().len(), 2);
        insta::assert_snapshot!(tree.to_string(), @r###"
        proj(c0, a1)(c0, a1) * I0(c0, a1)
          I0(c0, a1) = f1(a1, a2) * I1(a2, c0)
            I1(a2, c0) += 2 t1(a2, c0)
          I0(c0, a1) = h1(a1, a2) * I3(a2, c0)
            I3(a2, c0) += 2 t1(a2, c0)
        "###);
        Ok(())
    }

    #[test]
    fn merge_sums() -> Result<()> {
        let eq = equation(&["proj(c,a) f1(a,a) t1(a,c)", "proj(c,a) f1(a,a) s1(a,c)"])?;
        let mut ns = Namespace::init();
        let tree = Tree::new(&eq, TreeKind::Residual, &mut ns)?;
        insta::assert_snapshot!(tree.to_string(), @r###"
        proj(c0, a1)(c0, a1) * I0(c0, a1)
          I0(c0, a1) = f1(a1, a2) * I1(a2, c0)
            I1(a2, c0) += 2 t1(a2, c0)
            I1(a2, c0) += 2 s1(a2, c0)
        "###);
        Ok(())
    }

    #[test]
    fn dagger_is_kept_apart() -> Result<()> {
        let mut eq = equation(&["proj(c,c,a,a) t2(a,a,c,c)", "proj(c,c,a,a) v2(a,a,c,c)"])?;
        eq.duplicates()?;
        let mut ns = Namespace::init();
        let tree = Tree::new(&eq, TreeKind::Residual, &mut ns)?;
        let root = tree.node(Tree::ROOT);
        for &a in root.bc() {
            for &b in root.bc() {
                if a != b {
                    assert!(
                        tree.bc_dagger(a) != tree.bc_dagger(b)
                            || tree.ex_target_index_str(a) != tree.ex_target_index_str(b)
                    );
                }
            }
        }
        Ok(())
    }

    #[test]
    fn parents() -> Result<()> {
        let eq = equation(&["proj(c,a) f1(a,a) t1(a,c)", "proj(c,a) f1(a,a) s1(a,c)"])?;
        let mut ns = Namespace::init();
        let tree = Tree::new(&eq, TreeKind::Residual, &mut ns)?;
        for b in tree.live_bcs() {
            let bc = tree.bc(b);
            assert!(tree.node(bc.parent()).bc().contains(&b));
            for &s in bc.subtree() {
                assert_eq!(tree.node(s).parent(), Some(b));
                assert_eq!(tree.node(s).target(), tree.next_target(b));
            }
        }
        Ok(())
    }
}
