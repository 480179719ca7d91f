//! Factorized contraction plan of an equation
//!
//! A [Tree] is an arena of two kinds of vertices:
//!
//! - [Node] sums terms into its `target` tensor. A term is either a single tensor in `op`,
//!   or a [BinaryContraction] in `bc`.
//! - [BinaryContraction] computes `target = tensor * next_target`,
//!   where `next_target` is the common target of the nodes in its `subtree`.
//!
//! The root node has no target, and its binary contractions project
//! the top-level intermediates onto the residual or density, or sum up the energy.
//!
//! ```text
//! proj(c0, a1)(c0, a1) * I0(c0, a1)
//!   I0(c0, a1) = f1(a1, a2) * I1(a2, c0)
//!     I1(a2, c0) += 2 t1(a2, c0)
//! ```

mod factorize;
mod gamma;

use crate::{
    equation::Equation,
    error::{Error, Result},
    index::{index_str, Index},
    list_tensor::ListTensor,
    namespace::Namespace,
    tensor::Tensor,
};
use std::{fmt, str::FromStr};
use tracing::debug;

/// Quantity computed by a tree, which selects the template of the generated tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeKind {
    Residual,
    Energy,
    Correction,
    Density,
}

impl FromStr for TreeKind {
    type Err = Error;
    fn from_str(input: &str) -> Result<Self> {
        match input {
            "residual" => Ok(TreeKind::Residual),
            "energy" => Ok(TreeKind::Energy),
            "correction" => Ok(TreeKind::Correction),
            "density" => Ok(TreeKind::Density),
            _ => Err(Error::UnknownTreeKind(input.to_string())),
        }
    }
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TreeKind::Residual => "residual",
            TreeKind::Energy => "energy",
            TreeKind::Correction => "correction",
            TreeKind::Density => "density",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BcId(pub usize);

#[derive(Debug, Clone)]
pub struct Node {
    target: Option<Tensor>,
    op: Vec<Tensor>,
    bc: Vec<BcId>,
    parent: Option<BcId>,
    dagger: bool,
}

impl Node {
    pub fn target(&self) -> Option<&Tensor> {
        self.target.as_ref()
    }

    pub fn op(&self) -> &[Tensor] {
        &self.op
    }

    pub fn bc(&self) -> &[BcId] {
        &self.bc
    }

    pub fn parent(&self) -> Option<BcId> {
        self.parent
    }

    pub fn dagger(&self) -> bool {
        self.dagger
    }
}

#[derive(Debug, Clone)]
pub struct BinaryContraction {
    target: Option<Tensor>,
    tensor: Tensor,
    subtree: Vec<NodeId>,
    parent: NodeId,
    ex_target: Vec<Index>,
}

impl BinaryContraction {
    pub fn target(&self) -> Option<&Tensor> {
        self.target.as_ref()
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn subtree(&self) -> &[NodeId] {
        &self.subtree
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Projector indices of the diagrams this contraction comes from,
    /// empty below the root
    pub fn ex_target_index(&self) -> &[Index] {
        &self.ex_target
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    kind: TreeKind,
    name: String,
    nodes: Vec<Node>,
    bcs: Vec<BinaryContraction>,
    /// Distinct Gamma tensors required below the root
    gamma: Vec<Tensor>,
}

impl Tree {
    pub const ROOT: NodeId = NodeId(0);

    /// Factorized tree of the equation
    pub fn new(eq: &Equation, kind: TreeKind, namespace: &mut Namespace) -> Result<Self> {
        let mut tree = Self::build(eq, kind, namespace)?;
        let before = tree.bcs.len();
        tree.factorize();
        tree.set_parent_sub();
        tree.set_target_rec();
        tree.sort_gamma(Vec::new());
        debug!(
            name = tree.name.as_str(),
            %kind,
            before,
            after = tree.live_bcs().len(),
            gamma = tree.gamma.len(),
            "factorized"
        );
        Ok(tree)
    }

    /// Unfactorized tree, one binary contraction of the root for each diagram
    pub fn build(eq: &Equation, kind: TreeKind, namespace: &mut Namespace) -> Result<Self> {
        if eq.is_empty() {
            return Err(Error::EmptyEquation(eq.name().to_string()));
        }
        let mut tree = Tree {
            kind,
            name: eq.name().to_string(),
            nodes: vec![Node {
                target: None,
                op: Vec::new(),
                bc: Vec::new(),
                parent: None,
                dagger: false,
            }],
            bcs: Vec::new(),
            gamma: Vec::new(),
        };
        for d in eq.diagrams() {
            let mut list = ListTensor::new(d, namespace);
            list.absorb_all_internal();
            tree.push_bc(Self::ROOT, &list, namespace)?;
        }
        Ok(tree)
    }

    fn push_bc(&mut self, parent: NodeId, list: &ListTensor, namespace: &mut Namespace) -> Result<()> {
        let tensor = list.front().cloned().ok_or(Error::MissingTensors)?;
        let id = BcId(self.bcs.len());
        let ex_target = if parent == Self::ROOT {
            list.ex_target().to_vec()
        } else {
            Vec::new()
        };
        self.bcs.push(BinaryContraction {
            target: list.target().cloned(),
            tensor,
            subtree: Vec::new(),
            parent,
            ex_target,
        });
        let rest = list.rest(namespace);
        let sub = self.push_node(id, &rest, namespace)?;
        self.bcs[id.0].subtree.push(sub);
        self.nodes[parent.0].bc.push(id);
        Ok(())
    }

    fn push_node(&mut self, parent: BcId, list: &ListTensor, namespace: &mut Namespace) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            target: list.target().cloned(),
            op: Vec::new(),
            bc: Vec::new(),
            parent: Some(parent),
            dagger: list.dagger(),
        });
        match list.length() {
            0 => return Err(Error::MissingTensors),
            1 => {
                let mut t = list.front().cloned().ok_or(Error::MissingTensors)?;
                t.set_factor(list.fac());
                t.set_scalar(list.scalar().map(str::to_string));
                self.nodes[id.0].op.push(t);
            }
            _ => self.push_bc(id, list, namespace)?,
        }
        Ok(id)
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn bc(&self, id: BcId) -> &BinaryContraction {
        &self.bcs[id.0]
    }

    pub fn gamma(&self) -> &[Tensor] {
        &self.gamma
    }

    /// Binary contractions reachable from the root, in depth-first order
    pub fn live_bcs(&self) -> Vec<BcId> {
        let mut out = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(n) = stack.pop() {
            for &b in self.nodes[n.0].bc.iter().rev() {
                stack.extend(self.bcs[b.0].subtree.iter().rev());
                out.push(b);
            }
        }
        out.sort();
        out
    }

    /// Distance from the root, the root node is at depth 0
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(b) = self.nodes[current.0].parent {
            current = self.bcs[b.0].parent;
            depth += 1;
        }
        depth
    }

    pub fn bc_depth(&self, bc: BcId) -> usize {
        self.depth(self.bcs[bc.0].parent)
    }

    pub fn bc_dagger(&self, bc: BcId) -> bool {
        self.bcs[bc.0]
            .subtree
            .first()
            .map(|&n| self.nodes[n.0].dagger)
            .unwrap_or(false)
    }

    pub fn target_indices(&self, bc: BcId) -> Vec<Index> {
        self.bcs[bc.0]
            .target
            .as_ref()
            .map(|t| t.indices().to_vec())
            .unwrap_or_default()
    }

    /// Indices of the tensor summed up in the contraction
    pub fn loop_indices(&self, bc: BcId) -> Vec<Index> {
        let target = self.target_indices(bc);
        self.bcs[bc.0]
            .tensor
            .indices()
            .iter()
            .filter(|i| !target.contains(i))
            .copied()
            .collect()
    }

    /// Common target of the subtrees, i.e. the right operand of the contraction
    pub fn next_target(&self, bc: BcId) -> Option<&Tensor> {
        self.bcs[bc.0]
            .subtree
            .first()
            .and_then(|&n| self.nodes[n.0].target.as_ref())
    }

    /// `[target, tensor, next_target]`, skipping the missing ones
    pub fn tensors_vec(&self, bc: BcId) -> Vec<&Tensor> {
        let b = &self.bcs[bc.0];
        b.target
            .iter()
            .chain(std::iter::once(&b.tensor))
            .chain(self.next_target(bc))
            .collect()
    }

    pub fn ex_target_index_str(&self, bc: BcId) -> String {
        index_str(&self.bcs[bc.0].ex_target)
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, n: NodeId) -> fmt::Result {
        let node = &self.nodes[n.0];
        let indent = "  ".repeat(self.depth(n));
        if let Some(target) = &node.target {
            for op in &node.op {
                let dagger = if node.dagger { " *" } else { "" };
                writeln!(f, "{}{} += {}{}", indent, target, op, dagger)?;
            }
        }
        for &b in &node.bc {
            self.fmt_bc(f, b, &indent)?;
        }
        Ok(())
    }

    fn fmt_bc(&self, f: &mut fmt::Formatter<'_>, b: BcId, indent: &str) -> fmt::Result {
        let bc = &self.bcs[b.0];
        write!(f, "{}", indent)?;
        if let Some(target) = &bc.target {
            write!(f, "{} = ", target)?;
        }
        write!(f, "{}", bc.tensor)?;
        if self.bc_depth(b) == 0 {
            write!(f, "{}", self.ex_target_index_str(b))?;
        }
        if let Some(next) = self.next_target(b) {
            write!(f, " * {}", next)?;
        }
        writeln!(f)?;
        for &n in &bc.subtree {
            self.fmt_node(f, n)?;
        }
        Ok(())
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, Self::ROOT)
    }
}
