//! Templates of the tasks summing up the energy and its correction
//!
//! An energy tree has no output tensor. Its root contractions are the empty projector
//! and emit nothing, and the scalar terms right below the root are
//! accumulated into the task itself.

use super::{
    block::{get_block, Accumulate, TaskBody},
    ident::data_ident,
    residual::{common_scalar, dot_parts, scale, unique_inputs},
    Emission,
};
use crate::{
    error::{Error, Result},
    tree::{BcId, NodeId, Tree, TreeKind},
};
use quote::quote;

pub fn accumulate(kind: TreeKind) -> Option<Accumulate> {
    match kind {
        TreeKind::Energy => Some(Accumulate::Energy),
        TreeKind::Correction => Some(Accumulate::Correction),
        TreeKind::Residual | TreeKind::Density => None,
    }
}

/// Root contractions must be the empty projector
pub fn check_root(tree: &Tree, b: BcId) -> Result<()> {
    if tree.bc(b).tensor().indices().is_empty() {
        Ok(())
    } else {
        Err(Error::DisallowedDepth {
            kind: tree.kind(),
            depth: 0,
        })
    }
}

/// `energy += ddot(tensor, next)` for a contraction right below the root
pub fn dot(tree: &Tree, b: BcId) -> Result<Emission<'_>> {
    let depth = tree.bc_depth(b);
    if depth != 1 {
        return Err(Error::UnsupportedContraction(
            tree.bc(b).tensor().to_string(),
            "scalar contraction below the top level",
        ));
    }
    let (loops, body, tensors) = dot_parts(tree, b)?;
    let body = quote! {
        #body
        self.energy += value;
    };
    Ok(Emission {
        body: TaskBody {
            loops,
            body,
            accumulate: accumulate(tree.kind()),
            e0: false,
        },
        tensors,
    })
}

/// `energy += Σ factor * op` for the scalar terms right below the root
pub fn leaf(tree: &Tree, n: NodeId) -> Result<Emission<'_>> {
    let node = tree.node(n);
    let target = node
        .target()
        .ok_or_else(|| Error::UnsupportedContraction(format!("node {}", n.0), "summation without target"))?;
    let scalar = common_scalar(node.op())?;
    let inputs = unique_inputs(node.op());

    let mut body = quote! {};
    for op in node.op() {
        if !op.indices().is_empty() {
            return Err(Error::UnsupportedContraction(op.to_string(), "open indices in energy"));
        }
        let argc = inputs
            .iter()
            .position(|t| t.effective_label() == op.effective_label())
            .unwrap_or_default();
        let load = get_block(argc, &[]);
        let data = data_ident(argc);
        let alpha = scale(op)?;
        body.extend(quote! {
            {
                #load
                self.energy += #alpha * #data[0];
            }
        });
    }

    let mut tensors = vec![target];
    tensors.extend(inputs);
    Ok(Emission {
        body: TaskBody {
            loops: Vec::new(),
            body,
            accumulate: accumulate(tree.kind()),
            e0: scalar.is_some(),
        },
        tensors,
    })
}
