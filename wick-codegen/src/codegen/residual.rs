//! Templates of the tasks computing tensors
//!
//! The residual and density trees project their top intermediate onto `r` or `d`.
//! Below the root, every tree computes its intermediates with these templates.

use super::{
    block::{block_loops, dgemm, float, get_block, size, sort_indices, sorted_block, TaskBody},
    ident::{data_ident, sorted_ident, task_type},
    Emission,
};
use crate::{
    error::{Error, Result},
    index::Index,
    tensor::Tensor,
    tree::{BcId, NodeId, Tree, TreeKind},
};
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

/// Task clearing the output before the other tasks accumulate into it
pub fn zero_task(num: usize) -> TokenStream2 {
    let task = task_type(num);
    quote! {
        pub struct #task {
            out: Arc<Tensor>,
        }

        impl #task {
            pub fn new(tensor: Vec<Arc<Tensor>>, _range: [Arc<IndexRange>; 3]) -> Self {
                #task { out: tensor[0].clone() }
            }
        }

        impl Task for #task {
            fn compute(&mut self) {
                self.out.zero();
            }
        }
    }
}

fn swap_pairs(indices: &[Index]) -> Vec<Index> {
    let mut out = indices.to_vec();
    for pair in out.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
    out
}

/// `r(x) += I0(x)`, plus `I0(σx)` if the terms stand for their permuted copies too
///
/// The density is stored as `d(q, p)` for the projector `proj(p, q)`,
/// thus its indices are reversed and swapped pairwise.
pub fn projection(tree: &Tree, b: BcId) -> Result<Emission<'_>> {
    let bc = tree.bc(b);
    let x = bc.ex_target_index().to_vec();
    let next = tree
        .next_target(b)
        .ok_or_else(|| Error::UnsupportedContraction(bc.tensor().to_string(), "no term to project"))?;
    let n = next.indices().to_vec();
    let dst = match tree.kind() {
        TreeKind::Density => {
            let reversed: Vec<Index> = x.iter().rev().copied().collect();
            swap_pairs(&reversed)
        }
        _ => x.clone(),
    };

    let out = format_ident!("odata");
    let data = data_ident(0);
    let dst_size = size(&dst);
    let load = get_block(0, &n);
    let sort = sort_indices(&data, &out, &n, &dst, quote! { 1.0 }, quote! { 1.0 })?;
    let mut body = quote! {
        let mut #out = vec![0.0; #dst_size];
        {
            #load
            #sort
        }
    };
    if tree.bc_dagger(b) {
        if x.len() != 4 {
            return Err(Error::UnsupportedDagger(x.len()));
        }
        let swapped = swap_pairs(&x);
        let sigma: Vec<Index> = n
            .iter()
            .map(|i| match x.iter().position(|j| j == i) {
                Some(k) => swapped[k],
                None => *i,
            })
            .collect();
        let load = get_block(0, &sigma);
        let sort = sort_indices(&data, &out, &sigma, &dst, quote! { 1.0 }, quote! { 1.0 })?;
        body.extend(quote! {
            {
                #load
                #sort
            }
        });
    }
    body.extend(quote! {
        self.out.add_block(&[#(#dst),*], &#out);
    });
    Ok(Emission {
        body: TaskBody {
            loops: swap_pairs(&dst),
            body,
            accumulate: None,
            e0: false,
        },
        tensors: vec![bc.tensor(), next],
    })
}

/// `target(X) += tensor(L, A) * next(L, N)` summed over the loop indices `L`
///
/// Both operands are sorted so that the loop indices run fastest,
/// and the product is computed by `dgemm` into the `(A, N)` layout,
/// then sorted into the target.
pub fn contraction(tree: &Tree, b: BcId) -> Result<Emission<'_>> {
    let bc = tree.bc(b);
    let tensors = tree.tensors_vec(b);
    if tensors.len() != 3 {
        return Err(Error::UnsupportedContraction(bc.tensor().to_string(), "missing operand"));
    }
    let x = tree.target_indices(b);
    let a = bc.tensor().indices().to_vec();
    let n = tensors[2].indices().to_vec();
    let l = tree.loop_indices(b);
    let outer_a: Vec<Index> = a.iter().filter(|i| x.contains(i)).copied().collect();
    let outer_n: Vec<Index> = n.iter().filter(|i| !l.contains(i)).copied().collect();
    let a_sorted: Vec<Index> = l.iter().chain(&outer_a).copied().collect();
    let n_sorted: Vec<Index> = l.iter().chain(&outer_n).copied().collect();
    let o_sorted: Vec<Index> = outer_a.iter().chain(&outer_n).copied().collect();

    let out = format_ident!("odata");
    let out_sorted = format_ident!("odata_sorted");
    let load_a = sorted_block(0, &a, &a_sorted)?;
    let load_n = sorted_block(1, &n, &n_sorted)?;
    let gemm = dgemm(
        &sorted_ident(0),
        &sorted_ident(1),
        &out_sorted,
        size(&outer_a),
        size(&outer_n),
        size(&l),
    );
    let summation = block_loops(
        &l,
        quote! { self.range },
        quote! {
            #load_a
            #load_n
            #gemm
        },
    )?;
    let o_size = size(&o_sorted);
    let sort = sort_indices(&out_sorted, &out, &o_sorted, &x, quote! { 0.0 }, quote! { 1.0 })?;
    let body = quote! {
        let mut #out_sorted = vec![0.0; #o_size];
        #summation
        let mut #out = vec![0.0; #out_sorted.len()];
        #sort
        self.out.add_block(&[#(#x),*], &#out);
    };
    Ok(Emission {
        body: TaskBody {
            loops: x,
            body,
            accumulate: None,
            e0: false,
        },
        tensors,
    })
}

/// Full contraction into a scalar intermediate by `ddot`
///
/// The loop indices are block arguments of the task
/// instead of a summation inside it.
pub fn dot(tree: &Tree, b: BcId) -> Result<Emission<'_>> {
    let (loops, body, tensors) = dot_parts(tree, b)?;
    let out = format_ident!("odata");
    let body = quote! {
        #body
        let mut #out = vec![0.0; 1];
        #out[0] += value;
        self.out.add_block(&[], &#out);
    };
    Ok(Emission {
        body: TaskBody {
            loops,
            body,
            accumulate: None,
            e0: false,
        },
        tensors,
    })
}

/// Loop indices, the body computing `value`, and the tensors of a full contraction
pub(super) fn dot_parts(tree: &Tree, b: BcId) -> Result<(Vec<Index>, TokenStream2, Vec<&Tensor>)> {
    let bc = tree.bc(b);
    let tensors = tree.tensors_vec(b);
    if tensors.len() != 3 {
        return Err(Error::UnsupportedContraction(bc.tensor().to_string(), "missing operand"));
    }
    let a = bc.tensor().indices().to_vec();
    let n = tensors[2].indices().to_vec();
    let load_a = get_block(0, &a);
    let load_n = sorted_block(1, &n, &a)?;
    let data = data_ident(0);
    let sorted = sorted_ident(1);
    let body = quote! {
        #load_a
        #load_n
        let value = ddot(#data.len(), &#data, 1, &#sorted, 1);
    };
    let loops = tree.loop_indices(b).into_iter().rev().collect();
    Ok((loops, body, tensors))
}

/// Inputs of a summation task, one for each runtime tensor
pub(super) fn unique_inputs(ops: &[Tensor]) -> Vec<&Tensor> {
    let mut inputs: Vec<&Tensor> = Vec::new();
    for op in ops {
        if !inputs.iter().any(|t| t.effective_label() == op.effective_label()) {
            inputs.push(op);
        }
    }
    inputs
}

/// Factor of a term in the summation, e.g. `2.0 * self.e0`
pub(super) fn scale(op: &Tensor) -> Result<TokenStream2> {
    let factor = float(op.factor());
    match op.scalar() {
        None => Ok(factor),
        Some("e0") => Ok(quote! { #factor * self.e0 }),
        Some(other) => Err(Error::UnknownScalar(other.to_string())),
    }
}

/// The scalar multiplying the terms of a task, at most one kind
pub(super) fn common_scalar(ops: &[Tensor]) -> Result<Option<&str>> {
    let mut found: Option<&str> = None;
    for s in ops.iter().filter_map(|op| op.scalar()) {
        match found {
            Some(f) if f != s => return Err(Error::MultipleScalars(f.to_string(), s.to_string())),
            _ => found = Some(s),
        }
    }
    Ok(found)
}

/// `target(X) += Σ factor * op` for the terms of a leaf node
pub fn leaf(tree: &Tree, n: NodeId) -> Result<Emission<'_>> {
    let node = tree.node(n);
    let target = node
        .target()
        .ok_or_else(|| Error::UnsupportedContraction(format!("node {}", n.0), "summation without target"))?;
    let scalar = common_scalar(node.op())?;
    let inputs = unique_inputs(node.op());
    let x = target.indices().to_vec();

    let out = format_ident!("odata");
    let x_size = size(&x);
    let mut body = quote! {
        let mut #out = vec![0.0; #x_size];
    };
    for op in node.op() {
        let argc = inputs
            .iter()
            .position(|t| t.effective_label() == op.effective_label())
            .unwrap_or_default();
        let load = get_block(argc, op.indices());
        let data = data_ident(argc);
        let sort = sort_indices(&data, &out, op.indices(), &x, quote! { 1.0 }, scale(op)?)?;
        body.extend(quote! {
            {
                #load
                #sort
            }
        });
    }
    body.extend(quote! {
        self.out.add_block(&[#(#x),*], &#out);
    });

    let mut tensors = vec![target];
    tensors.extend(inputs);
    Ok(Emission {
        body: TaskBody {
            loops: x,
            body,
            accumulate: None,
            e0: scalar.is_some(),
        },
        tensors,
    })
}
