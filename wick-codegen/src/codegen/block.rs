//! Fragments of the generated task bodies
//!
//! The generated code runs on a block-sparse tensor runtime.
//! Each index of a task stands for one block of its range,
//! and a block is stored with its first index running fastest.

use super::ident::{data_ident, local_type, sorted_ident, task_type};
use crate::{
    error::{Error, Result},
    index::{index_str, Index},
};
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::{format_ident, quote};

/// Floating point literal, e.g. `-2.0`
pub fn float(value: f64) -> TokenStream2 {
    let lit = Literal::f64_unsuffixed(value.abs());
    if value < 0.0 {
        quote! { -#lit }
    } else {
        quote! { #lit }
    }
}

/// Number of elements of a block, e.g. `c0.size() * a1.size()`
pub fn size(indices: &[Index]) -> TokenStream2 {
    indices
        .iter()
        .map(|i| quote! { #i.size() })
        .reduce(|acc, s| quote! { #acc * #s })
        .unwrap_or_else(|| quote! { 1 })
}

/// Extent of each dimension, e.g. `[c0.size(), a1.size()]`
pub fn dims(indices: &[Index]) -> TokenStream2 {
    quote! { [#(#indices.size()),*] }
}

/// Position in `src` of each index of `dst`
pub fn permutation(dst: &[Index], src: &[Index]) -> Result<Vec<usize>> {
    dst.iter()
        .map(|i| {
            src.iter()
                .position(|j| j == i)
                .ok_or_else(|| Error::IndexNotFound(i.to_string(), index_str(src)))
        })
        .collect()
}

/// Load the block of the `argc`-th input, e.g.
///
/// ```ignore
/// let i0data = self.input[0].get_block(&[c0, a1]);
/// ```
pub fn get_block(argc: usize, indices: &[Index]) -> TokenStream2 {
    let data = data_ident(argc);
    let argc = Literal::usize_unsuffixed(argc);
    quote! {
        let #data = self.input[#argc].get_block(&[#(#indices),*]);
    }
}

/// `dst = beta * dst + alpha * src` with the indices of `src` sorted into `dst_indices`
pub fn sort_indices(
    src: &syn::Ident,
    dst: &syn::Ident,
    src_indices: &[Index],
    dst_indices: &[Index],
    beta: TokenStream2,
    alpha: TokenStream2,
) -> Result<TokenStream2> {
    let perm = permutation(dst_indices, src_indices)?
        .into_iter()
        .map(Literal::usize_unsuffixed);
    let dims = dims(src_indices);
    Ok(quote! {
        sort_indices(&#src, &mut #dst, &[#(#perm),*], &#dims, #beta, #alpha);
    })
}

/// Load the block of the `argc`-th input and sort it into `sorted`
pub fn sorted_block(argc: usize, indices: &[Index], sorted: &[Index]) -> Result<TokenStream2> {
    let load = get_block(argc, indices);
    let data = data_ident(argc);
    let out = sorted_ident(argc);
    let sort = sort_indices(&data, &out, indices, sorted, quote! { 0.0 }, quote! { 1.0 })?;
    Ok(quote! {
        #load
        let mut #out = vec![0.0; #data.len()];
        #sort
    })
}

/// Generate nested loops over the blocks of the indices, the first one outermost
///
/// ```ignore
/// for c0 in self.range[0].iter() {
///     for a1 in self.range[2].iter() {
///         #inner
///     }
/// }
/// ```
pub fn block_loops(indices: &[Index], range: TokenStream2, inner: TokenStream2) -> Result<TokenStream2> {
    let mut tt = inner;
    for i in indices.iter().rev() {
        let slot = range_slot(i)?;
        tt = quote! {
            for #i in #range[#slot].iter() { #tt }
        };
    }
    Ok(tt)
}

/// Literal position of the index range, e.g. `2` for `a1`
pub fn range_slot(index: &Index) -> Result<Literal> {
    index
        .class
        .slot()
        .map(Literal::usize_unsuffixed)
        .ok_or_else(|| Error::UnresolvedIndex(index.to_string()))
}

/// `c += a^T b` where `a` is `k x m` and `b` is `k x n`
pub fn dgemm(
    a: &syn::Ident,
    b: &syn::Ident,
    c: &syn::Ident,
    m: TokenStream2,
    n: TokenStream2,
    k: TokenStream2,
) -> TokenStream2 {
    quote! {
        {
            let m = #m;
            let n = #n;
            let k = #k;
            dgemm("T", "N", m, n, k, 1.0, &#a, k, &#b, k, 1.0, &mut #c, m);
        }
    }
}

/// Scalar a task sums up over its blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulate {
    Energy,
    Correction,
}

impl Accumulate {
    fn getter(&self) -> syn::Ident {
        match self {
            Accumulate::Energy => format_ident!("energy"),
            Accumulate::Correction => format_ident!("correction"),
        }
    }
}

/// Body of a task, computed for every block of `loops`
#[derive(Debug, Clone)]
pub struct TaskBody {
    pub loops: Vec<Index>,
    pub body: TokenStream2,
    pub accumulate: Option<Accumulate>,
    /// The body reads the reference energy `self.e0`
    pub e0: bool,
}

/// Define the task type and its block-wise part
///
/// The task is constructed from `[out, input...]` and the index ranges,
/// and splits into one subtask for every block of the loop indices.
/// The loop indices are stored in reverse order in the subtask.
pub fn task(num: usize, body: &TaskBody) -> Result<TokenStream2> {
    let task = task_type(num);
    let local = local_type(num);
    let block: Vec<Index> = body.loops.iter().rev().copied().collect();
    let position = (0..block.len()).map(Literal::usize_unsuffixed);
    let inner = &body.body;

    let (e0_arg, e0_field, e0_init) = if body.e0 {
        (quote! { , e0: f64 }, quote! { e0: f64, }, quote! { e0, })
    } else {
        (quote! {}, quote! {}, quote! {})
    };
    let (acc_field, acc_init, acc_sum, acc_getter) = match body.accumulate {
        Some(acc) => {
            let getter = acc.getter();
            (
                quote! { energy: f64, },
                quote! { energy: 0.0, },
                quote! { self.energy = self.subtasks.iter().map(|s| s.energy).sum(); },
                quote! {
                    fn #getter(&self) -> f64 {
                        self.energy
                    }
                },
            )
        }
        None => (quote! {}, quote! {}, quote! {}, quote! {}),
    };

    let push = quote! {
        subtasks.push(#local {
            block: vec![#(#block.clone()),*],
            input: input.clone(),
            out: out.clone(),
            range: range.clone(),
            #e0_init
            #acc_init
        });
    };
    let constructor_loops = block_loops(&body.loops, quote! { range }, push)?;

    Ok(quote! {
        pub struct #task {
            subtasks: Vec<#local>,
            #acc_field
        }

        impl #task {
            pub fn new(tensor: Vec<Arc<Tensor>>, range: [Arc<IndexRange>; 3] #e0_arg) -> Self {
                let out = tensor[0].clone();
                let input: Vec<Arc<Tensor>> = tensor[1..].to_vec();
                let mut subtasks = Vec::new();
                #constructor_loops
                #task { subtasks, #acc_init }
            }
        }

        impl Task for #task {
            fn compute(&mut self) {
                for subtask in self.subtasks.iter_mut() {
                    subtask.compute();
                }
                #acc_sum
            }

            #acc_getter
        }

        pub struct #local {
            block: Vec<Index>,
            input: Vec<Arc<Tensor>>,
            out: Arc<Tensor>,
            range: [Arc<IndexRange>; 3],
            #e0_field
            #acc_field
        }

        impl #local {
            fn compute(&mut self) {
                #(let #block = &self.block[#position];)*
                #inner
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codegen::format_block,
        index::{Index, RangeClass},
    };
    use anyhow::Result;

    fn c0() -> Index {
        Index::new(RangeClass::Closed, 0)
    }

    fn a1() -> Index {
        Index::new(RangeClass::Virtual, 1)
    }

    #[test]
    fn literals() {
        assert_eq!(float(2.0).to_string(), "2.0");
        assert_eq!(float(-0.5).to_string(), "- 0.5");
        assert_eq!(size(&[]).to_string(), "1");
        assert_eq!(size(&[c0(), a1()]).to_string(), "c0 . size () * a1 . size ()");
    }

    #[test]
    fn permutation_of_indices() -> Result<()> {
        let x2 = Index::new(RangeClass::Active, 2);
        assert_eq!(permutation(&[a1(), c0(), x2], &[c0(), x2, a1()])?, vec![2, 0, 1]);
        assert!(matches!(
            permutation(&[x2], &[c0()]),
            Err(Error::IndexNotFound(..))
        ));
        Ok(())
    }

    #[test]
    fn loops() {
        let tt = block_loops(&[c0(), a1()], quote! { self.range }, quote! { todo!() }).unwrap();
        insta::assert_snapshot!(format_block(quote! { fn f() { #tt } }.to_string()), @r###"
        fn f() {
            for c0 in self.range[0].iter() {
                for a1 in self.range[2].iter() {
                    todo!()
                }
            }
        }
        "###);
    }

    #[test]
    fn general_index_has_no_range() {
        let g0 = Index::new(RangeClass::General, 0);
        assert!(matches!(
            block_loops(&[c0(), g0], quote! { self.range }, quote! {}),
            Err(Error::UnresolvedIndex(i)) if i == "g0"
        ));
    }

    #[test]
    fn task_items_parse() -> Result<()> {
        let body = TaskBody {
            loops: vec![c0(), a1()],
            body: get_block(0, &[a1(), c0()]),
            accumulate: Some(Accumulate::Energy),
            e0: true,
        };
        let file: syn::File = syn::parse2(task(3, &body)?)?;
        assert_eq!(file.items.len(), 5);
        Ok(())
    }
}
