//! Tasks computing the Gamma tensors from the density matrices

use super::{
    block::{block_loops, dgemm, size, sorted_block, task, TaskBody},
    ident::{data_ident, sorted_ident},
};
use crate::{
    error::{Error, Result},
    index::Index,
    tensor::Tensor,
};
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::{format_ident, quote};

/// Generator of the task computing a Gamma tensor
///
/// The task is constructed from `[gamma, rdm..., merged]`,
/// i.e. the Gamma itself, the density matrices of [crate::active::Active::required_rdm]
/// in increasing rank, and the merged companion tensor if any.
///
/// An implementation has to combine all of these density matrices
/// when the active string is not normal ordered.
/// [DefaultGamma] only handles normal ordered strings.
pub trait GammaEmitter {
    fn generate_gamma(&self, num: usize, gamma: &Tensor) -> Result<TokenStream2>;
}

/// Read the Gamma from the density matrix of the highest rank
///
/// A string which is not normal ordered also needs the lower-rank matrices,
/// and is rejected with [Error::UnsupportedContraction].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGamma;

impl GammaEmitter for DefaultGamma {
    fn generate_gamma(&self, num: usize, gamma: &Tensor) -> Result<TokenStream2> {
        let active = gamma
            .active()
            .ok_or_else(|| Error::UnsupportedContraction(gamma.to_string(), "not a Gamma tensor"))?;
        let ranks = active.required_rdm();
        if ranks.len() > 1 {
            return Err(Error::UnsupportedContraction(
                gamma.to_string(),
                "active string is not normal ordered",
            ));
        }
        let top = ranks.len().saturating_sub(1);
        let full = active.indices();
        let exposed = gamma.indices().to_vec();
        let out = format_ident!("odata");

        let body = match gamma.merged() {
            None => {
                let sorted = sorted_block(top, &full, &exposed)?;
                let data = sorted_ident(top);
                quote! {
                    #sorted
                    self.out.add_block(&[#(#exposed),*], &#data);
                }
            }
            Some(merged) => {
                let companion: Vec<Index> = merged.indices().to_vec();
                let order: Vec<Index> = companion.iter().chain(&exposed).copied().collect();
                let rdm = sorted_block(top, &full, &order)?;
                let argc = ranks.len();
                let data = data_ident(argc);
                let argc_lit = Literal::usize_unsuffixed(argc);
                let gemm = dgemm(
                    &sorted_ident(top),
                    &data,
                    &out,
                    size(&exposed),
                    quote! { 1 },
                    size(&companion),
                );
                let inner = quote! {
                    #rdm
                    let #data = self.input[#argc_lit].get_block(&[#(#companion),*]);
                    #gemm
                };
                let summation = block_loops(&companion, quote! { self.range }, inner)?;
                let n = size(&exposed);
                quote! {
                    let mut #out = vec![0.0; #n];
                    #summation
                    self.out.add_block(&[#(#exposed),*], &#out);
                }
            }
        };
        task(
            num,
            &TaskBody {
                loops: exposed,
                body,
                accumulate: None,
                e0: false,
            },
        )
    }
}
