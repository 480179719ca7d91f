//! Names in the generated code

use crate::{
    error::{Error, Result},
    tensor::{Tensor, TensorKind},
    tree::TreeKind,
};
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

/// Tensors owned by the reference, accessed as `self.base.f1()`
const BASE_TENSORS: [&str; 3] = ["f1", "v2", "h1"];

/// Identifier from a user supplied label, e.g. the name of the method or an amplitude
pub fn checked_ident(name: &str) -> Result<syn::Ident> {
    syn::parse_str::<syn::Ident>(name).map_err(|_| Error::InvalidIdentifier(name.to_string()))
}

/// Task instance in the driver, e.g. `task3`
pub fn task_ident(num: usize) -> syn::Ident {
    format_ident!("task{}", num)
}

/// Task type, e.g. `Task3`
pub fn task_type(num: usize) -> syn::Ident {
    format_ident!("Task{}", num)
}

/// Type of the block-wise part of a task, e.g. `Task3Local`
pub fn local_type(num: usize) -> syn::Ident {
    format_ident!("Task{}Local", num)
}

/// Block of the `argc`-th input, e.g. `i0data`
pub fn data_ident(argc: usize) -> syn::Ident {
    format_ident!("i{}data", argc)
}

pub fn sorted_ident(argc: usize) -> syn::Ident {
    format_ident!("i{}data_sorted", argc)
}

/// Queue the tasks of a tree are added to
pub fn queue_ident(kind: TreeKind) -> syn::Ident {
    match kind {
        TreeKind::Residual => format_ident!("queue"),
        TreeKind::Energy => format_ident!("energy_queue"),
        TreeKind::Correction => format_ident!("correction_queue"),
        TreeKind::Density => format_ident!("density_queue"),
    }
}

/// Label of the runtime tensor behind an operand
///
/// The complex conjugate `t2dagger` is stored as `t2`.
pub fn storage_label(label: &str) -> &str {
    label.strip_suffix("dagger").unwrap_or(label)
}

fn is_base(label: &str) -> bool {
    BASE_TENSORS.contains(&label) || label.strip_prefix("rdm").map_or(false, |r| r.parse::<usize>().is_ok())
}

/// Operands which are neither the projector nor a tensor of the reference
pub fn is_amplitude(label: &str) -> bool {
    let label = storage_label(label);
    label != "proj" && !is_base(label)
}

/// Density matrix of the given rank
pub fn rdm_expr(rank: usize) -> TokenStream2 {
    let rdm = format_ident!("rdm{}", rank);
    quote! { self.base.#rdm() }
}

/// Expression of a tensor in `make_queue`
///
/// Intermediates and Gammas are local variables declared there,
/// operands are members of the method, and the projector stands for the output.
pub fn tensor_expr(tensor: &Tensor, kind: TreeKind) -> Result<TokenStream2> {
    Ok(match tensor.kind() {
        TensorKind::Intermediate(n) => {
            let local = format_ident!("i{}", n);
            quote! { #local }
        }
        TensorKind::Gamma { .. } => {
            let label = tensor.effective_label().to_lowercase();
            let local = checked_ident(&label)?;
            quote! { #local }
        }
        TensorKind::Operand(label) => {
            let label = storage_label(label);
            if label == "proj" {
                match kind {
                    TreeKind::Density => quote! { self.d },
                    _ => quote! { self.r },
                }
            } else if is_base(label) {
                let ident = checked_ident(label)?;
                quote! { self.base.#ident() }
            } else {
                let ident = checked_ident(label)?;
                quote! { self.#ident }
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::{Index, RangeClass};

    #[test]
    fn operand_expr() -> Result<()> {
        let c0 = Index::new(RangeClass::Closed, 0);
        let expr = |label: &str, kind| tensor_expr(&Tensor::operand(label, vec![c0]), kind);
        assert_eq!(expr("f1", TreeKind::Residual)?.to_string(), "self . base . f1 ()");
        assert_eq!(expr("rdm2", TreeKind::Residual)?.to_string(), "self . base . rdm2 ()");
        assert_eq!(expr("t2dagger", TreeKind::Energy)?.to_string(), "self . t2");
        assert_eq!(expr("proj", TreeKind::Density)?.to_string(), "self . d");
        assert_eq!(
            tensor_expr(&Tensor::intermediate(4, vec![c0]), TreeKind::Residual)?.to_string(),
            "i4"
        );
        assert!(matches!(
            expr("1t", TreeKind::Residual),
            Err(Error::InvalidIdentifier(_))
        ));
        Ok(())
    }

    #[test]
    fn amplitudes() {
        assert!(is_amplitude("t2"));
        assert!(is_amplitude("t2dagger"));
        assert!(!is_amplitude("proj"));
        assert!(!is_amplitude("v2"));
        assert!(!is_amplitude("rdm3"));
        assert!(is_amplitude("rdmx"));
    }
}
