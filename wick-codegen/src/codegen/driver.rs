//! The method type running the generated tasks

use super::{block::float, ident::checked_ident, EmitContext, Options};
use crate::{error::Result, tree::Tree};
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

const QUEUES: [&str; 4] = ["queue", "energy_queue", "correction_queue", "density_queue"];

/// Generate the method type of the main tree, e.g.
///
/// ```ignore
/// pub struct MP2 {
///     base: SpinFreeMethod,
///     t2: Arc<Tensor>,
///     r: Arc<Tensor>,
///     d: Arc<Tensor>,
///     e0: f64,
/// }
/// ```
///
/// with `make_queue` instantiating the tasks, and `solve` iterating them
/// until the residual converges.
/// The density and the correction are evaluated once with the converged amplitudes,
/// and `solve` returns the energy and the correction separately.
pub fn driver(main: &Tree, ctx: &EmitContext, options: &Options) -> Result<TokenStream2> {
    let name = checked_ident(main.name())?;
    let amplitudes = ctx
        .amplitudes
        .iter()
        .map(|a| checked_ident(a))
        .collect::<Result<Vec<_>>>()?;
    let labels = ctx.amplitudes.iter();
    let residual = match amplitudes.first() {
        Some(t) => quote! { Arc::new(#t.clone_zero()) },
        None => quote! { Arc::new(base.v2().clone_zero()) },
    };
    let update = amplitudes.first().map(|t| {
        quote! { self.base.update_amplitude(&self.#t, &self.r); }
    });

    let statements = &ctx.statements;
    let missing: Vec<syn::Ident> = QUEUES
        .iter()
        .filter(|q| !ctx.queues.contains(**q))
        .map(|q| format_ident!("{}", q))
        .collect();
    let queues: Vec<syn::Ident> = QUEUES.iter().map(|q| format_ident!("{}", q)).collect();
    let scale = float(options.scale);
    let (density_queue, density) = if ctx.queues.contains("density_queue") {
        (
            quote! { mut density_queue },
            quote! { self.density(&mut density_queue); },
        )
    } else {
        (quote! { _ }, quote! {})
    };

    Ok(quote! {
        pub struct #name {
            base: SpinFreeMethod,
            #(#amplitudes: Arc<Tensor>,)*
            r: Arc<Tensor>,
            d: Arc<Tensor>,
            e0: f64,
        }

        impl #name {
            pub fn new(reference: Arc<Reference>) -> Self {
                let base = SpinFreeMethod::new(reference);
                let e0 = base.e0();
                #(let #amplitudes = base.init_amplitude(#labels);)*
                let r = #residual;
                let d = Arc::new(base.h1().clone_zero());
                #name {
                    base,
                    #(#amplitudes,)*
                    r,
                    d,
                    e0,
                }
            }

            pub fn make_queue(&self) -> (Queue, Queue, Queue, Queue) {
                let pindex = self.base.index_ranges();
                #(#statements)*
                #(let mut #missing = Queue::new();)*
                (#(#queues),*)
            }

            pub fn solve(&mut self) -> (f64, f64) {
                let mut iter = 0;
                let energy = loop {
                    let (mut queue, mut energy_queue, _, _) = self.make_queue();
                    while !queue.done() {
                        queue.next_compute();
                    }
                    #update
                    let err = self.r.rms();
                    let energy = self.energy(&mut energy_queue);
                    self.base.print_iteration(iter, energy, err);
                    iter += 1;
                    if err < self.base.thresh_residual() || iter == self.base.maxiter() {
                        break energy;
                    }
                };
                let (_, _, mut correction_queue, #density_queue) = self.make_queue();
                #density
                let correction = self.correction(&mut correction_queue);
                (energy, correction)
            }

            pub fn energy(&self, queue: &mut Queue) -> f64 {
                let mut en = 0.0;
                while !queue.done() {
                    let task = queue.next_compute();
                    en += task.energy() * #scale;
                }
                en
            }

            pub fn correction(&self, queue: &mut Queue) -> f64 {
                let mut n = 0.0;
                while !queue.done() {
                    let task = queue.next_compute();
                    n += task.correction() * #scale;
                }
                n
            }

            pub fn density(&self, queue: &mut Queue) -> Arc<Tensor> {
                while !queue.done() {
                    queue.next_compute();
                }
                self.d.scale(#scale);
                self.d.clone()
            }
        }
    })
}
