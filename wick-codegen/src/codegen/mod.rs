//! Generate the task program of factorized trees
//!
//! The output consists of two token streams:
//!
//! - `tasks`: one task type for each contraction or summation of the trees
//! - `driver`: the method type, whose `make_queue` instantiates the tasks,
//!   wires their dependencies and adds them to the queues,
//!   and the iterative `solve` loop evaluating the queues.
//!
//! Both target a block-tensor runtime providing `Tensor`, `Index`, `IndexRange`,
//! `Task`, `TaskRef`, `Queue`, `sort_indices`, `dgemm` and `ddot`.
//! The dependencies are recorded in a [TaskGraph] as well.

mod block;
mod driver;
mod energy;
mod gamma;
mod graph;
mod ident;
mod residual;

pub use gamma::{DefaultGamma, GammaEmitter};
pub use graph::{GraphError, TaskGraph, TaskInfo};

use crate::{
    error::{Error, Result},
    tensor::{Tensor, TensorKind},
    tree::{BcId, NodeId, Tree, TreeKind},
};
use block::TaskBody;
use ident::{queue_ident, rdm_expr, storage_label, task_ident, task_type, tensor_expr};
use indexmap::IndexSet;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use std::{
    collections::{HashMap, HashSet},
    io::Write,
    process::{Command, Stdio},
};
use tracing::{debug, trace, warn};

/// Knobs of a compilation
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Multiplied to the energy and the correction, one half each for bra and ket
    pub scale: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options { scale: 0.25 }
    }
}

#[derive(Debug, Clone)]
pub struct Compiled {
    pub driver: TokenStream2,
    pub tasks: TokenStream2,
    pub graph: TaskGraph,
}

impl Compiled {
    /// Whole generated source, formatted if `rustfmt` is available
    pub fn source(&self) -> String {
        let driver = &self.driver;
        let tasks = &self.tasks;
        format_block(quote! { #driver #tasks }.to_string())
    }
}

/// State shared by the trees compiled into one program
#[derive(Debug, Default)]
pub struct EmitContext {
    count: usize,
    /// Task clearing the output of the current tree
    zero: Option<usize>,
    /// Labels of the intermediates and Gammas already declared in `make_queue`
    declared: HashSet<String>,
    queues: IndexSet<String>,
    /// Distinct Gammas computed so far, see [Tree::sort_gamma]
    gamma: Vec<Tensor>,
    gamma_tasks: HashMap<String, usize>,
    /// Operands stored in the method
    amplitudes: IndexSet<String>,
    statements: Vec<TokenStream2>,
    tasks: Vec<TokenStream2>,
    graph: TaskGraph,
}

/// Runtime tensor behind a tensor of the tree
fn runtime_label(tensor: &Tensor, kind: TreeKind) -> String {
    match tensor.kind() {
        TensorKind::Operand(_) if tensor.is_projector() => match kind {
            TreeKind::Density => "d".to_string(),
            _ => "r".to_string(),
        },
        TensorKind::Operand(label) => storage_label(label).to_string(),
        _ => tensor.effective_label(),
    }
}

impl EmitContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks emitted so far
    pub fn count(&self) -> usize {
        self.count
    }

    fn next_task(&mut self) -> usize {
        self.count += 1;
        self.count - 1
    }

    fn open_queue(&mut self, kind: TreeKind) -> syn::Ident {
        let queue = queue_ident(kind);
        if self.queues.insert(queue.to_string()) {
            self.statements.push(quote! { let mut #queue = Queue::new(); });
        }
        queue
    }

    /// Declare the local tensor in `make_queue` on its first use
    fn declare(&mut self, tensor: &Tensor) -> Result<()> {
        match tensor.kind() {
            TensorKind::Operand(label) => {
                if ident::is_amplitude(label) {
                    self.amplitudes.insert(storage_label(label).to_string());
                }
            }
            TensorKind::Intermediate(_) | TensorKind::Gamma { .. } => {
                if self.declared.insert(tensor.effective_label()) {
                    let local = tensor_expr(tensor, TreeKind::Residual)?;
                    let slots = tensor
                        .indices()
                        .iter()
                        .map(block::range_slot)
                        .collect::<Result<Vec<_>>>()?;
                    self.statements.push(quote! {
                        let #local = Arc::new(Tensor::new(vec![#(pindex[#slots].clone()),*]));
                    });
                }
            }
        }
        Ok(())
    }

    fn instantiate(&mut self, num: usize, queue: &syn::Ident, inputs: &[TokenStream2], e0: bool, deps: &[usize]) {
        let task = task_ident(num);
        let ty = task_type(num);
        let e0 = if e0 { quote! { , self.e0 } } else { quote! {} };
        let deps: Vec<TokenStream2> = deps
            .iter()
            .map(|&d| {
                let dep = task_ident(d);
                quote! { #task.add_dep(&#dep); }
            })
            .collect();
        self.statements.push(quote! {
            let #task = TaskRef::new(#ty::new(vec![#(#inputs.clone()),*], pindex.clone() #e0));
            #(#deps)*
            #queue.add_task(#task.clone());
        });
    }

    /// `consumer` waits for `producer`
    fn link(&mut self, consumer: usize, producer: usize) {
        if consumer == producer {
            return;
        }
        let c = task_ident(consumer);
        let p = task_ident(producer);
        self.statements.push(quote! { #c.add_dep(&#p); });
        self.graph.add_dep(consumer, producer);
    }

    fn zero_task(&mut self, kind: TreeKind, queue: &syn::Ident) -> usize {
        let num = self.next_task();
        self.tasks.push(residual::zero_task(num));
        let (out, label) = match kind {
            TreeKind::Density => (quote! { self.d }, "d"),
            _ => (quote! { self.r }, "r"),
        };
        self.instantiate(num, queue, &[out], false, &[]);
        self.graph.add_task(
            num,
            TaskInfo {
                queue: queue.to_string(),
                reads: Vec::new(),
                writes: Some(label.to_string()),
                gamma: false,
            },
        );
        num
    }

    fn gamma_task(&mut self, gamma: &Tensor, emitter: &dyn GammaEmitter, queue: &syn::Ident) -> Result<()> {
        let num = self.next_task();
        self.tasks.push(emitter.generate_gamma(num, gamma)?);
        let ranks = gamma.active().map(|a| a.required_rdm()).unwrap_or_default();
        self.declare(gamma)?;

        let mut inputs = vec![tensor_expr(gamma, TreeKind::Residual)?];
        let mut reads = Vec::new();
        for &rank in &ranks {
            inputs.push(rdm_expr(rank));
            reads.push(format!("rdm{}", rank));
        }
        if let Some(merged) = gamma.merged() {
            self.declare(merged)?;
            inputs.push(tensor_expr(merged, TreeKind::Residual)?);
            reads.push(runtime_label(merged, TreeKind::Residual));
        }
        self.instantiate(num, queue, &inputs, false, &[]);

        let label = gamma.effective_label();
        trace!(num, gamma = label.as_str(), "gamma task");
        self.graph.add_task(
            num,
            TaskInfo {
                queue: queue.to_string(),
                reads,
                writes: Some(label.clone()),
                gamma: true,
            },
        );
        self.gamma_tasks.insert(label, num);
        Ok(())
    }

    /// Emit the tasks of a tree, sharing the Gammas with the trees emitted before
    fn emit_tree(&mut self, tree: &Tree, emitter: &dyn GammaEmitter) -> Result<()> {
        let mut tree = tree.clone();
        let known = self.gamma.len();
        tree.sort_gamma(self.gamma.clone());
        let fresh = tree.gamma()[known..].to_vec();
        self.gamma = tree.gamma().to_vec();

        let queue = self.open_queue(tree.kind());
        self.zero = match tree.kind() {
            TreeKind::Residual | TreeKind::Density => Some(self.zero_task(tree.kind(), &queue)),
            TreeKind::Energy | TreeKind::Correction => None,
        };
        for gamma in &fresh {
            self.gamma_task(gamma, emitter, &queue)?;
        }

        let before = self.count;
        Emitter {
            tree: &tree,
            ctx: self,
            queue,
        }
        .node(Tree::ROOT, None)?;
        debug!(
            name = tree.name(),
            kind = %tree.kind(),
            gamma = fresh.len(),
            tasks = self.count - before,
            "emitted"
        );
        Ok(())
    }
}

/// Body and operands of a task, the output first
pub struct Emission<'a> {
    body: TaskBody,
    tensors: Vec<&'a Tensor>,
}

struct Emitter<'a> {
    tree: &'a Tree,
    ctx: &'a mut EmitContext,
    queue: syn::Ident,
}

impl<'a> Emitter<'a> {
    fn emit(&mut self, emission: Emission<'_>) -> Result<usize> {
        let kind = self.tree.kind();
        let num = self.ctx.next_task();
        trace!(num, tree = self.tree.name(), "task");
        self.ctx.tasks.push(block::task(num, &emission.body)?);

        let mut deps: Vec<usize> = self.ctx.zero.into_iter().collect();
        for t in emission.tensors.iter().skip(1).filter(|t| t.is_gamma()) {
            let label = t.effective_label();
            let producer = *self
                .ctx
                .gamma_tasks
                .get(&label)
                .ok_or(Error::MissingGamma(label))?;
            if !deps.contains(&producer) {
                deps.push(producer);
            }
        }

        let mut inputs = Vec::with_capacity(emission.tensors.len());
        for t in &emission.tensors {
            self.ctx.declare(t)?;
            inputs.push(tensor_expr(t, kind)?);
        }
        self.ctx.instantiate(num, &self.queue, &inputs, emission.body.e0, &deps);

        let writes = match emission.body.accumulate {
            Some(_) => None,
            None => emission.tensors.first().map(|t| runtime_label(t, kind)),
        };
        self.ctx.graph.add_task(
            num,
            TaskInfo {
                queue: self.queue.to_string(),
                reads: emission
                    .tensors
                    .iter()
                    .skip(1)
                    .map(|t| runtime_label(t, kind))
                    .collect(),
                writes,
                gamma: false,
            },
        );
        for dep in deps {
            self.ctx.graph.add_dep(num, dep);
        }
        Ok(num)
    }

    /// Emit the tasks below a node, each waited for by the task of the parent contraction
    fn node(&mut self, n: NodeId, parent: Option<usize>) -> Result<()> {
        let tree = self.tree;
        let node = tree.node(n);
        if !node.op().is_empty() {
            let scalar = node.target().map_or(false, |t| t.indices().is_empty());
            let emission = match tree.kind() {
                TreeKind::Energy | TreeKind::Correction if scalar && tree.depth(n) == 1 => {
                    energy::leaf(tree, n)?
                }
                _ => residual::leaf(tree, n)?,
            };
            let num = self.emit(emission)?;
            if let Some(p) = parent {
                self.ctx.link(p, num);
            }
        }
        for &b in node.bc() {
            let task = self.bc(b)?;
            if let (Some(p), Some(num)) = (parent, task) {
                self.ctx.link(p, num);
            }
            for &s in tree.bc(b).subtree() {
                self.node(s, task)?;
            }
        }
        Ok(())
    }

    fn bc(&mut self, b: BcId) -> Result<Option<usize>> {
        let tree = self.tree;
        let emission = match (tree.kind(), tree.bc_depth(b)) {
            (TreeKind::Residual | TreeKind::Density, 0) => residual::projection(tree, b)?,
            (TreeKind::Energy | TreeKind::Correction, 0) => {
                energy::check_root(tree, b)?;
                return Ok(None);
            }
            (kind, _) if tree.target_indices(b).is_empty() => match kind {
                TreeKind::Energy | TreeKind::Correction => energy::dot(tree, b)?,
                TreeKind::Residual | TreeKind::Density => residual::dot(tree, b)?,
            },
            _ => residual::contraction(tree, b)?,
        };
        self.emit(emission).map(Some)
    }
}

impl Tree {
    /// Generate the program computing this tree, followed by the other trees
    ///
    /// The other trees, e.g. the energy or the density, add their tasks to their own queues,
    /// and reuse the Gamma tasks of the trees emitted before them.
    pub fn generate_task_list(
        &self,
        others: &[&Tree],
        options: &Options,
        gamma: &dyn GammaEmitter,
    ) -> Result<Compiled> {
        let mut ctx = EmitContext::new();
        ctx.emit_tree(self, gamma)?;
        for other in others {
            ctx.emit_tree(other, gamma)?;
        }
        let driver = driver::driver(self, &ctx, options)?;
        let levels = ctx.graph.validate()?;
        debug!(tasks = ctx.count, levels = levels.len(), "compiled");
        let tasks = &ctx.tasks;
        Ok(Compiled {
            driver,
            tasks: quote! { #(#tasks)* },
            graph: ctx.graph,
        })
    }
}

/// Format generated code by `rustfmt`
///
/// The input is returned as is if `rustfmt` is unavailable or fails.
pub fn format_block(tt: String) -> String {
    let mut child = match Command::new("rustfmt")
        .args(["--edition", "2021"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("rustfmt is not available: {}", e);
            return tt;
        }
    };
    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(tt.as_bytes()) {
            warn!("cannot write to rustfmt: {}", e);
            return tt;
        }
    }
    match child.wait_with_output() {
        Ok(output) if output.status.success() => String::from_utf8(output.stdout).unwrap_or(tt),
        _ => {
            warn!("rustfmt failed, keep the code unformatted");
            tt
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{diagram::Diagram, equation::Equation, namespace::Namespace};
    use anyhow::Result;
    use std::str::FromStr;

    fn tree(input: &str, name: &str, kind: TreeKind, ns: &mut Namespace) -> Result<Tree> {
        let mut eq = Equation::new(&Diagram::from_str(input)?, name);
        eq.duplicates()?;
        Ok(Tree::new(&eq, kind, ns)?)
    }

    #[test]
    fn residual_tasks() -> Result<()> {
        let mut ns = Namespace::init();
        let main = tree("proj(c,a) f1(a,a) t1(a,c)", "CIS", TreeKind::Residual, &mut ns)?;
        let compiled = main.generate_task_list(&[], &Options::default(), &DefaultGamma)?;
        // zero, projection, contraction with f1, and the summation of t1
        assert_eq!(compiled.graph.len(), 4);
        assert_eq!(compiled.graph.validate()?, vec![vec![0], vec![3], vec![2], vec![1]]);
        assert!(compiled.graph.depends_on(1, 2));
        assert!(compiled.graph.depends_on(2, 3));
        let tasks: syn::File = syn::parse2(compiled.tasks)?;
        assert_eq!(tasks.items.len(), 3 + 3 * 5);
        Ok(())
    }

    #[test]
    fn queues_of_other_trees() -> Result<()> {
        let mut ns = Namespace::init();
        let main = tree("proj(c,a) f1(a,a) t1(a,c)", "CIS", TreeKind::Residual, &mut ns)?;
        let energy = tree("proj() f1(c,a) t1(a,c)", "energy", TreeKind::Energy, &mut ns)?;
        let compiled = main.generate_task_list(&[&energy], &Options::default(), &DefaultGamma)?;
        assert_eq!(compiled.graph.queue("queue"), vec![0, 1, 2, 3]);
        let energy_tasks = compiled.graph.queue("energy_queue");
        assert!(!energy_tasks.is_empty());
        for n in energy_tasks {
            assert!(!compiled.graph.depends_on(n, 0));
        }
        Ok(())
    }

    #[test]
    fn energy_rejects_open_projector() -> Result<()> {
        let mut ns = Namespace::init();
        let energy = tree("proj(c,a) f1(a,a) t1(a,c)", "energy", TreeKind::Energy, &mut ns)?;
        assert!(matches!(
            energy.generate_task_list(&[], &Options::default(), &DefaultGamma),
            Err(Error::DisallowedDepth { depth: 0, .. })
        ));
        Ok(())
    }
}
