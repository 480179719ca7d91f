#![cfg_attr(
    all(doc, not(doctest)),
    feature(prelude_import, custom_inner_attributes, proc_macro_hygiene)
)]
#![cfg_attr(all(doc, not(doctest)), katexit::katexit)]
//! Compiler of many-body perturbation theory into block-tensor tasks
//!
//! Wick's theorem
//! ---------------
//! A term of the perturbation theory is a product of second-quantized operators,
//! e.g. the residual of the first order amplitude
//! $$
//! r_{ij}^{ab} = \langle \Phi_{ij}^{ab} | \hat{f} \hat{T}_2 | \Phi \rangle,
//! $$
//! where each operator is a string of creation and annihilation operators
//! $a^\dagger_p$, $a_q$ with a tensor of coefficients.
//! Wick's theorem reduces the expectation value of such a product
//! into the sum of all full contractions, i.e. the pairings of a creation operator
//! with an annihilation operator of the same orbital subspace:
//! $$
//! \langle a_i a^\dagger_j \rangle = \delta_{ij}
//! $$
//! for a closed orbital $i, j$, and similar for the virtual orbitals.
//! Operators in the active space are not paired,
//! but left to the reduced density matrices $\Gamma$.
//!
//! Input
//! ------
//! An operator list is written as
//!
//! ```text
//! proj(c,c,a,a) f1(g,g) t2(a,a,c,c)
//! ```
//!
//! where `c`, `x`, `a` and `g` denote an index in the closed, active, virtual or general range.
//! `label(p1, ..., pm, q1, ..., qm)` stands for
//! $a^\dagger_{p_1} \cdots a^\dagger_{p_m} a_{q_m} \cdots a_{q_1}$,
//! and the projector `proj` is the excitation of the output.
//!
//! Pipeline
//! ---------
//!
//! - [equation::Equation] expands the product into the fully contracted [diagram::Diagram]s,
//!   and deduplicates them up to the permutation of indices.
//! - [tree::Tree] factorizes the sum of diagrams into binary contractions
//!   of [tensor::Tensor]s, merging the contractions shared by the terms.
//! - [tree::Tree::generate_task_list] emits the tasks computing each contraction,
//!   their dependencies, and the driver running them.
//!
//! ```
//! use wick_codegen::*;
//! use std::str::FromStr;
//!
//! let diagram = Diagram::from_str("proj(c,a) f1(a,a) t1(a,c)").unwrap();
//! let mut eq = Equation::new(&diagram, "CIS");
//! eq.duplicates().unwrap();
//!
//! let mut namespace = Namespace::init();
//! let tree = Tree::new(&eq, TreeKind::Residual, &mut namespace).unwrap();
//! let compiled = tree
//!     .generate_task_list(&[], &Options::default(), &DefaultGamma)
//!     .unwrap();
//! assert_eq!(compiled.graph.len(), 4);
//! ```

pub mod active;
pub mod codegen;
pub mod diagram;
pub mod equation;
pub mod error;
pub mod index;
pub mod list_tensor;
pub mod namespace;
pub mod operator;
pub mod parser;
pub mod tensor;
pub mod tree;

pub use codegen::{Compiled, DefaultGamma, GammaEmitter, Options, TaskGraph};
pub use diagram::Diagram;
pub use equation::Equation;
pub use error::{Error, Result};
pub use index::{Index, RangeClass};
pub use namespace::Namespace;
pub use tensor::Tensor;
pub use tree::{Tree, TreeKind};
