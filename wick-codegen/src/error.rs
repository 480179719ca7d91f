//! Errors raised while compiling an equation
//!
//! A Wick contraction which does not apply is not an error,
//! the branch is simply dropped. Everything here stops the compilation.

use crate::tree::TreeKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid operator list: {0}")]
    InvalidOperators(String),

    #[error("Equation `{0}` has no diagram")]
    EmptyEquation(String),

    #[error("Term has no tensor to contract")]
    MissingTensors,

    #[error("Merging duplicated diagrams yields zero factor: {0}")]
    ZeroFactor(String),

    #[error("Permuted diagrams have different factors: {0} and {1}")]
    FactorMismatch(f64, f64),

    #[error("Unknown tree kind: {0}")]
    UnknownTreeKind(String),

    #[error("Daggered object is only supported for 4-index tensors, found {0} indices")]
    UnsupportedDagger(usize),

    #[error("Contraction of `{0}` is not supported: {1}")]
    UnsupportedContraction(String, &'static str),

    #[error("Binary contraction of {kind} tree is not allowed at depth {depth}")]
    DisallowedDepth { kind: TreeKind, depth: usize },

    #[error("Unknown scalar: {0}")]
    UnknownScalar(String),

    #[error("Multiple scalars in a task: {0} and {1}")]
    MultipleScalars(String, String),

    #[error("Index {0} is left general, its range is unknown")]
    UnresolvedIndex(String),

    #[error("Index {0} is not found in {1}")]
    IndexNotFound(String, String),

    #[error("`{0}` cannot be used as an identifier in the generated code")]
    InvalidIdentifier(String),

    #[error("Gamma tensor {0} is read before any task computes it")]
    MissingGamma(String),

    #[error(transparent)]
    Graph(#[from] crate::codegen::GraphError),
}
