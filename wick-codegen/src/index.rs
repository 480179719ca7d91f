//! Orbital indices and their range classes

use proc_macro2::TokenStream;
use quote::{format_ident, quote, ToTokens, TokenStreamExt};
use std::fmt;

/// Orbital subspace an index runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RangeClass {
    /// Doubly occupied orbitals, `c`
    Closed,
    /// Partially occupied orbitals, `x`
    Active,
    /// Unoccupied orbitals, `a`
    Virtual,
    /// Any of above, `g`. Resolved before contraction.
    General,
}

impl RangeClass {
    /// Classes a general index is expanded into
    pub const RESOLVED: [RangeClass; 3] = [RangeClass::Closed, RangeClass::Active, RangeClass::Virtual];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'c' => Some(RangeClass::Closed),
            'x' => Some(RangeClass::Active),
            'a' => Some(RangeClass::Virtual),
            'g' => Some(RangeClass::General),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            RangeClass::Closed => 'c',
            RangeClass::Active => 'x',
            RangeClass::Virtual => 'a',
            RangeClass::General => 'g',
        }
    }

    /// Position of the range in the `[closed, active, virtual]` array of the generated code
    ///
    /// A general index has no range of its own.
    pub fn slot(&self) -> Option<usize> {
        match self {
            RangeClass::Closed => Some(0),
            RangeClass::Active => Some(1),
            RangeClass::Virtual => Some(2),
            RangeClass::General => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RangeClass::Active)
    }
}

impl fmt::Display for RangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// An index of a tensor, e.g. `c0` or `a3`
///
/// Two indices are identical if both the class and the number match.
/// The number is assigned by [crate::diagram::Diagram::refresh_indices]
/// so that the same diagram always yields the same indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Index {
    pub class: RangeClass,
    pub num: usize,
}

impl Index {
    pub fn new(class: RangeClass, num: usize) -> Self {
        Index { class, num }
    }

    pub fn identical(&self, other: &Index) -> bool {
        self == other
    }

    pub fn ident(&self) -> syn::Ident {
        format_ident!("{}", self.to_string())
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class, self.num)
    }
}

impl ToTokens for Index {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let ident = self.ident();
        tokens.append_all(quote! { #ident });
    }
}

/// Comma separated list in parentheses, e.g. `(c0, a1)`. Empty for empty list.
pub fn index_str(indices: &[Index]) -> String {
    if indices.is_empty() {
        return String::new();
    }
    let body: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
    format!("({})", body.join(", "))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn class_chars() {
        for c in ['c', 'x', 'a', 'g'] {
            assert_eq!(RangeClass::from_char(c).unwrap().as_char(), c);
        }
        assert_eq!(RangeClass::from_char('v'), None);
    }

    #[test]
    fn slots() {
        assert_eq!(RangeClass::Closed.slot(), Some(0));
        assert_eq!(RangeClass::Active.slot(), Some(1));
        assert_eq!(RangeClass::Virtual.slot(), Some(2));
        assert_eq!(RangeClass::General.slot(), None);
    }

    #[test]
    fn display() {
        let i = Index::new(RangeClass::Virtual, 3);
        assert_eq!(i.to_string(), "a3");
        assert_eq!(
            index_str(&[Index::new(RangeClass::Closed, 0), i]),
            "(c0, a3)"
        );
        assert_eq!(index_str(&[]), "");
    }
}
