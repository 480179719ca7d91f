//! Parse operator lists, e.g. `proj(c,c,a,a) f1(g,g) t2(a,a,c,c)`
//!
//! These parsers are implemented using [nom](https://github.com/Geal/nom),
//! and corresponding EBNF-like schema are written in each document page.
//!

use crate::{
    error::{Error, Result},
    index::RangeClass,
};
use nom::{
    character::complete::*, combinator::*, multi::*, number::complete::double, sequence::*,
    Finish, IResult, Parser,
};

/// An operator as written, e.g. `t2(a,a,c,c)`
#[derive(Debug, Clone, PartialEq)]
pub struct RawOperator {
    pub label: String,
    pub classes: Vec<RangeClass>,
}

/// A product of operators with an optional leading factor
#[derive(Debug, Clone, PartialEq)]
pub struct RawDiagram {
    pub factor: Option<f64>,
    pub operators: Vec<RawOperator>,
}

impl std::str::FromStr for RawDiagram {
    type Err = Error;
    fn from_str(input: &str) -> Result<Self> {
        if let Ok((_, raw)) = all_consuming(terminated(diagram, multispace0))(input).finish() {
            Ok(raw)
        } else {
            Err(Error::InvalidOperators(input.to_string()))
        }
    }
}

/// class = `c` | `x` | `a` | `g`;
pub fn class(input: &str) -> IResult<&str, RangeClass> {
    map_opt(one_of("cxag"), RangeClass::from_char).parse(input)
}

/// label = { alphanumeric }-;
pub fn label(input: &str) -> IResult<&str, String> {
    alphanumeric1.map(|s: &str| s.to_string()).parse(input)
}

/// operator = [label] `(` \[ [class] { `,` [class] } \] `)`;
pub fn operator(input: &str) -> IResult<&str, RawOperator> {
    let comma = tuple((multispace0, char(','), multispace0));
    tuple((
        label,
        multispace0,
        char('('),
        multispace0,
        separated_list0(comma, class),
        multispace0,
        char(')'),
    ))
    .map(|(label, _, _, _, classes, _, _)| RawOperator { label, classes })
    .parse(input)
}

/// factor = floating point literal followed by a space;
pub fn factor(input: &str) -> IResult<&str, f64> {
    terminated(double, multispace1).parse(input)
}

/// diagram = \[ [factor] \] [operator] { [operator] };
pub fn diagram(input: &str) -> IResult<&str, RawDiagram> {
    let (input, _head) = multispace0(input)?;
    let (input, factor) = opt(factor)(input)?;
    let (input, operators) = many1(preceded(multispace0, operator))(input)?;
    Ok((input, RawDiagram { factor, operators }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_operator() {
        let (res, op) = operator("t2(a,a,c,c)").finish().unwrap();
        assert_eq!(res, "");
        assert_eq!(op.label, "t2");
        assert_eq!(
            op.classes,
            vec![
                RangeClass::Virtual,
                RangeClass::Virtual,
                RangeClass::Closed,
                RangeClass::Closed
            ]
        );

        let (_, op) = operator("f1( g , x )").finish().unwrap();
        assert_eq!(op.classes, vec![RangeClass::General, RangeClass::Active]);

        let (_, op) = operator("proj()").finish().unwrap();
        assert!(op.classes.is_empty());
    }

    #[test]
    fn test_diagram() {
        let raw = RawDiagram::from_str("proj(c,c,a,a) f1(g,g) t2(a,a,c,c)").unwrap();
        assert_eq!(raw.factor, None);
        let labels: Vec<&str> = raw.operators.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["proj", "f1", "t2"]);

        let raw = RawDiagram::from_str("  0.5 proj(c,a) h1(g,g)  ").unwrap();
        assert_eq!(raw.factor, Some(0.5));
        assert_eq!(raw.operators.len(), 2);
    }

    #[test]
    fn test_invalid() {
        assert!(RawDiagram::from_str("").is_err());
        assert!(RawDiagram::from_str("proj(c,q)").is_err());
        assert!(RawDiagram::from_str("proj(c,a").is_err());
    }
}
