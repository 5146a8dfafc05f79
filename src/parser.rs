//! Vendor column type parser using nom.
//!
//! Introspection queries report column types the way the vendor spells them:
//!
//! ```text
//! varchar(255)        -> base "varchar", size 255
//! decimal(10,2)       -> base "decimal", size 10, scale 2
//! int(11) unsigned    -> base "int", size 11, unsigned
//! NUMBER              -> base "number"
//! ```

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, multispace0, u32 as decimal},
    combinator::{opt, rest},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::error::{AssocError, AssocResult};

/// A parsed column type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnType {
    /// Lowercased base type name, modifiers removed.
    pub base: String,
    pub size: Option<u32>,
    pub scale: Option<u32>,
    pub unsigned: bool,
}

const MODIFIERS: &[&str] = &["unsigned", "signed", "zerofill"];

/// Parse a vendor type declaration.
pub fn parse_column_type(input: &str) -> AssocResult<ColumnType> {
    let input = input.trim();
    match type_decl(input) {
        Ok((_, (head, dims, tail))) => {
            let words: Vec<String> = head
                .split_whitespace()
                .chain(tail.split_whitespace())
                .map(|w| w.to_ascii_lowercase())
                .collect();
            let unsigned = words.iter().any(|w| w == "unsigned");
            let base = words
                .iter()
                .take_while(|w| !w.starts_with('('))
                .filter(|w| !MODIFIERS.contains(&w.as_str()))
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            Ok(ColumnType {
                base,
                size: dims.map(|(size, _)| size),
                scale: dims.and_then(|(_, scale)| scale),
                unsigned,
            })
        }
        Err(e) => Err(AssocError::InvalidCriteria(format!(
            "unparseable column type '{input}': {e:?}"
        ))),
    }
}

/// Parse `base[(size[,scale])][ modifiers]`.
fn type_decl(input: &str) -> IResult<&str, (&str, Option<(u32, Option<u32>)>, &str)> {
    let (input, head) = take_while1(|c: char| c != '(')(input)?;
    let (input, dims) = opt(delimited(char('('), dimensions, char(')')))(input)?;
    let (input, tail) = rest(input)?;
    Ok((input, (head, dims, tail)))
}

fn dimensions(input: &str) -> IResult<&str, (u32, Option<u32>)> {
    pair(
        preceded(multispace0, decimal),
        opt(preceded(tuple((multispace0, char(','), multispace0)), decimal)),
    )(input)
}
