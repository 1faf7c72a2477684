// Aggregate expression parser: Avg(price), sum('rating'), Count("id")

use super::lexer::{identifier, string_literal, ws};
use crate::error::SpecError;
use crate::source::{Aggregate, AggregateKind};
use nom::{
    branch::alt,
    character::complete::char,
    combinator::eof,
    sequence::terminated,
    IResult,
};

/// Parse `name(field)` into its raw parts
pub fn aggregate_call(input: &str) -> IResult<&str, (String, String)> {
    let (input, name) = ws(identifier)(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, field) = ws(alt((string_literal, identifier)))(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((input, (name, field)))
}

/// Parse a complete aggregate expression and resolve the function name.
pub fn parse_aggregate_expr(input: &str) -> Result<Aggregate, SpecError> {
    let (_, (name, field)) = terminated(aggregate_call, eof)(input).map_err(|e| {
        SpecError::Malformed(format!("cannot parse aggregate {:?}: {}", input, e))
    })?;
    let kind = AggregateKind::from_name(&name).ok_or(SpecError::UnknownAggregate(name))?;
    if field.trim().is_empty() {
        return Err(SpecError::Malformed(format!(
            "aggregate {:?} has an empty field",
            input
        )));
    }
    Ok(Aggregate { kind, field })
}
