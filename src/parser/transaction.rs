use super::common::{keyword, keywords, ws};
use nom::{
    branch::alt,
    combinator::{map, opt},
    sequence::pair,
    IResult,
};

/// `BEGIN [WORK]` or `START TRANSACTION [READ ONLY | READ WRITE]`.
pub fn begin_transaction(input: &str) -> IResult<&str, ()> {
    let (input, _) = ws(alt((
        map(keywords("START TRANSACTION"), |()| ""),
        map(pair(keyword("BEGIN"), opt(ws(alt((keyword("WORK"), keyword("TRANSACTION")))))), |_| ""),
    )))(input)?;
    let (input, _) = opt(ws(alt((keywords("READ ONLY"), keywords("READ WRITE")))))(input)?;
    Ok((input, ()))
}

pub fn commit_transaction(input: &str) -> IResult<&str, ()> {
    let (input, _) = ws(keyword("COMMIT"))(input)?;
    let (input, _) = opt(ws(keyword("WORK")))(input)?;
    Ok((input, ()))
}

pub fn rollback_transaction(input: &str) -> IResult<&str, ()> {
    let (input, _) = ws(keyword("ROLLBACK"))(input)?;
    let (input, _) = opt(ws(keyword("WORK")))(input)?;
    Ok((input, ()))
}
