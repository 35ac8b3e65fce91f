//! Numeric and date comparisons used by `大于:` / `小于:` / `早于:` / `晚于:`

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::query::types::Comparison;

lazy_static! {
    // 2020-01-05, 2020/1/5, 2020.01, 2020年1月5日, 2020年1月, 2020年, 2020
    static ref DATE: Regex = Regex::new(
        r"([0-9]{4})\s*(?:年\s*(?:([0-9]{1,2})\s*月\s*(?:([0-9]{1,2})\s*日)?)?|[-/.]\s*([0-9]{1,2})(?:\s*[-/.]\s*([0-9]{1,2}))?)?"
    )
    .expect("date pattern is valid");
}

/// First run of ASCII digits in `s`
pub fn leading_number(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// First date found in `s`; a missing month or day defaults to 1
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let caps = DATE.captures(s)?;
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month = number(2).or_else(|| number(4)).unwrap_or(1);
    let day = number(3).or_else(|| number(5)).unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `value <op> operand`. Either side failing to parse means no match.
pub fn compare(op: Comparison, value: &str, operand: &str) -> bool {
    match op {
        Comparison::Greater | Comparison::Less => {
            let (Some(lhs), Some(rhs)) = (leading_number(value), leading_number(operand)) else {
                return false;
            };
            if op == Comparison::Greater {
                lhs > rhs
            } else {
                lhs < rhs
            }
        }
        Comparison::Before | Comparison::After => {
            let (Some(lhs), Some(rhs)) = (parse_date(value), parse_date(operand)) else {
                return false;
            };
            if op == Comparison::Before {
                lhs < rhs
            } else {
                lhs > rhs
            }
        }
    }
}

/// Check that a literal operand can take part in `op`
pub fn validate_operand(op: Comparison, operand: &str) -> Result<(), String> {
    if op.is_date() {
        parse_date(operand)
            .map(|_| ())
            .ok_or_else(|| format!("'{}' is not a date", operand))
    } else {
        match leading_number(operand) {
            Some(_) => Ok(()),
            None if operand.contains(|c: char| c.is_ascii_digit()) => {
                Err(format!("number in '{}' is out of range", operand))
            }
            None => Err(format!("'{}' contains no number", operand)),
        }
    }
}
