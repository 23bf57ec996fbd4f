//! Arithmetic candidates for an operand pair.

use std::fmt;

/// Arithmetic operator joining the two operands of a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Mod => '%',
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// `first operator second = solution`, with the solution in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub first: i64,
    pub operator: Operator,
    pub second: i64,
    pub solution: i64,
}

const DESCENDING: &[Operator] = &[
    Operator::Sub,
    Operator::Div,
    Operator::Mod,
    Operator::Add,
    Operator::Mul,
];
const ASCENDING: &[Operator] = &[Operator::Mod, Operator::Add, Operator::Mul];

/// Operators tried for `(a, b)`, in order. Subtraction and division only
/// apply when `a > b`.
pub fn rules_for(a: i64, b: i64) -> &'static [Operator] {
    if a > b {
        DESCENDING
    } else {
        ASCENDING
    }
}

/// Result of `a op b`, or `None` when it overflows, divides by zero or
/// divides inexactly.
pub fn evaluate(operator: Operator, a: i64, b: i64) -> Option<i64> {
    match operator {
        Operator::Add => a.checked_add(b),
        Operator::Sub => a.checked_sub(b),
        Operator::Mul => a.checked_mul(b),
        Operator::Div => match a.checked_rem(b)? {
            0 => a.checked_div(b),
            _ => None,
        },
        Operator::Mod => a.checked_rem(b),
    }
}

/// Call `f` for every candidate of `(a, b)` whose solution lies in
/// `[min, max]`.
pub fn for_each_candidate<F>(a: i64, b: i64, min: i64, max: i64, mut f: F)
where
    F: FnMut(Candidate),
{
    for &operator in rules_for(a, b) {
        let Some(solution) = evaluate(operator, a, b) else {
            continue;
        };
        if solution < min || solution > max {
            continue;
        }
        f(Candidate {
            first: a,
            operator,
            second: b,
            solution,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(a: i64, b: i64, min: i64, max: i64) -> Vec<(Operator, i64)> {
        let mut out = Vec::new();
        for_each_candidate(a, b, min, max, |c| out.push((c.operator, c.solution)));
        out
    }

    #[test]
    fn test_descending_pair() {
        // 57 / 13 is inexact and skipped.
        assert_eq!(
            candidates(57, 13, 1, 1000),
            vec![
                (Operator::Sub, 44),
                (Operator::Mod, 5),
                (Operator::Add, 70),
                (Operator::Mul, 741),
            ]
        );
    }

    #[test]
    fn test_exact_division_included() {
        assert_eq!(
            candidates(60, 12, 1, 1000),
            vec![
                (Operator::Sub, 48),
                (Operator::Div, 5),
                (Operator::Add, 72),
                (Operator::Mul, 720),
            ]
        );
    }

    #[test]
    fn test_ascending_pair() {
        assert_eq!(
            candidates(13, 57, 1, 1000),
            vec![
                (Operator::Mod, 13),
                (Operator::Add, 70),
                (Operator::Mul, 741),
            ]
        );
    }

    #[test]
    fn test_solutions_outside_range_dropped() {
        assert_eq!(
            candidates(57, 13, 10, 100),
            vec![(Operator::Sub, 44), (Operator::Add, 70)]
        );
    }

    #[test]
    fn test_zero_divisor_skipped() {
        assert_eq!(
            candidates(5, 0, 0, 100),
            vec![(Operator::Sub, 5), (Operator::Add, 5), (Operator::Mul, 0)]
        );
        assert_eq!(evaluate(Operator::Mod, 5, 0), None);
        assert_eq!(evaluate(Operator::Div, 5, 0), None);
    }

    #[test]
    fn test_overflow_skipped() {
        assert_eq!(evaluate(Operator::Mul, i64::MAX, 2), None);
        assert_eq!(evaluate(Operator::Add, i64::MAX, 1), None);
        assert_eq!(
            candidates(i64::MAX, 2, 0, i64::MAX),
            vec![(Operator::Sub, i64::MAX - 2), (Operator::Mod, 1)]
        );
    }

    #[test]
    fn test_operator_display() {
        let symbols: String = [
            Operator::Add,
            Operator::Sub,
            Operator::Mul,
            Operator::Div,
            Operator::Mod,
        ]
        .iter()
        .map(|op| op.to_string())
        .collect();
        assert_eq!(symbols, "+-*/%");
    }
}
