use anyhow::{anyhow, Result};

use super::parser::{BinaryOp, CompareOp, Expr};
use crate::group::{aggregate, Group};

/// Result of evaluating a rule expression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
        }
    }
}

pub fn evaluate(expr: &Expr, groups: &[Group]) -> Result<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Call { func, group } => aggregate(groups, *func, group).map(Value::Number),
        Expr::Neg(inner) => Ok(Value::Number(-evaluate(inner, groups)?.as_f64())),
        Expr::Not(inner) => Ok(Value::Bool(!evaluate(inner, groups)?.truthy())),
        Expr::Binary { op, lhs, rhs } => {
            let a = evaluate(lhs, groups)?.as_f64();
            let b = evaluate(rhs, groups)?.as_f64();
            arithmetic(*op, a, b).map(Value::Number)
        }
        Expr::Compare { first, rest } => {
            let mut left = evaluate(first, groups)?.as_f64();
            for (op, operand) in rest {
                let right = evaluate(operand, groups)?.as_f64();
                if !compare(*op, left, right) {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(lhs, rhs) => {
            let left = evaluate(lhs, groups)?;
            if left.truthy() {
                evaluate(rhs, groups)
            } else {
                Ok(left)
            }
        }
        Expr::Or(lhs, rhs) => {
            let left = evaluate(lhs, groups)?;
            if left.truthy() {
                Ok(left)
            } else {
                evaluate(rhs, groups)
            }
        }
    }
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<f64> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div if b == 0.0 => Err(anyhow!("division by zero")),
        BinaryOp::Div => Ok(a / b),
        BinaryOp::Rem if b == 0.0 => Err(anyhow!("modulo by zero")),
        // Result takes the sign of the divisor.
        BinaryOp::Rem => Ok(a - b * (a / b).floor()),
    }
}

fn compare(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationValue;
    use crate::group::tests::group_with_history;
    use crate::rules::parser::parse;

    fn eval(source: &str, groups: &[Group]) -> Result<Value> {
        evaluate(&parse(source)?, groups)
    }

    fn counts(values: &[i64]) -> Vec<ClassificationValue> {
        values.iter().map(|v| ClassificationValue::Count(*v)).collect()
    }

    #[test]
    fn literal_arithmetic() {
        assert_eq!(eval("1 + 2 * 3", &[]).unwrap(), Value::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3", &[]).unwrap(), Value::Number(9.0));
        assert_eq!(eval("-2 - -3", &[]).unwrap(), Value::Number(1.0));
        assert_eq!(eval("7 % 3", &[]).unwrap(), Value::Number(1.0));
        assert_eq!(eval("-7 % 3", &[]).unwrap(), Value::Number(2.0));
        assert_eq!(eval("true + true", &[]).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn chained_comparisons() {
        assert_eq!(eval("1 < 2 < 3", &[]).unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 3 < 2", &[]).unwrap(), Value::Bool(false));
        assert_eq!(eval("2 == 2 != 3", &[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn and_or_return_deciding_operand() {
        assert_eq!(eval("0 or 5", &[]).unwrap(), Value::Number(5.0));
        assert_eq!(eval("3 and 0", &[]).unwrap(), Value::Number(0.0));
        assert_eq!(eval("2 || 1 / 0", &[]).unwrap(), Value::Number(2.0));
        assert_eq!(eval("false && 1 / 0", &[]).unwrap(), Value::Bool(false));
        assert_eq!(eval("not 0", &[]).unwrap(), Value::Bool(true));
        assert_eq!(eval("!true", &[]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval("1 / 0", &[]).is_err());
        assert!(eval("1 % 0", &[]).is_err());
        assert!(eval("true or 1 / 0", &[]).is_ok());
    }

    #[test]
    fn calls_read_group_aggregates() {
        let a = counts(&[1, 4]);
        let b = counts(&[2]);
        let groups = vec![group_with_history("people", &[&a, &b])];
        assert_eq!(eval("count(people)", &groups).unwrap(), Value::Number(6.0));
        assert_eq!(eval("avg(people)", &groups).unwrap(), Value::Number(3.0));
        assert_eq!(
            eval("count_max(people, 2)", &groups).unwrap(),
            Value::Number(6.0)
        );
        assert_eq!(eval("avg(nobody) == 0", &groups).unwrap(), Value::Bool(true));
    }

    #[test]
    fn aggregate_errors_propagate() {
        let labels = vec![ClassificationValue::from("open")];
        let groups = vec![group_with_history("doors", &[&labels])];
        let err = eval("avg(doors) > 0", &groups).unwrap_err();
        assert!(format!("{:#}", err).contains("avg(doors) failed"));
    }
}
