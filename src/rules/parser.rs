use anyhow::{anyhow, Result};

use super::lexer::{tokenize, Token, TokenKind};
use crate::group::Aggregate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed classification rule.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    /// `avg(group)`, `avg_max(group, 3)`, ...
    Call { func: Aggregate, group: String },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `a < b <= c` holds when every adjacent pair holds.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Group names referenced by aggregate calls, in source order.
    pub fn groups(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_groups(&mut out);
        out
    }

    fn collect_groups<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) | Expr::Bool(_) => {}
            Expr::Call { group, .. } => out.push(group),
            Expr::Neg(inner) | Expr::Not(inner) => inner.collect_groups(out),
            Expr::Binary { lhs, rhs, .. } | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.collect_groups(out);
                rhs.collect_groups(out);
            }
            Expr::Compare { first, rest } => {
                first.collect_groups(out);
                for (_, e) in rest {
                    e.collect_groups(out);
                }
            }
        }
    }
}

pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.or()?;
    if let Some(token) = parser.peek() {
        return Err(anyhow!(
            "unexpected {:?} at offset {}",
            token.kind,
            token.offset
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(anyhow!("expected {} at offset {}", what, self.offset()))
        }
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.not()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Not) {
            let inner = self.not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr> {
        let first = self.sum()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Eq) => CompareOp::Eq,
                Some(TokenKind::Ne) => CompareOp::Ne,
                Some(TokenKind::Lt) => CompareOp::Lt,
                Some(TokenKind::Le) => CompareOp::Le,
                Some(TokenKind::Gt) => CompareOp::Gt,
                Some(TokenKind::Ge) => CompareOp::Ge,
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.sum()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let Some(token) = self.next() else {
            return Err(anyhow!("unexpected end of expression at offset {}", offset));
        };
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Integer(n) => Ok(Expr::Number(n as f64)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::LParen => {
                let inner = self.or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => self.call(&name, token.offset),
            other => Err(anyhow!("unexpected {:?} at offset {}", other, token.offset)),
        }
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<Expr> {
        let windowed = match name {
            "avg" | "count" => false,
            "avg_max" | "count_max" => true,
            _ => {
                return Err(anyhow!(
                    "unknown name '{}' at offset {} (expected avg, count, avg_max or count_max)",
                    name,
                    offset
                ))
            }
        };
        self.expect(TokenKind::LParen, "'('")?;
        let group = match self.next() {
            Some(Token {
                kind: TokenKind::Ident(group),
                ..
            }) => group,
            _ => {
                return Err(anyhow!(
                    "{}() at offset {} needs a group name",
                    name,
                    offset
                ))
            }
        };
        let func = if windowed {
            self.expect(TokenKind::Comma, "','")?;
            let window = match self.next() {
                Some(Token {
                    kind: TokenKind::Integer(n),
                    ..
                }) => usize::try_from(n)
                    .map_err(|_| anyhow!("{}() window at offset {} is too large", name, offset))?,
                _ => {
                    return Err(anyhow!(
                        "{}() at offset {} needs a non-negative integer window",
                        name,
                        offset
                    ))
                }
            };
            if name == "avg_max" {
                Aggregate::AvgMax(window)
            } else {
                Aggregate::CountMax(window)
            }
        } else if name == "avg" {
            Aggregate::Avg
        } else {
            Aggregate::Count
        };
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::Call { func, group })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(func: Aggregate, group: &str) -> Expr {
        Expr::Call {
            func,
            group: group.to_string(),
        }
    }

    #[test]
    fn parses_and_of_comparisons() {
        let expr = parse("avg(g1) > 0.5 && count(g2) >= 1").unwrap();
        assert_eq!(
            expr,
            Expr::And(
                Box::new(Expr::Compare {
                    first: Box::new(call(Aggregate::Avg, "g1")),
                    rest: vec![(CompareOp::Gt, Expr::Number(0.5))],
                }),
                Box::new(Expr::Compare {
                    first: Box::new(call(Aggregate::Count, "g2")),
                    rest: vec![(CompareOp::Ge, Expr::Number(1.0))],
                }),
            )
        );
    }

    #[test]
    fn windowed_calls_tolerate_whitespace() {
        let a = parse("avg_max(g1, 3)").unwrap();
        let b = parse("avg_max( g1 ,3 )").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, call(Aggregate::AvgMax(3), "g1"));
        assert_eq!(
            parse("count_max(people,0)").unwrap(),
            call(Aggregate::CountMax(0), "people")
        );
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Number(2.0)),
                    rhs: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn or_binds_looser_than_and() {
        let expr = parse("true || false and false").unwrap();
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn collects_referenced_groups() {
        let expr = parse("(avg(a) + count_max(b, 2)) / 2 > 1 or not count(c)").unwrap();
        assert_eq!(expr.groups(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_malformed_rules() {
        for bad in [
            "",
            "avg(g1",
            "avg()",
            "avg(1)",
            "avg_max(g1)",
            "avg_max(g1, -1)",
            "avg_max(g1, 1.5)",
            "sum(g1)",
            "g1 > 1",
            "1 2",
            "(1 + 2",
            "1 +",
        ] {
            assert!(parse(bad).is_err(), "expected {:?} to be rejected", bad);
        }
    }

    #[test]
    fn errors_carry_offsets() {
        let err = parse("avg(g1) > ").unwrap_err();
        assert!(err.to_string().contains("offset 10"));
        let err = parse("total(g1)").unwrap_err();
        assert!(err.to_string().contains("unknown name 'total' at offset 0"));
    }
}
