//! Recursive-descent / precedence-climbing parser for the JS-subset
//! expression grammar.
//!
//! ARCHITECTURE: grammar precedence mirrors `ast.rs`'s `BinaryOp`/`LogicalOp`
//! precedence tables so the parser and the printer can never disagree about
//! what needs parenthesizing. Statements, assignments, declarations and
//! arrow functions are rejected by construction: there is no grammar
//! production for them, only expressions.

use crate::ast::{BinaryOp, Expr, ExprKind, LogicalOp, UnaryOp};
use crate::error::{CompileError, Result};
use crate::lexer::{Lexer, Token};

pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
    };
    let expr = parser.parse_sequence()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(message, self.source)
    }

    fn expect_punct(&mut self, p: &str) -> Result<()> {
        match self.peek() {
            Token::Punct(found) if *found == p => {
                self.advance();
                Ok(())
            }
            other => Err(self.err(format!("expected {:?}, found {:?}", p, other))),
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(self.err(format!("unexpected trailing token {:?}", other))),
        }
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Token::Punct(found) if *found == p)
    }

    /// Top-level production: a comma-separated sequence expression.
    fn parse_sequence(&mut self) -> Result<Expr> {
        let first = self.parse_conditional()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.is_punct(",") {
            self.advance();
            items.push(self.parse_conditional()?);
        }
        Ok(Expr::new(ExprKind::Sequence(items)))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let test = self.parse_logical_or()?;
        if self.is_punct("?") {
            self.advance();
            let consequent = self.parse_conditional()?;
            self.expect_punct(":")?;
            let alternate = self.parse_conditional()?;
            Ok(Expr::new(ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            }))
        } else {
            Ok(test)
        }
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.is_punct("||") {
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::new(ExprKind::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.is_punct("&&") {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::new(ExprKind::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Punct("==") => BinaryOp::Eq,
                Token::Punct("!=") => BinaryOp::NotEq,
                Token::Punct("===") => BinaryOp::StrictEq,
                Token::Punct("!==") => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::new(ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Punct("<") => BinaryOp::Lt,
                Token::Punct("<=") => BinaryOp::LtEq,
                Token::Punct(">") => BinaryOp::Gt,
                Token::Punct(">=") => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::new(ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Punct("+") => BinaryOp::Add,
                Token::Punct("-") => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::new(ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Punct("*") => BinaryOp::Mul,
                Token::Punct("/") => BinaryOp::Div,
                Token::Punct("%") => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::new(ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let argument = self.parse_unary()?;
            Ok(Expr::new(ExprKind::Unary {
                op,
                argument: Box::new(argument),
            }))
        } else {
            self.parse_call_member()
        }
    }

    /// Parses a primary expression followed by any chain of `.prop`,
    /// `[expr]` and `(args)` postfix operators.
    fn parse_call_member(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.is_punct(".") {
                self.advance();
                let name = self.expect_ident()?;
                expr = Expr::dotted(expr, name);
            } else if self.is_punct("[") {
                self.advance();
                let index = self.parse_conditional()?;
                self.expect_punct("]")?;
                expr = Expr::member(expr, index, true);
            } else if self.is_punct("(") {
                self.advance();
                let args = self.parse_args()?;
                expr = Expr::call(expr, args);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.is_punct(")") {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_conditional()?);
            if self.is_punct(",") {
                self.advance();
                continue;
            }
            self.expect_punct(")")?;
            break;
        }
        Ok(args)
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(self.err(format!("expected identifier, found {:?}", other))),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::number(n)),
            Token::Str(s) => Ok(Expr::string(s)),
            Token::Bool(b) => Ok(Expr::boolean(b)),
            Token::Ident(name) => Ok(Expr::ident(name)),
            Token::Punct("(") => {
                let inner = self.parse_sequence()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            other => Err(self.err(format!("unexpected token {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_check() {
        let expr = parse_expression("next >= 0 && next <= 100").unwrap();
        match expr.kind {
            ExprKind::Logical { op: LogicalOp::And, .. } => {}
            other => panic!("expected logical and, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_of_plus_and_times() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                ref right,
                ..
            } => assert!(matches!(
                right.kind,
                ExprKind::Binary { op: BinaryOp::Mul, .. }
            )),
            other => panic!("expected addition at root, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_member_and_call_chain() {
        let expr = parse_expression("newData.child('foo').exists()").unwrap();
        assert!(expr.is_dotted_call("exists"));
    }

    #[test]
    fn test_parse_conditional_ternary() {
        let expr = parse_expression("a ? b : c").unwrap();
        assert!(matches!(expr.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn test_parse_rejects_assignment() {
        assert!(parse_expression("x = 1").is_err());
    }

    #[test]
    fn test_parse_computed_member() {
        let expr = parse_expression("data.child($uid)[0]").unwrap();
        assert!(matches!(
            expr.kind,
            ExprKind::Member { computed: true, .. }
        ));
    }

    #[test]
    fn test_parse_sequence_expression() {
        let expr = parse_expression("a, b, c").unwrap();
        match expr.kind {
            ExprKind::Sequence(items) => assert_eq!(items.len(), 3),
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_trailing_garbage() {
        assert!(parse_expression("a + b )").is_err());
    }
}
