use crate::ast::{Expr, FunctionDecl, Parsed, Stmt};
use crate::diagnostics::Diagnostics;
use crate::token::{Token, TokenType};
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
struct ParseError {
    message: String,
    line: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Parse Error: {}", self.line, self.message)
    }
}

impl Error for ParseError {}

pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    allow_expression: bool,
    found_expression: bool,
    loop_depth: usize,
    diagnostics: &'a mut Diagnostics,
}

/// Parses a token vector into a program. With `allow_expression` set and a
/// buffer that is one expression with no terminating `;`, the expression
/// itself is returned so the REPL can echo its value.
pub fn parse(tokens: &[Token], allow_expression: bool, diagnostics: &mut Diagnostics) -> Parsed {
    let mut parser = Parser {
        tokens,
        current: 0,
        allow_expression,
        found_expression: false,
        loop_depth: 0,
        diagnostics,
    };
    let mut statements: Vec<Stmt> = Vec::new();
    while !parser.is_at_end() {
        if let Some(stmt) = parser.statement() {
            statements.push(stmt);
            if parser.found_expression {
                if let Some(Stmt::Expression(expr)) = statements.pop() {
                    return Parsed::Expression(Box::new(expr));
                }
            }
        }
        parser.allow_expression = false;
    }
    Parsed::Program(statements)
}

macro_rules! check {
    ($self:expr, $($pattern:tt)+) => {
        matches!($self.peek().kind, $($pattern)+)
    };
}

macro_rules! advance_if {
    ($self:expr, $($pattern:tt)+) => {
        if check!($self, $($pattern)+) {
            $self.advance();
            true
        } else {
            false
        }
    };
}

macro_rules! consume {
    ($self:expr, $pattern:pat, $error:expr) => {
        if matches!($self.peek().kind, $pattern) {
            $self.advance().clone()
        } else {
            return Err($self.error($error));
        }
    };
}

macro_rules! expect {
    ($self:expr, $pattern:pat, $error:expr) => {{
        if !matches!($self.peek().kind, $pattern) {
            return Err($self.error($error));
        }
        $self.advance();
    }};
}

impl<'a> Parser<'a> {
    /// Parses one statement, synchronizing past it on error.
    fn statement(&mut self) -> Option<Stmt> {
        match self.parse_statement() {
            Ok(stmt) => Some(stmt),
            Err(_) => {
                self.synchronize();
                None
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        if advance_if!(self, TokenType::Return) {
            return self.return_statement();
        }
        if check!(self, TokenType::Fn) && matches!(self.peek_next().kind, TokenType::Identifier(_))
        {
            self.advance();
            return self.function_definition();
        }
        if advance_if!(self, TokenType::LeftBrace) {
            return Ok(Stmt::Block(self.block()?));
        }
        if advance_if!(self, TokenType::If) {
            return self.if_statement();
        }
        if advance_if!(self, TokenType::While) {
            return self.while_statement();
        }
        if advance_if!(self, TokenType::For) {
            return self.for_statement();
        }
        if advance_if!(self, TokenType::Break) {
            return self.break_statement();
        }
        if advance_if!(self, TokenType::Continue) {
            return self.continue_statement();
        }
        self.expression_statement()
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let value = if check!(self, TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        expect!(self, TokenType::Semicolon, "Expected a ';' after return value.");
        Ok(Stmt::Return { keyword, value })
    }

    fn function_definition(&mut self) -> Result<Stmt, ParseError> {
        let name = consume!(self, TokenType::Identifier(_), "A function name was expected.");
        expect!(
            self,
            TokenType::LeftParen,
            "Expected a '(' after function name in definition."
        );
        let params = self.parameters("function")?;
        expect!(
            self,
            TokenType::RightParen,
            "Expected a ')' after function parameters."
        );
        expect!(self, TokenType::LeftBrace, "Expected a '{' before function body.");
        let body = self.block()?;
        Ok(Stmt::Function(Rc::new(FunctionDecl {
            name: Some(name),
            params,
            body: RefCell::new(body),
        })))
    }

    fn parameters(&mut self, kind: &str) -> Result<Vec<Token>, ParseError> {
        let mut params: Vec<Token> = Vec::new();
        if !check!(self, TokenType::RightParen) {
            loop {
                if params.len() >= 127 {
                    let line = self.peek().line;
                    self.diagnostics.error(
                        line,
                        &format!("Cannot have more than 127 parameters in a {}.", kind),
                    );
                }
                params.push(consume!(
                    self,
                    TokenType::Identifier(_),
                    "Expected a parameter name after ','."
                ));
                if !advance_if!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        Ok(params)
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements: Vec<Stmt> = Vec::new();
        while !check!(self, TokenType::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.statement() {
                statements.push(stmt);
            }
        }
        expect!(self, TokenType::RightBrace, "Expected a '}' at the end of the block.");
        Ok(statements)
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        expect!(self, TokenType::LeftParen, "Expected a '(' after 'if'.");
        let condition = self.expression()?;
        expect!(self, TokenType::RightParen, "Expected a ')' after if condition.");
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if advance_if!(self, TokenType::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        expect!(self, TokenType::LeftParen, "Expected a '(' after 'while'.");
        let condition = self.expression()?;
        expect!(self, TokenType::RightParen, "Expected a ')' after while condition.");
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        Ok(Stmt::While {
            condition,
            body: Box::new(body?),
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        expect!(self, TokenType::LeftParen, "Expected a '(' after 'for'.");

        let init = if advance_if!(self, TokenType::Semicolon) {
            None
        } else {
            let expr = self.expression()?;
            if matches!(expr, Expr::In { .. }) {
                // Ranged form: the head is the whole clause.
                expect!(
                    self,
                    TokenType::RightParen,
                    "Expected a ')' after the ranged for loop clause."
                );
                self.loop_depth += 1;
                let body = self.parse_statement();
                self.loop_depth -= 1;
                return Ok(Stmt::RangedFor {
                    head: expr,
                    body: Box::new(body?),
                });
            }
            expect!(
                self,
                TokenType::Semicolon,
                "Expected a ';' after for-loop initialization clause."
            );
            Some(expr)
        };

        let condition = if check!(self, TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        expect!(self, TokenType::Semicolon, "Expected a ';' after for-loop condition.");

        let increment = if check!(self, TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        expect!(self, TokenType::RightParen, "Expected a ')' after for-loop clauses.");

        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;

        Ok(Stmt::For {
            init,
            condition,
            increment,
            body: Box::new(body?),
        })
    }

    fn break_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        if self.loop_depth == 0 {
            self.report(&keyword, "Cannot use 'break' outside of a loop.");
        }
        expect!(self, TokenType::Semicolon, "Expected a ';' after 'break'.");
        Ok(Stmt::Break(keyword))
    }

    fn continue_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        if self.loop_depth == 0 {
            self.report(&keyword, "Cannot use 'continue' outside of a loop.");
        }
        expect!(self, TokenType::Semicolon, "Expected a ';' after 'continue'.");
        Ok(Stmt::Continue(keyword))
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        if self.allow_expression && self.is_at_end() {
            self.found_expression = true;
        } else {
            expect!(
                self,
                TokenType::Semicolon,
                "Invalid Syntax. Did you miss a ';' after the expression?"
            );
        }
        Ok(Stmt::Expression(expr))
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.logical_or()?;

        if advance_if!(self, TokenType::Equal | TokenType::TickEqual) {
            let operator = self.previous().clone();
            let value = self.assignment()?;
            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    name,
                    operator,
                    value: Box::new(value),
                    scope: None,
                }),
                Expr::Index {
                    bracket,
                    target,
                    index,
                } => Ok(Expr::IndexAssign {
                    bracket,
                    target,
                    index,
                    operator,
                    value: Box::new(value),
                }),
                other => {
                    self.report(&operator, "Invalid assignment location.");
                    Ok(other)
                }
            };
        }

        if advance_if!(
            self,
            TokenType::PlusEqual | TokenType::MinusEqual | TokenType::StarEqual | TokenType::SlashEqual
        ) {
            let operator = self.previous().clone();
            let value = self.assignment()?;
            // a += e desugars to a `= (a + e), and likewise for the others.
            return match expr {
                Expr::Variable { name, .. } => {
                    let (kind, lexeme) = match operator.kind {
                        TokenType::PlusEqual => (TokenType::Plus, "+"),
                        TokenType::MinusEqual => (TokenType::Minus, "-"),
                        TokenType::StarEqual => (TokenType::Star, "*"),
                        _ => (TokenType::Slash, "/"),
                    };
                    let binary = Expr::Binary {
                        left: Box::new(Expr::Variable {
                            name: name.clone(),
                            scope: None,
                        }),
                        operator: Token::new(kind, lexeme, operator.line),
                        right: Box::new(value),
                    };
                    Ok(Expr::Assign {
                        name,
                        operator: Token::new(TokenType::TickEqual, "`=", operator.line),
                        value: Box::new(binary),
                        scope: None,
                    })
                }
                other => {
                    self.report(&operator, "Invalid assignment location.");
                    Ok(other)
                }
            };
        }

        if advance_if!(self, TokenType::In) {
            let keyword = self.previous().clone();
            let iterable = self.assignment()?;
            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::In {
                    name,
                    keyword,
                    iterable: Box::new(iterable),
                    scope: None,
                }),
                other => {
                    self.report(&keyword, "Missing identifier for iterating variable.");
                    Ok(other)
                }
            };
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.logical_and()?;
        while advance_if!(self, TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.logical_and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;
        while advance_if!(self, TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;
        while advance_if!(self, TokenType::BangEqual | TokenType::EqualEqual) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.range()?;
        while advance_if!(
            self,
            TokenType::Greater | TokenType::GreaterEqual | TokenType::Less | TokenType::LessEqual
        ) {
            let operator = self.previous().clone();
            let right = self.range()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn range(&mut self) -> Result<Expr, ParseError> {
        let expr = self.addition()?;
        if advance_if!(self, TokenType::DotDot) {
            let operator = self.previous().clone();
            let second = self.addition()?;
            if advance_if!(self, TokenType::DotDot) {
                let third = self.addition()?;
                return Ok(Expr::Range {
                    operator,
                    start: Box::new(expr),
                    step: Some(Box::new(second)),
                    end: Box::new(third),
                });
            }
            return Ok(Expr::Range {
                operator,
                start: Box::new(expr),
                step: None,
                end: Box::new(second),
            });
        }
        Ok(expr)
    }

    fn addition(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.product()?;
        while advance_if!(self, TokenType::Plus | TokenType::Minus) {
            let operator = self.previous().clone();
            let right = self.product()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        while advance_if!(self, TokenType::Star | TokenType::Slash) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if advance_if!(self, TokenType::Bang | TokenType::Minus) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.exponent()
    }

    // Right-associative, and binds tighter than unary: -2^2 is -(2^2).
    fn exponent(&mut self) -> Result<Expr, ParseError> {
        let base = self.postfix()?;
        if advance_if!(self, TokenType::Caret) {
            let operator = self.previous().clone();
            let power = self.exponent()?;
            return Ok(Expr::Binary {
                left: Box::new(base),
                operator,
                right: Box::new(power),
            });
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if advance_if!(self, TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if advance_if!(self, TokenType::LeftBracket) {
                let bracket = self.previous().clone();
                let index = if advance_if!(self, TokenType::LeftBracket) {
                    // x[[i, j, ...]] gathers by a list of indices.
                    self.list_literal()?
                } else {
                    self.expression()?
                };
                expect!(self, TokenType::RightBracket, "Expected a ']' after index end.");
                expr = Expr::Index {
                    bracket,
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let mut arguments: Vec<Expr> = Vec::new();
        if !check!(self, TokenType::RightParen) {
            loop {
                if arguments.len() >= 127 {
                    let line = self.peek().line;
                    self.diagnostics
                        .error(line, "Cannot have more than 127 arguments.");
                }
                arguments.push(self.expression()?);
                if !advance_if!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        expect!(
            self,
            TokenType::RightParen,
            "Expected a ')' after function arguments."
        );
        let paren = self.previous().clone();
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if advance_if!(
            self,
            TokenType::True
                | TokenType::False
                | TokenType::Nix
                | TokenType::Number(_)
                | TokenType::Str(_)
        ) {
            return Ok(Expr::Literal(self.previous().clone()));
        }

        if advance_if!(self, TokenType::Identifier(_)) {
            return Ok(Expr::Variable {
                name: self.previous().clone(),
                scope: None,
            });
        }

        if advance_if!(self, TokenType::LeftParen) {
            let expr = self.expression()?;
            expect!(self, TokenType::RightParen, "Expected ')' after expression.");
            return Ok(Expr::Grouping(Box::new(expr)));
        }

        if advance_if!(self, TokenType::Fn) {
            expect!(self, TokenType::LeftParen, "Expected a '(' after fn.");
            let params = self.parameters("lambda")?;
            expect!(
                self,
                TokenType::RightParen,
                "Expected a ')' after lambda parameters."
            );
            expect!(self, TokenType::LeftBrace, "Expected a '{' before lambda body.");
            let body = self.block()?;
            return Ok(Expr::Lambda(Rc::new(FunctionDecl {
                name: None,
                params,
                body: RefCell::new(body),
            })));
        }

        if advance_if!(self, TokenType::LeftBracket) {
            return self.list_literal();
        }

        Err(self.error("Invalid Syntax."))
    }

    fn list_literal(&mut self) -> Result<Expr, ParseError> {
        let bracket = self.previous().clone();
        let mut elements: Vec<Expr> = Vec::new();
        if !check!(self, TokenType::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !advance_if!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        expect!(self, TokenType::RightBracket, "Expected a ']' after list end.");
        Ok(Expr::ListLiteral { bracket, elements })
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if matches!(self.previous().kind, TokenType::Semicolon) {
                return;
            }
            match self.peek().kind {
                TokenType::Class
                | TokenType::If
                | TokenType::While
                | TokenType::For
                | TokenType::Fn
                | TokenType::Return => return,
                _ => (),
            }
            self.advance();
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenType::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> &Token {
        if self.is_at_end() {
            self.peek()
        } else {
            &self.tokens[self.current + 1]
        }
    }

    fn previous(&self) -> &Token {
        &self.tokens[if self.current > 0 { self.current - 1 } else { 0 }]
    }

    fn report(&mut self, token: &Token, message: &str) {
        self.diagnostics.error(token.line, message);
    }

    fn error(&mut self, message: &str) -> ParseError {
        let line = self.peek().line;
        self.diagnostics.error(line, message);
        ParseError {
            message: message.to_string(),
            line,
        }
    }
}

#[cfg(test)]
mod parser_tests {
    use crate::ast::{Expr, Parsed, Stmt};
    use crate::diagnostics::Diagnostics;
    use crate::parser;
    use crate::scanner::Scanner;
    use crate::token::TokenType;

    fn parse(source: &str, allow_expression: bool) -> (Parsed, bool) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::from_string(source).scan_tokens(&mut diagnostics);
        assert!(!diagnostics.had_error(), "scan failed for {:?}", source);
        let parsed = parser::parse(&tokens, allow_expression, &mut diagnostics);
        (parsed, !diagnostics.had_error())
    }

    fn expect_error(source: &str) {
        let (_, success) = parse(source, false);
        assert!(success == false, "expected a parse error for {:?}", source);
    }

    #[test]
    fn statement_list() {
        let (parsed, success) = parse("x = 1; println(x);", false);
        assert!(success);
        match parsed {
            Parsed::Program(stmts) => assert_eq!(stmts.len(), 2),
            _ => panic!("expected a program"),
        }
    }

    #[test]
    fn trailing_expression_in_repl_mode() {
        let (parsed, success) = parse("1 + 2", true);
        assert!(success);
        assert!(matches!(parsed, Parsed::Expression(_)));
    }

    #[test]
    fn trailing_expression_needs_repl_mode() {
        expect_error("1 + 2");
    }

    #[test]
    fn semicolon_terminated_expression_is_a_statement() {
        let (parsed, success) = parse("1 + 2;", true);
        assert!(success);
        assert!(matches!(parsed, Parsed::Program(_)));
    }

    #[test]
    fn compound_assignment_desugars_to_strict_assign() {
        let (parsed, success) = parse("a += 2;", false);
        assert!(success);
        let stmts = match parsed {
            Parsed::Program(stmts) => stmts,
            _ => panic!("expected a program"),
        };
        match &stmts[0] {
            Stmt::Expression(Expr::Assign {
                operator, value, ..
            }) => {
                assert!(matches!(operator.kind, TokenType::TickEqual));
                match value.as_ref() {
                    Expr::Binary { operator, .. } => {
                        assert!(matches!(operator.kind, TokenType::Plus))
                    }
                    other => panic!("expected a binary value, got {:?}", other),
                }
            }
            other => panic!("expected an assignment, got {:?}", other),
        }
    }

    #[test]
    fn ranged_for_head() {
        let (parsed, success) = parse("for (x in 1..3) { println(x); }", false);
        assert!(success);
        let stmts = match parsed {
            Parsed::Program(stmts) => stmts,
            _ => panic!("expected a program"),
        };
        assert!(matches!(&stmts[0], Stmt::RangedFor { head: Expr::In { .. }, .. }));
    }

    #[test]
    fn index_assignment_target() {
        let (parsed, success) = parse("x[1] = 5;", false);
        assert!(success);
        let stmts = match parsed {
            Parsed::Program(stmts) => stmts,
            _ => panic!("expected a program"),
        };
        assert!(matches!(&stmts[0], Stmt::Expression(Expr::IndexAssign { .. })));
    }

    #[test]
    fn invalid_assignment_target() {
        expect_error("1 = 2;");
        expect_error("a + b = 2;");
        expect_error("x[1] += 2;");
    }

    #[test]
    fn break_outside_a_loop() {
        expect_error("break;");
        expect_error("continue;");
    }

    #[test]
    fn missing_semicolon() {
        expect_error("x = 1");
    }

    #[test]
    fn class_is_reserved() {
        expect_error("class Thing {}");
    }

    #[test]
    fn recovery_continues_past_a_bad_statement() {
        let (parsed, success) = parse("x = ; y = 2;", false);
        assert!(!success);
        match parsed {
            Parsed::Program(stmts) => assert_eq!(stmts.len(), 1),
            _ => panic!("expected a program"),
        }
    }
}
