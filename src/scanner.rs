use crate::diagnostics::Diagnostics;
use crate::token::{Token, TokenType};
use std::iter::Peekable;
use std::str::CharIndices;

use phf::phf_map;

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "or" => TokenType::Or,
    "if" => TokenType::If,
    "else" => TokenType::Else,
    "while" => TokenType::While,
    "for" => TokenType::For,
    "break" => TokenType::Break,
    "continue" => TokenType::Continue,
    "fn" => TokenType::Fn,
    "return" => TokenType::Return,
    "in" => TokenType::In,
    "class" => TokenType::Class,
    "true" => TokenType::True,
    "false" => TokenType::False,
    "nix" => TokenType::Nix,
};

pub struct Scanner<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    iter: Peekable<CharIndices<'a>>,
    start: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn from_string(source: &str) -> Scanner {
        Scanner {
            source,
            tokens: Vec::new(),
            iter: source.char_indices().peekable(),
            start: 0,
            line: 1,
        }
    }

    pub fn scan_tokens(mut self, diagnostics: &mut Diagnostics) -> Vec<Token> {
        while let Some((idx, _)) = self.iter.peek() {
            self.start = *idx;
            self.scan_token(diagnostics);
        }
        self.tokens.push(Token::new(TokenType::Eof, "", self.line));
        self.tokens
    }

    fn scan_token(&mut self, diagnostics: &mut Diagnostics) {
        let (_, c) = match self.iter.next() {
            Some(x) => x,
            None => return,
        };
        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            '[' => self.add_token(TokenType::LeftBracket),
            ']' => self.add_token(TokenType::RightBracket),
            ',' => self.add_token(TokenType::Comma),
            ';' => self.add_token(TokenType::Semicolon),
            '^' => self.add_token(TokenType::Caret),
            '+' => {
                let token = if self.next_if('=') { TokenType::PlusEqual } else { TokenType::Plus };
                self.add_token(token)
            }
            '-' => {
                let token = if self.next_if('=') { TokenType::MinusEqual } else { TokenType::Minus };
                self.add_token(token)
            }
            '*' => {
                let token = if self.next_if('=') { TokenType::StarEqual } else { TokenType::Star };
                self.add_token(token)
            }
            '!' => {
                let token = if self.next_if('=') { TokenType::BangEqual } else { TokenType::Bang };
                self.add_token(token)
            }
            '=' => {
                let token = if self.next_if('=') { TokenType::EqualEqual } else { TokenType::Equal };
                self.add_token(token)
            }
            '<' => {
                let token = if self.next_if('=') { TokenType::LessEqual } else { TokenType::Less };
                self.add_token(token)
            }
            '>' => {
                let token = if self.next_if('=') { TokenType::GreaterEqual } else { TokenType::Greater };
                self.add_token(token)
            }
            '`' => {
                // A backtick only occurs as the start of the strict-assign
                // operator.
                if self.next_if('=') {
                    self.add_token(TokenType::TickEqual);
                } else {
                    diagnostics.error(self.line, "Unexpected character: `");
                }
            }
            '/' => {
                if self.next_if('/') {
                    while let Some((_, c)) = self.iter.peek() {
                        if *c == '\n' {
                            break;
                        }
                        self.iter.next();
                    }
                } else if self.next_if('[') {
                    self.block_comment(diagnostics);
                } else if self.next_if('=') {
                    self.add_token(TokenType::SlashEqual);
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            ' ' | '\r' | '\t' => (),
            '\n' => {
                self.line += 1;
            }
            '"' => self.string(diagnostics),
            '0'..='9' => self.number(),
            '.' => {
                if matches!(self.iter.peek(), Some((_, '0'..='9'))) {
                    self.number();
                } else if self.next_if('.') {
                    self.add_token(TokenType::DotDot);
                } else {
                    diagnostics.error(self.line, "Unexpected character: .");
                }
            }
            'a'..='z' | 'A'..='Z' | '_' => self.identifier(),
            _ => {
                diagnostics.error(self.line, &format!("Unexpected character: {}", c));
            }
        }
    }

    fn current(&mut self) -> usize {
        match self.iter.peek() {
            None => self.source.len(),
            Some((idx, _)) => *idx,
        }
    }

    fn add_token(&mut self, kind: TokenType) {
        let current = self.current();
        self.tokens.push(Token {
            kind,
            lexeme: self.source[self.start..current].to_string(),
            line: self.line,
        });
    }

    fn next_if(&mut self, expected: char) -> bool {
        if let Some((_, c)) = self.iter.peek() {
            if *c == expected {
                self.iter.next();
                return true;
            }
        }
        false
    }

    /// Multi-line comments run from `/[` to the first `]/`; nesting is not
    /// supported. Newlines inside still count toward the line number.
    fn block_comment(&mut self, diagnostics: &mut Diagnostics) {
        loop {
            match self.iter.next() {
                None => {
                    diagnostics.warn(self.line, "Unterminated multi-line comment.");
                    return;
                }
                Some((_, '\n')) => {
                    self.line += 1;
                }
                Some((_, ']')) => {
                    if self.next_if('/') {
                        return;
                    }
                }
                Some(_) => (),
            }
        }
    }

    /// The stored literal has the surrounding quotes removed and the escape
    /// sequences `\n`, `\t`, `\"` and `\\` substituted. Anything else after
    /// a backslash is kept verbatim.
    fn string(&mut self, diagnostics: &mut Diagnostics) {
        let mut value = String::new();
        loop {
            match self.iter.next() {
                None => {
                    diagnostics.error(self.line, "Unterminated String. Expected a \".");
                    return;
                }
                Some((_, '"')) => break,
                Some((_, '\n')) => {
                    self.line += 1;
                    value.push('\n');
                }
                Some((_, '\\')) => match self.iter.next() {
                    None => {
                        diagnostics.error(self.line, "Unterminated String. Expected a \".");
                        return;
                    }
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                },
                Some((_, c)) => value.push(c),
            }
        }
        self.tokens.push(Token {
            kind: TokenType::Str(value.clone()),
            lexeme: value,
            line: self.line,
        });
    }

    fn number(&mut self) {
        while matches!(self.iter.peek(), Some((_, '0'..='9'))) {
            self.iter.next();
        }

        // A fractional part needs a digit right after the dot, otherwise the
        // dot belongs to a range operator.
        if matches!(self.iter.peek(), Some((_, '.'))) {
            let mut ahead = self.iter.clone();
            ahead.next();
            if matches!(ahead.peek(), Some((_, '0'..='9'))) {
                self.iter.next();
                while matches!(self.iter.peek(), Some((_, '0'..='9'))) {
                    self.iter.next();
                }
            }
        }

        // Only take the exponent marker when a complete exponent follows, so
        // the collected lexeme always parses.
        if matches!(self.iter.peek(), Some((_, 'e'))) {
            let mut ahead = self.iter.clone();
            ahead.next();
            let exponent_follows = match ahead.peek() {
                Some((_, '0'..='9')) => true,
                Some((_, '+')) | Some((_, '-')) => {
                    ahead.next();
                    matches!(ahead.peek(), Some((_, '0'..='9')))
                }
                _ => false,
            };
            if exponent_follows {
                self.iter.next();
                if matches!(self.iter.peek(), Some((_, '+')) | Some((_, '-'))) {
                    self.iter.next();
                }
                while matches!(self.iter.peek(), Some((_, '0'..='9'))) {
                    self.iter.next();
                }
            }
        }

        let current = self.current();
        let value = self.source[self.start..current]
            .parse()
            .expect("failed to parse number");
        self.add_token(TokenType::Number(value));
    }

    fn identifier(&mut self) {
        while matches!(
            self.iter.peek(),
            Some((_, '0'..='9')) | Some((_, 'a'..='z')) | Some((_, 'A'..='Z')) | Some((_, '_'))
        ) {
            self.iter.next();
        }
        let current = self.current();
        let text = &self.source[self.start..current];
        match KEYWORDS.get(text) {
            Some(kind) => self.add_token(kind.clone()),
            None => self.add_token(TokenType::Identifier(text.to_string())),
        }
    }
}
