use crate::ast::Parsed;
use crate::diagnostics::Diagnostics;
use crate::interpreter::Interpreter;
use crate::parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use std::fs;
use std::io::{self, Write};

/// Owns one interpreter and its diagnostic sink. A script runs through it
/// once; a REPL feeds it entry after entry, so globals persist between
/// prompts.
pub struct Session {
    interpreter: Interpreter,
    diagnostics: Diagnostics,
}

impl Session {
    pub fn new() -> Session {
        Session {
            interpreter: Interpreter::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_output(out: Box<dyn Write>) -> Session {
        Session {
            interpreter: Interpreter::with_output(out),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Lex, parse, resolve and interpret, skipping later phases once an
    /// earlier one reported. With `allow_expression` set and a buffer that
    /// is a single trailing expression, the expression's rendered value is
    /// returned for the REPL to echo.
    pub fn run(&mut self, source: &str, allow_expression: bool) -> Option<String> {
        let tokens = Scanner::from_string(source).scan_tokens(&mut self.diagnostics);
        if self.diagnostics.had_error() {
            return None;
        }

        let parsed = parser::parse(&tokens, allow_expression, &mut self.diagnostics);
        if self.diagnostics.had_error() {
            return None;
        }

        match parsed {
            Parsed::Program(mut statements) => {
                if let Err(err) = Resolver::new().resolve(&mut statements) {
                    self.diagnostics.resolver_error(&err);
                    return None;
                }
                if let Err(err) = self.interpreter.interpret(&statements) {
                    self.diagnostics.runtime_error(&err);
                }
                None
            }
            Parsed::Expression(mut expr) => {
                if let Err(err) = Resolver::new().resolve_expression(&mut expr) {
                    self.diagnostics.resolver_error(&err);
                    return None;
                }
                match self.interpreter.interpret_expression(&expr) {
                    Ok(echo) => echo,
                    Err(err) => {
                        self.diagnostics.runtime_error(&err);
                        None
                    }
                }
            }
        }
    }

    /// Runs a script file and reports the exit code the process should end
    /// with: 65 for lex/parse/resolve errors, 70 for runtime errors, 0
    /// otherwise.
    pub fn run_file(&mut self, path: &str) -> io::Result<i32> {
        let source = fs::read_to_string(path)?;
        self.run(&source, false);
        if self.diagnostics.had_error() {
            Ok(65)
        } else if self.diagnostics.had_runtime_error() {
            Ok(70)
        } else {
            Ok(0)
        }
    }

    pub fn had_error(&self) -> bool {
        self.diagnostics.had_error()
    }

    pub fn had_runtime_error(&self) -> bool {
        self.diagnostics.had_runtime_error()
    }

    /// Clears the error flags between REPL entries; the environment keeps
    /// its bindings.
    pub fn reset(&mut self) {
        self.diagnostics.reset();
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}
