use crate::interpreter::RuntimeError;
use crate::resolver::ResolverError;

/// Collects lex, parse, resolve and runtime reports for one session.
/// Every phase that can complain takes this sink explicitly; the flags
/// decide whether later phases run and which exit code a file run gets.
pub struct Diagnostics {
    had_error: bool,
    had_runtime_error: bool,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics {
            had_error: false,
            had_runtime_error: false,
        }
    }

    pub fn error(&mut self, line: usize, message: &str) {
        eprintln!("[line {}] Error: {}", line, message);
        self.had_error = true;
    }

    pub fn error_at(&mut self, line: usize, lexeme: &str, message: &str) {
        eprintln!("[line {}] Error at '{}': {}", line, lexeme, message);
        self.had_error = true;
    }

    pub fn warn(&mut self, line: usize, message: &str) {
        eprintln!("[line {}] Warning: {}", line, message);
    }

    pub fn resolver_error(&mut self, err: &ResolverError) {
        eprintln!("{}", err);
        self.had_error = true;
    }

    pub fn runtime_error(&mut self, err: &RuntimeError) {
        eprintln!("{}", err);
        self.had_runtime_error = true;
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    pub fn reset(&mut self) {
        self.had_error = false;
        self.had_runtime_error = false;
    }
}

impl Default for Diagnostics {
    fn default() -> Diagnostics {
        Diagnostics::new()
    }
}
