use crate::ast::{Expr, Stmt};
use crate::callable::{Callable, NativeFunction, UserFunction};
use crate::environment::Environment;
use crate::token::{Token, TokenType};
use crate::value::{approx_eq, near_integer, stringify, List, Value, ValueKind};
use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

#[derive(Debug)]
pub struct RuntimeError {
    message: String,
    token: Token,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            message: message.into(),
            token: token.clone(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n[line {}]", self.message, self.token.line)
    }
}

impl Error for RuntimeError {}

/// A non-local exit travelling up the evaluator. Loops absorb `Break` and
/// `Continue`, calls absorb `Return`, and `Error` rides all the way out.
/// Every handler restores its environment before passing one of these on.
#[derive(Debug)]
pub enum Unwind {
    Break,
    Continue,
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Unwind {
        Unwind::Error(err)
    }
}

/// Validated 1-based indices into a list.
enum Indices {
    One(usize),
    Many(Vec<usize>),
}

pub struct Interpreter {
    globals: Environment,
    environment: Environment,
    out: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(out: Box<dyn Write>) -> Interpreter {
        let globals = Environment::new();
        for native in NATIVES {
            globals.define(
                native.name.to_string(),
                Value::Callable(Callable::Native(*native)),
            );
        }
        Interpreter {
            environment: globals.clone(),
            globals,
            out,
        }
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => (),
                Err(Unwind::Error(err)) => return Err(err),
                // Break, continue and return cannot escape their frames;
                // the parser and resolver reject the programs that would
                // let them.
                Err(_) => return Ok(()),
            }
        }
        Ok(())
    }

    /// Evaluates a single REPL expression and renders its value with
    /// strings quoted. A call that came back as `nix` echoes nothing, so
    /// printing at the prompt does not also echo.
    pub fn interpret_expression(&mut self, expr: &Expr) -> Result<Option<String>, RuntimeError> {
        match self.evaluate(expr) {
            Ok(value) => {
                if matches!(expr, Expr::Call { .. }) && matches!(value, Value::Nil) {
                    Ok(None)
                } else {
                    Ok(Some(stringify(&value, true)))
                }
            }
            Err(Unwind::Error(err)) => Err(err),
            Err(_) => Ok(None),
        }
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<(), Unwind> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(())
            }
            Stmt::Block(stmts) => self.execute_block(stmts, self.environment.new_child()),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body) {
                        Ok(()) | Err(Unwind::Continue) => (),
                        Err(Unwind::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::For {
                init,
                condition,
                increment,
                body,
            } => {
                let child = self.environment.new_child();
                let parent = std::mem::replace(&mut self.environment, child);
                let result = self.run_for(init, condition, increment, body);
                self.environment = parent;
                result
            }
            Stmt::RangedFor { head, body } => {
                let child = self.environment.new_child();
                let parent = std::mem::replace(&mut self.environment, child);
                let result = self.run_ranged_for(head, body);
                self.environment = parent;
                result
            }
            Stmt::Break(_) => Err(Unwind::Break),
            Stmt::Continue(_) => Err(Unwind::Continue),
            Stmt::Function(decl) => {
                let function = Value::Callable(Callable::Function(Rc::new(UserFunction {
                    declaration: decl.clone(),
                    closure: self.environment.clone(),
                })));
                if let Some(name) = &decl.name {
                    self.environment.assign(&name.lexeme, function);
                }
                Ok(())
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Err(Unwind::Return(value))
            }
        }
    }

    /// The loop head and body share the environment the caller installed;
    /// a block body does not open a scope of its own.
    fn run_for(
        &mut self,
        init: &Option<Expr>,
        condition: &Option<Expr>,
        increment: &Option<Expr>,
        body: &Stmt,
    ) -> Result<(), Unwind> {
        if let Some(init) = init {
            self.evaluate(init)?;
        }
        loop {
            let keep_going = match condition {
                Some(condition) => self.evaluate(condition)?.is_truthy(),
                None => true,
            };
            if !keep_going {
                break;
            }
            match self.execute_loop_body(body) {
                Ok(()) | Err(Unwind::Continue) => (),
                Err(Unwind::Break) => break,
                Err(other) => return Err(other),
            }
            if let Some(increment) = increment {
                self.evaluate(increment)?;
            }
        }
        Ok(())
    }

    fn run_ranged_for(&mut self, head: &Expr, body: &Stmt) -> Result<(), Unwind> {
        let (name, depth) = match head {
            Expr::In { name, scope, .. } => (name, scope.unwrap_or(0)),
            // The parser only builds ranged loops around in-expressions.
            other => {
                self.evaluate(other)?;
                return Ok(());
            }
        };
        let iterable = match self.evaluate(head)? {
            Value::List(list) => list,
            _ => return Ok(()),
        };
        self.environment.define(name.lexeme.clone(), Value::Nil);

        let mut position = 0;
        loop {
            let element = {
                let list = iterable.borrow();
                match list.elements.get(position) {
                    Some(element) => element.clone(),
                    None => break,
                }
            };
            self.environment
                .strict_assign_at(name, element, depth)
                .map_err(Unwind::from)?;
            match self.execute_loop_body(body) {
                Ok(()) | Err(Unwind::Continue) => (),
                Err(Unwind::Break) => break,
                Err(other) => return Err(other),
            }
            position += 1;
        }
        Ok(())
    }

    fn execute_loop_body(&mut self, body: &Stmt) -> Result<(), Unwind> {
        match body {
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.execute(stmt)?;
                }
                Ok(())
            }
            other => self.execute(other),
        }
    }

    pub fn execute_block(&mut self, stmts: &[Stmt], env: Environment) -> Result<(), Unwind> {
        let parent = std::mem::replace(&mut self.environment, env);
        let mut result = Ok(());
        for stmt in stmts {
            result = self.execute(stmt);
            if result.is_err() {
                break;
            }
        }
        self.environment = parent;
        result
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, Unwind> {
        match expr {
            Expr::Literal(token) => Ok(match &token.kind {
                TokenType::Number(n) => Value::Number(*n),
                TokenType::Str(s) => Value::Str(s.clone()),
                TokenType::True => Value::Boolean(true),
                TokenType::False => Value::Boolean(false),
                _ => Value::Nil,
            }),
            Expr::Grouping(inner) => self.evaluate(inner),
            Expr::Unary { operator, right } => {
                let value = self.evaluate(right)?;
                match operator.kind {
                    TokenType::Minus => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(RuntimeError::new(operator, "Operand must be a number.").into()),
                    },
                    _ => Ok(Value::Boolean(!value.is_truthy())),
                }
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary(left, operator, right).map_err(Unwind::from)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?.is_truthy();
                if matches!(operator.kind, TokenType::Or) {
                    if left {
                        Ok(Value::Boolean(true))
                    } else {
                        Ok(Value::Boolean(self.evaluate(right)?.is_truthy()))
                    }
                } else if !left {
                    Ok(Value::Boolean(false))
                } else {
                    Ok(Value::Boolean(self.evaluate(right)?.is_truthy()))
                }
            }
            Expr::Variable { name, scope } => match scope {
                Some(depth) => self.environment.get_at(name, *depth).map_err(Unwind::from),
                None => self.globals.get(name).map_err(Unwind::from),
            },
            Expr::Assign {
                name,
                operator,
                value,
                scope,
            } => {
                let value = self.evaluate(value)?;
                let strict = matches!(operator.kind, TokenType::TickEqual);
                match scope {
                    Some(depth) => {
                        if strict {
                            self.environment
                                .strict_assign_at(name, value.clone(), *depth)
                                .map_err(Unwind::from)?;
                        } else {
                            self.environment.assign_at(&name.lexeme, value.clone(), *depth);
                        }
                    }
                    None => {
                        if strict {
                            self.globals
                                .strict_assign(name, value.clone())
                                .map_err(Unwind::from)?;
                        } else {
                            self.globals.assign(&name.lexeme, value.clone());
                        }
                    }
                }
                Ok(value)
            }
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;
                let mut args: Vec<Value> = Vec::new();
                for argument in arguments {
                    args.push(self.evaluate(argument)?);
                }
                let callable = match callee {
                    Value::Callable(c) => c,
                    _ => {
                        return Err(
                            RuntimeError::new(paren, "Provided object is not callable.").into()
                        )
                    }
                };
                if callable.arity() != args.len() {
                    return Err(RuntimeError::new(
                        paren,
                        format!(
                            "Expected {} argument(s) but got {} argument(s).",
                            callable.arity(),
                            args.len()
                        ),
                    )
                    .into());
                }
                callable.call(self, args)
            }
            Expr::Lambda(decl) => Ok(Value::Callable(Callable::Function(Rc::new(UserFunction {
                declaration: decl.clone(),
                closure: self.environment.clone(),
            })))),
            Expr::ListLiteral { bracket, elements } => {
                let mut values: Vec<Value> = Vec::new();
                let mut tag: Option<ValueKind> = None;
                for element in elements {
                    let value = self.evaluate(element)?;
                    match tag {
                        None => tag = Some(value.kind()),
                        Some(tag) if tag != value.kind() => {
                            return Err(RuntimeError::new(
                                bracket,
                                "Lists are homogenous and can't contain different types.",
                            )
                            .into())
                        }
                        Some(_) => (),
                    }
                    values.push(value);
                }
                Ok(Value::list(List::new(values, tag)))
            }
            Expr::Index {
                bracket,
                target,
                index,
            } => {
                let target = self.evaluate(target)?;
                let list = match target {
                    Value::List(list) => list,
                    _ => {
                        return Err(RuntimeError::new(
                            bracket,
                            "The index operator can only be used on lists.",
                        )
                        .into())
                    }
                };
                let index = self.evaluate(index)?;
                let result = match check_indices(list.borrow().len(), &index, bracket)? {
                    Indices::One(i) => Ok(list.borrow().elements[i - 1].clone()),
                    Indices::Many(indices) => {
                        let source = list.borrow();
                        let gathered: Vec<Value> = indices
                            .iter()
                            .map(|i| source.elements[i - 1].clone())
                            .collect();
                        Ok(Value::list(List::new(gathered, source.tag)))
                    }
                };
                result
            }
            Expr::IndexAssign {
                bracket,
                target,
                index,
                operator,
                value,
            } => {
                let target = self.evaluate(target)?;
                let list = match target {
                    Value::List(list) => list,
                    _ => {
                        return Err(RuntimeError::new(
                            bracket,
                            "The index operator can only be used on lists.",
                        )
                        .into())
                    }
                };
                let index = self.evaluate(index)?;
                let indices = check_indices(list.borrow().len(), &index, bracket)?;
                let value = self.evaluate(value)?;
                match indices {
                    Indices::Many(indices) => {
                        // Copy the value list out first; it may alias the
                        // target.
                        let (value_tag, value_elements) = match &value {
                            Value::List(values) => {
                                let values = values.borrow();
                                (values.tag, values.elements.clone())
                            }
                            _ => {
                                return Err(
                                    RuntimeError::new(operator, "The value must be a list.").into()
                                )
                            }
                        };
                        if indices.len() != value_elements.len() {
                            return Err(RuntimeError::new(
                                operator,
                                "The value list's length must be equal to the number of indices accessed.",
                            )
                            .into());
                        }
                        let mut list = list.borrow_mut();
                        if !indices.is_empty() && value_tag != list.tag {
                            return Err(RuntimeError::new(
                                operator,
                                "Type mismatch for list assignment.",
                            )
                            .into());
                        }
                        for (i, element) in indices.iter().zip(value_elements) {
                            list.elements[i - 1] = element;
                        }
                    }
                    Indices::One(i) => {
                        let mut list = list.borrow_mut();
                        if Some(value.kind()) != list.tag {
                            return Err(RuntimeError::new(
                                bracket,
                                "Type mismatch for list assignment.",
                            )
                            .into());
                        }
                        list.elements[i - 1] = value.clone();
                    }
                }
                Ok(value)
            }
            Expr::Range {
                operator,
                start,
                step,
                end,
            } => {
                let start = self.range_bound(start, operator)?;
                let step = match step {
                    Some(step) => {
                        let step = self.range_bound(step, operator)?;
                        if approx_eq(step, 0.0) {
                            return Err(
                                RuntimeError::new(operator, "Range step cannot be 0.").into()
                            );
                        }
                        step
                    }
                    None => 1.0,
                };
                let end = self.range_bound(end, operator)?;

                let mut values: Vec<Value> = Vec::new();
                let mut current = start;
                while current <= end {
                    values.push(Value::Number(current));
                    current += step;
                }
                Ok(Value::list(List::new(values, Some(ValueKind::Number))))
            }
            Expr::In {
                keyword, iterable, ..
            } => {
                let value = self.evaluate(iterable)?;
                if !matches!(value, Value::List(_)) {
                    return Err(RuntimeError::new(
                        keyword,
                        "The specified object for the in-expression isn't an iterable.",
                    )
                    .into());
                }
                Ok(value)
            }
        }
    }

    fn range_bound(&mut self, expr: &Expr, operator: &Token) -> Result<f64, Unwind> {
        match self.evaluate(expr)? {
            Value::Number(n) => Ok(n),
            _ => Err(RuntimeError::new(operator, "Ranges can only contain numeric descriptors.").into()),
        }
    }

    fn binary(&mut self, left: Value, operator: &Token, right: Value) -> Result<Value, RuntimeError> {
        match operator.kind {
            TokenType::Plus => match (&left, &right) {
                (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                (Value::Str(l), Value::Str(r)) => {
                    let mut joined = l.clone();
                    joined.push_str(r);
                    Ok(Value::Str(joined))
                }
                _ => Err(RuntimeError::new(
                    operator,
                    "Both of the operands must be numbers or strings.",
                )),
            },
            TokenType::EqualEqual => Ok(Value::Boolean(left.equals(&right))),
            TokenType::BangEqual => Ok(Value::Boolean(!left.equals(&right))),
            _ => {
                let (l, r) = match (&left, &right) {
                    (Value::Number(l), Value::Number(r)) => (*l, *r),
                    _ => return Err(RuntimeError::new(operator, "Operands must be numbers.")),
                };
                match operator.kind {
                    TokenType::Minus => Ok(Value::Number(l - r)),
                    TokenType::Star => Ok(Value::Number(l * r)),
                    TokenType::Slash => {
                        if approx_eq(r, 0.0) {
                            Err(RuntimeError::new(operator, "Cannot divide by 0!"))
                        } else {
                            Ok(Value::Number(l / r))
                        }
                    }
                    TokenType::Caret => Ok(Value::Number(l.powf(r))),
                    // Comparisons defer to the epsilon: values within it
                    // are neither greater nor less.
                    TokenType::Greater => Ok(Value::Boolean(!approx_eq(l, r) && l > r)),
                    TokenType::GreaterEqual => Ok(Value::Boolean(approx_eq(l, r) || l > r)),
                    TokenType::Less => Ok(Value::Boolean(!approx_eq(l, r) && l < r)),
                    TokenType::LessEqual => Ok(Value::Boolean(approx_eq(l, r) || l < r)),
                    _ => Ok(Value::Nil),
                }
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Interpreter {
        Interpreter::new()
    }
}

fn check_index_number(n: f64, len: usize, bracket: &Token) -> Result<usize, RuntimeError> {
    let index = match near_integer(n) {
        Some(i) => i,
        None => {
            return Err(RuntimeError::new(
                bracket,
                "Indices must be positive, non-zero integers.",
            ))
        }
    };
    if index <= 0 {
        return Err(RuntimeError::new(bracket, "Indices can't be negative or zero."));
    }
    if index as usize > len {
        return Err(RuntimeError::new(
            bracket,
            "One or more of the indices is greater than the length of the list.",
        ));
    }
    Ok(index as usize)
}

/// Indices are 1-based and must be integers (within epsilon) no larger
/// than the list's length. A list index must itself be a numeric list.
fn check_indices(len: usize, index: &Value, bracket: &Token) -> Result<Indices, RuntimeError> {
    match index {
        Value::List(indices) => {
            let indices = indices.borrow();
            match indices.tag {
                None => Ok(Indices::Many(Vec::new())),
                Some(ValueKind::Number) => {
                    let mut checked: Vec<usize> = Vec::new();
                    for element in &indices.elements {
                        match element {
                            Value::Number(n) => checked.push(check_index_number(*n, len, bracket)?),
                            _ => {
                                return Err(RuntimeError::new(
                                    bracket,
                                    "The indexing list must contain numbers.",
                                ))
                            }
                        }
                    }
                    Ok(Indices::Many(checked))
                }
                Some(_) => Err(RuntimeError::new(
                    bracket,
                    "The indexing list must contain numbers.",
                )),
            }
        }
        Value::Number(n) => Ok(Indices::One(check_index_number(*n, len, bracket)?)),
        _ => Err(RuntimeError::new(bracket, "The index must be a list or a number.")),
    }
}

fn native_read(_interpreter: &mut Interpreter, _args: &[Value]) -> Value {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return Value::Str(String::new());
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Value::Str(line)
}

fn native_print(interpreter: &mut Interpreter, args: &[Value]) -> Value {
    let _ = write!(interpreter.out, "{}", stringify(&args[0], false));
    let _ = interpreter.out.flush();
    Value::Nil
}

fn native_println(interpreter: &mut Interpreter, args: &[Value]) -> Value {
    let _ = writeln!(interpreter.out, "{}", stringify(&args[0], false));
    let _ = interpreter.out.flush();
    Value::Nil
}

fn native_copy(_interpreter: &mut Interpreter, args: &[Value]) -> Value {
    args[0].deep_copy()
}

static NATIVES: &[NativeFunction] = &[
    NativeFunction {
        name: "read",
        arity: 0,
        func: native_read,
    },
    NativeFunction {
        name: "print",
        arity: 1,
        func: native_print,
    },
    NativeFunction {
        name: "println",
        arity: 1,
        func: native_println,
    },
    NativeFunction {
        name: "copy",
        arity: 1,
        func: native_copy,
    },
];

#[cfg(test)]
mod interpreter_tests {
    use crate::ast::Parsed;
    use crate::diagnostics::Diagnostics;
    use crate::interpreter::Interpreter;
    use crate::parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(source: &str) -> (String, Option<String>) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::from_string(source).scan_tokens(&mut diagnostics);
        assert!(!diagnostics.had_error(), "scan failed for {:?}", source);
        let parsed = parser::parse(&tokens, false, &mut diagnostics);
        assert!(!diagnostics.had_error(), "parse failed for {:?}", source);
        let mut statements = match parsed {
            Parsed::Program(stmts) => stmts,
            _ => panic!("expected a program"),
        };
        let resolved = Resolver::new().resolve(&mut statements);
        assert!(resolved.is_ok(), "resolve failed: {}", resolved.err().unwrap());

        let buffer = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::with_output(Box::new(SharedBuffer(buffer.clone())));
        let result = interpreter.interpret(&statements);
        let output = String::from_utf8(buffer.borrow().clone()).expect("output was not UTF-8");
        (output, result.err().map(|e| e.message().to_string()))
    }

    fn expect_output(source: &str, expected: &str) {
        let (output, error) = run(source);
        assert_eq!(error, None, "unexpected runtime error for {:?}", source);
        assert_eq!(output, expected);
    }

    fn expect_runtime_error(source: &str, expected: &str) {
        let (_, error) = run(source);
        assert_eq!(error.as_deref(), Some(expected), "for {:?}", source);
    }

    #[test]
    fn arithmetic() {
        expect_output("println(1 + 2);", "3\n");
        expect_output("println(10 / 4);", "2.5\n");
        expect_output("println(2 ^ 10);", "1024\n");
        expect_output("println(7 - 2 * 3);", "1\n");
    }

    #[test]
    fn exponent_is_right_associative_and_tighter_than_unary() {
        expect_output("println(2 ^ 3 ^ 2);", "512\n");
        expect_output("println(-2 ^ 2);", "-4\n");
    }

    #[test]
    fn string_concatenation() {
        expect_output("println(\"foo\" + \"bar\");", "foobar\n");
    }

    #[test]
    fn print_has_no_newline() {
        expect_output("print(1); print(2);", "12");
    }

    #[test]
    fn function_call() {
        expect_output("fn add(a, b) { return a + b; } println(add(2, 3));", "5\n");
    }

    #[test]
    fn falling_off_a_function_yields_nix() {
        expect_output("fn noop() { 1 + 1; } println(noop());", "nix\n");
        expect_output("fn bare() { return; } println(bare());", "nix\n");
    }

    #[test]
    fn early_return_out_of_a_branch() {
        expect_output(
            "fn f() { if (true) { return 7; } return 0; } println(f());",
            "7\n",
        );
    }

    #[test]
    fn recursion() {
        expect_output(
            "fn fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); } println(fact(5));",
            "120\n",
        );
    }

    #[test]
    fn lambda_values() {
        expect_output("double = fn(a) { return a * 2; }; println(double(4));", "8\n");
        expect_output("f = fn() { return 1; }; println(f);", "<lambda>\n");
        expect_output("fn named() { return 1; } println(named);", "<fn named>\n");
        expect_output("println(println);", "<native println>\n");
    }

    #[test]
    fn closures_capture_their_scope() {
        expect_output(
            "fn mk() { c = 0; fn inc() { c `= c + 1; return c; } return inc; } \
             f = mk(); println(f()); println(f());",
            "1\n2\n",
        );
    }

    #[test]
    fn strict_assign_reaches_the_global() {
        expect_output(
            "x = 0; fn bump() { x `= x + 1; return x; } println(bump()); println(bump());",
            "1\n2\n",
        );
    }

    #[test]
    fn lazy_assign_in_a_function_creates_a_local() {
        expect_output("x = 0; fn f() { x = 5; } f(); println(x);", "0\n");
        expect_output("x = 0; fn f() { x `= 5; } f(); println(x);", "5\n");
    }

    #[test]
    fn strict_assign_to_undefined_is_an_error() {
        expect_runtime_error(
            "y `= 1;",
            "Cannot strictly assign to undefined variable 'y'.",
        );
    }

    #[test]
    fn compound_assignment() {
        expect_output("x = 10; x += 5; x -= 1; x *= 2; x /= 4; println(x);", "7\n");
    }

    #[test]
    fn read_of_an_undefined_variable() {
        expect_runtime_error("println(missing);", "Undefined variable 'missing'.");
    }

    #[test]
    fn truthiness_and_logic_normalize_to_booleans() {
        expect_output("println(1 and 2);", "true\n");
        expect_output("println(nix or false);", "false\n");
        expect_output("println(0 or \"\");", "true\n");
        expect_output("println(!0);", "true\n");
    }

    #[test]
    fn logic_short_circuits() {
        expect_output("fn boom() { return 1 / 0; } println(true or boom());", "true\n");
        expect_output("fn boom() { return 1 / 0; } println(false and boom());", "false\n");
    }

    #[test]
    fn epsilon_equality() {
        expect_output("println(0.1 + 0.2 == 0.3);", "true\n");
        expect_output("println(1 != 1.0000000001);", "true\n");
        expect_output("println(1 < 1 + 1e-13);", "false\n");
        expect_output("println(1 <= 1 + 1e-13);", "true\n");
    }

    #[test]
    fn division_by_zero() {
        expect_runtime_error("println(1 / 0);", "Cannot divide by 0!");
        expect_runtime_error("println(1 / 1e-13);", "Cannot divide by 0!");
    }

    #[test]
    fn type_errors_in_operators() {
        expect_runtime_error(
            "println([1, 2] + [3]);",
            "Both of the operands must be numbers or strings.",
        );
        expect_runtime_error("println(\"a\" - 1);", "Operands must be numbers.");
        expect_runtime_error("println(-\"a\");", "Operand must be a number.");
    }

    #[test]
    fn while_loop() {
        expect_output(
            "a = 0; b = 1; while (a < 10000) { t = a; a `= b; b `= t + b; } println(a);",
            "10946\n",
        );
    }

    #[test]
    fn for_loop() {
        expect_output(
            "total = 1; for (i = 1; i <= 6; i += 1) { total `= total * i; } println(total);",
            "720\n",
        );
    }

    #[test]
    fn for_loop_locals_stay_in_the_head_scope() {
        expect_output(
            "i = 99; for (i = 0; i < 3; i += 1) {} println(i);",
            "99\n",
        );
    }

    #[test]
    fn break_and_continue() {
        expect_output(
            "for (i = 0; i < 10; i += 1) { if (i == 3) { break; } print(i); }",
            "012",
        );
        expect_output(
            "for (i = 0; i < 5; i += 1) { if (i == 2) { continue; } print(i); }",
            "0134",
        );
        expect_output(
            "i = 0; while (true) { i `= i + 1; if (i > 2) { break; } print(i); }",
            "12",
        );
    }

    #[test]
    fn ranged_for() {
        expect_output("for (x in [10, 20, 30]) { println(x); }", "10\n20\n30\n");
        expect_output("for (x in 1..3) { print(x); }", "123");
        expect_output(
            "for (x in [1, 2, 3, 4]) { if (x == 3) { break; } print(x); }",
            "12",
        );
    }

    #[test]
    fn ranged_for_needs_a_list() {
        expect_runtime_error(
            "for (x in 5) { println(x); }",
            "The specified object for the in-expression isn't an iterable.",
        );
    }

    #[test]
    fn ranges() {
        expect_output("println(1..5);", "[1, 2, 3, 4, 5]\n");
        expect_output("println(1..2..9);", "[1, 3, 5, 7, 9]\n");
        expect_output("println(1..2..10);", "[1, 3, 5, 7, 9]\n");
        expect_output("println(0..0.5..2);", "[0, 0.5, 1, 1.5, 2]\n");
        // The walk adds the step and tests against the upper bound, so a
        // negative step with start above end produces nothing.
        expect_output("println(5..-1..1);", "[]\n");
    }

    #[test]
    fn range_errors() {
        expect_runtime_error("println(1..0..5);", "Range step cannot be 0.");
        expect_runtime_error(
            "println(\"a\"..5);",
            "Ranges can only contain numeric descriptors.",
        );
    }

    #[test]
    fn list_literals_are_homogenous() {
        expect_output("println([1, 2, 3]);", "[1, 2, 3]\n");
        expect_output("println([]);", "[]\n");
        expect_runtime_error(
            "println([1, \"two\"]);",
            "Lists are homogenous and can't contain different types.",
        );
    }

    #[test]
    fn scalar_indexing_is_one_based() {
        expect_output("x = [10, 20, 30]; println(x[1]); println(x[3]);", "10\n30\n");
    }

    #[test]
    fn index_errors() {
        expect_runtime_error("x = [1, 2]; println(x[0]);", "Indices can't be negative or zero.");
        expect_runtime_error(
            "x = [1, 2]; println(x[3]);",
            "One or more of the indices is greater than the length of the list.",
        );
        expect_runtime_error(
            "x = [1, 2]; println(x[1.5]);",
            "Indices must be positive, non-zero integers.",
        );
        expect_runtime_error(
            "x = [1, 2]; println(x[\"1\"]);",
            "The index must be a list or a number.",
        );
        expect_runtime_error(
            "x = [1, 2]; println(x[[\"1\"]]);",
            "The indexing list must contain numbers.",
        );
        expect_runtime_error("println(5[1]);", "The index operator can only be used on lists.");
    }

    #[test]
    fn gather_by_an_index_list() {
        expect_output("x = [10, 20, 30]; println(x[[3, 1]]);", "[30, 10]\n");
        expect_output("x = [10, 20, 30]; println(x[2..3]);", "[20, 30]\n");
        expect_output("x = [10, 20, 30]; println(x[[]]);", "[]\n");
    }

    #[test]
    fn scatter_by_an_index_list() {
        expect_output(
            "x = [1, 2, 3]; x[[2, 3]] `= [20, 30]; println(x);",
            "[1, 20, 30]\n",
        );
    }

    #[test]
    fn scalar_index_assignment() {
        expect_output("x = [1, 2, 3]; x[2] = 9; println(x);", "[1, 9, 3]\n");
        expect_runtime_error(
            "x = [1, 2, 3]; x[2] = \"nine\";",
            "Type mismatch for list assignment.",
        );
    }

    #[test]
    fn scatter_errors() {
        expect_runtime_error(
            "x = [1, 2, 3]; x[[1, 2]] `= [9];",
            "The value list's length must be equal to the number of indices accessed.",
        );
        expect_runtime_error(
            "x = [1, 2, 3]; x[[1, 2]] `= 9;",
            "The value must be a list.",
        );
        expect_runtime_error(
            "x = [1, 2, 3]; x[[1, 2]] `= [\"a\", \"b\"];",
            "Type mismatch for list assignment.",
        );
    }

    #[test]
    fn lists_share_and_copy_unshares() {
        expect_output(
            "x = [1, 2, 3]; y = x; y[1] = 9; println(x);",
            "[9, 2, 3]\n",
        );
        expect_output(
            "x = [1, 2, 3]; y = copy(x); y[1] = 9; println(x); println(y);",
            "[1, 2, 3]\n[9, 2, 3]\n",
        );
    }

    #[test]
    fn list_arguments_share_their_storage() {
        expect_output(
            "fn first_to_zero(l) { l[1] = 0; } x = [5, 6]; first_to_zero(x); println(x);",
            "[0, 6]\n",
        );
    }

    #[test]
    fn list_equality_is_structural() {
        expect_output("println([1, 2] == [1, 2]);", "true\n");
        expect_output("println([1, 2] == [1, 3]);", "false\n");
        expect_output("println([] == []);", "true\n");
        expect_output("println([1] != [1, 2]);", "true\n");
    }

    #[test]
    fn call_errors() {
        expect_runtime_error("x = 5; x();", "Provided object is not callable.");
        expect_runtime_error(
            "fn f(a) { return a; } f(1, 2);",
            "Expected 1 argument(s) but got 2 argument(s).",
        );
        expect_runtime_error(
            "println();",
            "Expected 1 argument(s) but got 0 argument(s).",
        );
    }

    #[test]
    fn assignment_is_an_expression() {
        expect_output("x = 0; y = (x = 5); println(y);", "5\n");
    }

    #[test]
    fn long_list_output_is_elided() {
        expect_output(
            "println(1..60);",
            "[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, ..., 51, 52, 53, 54, 55, 56, 57, 58, 59, 60]\n",
        );
    }

    #[test]
    fn runtime_error_aborts_the_run() {
        expect_runtime_error("println(1); x = 1 / 0; println(2);", "Cannot divide by 0!");
        let (output, _) = run("println(1); x = 1 / 0; println(2);");
        assert_eq!(output, "1\n");
    }
}
