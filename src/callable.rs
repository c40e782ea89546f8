use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::interpreter::{Interpreter, Unwind};
use crate::value::Value;
use std::fmt;
use std::fmt::Debug;
use std::rc::Rc;

/// A user-defined function or lambda, closed over the environment that was
/// current when its definition was evaluated.
pub struct UserFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Environment,
}

impl UserFunction {
    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, Unwind> {
        let environment = self.closure.new_child();
        for (param, arg) in self.declaration.params.iter().zip(args) {
            environment.define(param.lexeme.clone(), arg);
        }
        let body = self.declaration.body.borrow();
        match interpreter.execute_block(&body, environment) {
            Err(Unwind::Return(value)) => Ok(value),
            Err(other) => Err(other),
            Ok(()) => Ok(Value::Nil),
        }
    }

    fn info(&self) -> String {
        match &self.declaration.name {
            Some(name) => format!("<fn {}>", name.lexeme),
            None => "<lambda>".to_string(),
        }
    }
}

impl Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info())
    }
}

/// A host-provided built-in bound in the root environment at startup.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&mut Interpreter, &[Value]) -> Value,
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Callable {
    Function(Rc<UserFunction>),
    Native(NativeFunction),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Function(f) => f.declaration.params.len(),
            Callable::Native(n) => n.arity,
        }
    }

    pub fn info(&self) -> String {
        match self {
            Callable::Function(f) => f.info(),
            Callable::Native(n) => format!("<native {}>", n.name),
        }
    }

    /// Arity has already been checked by the call site.
    pub fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, Unwind> {
        match self {
            Callable::Function(f) => f.call(interpreter, args),
            Callable::Native(n) => Ok((n.func)(interpreter, &args)),
        }
    }

    pub fn equals(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Function(l), Callable::Function(r)) => Rc::ptr_eq(l, r),
            (Callable::Native(l), Callable::Native(r)) => l.name == r.name && l.func == r.func,
            _ => false,
        }
    }
}
