use crate::interpreter::RuntimeError;
use crate::token::Token;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

struct Frame {
    slots: BTreeMap<String, Value>,
    parent: Option<Environment>,
}

/// One scope in the lexical chain. Cloning shares the frame, so a closure
/// that holds a clone sees every later mutation of the same scope. Lookups
/// and assignments address exactly one frame; the resolver supplies the
/// ancestor depth.
#[derive(Clone)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                slots: BTreeMap::new(),
                parent: None,
            })),
        }
    }

    pub fn new_child(&self) -> Environment {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                slots: BTreeMap::new(),
                parent: Some(self.clone()),
            })),
        }
    }

    fn ancestor(&self, depth: usize) -> Environment {
        let mut env = self.clone();
        for _ in 0..depth {
            let parent = env.frame.borrow().parent.clone();
            match parent {
                Some(p) => env = p,
                None => break,
            }
        }
        env
    }

    /// Creates or overwrites a binding in this frame.
    pub fn define(&self, name: String, value: Value) {
        self.frame.borrow_mut().slots.insert(name, value);
    }

    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        match self.frame.borrow().slots.get(&name.lexeme) {
            Some(value) => Ok(value.clone()),
            None => Err(RuntimeError::new(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    pub fn get_at(&self, name: &Token, depth: usize) -> Result<Value, RuntimeError> {
        self.ancestor(depth).get(name)
    }

    /// Lazy assignment: the binding is created in this frame if absent.
    pub fn assign(&self, name: &str, value: Value) {
        self.frame.borrow_mut().slots.insert(name.to_string(), value);
    }

    pub fn assign_at(&self, name: &str, value: Value, depth: usize) {
        self.ancestor(depth).assign(name, value);
    }

    /// Strict assignment: the binding must already exist in this frame.
    pub fn strict_assign(&self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        let mut frame = self.frame.borrow_mut();
        if frame.slots.contains_key(&name.lexeme) {
            frame.slots.insert(name.lexeme.clone(), value);
            Ok(())
        } else {
            Err(RuntimeError::new(
                name,
                format!("Cannot strictly assign to undefined variable '{}'.", name.lexeme),
            ))
        }
    }

    pub fn strict_assign_at(
        &self,
        name: &Token,
        value: Value,
        depth: usize,
    ) -> Result<(), RuntimeError> {
        self.ancestor(depth).strict_assign(name, value)
    }
}

impl Default for Environment {
    fn default() -> Environment {
        Environment::new()
    }
}
