use crate::callable::Callable;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use strum_macros::Display;

/// Numeric comparisons are blurred by this amount, and a number counts as
/// an integer when it is within it of the nearest whole number.
pub const EPSILON: f64 = 1e-12;

pub fn approx_eq(left: f64, right: f64) -> bool {
    (left - right).abs() < EPSILON
}

/// `Some(n)` when `x` is within epsilon of the integer `n`.
pub fn near_integer(x: f64) -> Option<i64> {
    let rounded = x.round();
    if (x - rounded).abs() < EPSILON {
        Some(rounded as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ValueKind {
    #[strum(serialize = "nix")]
    Nil,
    #[strum(serialize = "boolean")]
    Boolean,
    #[strum(serialize = "number")]
    Number,
    #[strum(serialize = "string")]
    Str,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "callable")]
    Callable,
}

/// A mutable homogenous list. The tag is fixed when the list is built;
/// `None` marks the empty list, which has no element type yet.
#[derive(Debug, Clone)]
pub struct List {
    pub elements: Vec<Value>,
    pub tag: Option<ValueKind>,
}

impl List {
    pub fn new(elements: Vec<Value>, tag: Option<ValueKind>) -> List {
        List { elements, tag }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    Str(String),
    List(Rc<RefCell<List>>),
    Callable(Callable),
}

impl Value {
    pub fn list(list: List) -> Value {
        Value::List(Rc::new(RefCell::new(list)))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::Str(_) => ValueKind::Str,
            Value::List(_) => ValueKind::List,
            Value::Callable(_) => ValueKind::Callable,
        }
    }

    /// `nix` and `false` are false, a number within epsilon of zero is
    /// false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !approx_eq(*n, 0.0),
            _ => true,
        }
    }

    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Number(l), Value::Number(r)) => approx_eq(*l, *r),
            (Value::Str(l), Value::Str(r)) => l == r,
            (Value::List(l), Value::List(r)) => {
                let left = l.borrow();
                let right = r.borrow();
                if left.tag != right.tag || left.len() != right.len() {
                    return false;
                }
                left.elements
                    .iter()
                    .zip(right.elements.iter())
                    .all(|(a, b)| a.equals(b))
            }
            (Value::Callable(l), Value::Callable(r)) => l.equals(r),
            _ => false,
        }
    }

    /// Lists are cloned recursively; scalars copy by value and callables
    /// stay shared.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::List(list) => {
                let list = list.borrow();
                let elements = list.elements.iter().map(Value::deep_copy).collect();
                Value::list(List::new(elements, list.tag))
            }
            other => other.clone(),
        }
    }
}

/// Renders a value the way `print` and the REPL echo do. `quoted` wraps
/// string contents in `"`, which only the REPL asks for. Lists longer than
/// 50 elements show the first and last ten around an ellipsis.
pub fn stringify(value: &Value, quoted: bool) -> String {
    match value {
        Value::Nil => "nix".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Str(s) => {
            if quoted {
                format!("\"{}\"", s)
            } else {
                s.clone()
            }
        }
        Value::Callable(c) => c.info(),
        Value::List(list) => {
            let list = list.borrow();
            let mut parts: Vec<String> = Vec::new();
            if list.len() > 50 {
                for element in &list.elements[..10] {
                    parts.push(stringify(element, quoted));
                }
                parts.push("...".to_string());
                for element in &list.elements[list.len() - 10..] {
                    parts.push(stringify(element, quoted));
                }
            } else {
                for element in &list.elements {
                    parts.push(stringify(element, quoted));
                }
            }
            format!("[{}]", parts.join(", "))
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stringify(self, false))
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn epsilon_equality() {
        let a = Value::Number(0.1 + 0.2);
        let b = Value::Number(0.3);
        assert!(a.equals(&b));
        assert!(!Value::Number(1.0).equals(&Value::Number(1.0 + 1e-9)));
        assert!(approx_eq(1.0, 1.0 + 1e-13));
    }

    #[test]
    fn near_integer_accepts_epsilon_wobble() {
        assert_eq!(near_integer(3.0), Some(3));
        assert_eq!(near_integer(3.0 + 1e-13), Some(3));
        assert_eq!(near_integer(3.5), None);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(1e-13).is_truthy());
        assert!(Value::Number(2.0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn list_equality_checks_tag_and_elements() {
        let a = Value::list(List::new(
            vec![Value::Number(1.0), Value::Number(2.0)],
            Some(ValueKind::Number),
        ));
        let b = Value::list(List::new(
            vec![Value::Number(1.0), Value::Number(2.0 + 1e-13)],
            Some(ValueKind::Number),
        ));
        assert!(a.equals(&b));

        let empty_a = Value::list(List::new(Vec::new(), None));
        let empty_b = Value::list(List::new(Vec::new(), None));
        assert!(empty_a.equals(&empty_b));
        assert!(!a.equals(&empty_a));
    }

    #[test]
    fn stringify_forms() {
        assert_eq!(stringify(&Value::Nil, false), "nix");
        assert_eq!(stringify(&Value::Boolean(true), false), "true");
        assert_eq!(stringify(&Value::Number(2.5), false), "2.5");
        assert_eq!(stringify(&Value::Number(3.0), false), "3");
        assert_eq!(stringify(&Value::Str("hi".to_string()), false), "hi");
        assert_eq!(stringify(&Value::Str("hi".to_string()), true), "\"hi\"");
        let list = Value::list(List::new(
            vec![Value::Number(1.0), Value::Number(20.0)],
            Some(ValueKind::Number),
        ));
        assert_eq!(stringify(&list, false), "[1, 20]");
        assert_eq!(stringify(&Value::list(List::new(Vec::new(), None)), false), "[]");
    }

    #[test]
    fn long_lists_are_elided() {
        let elements: Vec<Value> = (1..=60).map(|i| Value::Number(i as f64)).collect();
        let list = Value::list(List::new(elements, Some(ValueKind::Number)));
        let text = stringify(&list, false);
        assert_eq!(
            text,
            "[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, ..., 51, 52, 53, 54, 55, 56, 57, 58, 59, 60]"
        );
    }

    #[test]
    fn deep_copy_unshares_nested_lists() {
        let inner = Value::list(List::new(vec![Value::Number(1.0)], Some(ValueKind::Number)));
        let outer = Value::list(List::new(vec![inner], Some(ValueKind::List)));
        let copy = outer.deep_copy();

        if let (Value::List(original), Value::List(copied)) = (&outer, &copy) {
            if let (Value::List(inner_orig), Value::List(inner_copy)) =
                (&original.borrow().elements[0], &copied.borrow().elements[0])
            {
                assert!(!Rc::ptr_eq(inner_orig, inner_copy));
                inner_orig.borrow_mut().elements[0] = Value::Number(9.0);
                assert!(matches!(inner_copy.borrow().elements[0], Value::Number(n) if n == 1.0));
            } else {
                panic!("expected nested lists");
            }
        } else {
            panic!("expected lists");
        }
    }
}
