use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::token::{Token, TokenType};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub struct ResolverError {
    message: String,
    token: Option<Token>,
}

impl ResolverError {
    fn new(message: &str, token: Option<&Token>) -> ResolverError {
        ResolverError {
            message: message.to_string(),
            token: token.cloned(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            None => write!(f, "Error: {}", self.message),
            Some(token) => write!(
                f,
                "[line {}] Error at '{}': {}",
                token.line, token.lexeme, self.message
            ),
        }
    }
}

impl Error for ResolverError {}

#[derive(Clone, Copy)]
enum FunctionType {
    None,
    Function,
}

/// Walks the tree once before evaluation, writing the lexical depth of
/// every variable use and assignment into the node. A name that no scope
/// frame knows stays unannotated and binds to the root environment at run
/// time. Lazy assignment to an unknown name inside a scope declares it
/// there: locals are created by assignment.
pub struct Resolver {
    scopes: Vec<BTreeMap<String, bool>>,
    current_function: FunctionType,
    loop_depth: usize,
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            scopes: Vec::new(),
            current_function: FunctionType::None,
            loop_depth: 0,
        }
    }

    pub fn resolve(&mut self, statements: &mut [Stmt]) -> Result<(), ResolverError> {
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn resolve_expression(&mut self, expr: &mut Expr) -> Result<(), ResolverError> {
        self.resolve_expr(expr)
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) -> Result<(), ResolverError> {
        match stmt {
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::Block(stmts) => {
                self.begin_scope();
                let result = self.resolve(stmts);
                self.end_scope();
                result
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition)?;
                self.loop_depth += 1;
                let result = self.resolve_stmt(body);
                self.loop_depth -= 1;
                result
            }
            Stmt::For {
                init,
                condition,
                increment,
                body,
            } => {
                // The whole head and the body share one scope; a block body
                // does not open another one.
                self.begin_scope();
                let result = (|| {
                    if let Some(init) = init {
                        self.resolve_expr(init)?;
                    }
                    if let Some(condition) = condition {
                        self.resolve_expr(condition)?;
                    }
                    if let Some(increment) = increment {
                        self.resolve_expr(increment)?;
                    }
                    self.loop_depth += 1;
                    let body_result = self.resolve_loop_body(body);
                    self.loop_depth -= 1;
                    body_result
                })();
                self.end_scope();
                result
            }
            Stmt::RangedFor { head, body } => {
                self.begin_scope();
                let result = (|| {
                    match head {
                        Expr::In {
                            name,
                            iterable,
                            scope,
                            ..
                        } => {
                            self.declare(name)?;
                            self.resolve_expr(iterable)?;
                            self.define(name);
                            self.resolve_local(scope, name);
                        }
                        other => {
                            self.resolve_expr(other)?;
                        }
                    }
                    self.loop_depth += 1;
                    let body_result = self.resolve_loop_body(body);
                    self.loop_depth -= 1;
                    body_result
                })();
                self.end_scope();
                result
            }
            Stmt::Break(keyword) | Stmt::Continue(keyword) => {
                if self.loop_depth == 0 {
                    Err(ResolverError::new(
                        &format!("Cannot use '{}' outside of a loop.", keyword.lexeme),
                        Some(keyword),
                    ))
                } else {
                    Ok(())
                }
            }
            Stmt::Function(decl) => {
                if let Some(name) = &decl.name {
                    self.declare(name)?;
                    self.define(name);
                }
                self.resolve_function(decl)
            }
            Stmt::Return { keyword, value } => {
                if let FunctionType::None = self.current_function {
                    return Err(ResolverError::new(
                        "Cannot return from top-level code.",
                        Some(keyword),
                    ));
                }
                match value {
                    Some(value) => self.resolve_expr(value),
                    None => Ok(()),
                }
            }
        }
    }

    /// A block body of a for loop shares the loop-head scope.
    fn resolve_loop_body(&mut self, body: &mut Stmt) -> Result<(), ResolverError> {
        match body {
            Stmt::Block(stmts) => self.resolve(stmts),
            other => self.resolve_stmt(other),
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) -> Result<(), ResolverError> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Grouping(inner) => self.resolve_expr(inner),
            Expr::Unary { right, .. } => self.resolve_expr(right),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            Expr::Variable { name, scope } => {
                if let Some(frame) = self.scopes.last() {
                    if frame.get(&name.lexeme) == Some(&false) {
                        return Err(ResolverError::new(
                            "Cannot read local variable in its own initializer.",
                            Some(name),
                        ));
                    }
                }
                self.resolve_local(scope, name);
                Ok(())
            }
            Expr::Assign {
                name,
                operator,
                value,
                scope,
            } => {
                self.resolve_expr(value)?;
                self.resolve_local(scope, name);
                if scope.is_none()
                    && matches!(operator.kind, TokenType::Equal)
                    && !self.scopes.is_empty()
                {
                    // First lazy assignment inside a scope creates a local.
                    self.declare(name)?;
                    self.define(name);
                    *scope = Some(0);
                }
                Ok(())
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee)?;
                for argument in arguments {
                    self.resolve_expr(argument)?;
                }
                Ok(())
            }
            Expr::Lambda(decl) => self.resolve_function(decl),
            Expr::ListLiteral { elements, .. } => {
                for element in elements {
                    self.resolve_expr(element)?;
                }
                Ok(())
            }
            Expr::Index { target, index, .. } => {
                self.resolve_expr(target)?;
                self.resolve_expr(index)
            }
            Expr::IndexAssign {
                target,
                index,
                value,
                ..
            } => {
                self.resolve_expr(target)?;
                self.resolve_expr(index)?;
                self.resolve_expr(value)
            }
            Expr::Range {
                start, step, end, ..
            } => {
                self.resolve_expr(start)?;
                if let Some(step) = step {
                    self.resolve_expr(step)?;
                }
                self.resolve_expr(end)
            }
            Expr::In { keyword, .. } => Err(ResolverError::new(
                "An 'in' expression can only be used as a for-loop clause.",
                Some(keyword),
            )),
        }
    }

    fn resolve_function(&mut self, decl: &FunctionDecl) -> Result<(), ResolverError> {
        let enclosing_function = self.current_function;
        let enclosing_loop_depth = self.loop_depth;
        self.current_function = FunctionType::Function;
        self.loop_depth = 0;

        self.begin_scope();
        let result = (|| {
            for param in &decl.params {
                self.declare(param)?;
                self.define(param);
            }
            self.resolve(&mut decl.body.borrow_mut())
        })();
        self.end_scope();

        self.current_function = enclosing_function;
        self.loop_depth = enclosing_loop_depth;
        result
    }

    fn begin_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) -> Result<(), ResolverError> {
        match self.scopes.last_mut() {
            None => Ok(()),
            Some(frame) => match frame.insert(name.lexeme.clone(), false) {
                None => Ok(()),
                Some(_) => Err(ResolverError::new(
                    "Variable with this name already declared in this scope.",
                    Some(name),
                )),
            },
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.lexeme.clone(), true);
        }
    }

    fn resolve_local(&mut self, scope: &mut Option<usize>, name: &Token) {
        for (i, frame) in self.scopes.iter().enumerate().rev() {
            if frame.contains_key(&name.lexeme) {
                *scope = Some(self.scopes.len() - 1 - i);
                return;
            }
        }
    }
}

impl Default for Resolver {
    fn default() -> Resolver {
        Resolver::new()
    }
}
