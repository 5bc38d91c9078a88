//! Tree‑walking evaluator.
//!
//! Statements return a [`Flow`] so that `return` unwinds through blocks and
//! loops as an ordinary value and is consumed at the call boundary in
//! [`Function::call`].  The active environment is passed down explicitly;
//! nothing has to be restored on the way out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use anyhow::anyhow;
use log::{debug, info};

use crate::ast::{Expr, ExprId, LiteralValue, Stmt};
use crate::environment::{EnvId, Environments};
use crate::error::{LoxError, Result};
use crate::native;
use crate::resolver::Locals;
use crate::token::{Token, TokenType};
use crate::value::{Callable, Class, Function, Instance, Property, Value};

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<'a> {
    Normal,
    /// A `return` is unwinding to the nearest function call.
    Return(Value<'a>),
}

pub struct Interpreter<'a> {
    environments: Environments<'a>,
    globals: EnvId,
    locals: Locals,
    out: Box<dyn Write + 'a>,
}

impl<'a> Default for Interpreter<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Interpreter<'a> {
    /// Creates a new Interpreter printing to stdout.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Creates a new Interpreter whose `print` statements write to `out`,
    /// with the native functions already defined.
    pub fn with_output(out: impl Write + 'a) -> Self {
        info!("Initializing Interpreter");

        let natives = native::globals().into_iter().map(|native| {
            debug!("Defining native function '{}'", native.name);

            let name: &'a str = native.name;
            (name, Value::Callable(Callable::Native(Rc::new(native))))
        });

        let environments = Environments::with_globals(natives);
        let globals = environments.globals();

        Self {
            environments,
            globals,
            locals: HashMap::new(),
            out: Box::new(out),
        }
    }

    /// Install the resolver's distance table.
    pub fn resolve(&mut self, locals: Locals) {
        debug!("Installing {} resolved local(s)", locals.len());

        self.locals.extend(locals);
    }

    /// Interprets a list of statements (a "program").  The first runtime error
    /// aborts the run.
    pub fn interpret(&mut self, statements: &'a [Stmt<'a>]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            if let Flow::Return(value) = self.execute(stmt, self.globals)? {
                return Err(anyhow!("return signal escaped to top level with {}", value).into());
            }
        }

        self.out.flush()?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    pub(crate) fn environments(&mut self) -> &mut Environments<'a> {
        &mut self.environments
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    /// Executes a single statement in `env`.
    pub fn execute(&mut self, stmt: &'a Stmt<'a>, env: EnvId) -> Result<Flow<'a>> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr, env)?;
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr, env)?;
                writeln!(self.out, "{}", value)?;
                debug!("Printed value: {}", value);
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };

                debug!("Variable '{}' defined with value: {}", name.lexeme, value);
                self.environments.define(env, name.lexeme, value)?;
            }

            Stmt::Block(statements) => {
                let scope = self.environments.push(env);
                let flow = self.execute_block(statements, scope);
                self.environments.release(scope);

                return flow;
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, env)?.is_truthy() {
                    return self.execute(then_branch, env);
                } else if let Some(else_stmt) = else_branch {
                    return self.execute(else_stmt, env);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition, env)?.is_truthy() {
                    if let flow @ Flow::Return(_) = self.execute(body, env)? {
                        return Ok(flow);
                    }
                }
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);

                self.environments.capture(env);
                let function = Function::new(decl, env, false);
                self.environments.define(
                    env,
                    decl.name.lexeme,
                    Value::Callable(Callable::Function(Rc::new(function))),
                )?;
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };

                debug!("Returning value: {}", value);
                return Ok(Flow::Return(value));
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let superclass: Option<Rc<Class<'a>>> = match superclass {
                    Some(expr) => match self.evaluate(expr, env)? {
                        Value::Callable(Callable::Class(class)) => Some(class),
                        _ => {
                            return Err(LoxError::runtime(
                                expr_line(expr).unwrap_or(name.line),
                                "Superclass must be a class.",
                            ))
                        }
                    },
                    None => None,
                };

                // Declared first so methods can refer to the class by name.
                self.environments.define(env, name.lexeme, Value::Nil)?;

                let method_env = match &superclass {
                    Some(superclass) => {
                        let scope = self.environments.push(env);
                        self.environments.define(
                            scope,
                            "super",
                            Value::Callable(Callable::Class(Rc::clone(superclass))),
                        )?;
                        scope
                    }
                    None => env,
                };

                self.environments.capture(method_env);

                let methods = methods
                    .iter()
                    .map(|method| {
                        let is_initializer = method.name.lexeme == "init";
                        (
                            method.name.lexeme,
                            Rc::new(Function::new(method, method_env, is_initializer)),
                        )
                    })
                    .collect::<HashMap<_, _>>();

                let class = Class::new(name.lexeme, superclass, methods);
                info!("Class '{}' defined", name.lexeme);

                self.environments.assign(
                    env,
                    name,
                    Value::Callable(Callable::Class(Rc::new(class))),
                )?;
            }
        }

        Ok(Flow::Normal)
    }

    /// Run `statements` in the already created frame `env`, stopping at the
    /// first `return`.
    pub(crate) fn execute_block(
        &mut self,
        statements: &'a [Stmt<'a>],
        env: EnvId,
    ) -> Result<Flow<'a>> {
        for stmt in statements {
            if let flow @ Flow::Return(_) = self.execute(stmt, env)? {
                return Ok(flow);
            }
        }

        Ok(Flow::Normal)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression in `env` and returns a Value.
    pub fn evaluate(&mut self, expr: &'a Expr<'a>, env: EnvId) -> Result<Value<'a>> {
        let value = match expr {
            Expr::Literal(literal) => match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            },

            Expr::Grouping(inner) => self.evaluate(inner, env)?,

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right, env)?;

                match operator.token_type {
                    TokenType::BANG => Value::Bool(!right.is_truthy()),
                    TokenType::MINUS => match right {
                        Value::Number(n) => Value::Number(-n),
                        _ => return Err(LoxError::runtime(operator.line, "Operand must be a number.")),
                    },
                    _ => return Err(anyhow!("invalid unary operator '{}'", operator.lexeme).into()),
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;

                binary(operator, left, right)?
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, env)?;

                let short_circuits = match operator.token_type {
                    TokenType::OR => left.is_truthy(),
                    _ => !left.is_truthy(),
                };

                if short_circuits {
                    left
                } else {
                    self.evaluate(right, env)?
                }
            }

            Expr::Variable { id, name } => self.look_up(*id, name, name.lexeme, env)?,

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value, env)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        self.environments
                            .assign_at(env, distance, name.lexeme, value.clone())?
                    }
                    None => self
                        .environments
                        .assign(self.globals, name, value.clone())?,
                }

                value
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.callee(callee, env)?;

                let mut values: Vec<Value<'a>> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument, env)?);
                }

                match callee {
                    Callee::Value(Value::Callable(callable)) => {
                        check_arity(paren, callable.arity(), values.len())?;
                        callable.call(self, values, paren)?
                    }

                    Callee::Method(method, instance) => {
                        check_arity(paren, method.arity(), values.len())?;
                        method.invoke(instance, self, values)?
                    }

                    Callee::Value(_) => {
                        return Err(LoxError::runtime(
                            paren.line,
                            "Can only call functions and classes.",
                        ))
                    }
                }
            }

            Expr::Get { object, name } => match self.evaluate(object, env)? {
                Value::Instance(instance) => {
                    Instance::get(&instance, name, &mut self.environments)?
                }
                _ => {
                    return Err(LoxError::runtime(
                        name.line,
                        "Only instances have properties.",
                    ))
                }
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object, env)? else {
                    return Err(LoxError::runtime(name.line, "Only instances have fields."));
                };

                let value = self.evaluate(value, env)?;
                instance.borrow_mut().set(name.lexeme, value.clone());

                value
            }

            Expr::This { id, keyword } => self.look_up(*id, keyword, "this", env)?,

            Expr::Super { id, method, .. } => {
                let (found, instance) = self.super_method(*id, method, env)?;
                let bound = found.bind(instance, &mut self.environments)?;
                self.environments.capture(bound.closure);

                Value::Callable(Callable::Function(Rc::new(bound)))
            }
        };

        Ok(value)
    }

    /// Resolved locals are read at their exact distance; anything else is a
    /// global.
    fn look_up(&self, id: ExprId, token: &Token<'_>, name: &str, env: EnvId) -> Result<Value<'a>> {
        match self.locals.get(&id) {
            Some(&distance) => self.environments.get_at(env, distance, name),
            None => self.environments.get(self.globals, token),
        }
    }

    /// Evaluate the callee of a call.  A method named directly on an instance
    /// or on `super` is not bound here: the call binds it and frees the
    /// `this` frame afterwards.
    fn callee(&mut self, expr: &'a Expr<'a>, env: EnvId) -> Result<Callee<'a>> {
        match expr {
            Expr::Get { object, name } => {
                let Value::Instance(instance) = self.evaluate(object, env)? else {
                    return Err(LoxError::runtime(
                        name.line,
                        "Only instances have properties.",
                    ));
                };

                Ok(match Instance::lookup(&instance, name)? {
                    Property::Field(value) => Callee::Value(value),
                    Property::Method(method) => Callee::Method(method, instance),
                })
            }

            Expr::Super { id, method, .. } => {
                let (found, instance) = self.super_method(*id, method, env)?;
                Ok(Callee::Method(found, instance))
            }

            _ => Ok(Callee::Value(self.evaluate(expr, env)?)),
        }
    }

    /// `super.method`: the superclass sits `distance` frames out, `this` one
    /// frame closer.  Returns the method unbound, with the instance to bind.
    fn super_method(
        &mut self,
        id: ExprId,
        method: &Token<'_>,
        env: EnvId,
    ) -> Result<(Rc<Function<'a>>, Rc<RefCell<Instance<'a>>>)> {
        let distance = *self
            .locals
            .get(&id)
            .ok_or_else(|| anyhow!("unresolved 'super' at line {}", method.line))?;

        let Value::Callable(Callable::Class(superclass)) =
            self.environments.get_at(env, distance, "super")?
        else {
            return Err(anyhow!("'super' is not bound to a class").into());
        };

        let this_distance = distance
            .checked_sub(1)
            .ok_or_else(|| anyhow!("'super' resolved without a 'this' frame"))?;

        let Value::Instance(instance) = self.environments.get_at(env, this_distance, "this")? else {
            return Err(anyhow!("'this' is not bound to an instance").into());
        };

        match superclass.find_method(method.lexeme) {
            Some(found) => Ok((found, instance)),
            None => Err(LoxError::runtime(
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }
}

/// What a call expression is about to invoke.
enum Callee<'a> {
    Value(Value<'a>),
    /// `instance.name(...)` or `super.name(...)`.
    Method(Rc<Function<'a>>, Rc<RefCell<Instance<'a>>>),
}

fn check_arity(paren: &Token<'_>, arity: usize, got: usize) -> Result<()> {
    if arity == got {
        return Ok(());
    }

    Err(LoxError::runtime(
        paren.line,
        format!("Expected {} arguments but got {}.", arity, got),
    ))
}

/// Arithmetic, comparison and equality on two evaluated operands.
fn binary<'a>(operator: &Token<'_>, left: Value<'a>, right: Value<'a>) -> Result<Value<'a>> {
    let numbers_only = || {
        LoxError::runtime(
            operator.line,
            format!("Operands of '{}' must be numbers.", operator.lexeme),
        )
    };

    let value = match operator.token_type {
        TokenType::EQUAL_EQUAL => Value::Bool(left == right),
        TokenType::BANG_EQUAL => Value::Bool(left != right),

        TokenType::PLUS => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(a), Value::String(b)) => Value::String(a + &b),
            _ => {
                return Err(LoxError::runtime(
                    operator.line,
                    format!(
                        "Operands of '{}' must be two numbers or two strings.",
                        operator.lexeme
                    ),
                ))
            }
        },

        _ => {
            let (Value::Number(a), Value::Number(b)) = (left, right) else {
                return Err(numbers_only());
            };

            match operator.token_type {
                TokenType::MINUS => Value::Number(a - b),
                TokenType::STAR => Value::Number(a * b),
                // IEEE semantics: x / 0 is ±inf or NaN, not an error.
                TokenType::SLASH => Value::Number(a / b),
                TokenType::GREATER => Value::Bool(a > b),
                TokenType::GREATER_EQUAL => Value::Bool(a >= b),
                TokenType::LESS => Value::Bool(a < b),
                TokenType::LESS_EQUAL => Value::Bool(a <= b),
                _ => return Err(anyhow!("invalid binary operator '{}'", operator.lexeme).into()),
            }
        }
    };

    Ok(value)
}

fn expr_line(expr: &Expr<'_>) -> Option<usize> {
    match expr {
        Expr::Variable { name, .. } => Some(name.line),
        _ => None,
    }
}
