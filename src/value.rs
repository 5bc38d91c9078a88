//! Runtime values and the callable object model: native functions, user
//! functions (closures), classes and instances.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::environment::{EnvId, Environments};
use crate::error::{LoxError, Result};
use crate::interpreter::{Flow, Interpreter};
use crate::token::Token;

/// Host function body: receives the already arity‑checked arguments.
pub type NativeFn<'a> = fn(&[Value<'a>]) -> std::result::Result<Value<'a>, String>;

#[derive(Debug, Clone)]
pub enum Value<'a> {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Callable(Callable<'a>),
    Instance(Rc<RefCell<Instance<'a>>>),
}

impl<'a> Value<'a> {
    /// `nil` and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

/// Value equality.  Numbers compare like boxed doubles (`NaN` equals `NaN`,
/// `0` and `-0` differ); callables and instances compare by identity.
impl<'a> PartialEq for Value<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<'a> fmt::Display for Value<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => write!(f, "{}", format_number(*n)),

            Value::String(s) => write!(f, "{}", s),

            Value::Callable(c) => write!(f, "{}", c),

            Value::Instance(i) => write!(f, "{} instance", i.borrow().class.name),
        }
    }
}

/// Numbers print like boxed doubles with a trailing `.0` dropped: plain
/// decimals for magnitudes in `[1e-3, 1e7)`, otherwise `1.5E-7` style.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }

    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = n.abs();

    if magnitude != 0.0 && !(1e-3..1e7).contains(&magnitude) {
        let scientific = format!("{:e}", n);

        return match scientific.split_once('e') {
            Some((mantissa, exponent)) if mantissa.contains('.') => {
                format!("{}E{}", mantissa, exponent)
            }
            Some((mantissa, exponent)) => format!("{}.0E{}", mantissa, exponent),
            None => scientific,
        };
    }

    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Callables
// ─────────────────────────────────────────────────────────────────────────────

/// Anything that can appear as the target of a call expression.
#[derive(Debug, Clone)]
pub enum Callable<'a> {
    Native(Rc<NativeFunction<'a>>),
    Function(Rc<Function<'a>>),
    Class(Rc<Class<'a>>),
}

impl<'a> Callable<'a> {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Native(native) => native.arity,
            Callable::Function(function) => function.arity(),
            Callable::Class(class) => class.arity(),
        }
    }

    /// Invoke with arguments whose count already matches [`arity`](Self::arity).
    /// `paren` locates errors raised by native bodies.
    pub fn call(
        &self,
        interpreter: &mut Interpreter<'a>,
        arguments: Vec<Value<'a>>,
        paren: &Token<'_>,
    ) -> Result<Value<'a>> {
        match self {
            Callable::Native(native) => {
                debug!("Calling native function '{}'", native.name);

                (native.func)(&arguments).map_err(|msg| LoxError::runtime(paren.line, msg))
            }

            Callable::Function(function) => function.call(interpreter, arguments),

            Callable::Class(class) => Class::instantiate(class, interpreter, arguments),
        }
    }
}

impl<'a> PartialEq for Callable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Class(a), Callable::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<'a> fmt::Display for Callable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "<native fn>"),
            Callable::Function(function) => write!(f, "<fn {}>", function.declaration.name.lexeme),
            Callable::Class(class) => write!(f, "{}", class.name),
        }
    }
}

/// A host‑implemented function with a fixed arity.
#[derive(Debug)]
pub struct NativeFunction<'a> {
    pub name: &'static str,
    pub arity: usize,
    pub func: NativeFn<'a>,
}

/// A user function closed over the frame it was declared in.
#[derive(Debug)]
pub struct Function<'a> {
    pub declaration: &'a FunctionDecl<'a>,
    pub closure: EnvId,
    pub is_initializer: bool,
}

impl<'a> Function<'a> {
    /// Callers capture `closure` when the function may outlive the frame.
    pub fn new(declaration: &'a FunctionDecl<'a>, closure: EnvId, is_initializer: bool) -> Self {
        Function {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Same declaration, closed over a fresh frame where `this` is `instance`.
    /// The frame starts out uncaptured: a bound method that escapes as a value
    /// must be captured by the caller, one that is called at once goes
    /// through [`invoke`](Self::invoke) instead.
    pub fn bind(
        &self,
        instance: Rc<RefCell<Instance<'a>>>,
        environments: &mut Environments<'a>,
    ) -> Result<Function<'a>> {
        let env = environments.push(self.closure);
        environments.define(env, "this", Value::Instance(instance))?;

        Ok(Function::new(self.declaration, env, self.is_initializer))
    }

    /// Bind to `instance`, call right away and free the `this` frame again
    /// unless the body captured it.
    pub fn invoke(
        &self,
        instance: Rc<RefCell<Instance<'a>>>,
        interpreter: &mut Interpreter<'a>,
        arguments: Vec<Value<'a>>,
    ) -> Result<Value<'a>> {
        let bound = self.bind(instance, interpreter.environments())?;
        let result = bound.call(interpreter, arguments);
        interpreter.environments().release(bound.closure);

        result
    }

    /// Run the body in a new frame enclosed by the closure, not by the caller.
    pub fn call(&self, interpreter: &mut Interpreter<'a>, arguments: Vec<Value<'a>>) -> Result<Value<'a>> {
        debug!("Calling user-defined function '{}'", self.declaration.name.lexeme);

        let declaration: &'a FunctionDecl<'a> = self.declaration;
        let env = interpreter.environments().push(self.closure);

        for (param, argument) in declaration.params.iter().zip(arguments) {
            interpreter.environments().define(env, param.lexeme, argument)?;
        }

        let flow = interpreter.execute_block(&declaration.body, env);
        interpreter.environments().release(env);

        let flow = flow?;

        if self.is_initializer {
            return interpreter.environments().get_at(self.closure, 0, "this");
        }

        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
        })
    }
}

/// A class: its methods and an optional superclass to fall back on.
#[derive(Debug)]
pub struct Class<'a> {
    pub name: &'a str,
    pub superclass: Option<Rc<Class<'a>>>,
    pub methods: HashMap<&'a str, Rc<Function<'a>>>,
}

impl<'a> Class<'a> {
    pub fn new(
        name: &'a str,
        superclass: Option<Rc<Class<'a>>>,
        methods: HashMap<&'a str, Rc<Function<'a>>>,
    ) -> Self {
        Class {
            name,
            superclass,
            methods,
        }
    }

    /// Own methods first, then the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function<'a>>> {
        match self.methods.get(name) {
            Some(method) => Some(Rc::clone(method)),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name)),
        }
    }

    /// Arity of `init`, or zero without one.
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }

    /// Create an instance and run `init` on it, if there is one.
    fn instantiate(
        class: &Rc<Class<'a>>,
        interpreter: &mut Interpreter<'a>,
        arguments: Vec<Value<'a>>,
    ) -> Result<Value<'a>> {
        debug!("Instantiating class '{}'", class.name);

        let instance = Rc::new(RefCell::new(Instance::new(Rc::clone(class))));

        if let Some(init) = class.find_method("init") {
            init.invoke(Rc::clone(&instance), interpreter, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

/// Result of [`Instance::lookup`].
pub enum Property<'a> {
    Field(Value<'a>),
    /// Not bound to the instance yet.
    Method(Rc<Function<'a>>),
}

/// An object created by calling a class.  Fields live here; methods stay on
/// the class.
pub struct Instance<'a> {
    pub class: Rc<Class<'a>>,
    fields: HashMap<&'a str, Value<'a>>,
}

impl<'a> Instance<'a> {
    pub fn new(class: Rc<Class<'a>>) -> Self {
        Instance {
            class,
            fields: HashMap::new(),
        }
    }

    /// Field first, then a method along the class chain.
    pub fn lookup(this: &Rc<RefCell<Instance<'a>>>, name: &Token<'_>) -> Result<Property<'a>> {
        let instance = this.borrow();

        if let Some(value) = instance.fields.get(name.lexeme) {
            return Ok(Property::Field(value.clone()));
        }

        match instance.class.find_method(name.lexeme) {
            Some(method) => Ok(Property::Method(method)),
            None => Err(LoxError::runtime(
                name.line,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    /// Property read as a value.  A method comes back bound to `this` and
    /// its frame captured, since the value may outlive the expression.
    pub fn get(
        this: &Rc<RefCell<Instance<'a>>>,
        name: &Token<'_>,
        environments: &mut Environments<'a>,
    ) -> Result<Value<'a>> {
        match Instance::lookup(this, name)? {
            Property::Field(value) => Ok(value),
            Property::Method(method) => {
                let bound = method.bind(Rc::clone(this), environments)?;
                environments.capture(bound.closure);

                Ok(Value::Callable(Callable::Function(Rc::new(bound))))
            }
        }
    }

    pub fn set(&mut self, name: &'a str, value: Value<'a>) {
        self.fields.insert(name, value);
    }
}

// Fields may refer back to the instance itself.
impl<'a> fmt::Debug for Instance<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
