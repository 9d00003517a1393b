use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::lang::ast::Identifier;
use crate::lang::error::{JsError, Result};
use crate::lang::functions::FUNCTIONS;
use crate::lang::value::{Function, Value};

struct Binding {
    value: Value,
    mutable: bool,
}

struct Frame {
    vars: BTreeMap<Identifier, Binding>,
    parent: Option<Scope>,
    /// Set on the global frame and on frames created by function calls. `var` declarations land
    /// in the nearest such frame.
    function_boundary: bool,
}

/// A lexical environment
///
/// Frames are shared: closures keep the frame they were created in alive and see later writes
/// to it.
#[derive(Clone)]
pub struct Scope(Rc<RefCell<Frame>>);

impl Scope {
    fn new(parent: Option<Scope>, function_boundary: bool) -> Self {
        Scope(Rc::new(RefCell::new(Frame {
            vars: BTreeMap::default(),
            parent,
            function_boundary,
        })))
    }

    /// Create the global scope, pre-populated with builtins
    pub fn global() -> Self {
        let scope = Self::new(None, true);

        for func in &*FUNCTIONS {
            scope.declare(
                Identifier(func.to_string()),
                Value::Function(Function::Builtin(*func)),
                true,
            );
        }

        scope.declare(Identifier("undefined".to_string()), Value::Undefined, false);
        scope.declare(Identifier("NaN".to_string()), Value::Number(f64::NAN), false);
        scope.declare(
            Identifier("Infinity".to_string()),
            Value::Number(f64::INFINITY),
            false,
        );

        scope
    }

    /// Create a block scope nested in `self`
    pub fn child(&self) -> Self {
        Self::new(Some(self.clone()), false)
    }

    /// Create the scope of a function call whose closure captured `self`
    pub fn function(&self) -> Self {
        Self::new(Some(self.clone()), true)
    }

    /// Define `ident` in this frame, shadowing outer definitions
    pub fn declare(&self, ident: Identifier, value: Value, mutable: bool) {
        self.0
            .borrow_mut()
            .vars
            .insert(ident, Binding { value, mutable });
    }

    pub fn is_declared_here(&self, ident: &Identifier) -> bool {
        self.0.borrow().vars.contains_key(ident)
    }

    /// The nearest enclosing function (or global) scope
    pub fn var_scope(&self) -> Scope {
        let mut scope = self.clone();
        loop {
            let parent = {
                let frame = scope.0.borrow();
                if frame.function_boundary {
                    None
                } else {
                    frame.parent.clone()
                }
            };

            match parent {
                Some(p) => scope = p,
                None => return scope,
            }
        }
    }

    /// Hoist a `var` declaration: binds `undefined` unless already declared
    pub fn declare_var(&self, ident: &Identifier) {
        let scope = self.var_scope();
        if !scope.is_declared_here(ident) {
            scope.declare(ident.clone(), Value::Undefined, true);
        }
    }

    /// Look up `ident`, walking outwards
    pub fn lookup(&self, ident: &Identifier) -> Option<Value> {
        let mut scope = Some(self.clone());
        while let Some(s) = scope {
            let frame = s.0.borrow();
            if let Some(binding) = frame.vars.get(ident) {
                return Some(binding.value.clone());
            }
            scope = frame.parent.clone();
        }

        None
    }

    pub fn get(&self, ident: &Identifier) -> Result<Value> {
        self.lookup(ident)
            .ok_or_else(|| JsError::Reference(format!("{} is not defined", ident)))
    }

    /// Assign to the nearest binding of `ident`
    ///
    /// Assigning to an undeclared name creates a global
    pub fn assign(&self, ident: &Identifier, value: Value) -> Result<()> {
        let mut scope = self.clone();
        loop {
            let parent = {
                let mut frame = scope.0.borrow_mut();
                if let Some(binding) = frame.vars.get_mut(ident) {
                    if !binding.mutable {
                        return Err(JsError::Type(
                            "Assignment to constant variable.".to_string(),
                        ));
                    }

                    binding.value = value;
                    return Ok(());
                }

                frame.parent.clone()
            };

            match parent {
                Some(p) => scope = p,
                None => {
                    // `scope` is now the global scope
                    scope.declare(ident.clone(), value, true);
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
fn ident(name: &str) -> Identifier {
    Identifier(name.to_string())
}

#[test]
fn test_lookup_and_shadowing() {
    let global = Scope::global();
    assert!(matches!(
        global.get(&ident("log")),
        Ok(Value::Function(Function::Builtin(_)))
    ));
    assert!(matches!(global.get(&ident("undefined")), Ok(Value::Undefined)));
    assert!(matches!(
        global.get(&ident("nope")),
        Err(JsError::Reference(_))
    ));

    global.declare(ident("x"), Value::Number(1.0), true);
    let block = global.child();
    block.declare(ident("x"), Value::Number(2.0), true);
    assert_eq!(block.get(&ident("x")).ok(), Some(Value::Number(2.0)));
    assert_eq!(global.get(&ident("x")).ok(), Some(Value::Number(1.0)));
}

#[test]
fn test_assign() {
    let global = Scope::global();
    let func = global.function();
    let block = func.child();

    // Undeclared names become globals
    block
        .assign(&ident("implicit"), Value::Boolean(true))
        .expect("Failed to assign");
    assert!(global.is_declared_here(&ident("implicit")));

    func.declare(ident("c"), Value::Number(1.0), false);
    assert!(matches!(
        block.assign(&ident("c"), Value::Number(2.0)),
        Err(JsError::Type(_))
    ));

    func.declare(ident("m"), Value::Number(1.0), true);
    block
        .assign(&ident("m"), Value::Number(5.0))
        .expect("Failed to assign");
    assert_eq!(func.get(&ident("m")).ok(), Some(Value::Number(5.0)));
}

#[test]
fn test_var_hoisting_target() {
    let global = Scope::global();
    let func = global.function();
    let block = func.child().child();

    block.declare_var(&ident("v"));
    assert!(func.is_declared_here(&ident("v")));
    assert!(!block.is_declared_here(&ident("v")));
    assert!(!global.is_declared_here(&ident("v")));

    // Hoisting must not clobber an existing value
    func.declare(ident("w"), Value::Number(3.0), true);
    block.declare_var(&ident("w"));
    assert_eq!(func.get(&ident("w")).ok(), Some(Value::Number(3.0)));
}
