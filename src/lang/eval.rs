use std::cmp::Ordering;
use std::io::Write;
use std::rc::Rc;

use log::trace;

use crate::lang::ast::*;
use crate::lang::error::{JsError, Result};
use crate::lang::functions::Builtin;
use crate::lang::value::{Closure, Function, Value};
use crate::lang::variables::Scope;

/// How a statement finished
///
/// Exceptions are not completions: they travel as `Err(JsError)`
#[derive(Debug)]
pub enum Completion {
    /// Carries the value of the last expression statement, if any
    Normal(Option<Value>),
    Return(Value),
    Break,
    Continue,
}

/// Where an assignment writes to
enum Reference {
    Variable(Identifier),
    /// (object, key)
    Property(Value, String),
}

/// Convert objects to their primitive (string) form, leave primitives alone
fn to_primitive(val: Value) -> Value {
    match val {
        Value::Array(_) | Value::Object(_) | Value::Function(_) => Value::String(val.to_string()),
        v => v,
    }
}

/// `+`: concatenates if either side is a string, adds otherwise
fn add_values(lhs: Value, rhs: Value) -> Value {
    let lhs = to_primitive(lhs);
    let rhs = to_primitive(rhs);

    match (&lhs, &rhs) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Value::String(format!("{}{}", lhs, rhs))
        }
        _ => Value::Number(lhs.to_number() + rhs.to_number()),
    }
}

/// Relational comparison. `None` means the operands are unordered (ie. NaN was involved).
fn compare_values(lhs: Value, rhs: Value) -> Option<Ordering> {
    let lhs = to_primitive(lhs);
    let rhs = to_primitive(rhs);

    match (&lhs, &rhs) {
        (Value::String(l), Value::String(r)) => Some(l.encode_utf16().cmp(r.encode_utf16())),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    }
}

fn apply_assign_op(op: AssignOp, lhs: Value, rhs: Value) -> Value {
    match op {
        AssignOp::Assign => rhs,
        AssignOp::Plus => add_values(lhs, rhs),
        AssignOp::Minus => Value::Number(lhs.to_number() - rhs.to_number()),
        AssignOp::Multiply => Value::Number(lhs.to_number() * rhs.to_number()),
        AssignOp::Divide => Value::Number(lhs.to_number() / rhs.to_number()),
        AssignOp::Modulo => Value::Number(lhs.to_number() % rhs.to_number()),
    }
}

/// Short description of an expression for error messages, eg. `obj.method`
fn describe(expr: &Expression) -> String {
    match expr {
        Expression::PrimaryExpression(PrimaryExpression::Identifier(ident)) => ident.to_string(),
        Expression::PrimaryExpression(PrimaryExpression::Paren(e)) => describe(e),
        Expression::FieldAccess(e, field) => format!("{}.{}", describe(e), field),
        Expression::ArrayIndex(e, _) => format!("{}[...]", describe(e)),
        Expression::FunctionCall(e, _) => format!("{}(...)", describe(e)),
        _ => "expression".to_string(),
    }
}

fn make_closure(definition: &Rc<FunctionDefinition>, scope: &Scope) -> Value {
    Value::Function(Function::Closure(Rc::new(Closure {
        definition: definition.clone(),
        scope: scope.clone(),
    })))
}

/// Declare every `var` in `stmts` (but not in nested functions) in `scope`
fn hoist_vars(stmts: &[Statement], scope: &Scope) {
    for stmt in stmts {
        hoist_vars_stmt(stmt, scope);
    }
}

fn hoist_vars_stmt(stmt: &Statement, scope: &Scope) {
    let block = match stmt {
        Statement::Declaration(DeclarationKind::Var, declarators) => {
            for (ident, _) in declarators {
                scope.declare_var(ident);
            }
            return;
        }
        Statement::BlockStatement(block) => block,
        _ => return,
    };

    match block {
        BlockStatement::If(_, true_body, false_body) => {
            hoist_vars_stmt(true_body, scope);
            if let Some(false_body) = false_body {
                hoist_vars_stmt(false_body, scope);
            }
        }
        BlockStatement::While(_, body) | BlockStatement::DoWhile(body, _) => {
            hoist_vars_stmt(body, scope)
        }
        BlockStatement::For(init, _, _, body) => {
            if let Some(init) = init {
                hoist_vars_stmt(init, scope);
            }
            hoist_vars_stmt(body, scope);
        }
        BlockStatement::Block(stmts) => hoist_vars(stmts, scope),
        BlockStatement::Try(body, handler, finalizer) => {
            hoist_vars(body, scope);
            if let Some(handler) = handler {
                hoist_vars(&handler.body, scope);
            }
            if let Some(finalizer) = finalizer {
                hoist_vars(finalizer, scope);
            }
        }
    }
}

/// Bind the function declarations of a statement list before any of it runs
fn hoist_functions(stmts: &[Statement], scope: &Scope) {
    for stmt in stmts {
        if let Statement::FunctionDeclaration(definition) = stmt {
            if let Some(name) = &definition.name {
                scope.declare(name.clone(), make_closure(definition, scope), true);
            }
        }
    }
}

pub struct Eval<'a> {
    sink: &'a mut dyn Write,
    global: Scope,
    call_depth: usize,
    max_call_depth: usize,
}

impl<'a> Eval<'a> {
    fn eval_primary_expr(&mut self, expr: &PrimaryExpression, scope: &Scope) -> Result<Value> {
        let val = match expr {
            PrimaryExpression::Identifier(ident) => scope.get(ident)?,
            PrimaryExpression::Constant(c) => match c {
                Constant::Number(n) => Value::Number(*n),
                Constant::Boolean(b) => Value::Boolean(*b),
                Constant::Null => Value::Null,
            },
            PrimaryExpression::Str(s) => Value::String(s.clone()),
            PrimaryExpression::Paren(expr) => self.eval_expr(expr, scope)?,
            PrimaryExpression::Array(items) => Value::new_array(self.eval_exprs(items, scope)?),
            PrimaryExpression::Object(props) => {
                let mut properties: Vec<(String, Value)> = Vec::with_capacity(props.len());
                for (key, expr) in props {
                    let val = self.eval_expr(expr, scope)?;
                    // Later duplicates overwrite earlier ones but keep the first position
                    match properties.iter_mut().find(|(k, _)| k == key) {
                        Some((_, v)) => *v = val,
                        None => properties.push((key.clone(), val)),
                    }
                }

                Value::new_object(properties)
            }
            PrimaryExpression::Function(definition) => match &definition.name {
                // A named function expression can refer to itself by name
                Some(name) => {
                    let inner = scope.child();
                    let func = make_closure(definition, &inner);
                    inner.declare(name.clone(), func.clone(), true);

                    func
                }
                None => make_closure(definition, scope),
            },
        };

        Ok(val)
    }

    fn eval_binop_expr(&mut self, binop: &BinaryExpression, scope: &Scope) -> Result<Value> {
        // `&&` and `||` short circuit and evaluate to one of their operands
        match binop {
            BinaryExpression::LogicalAnd(lhs, rhs) => {
                let lhs = self.eval_expr(lhs, scope)?;
                return if lhs.to_boolean() {
                    self.eval_expr(rhs, scope)
                } else {
                    Ok(lhs)
                };
            }
            BinaryExpression::LogicalOr(lhs, rhs) => {
                let lhs = self.eval_expr(lhs, scope)?;
                return if lhs.to_boolean() {
                    Ok(lhs)
                } else {
                    self.eval_expr(rhs, scope)
                };
            }
            _ => (),
        };

        let (lhs, rhs) = binop.operands();
        let l = self.eval_expr(lhs, scope)?;
        let r = self.eval_expr(rhs, scope)?;

        let val = match binop {
            BinaryExpression::Plus(_, _) => add_values(l, r),
            BinaryExpression::Minus(_, _) => Value::Number(l.to_number() - r.to_number()),
            BinaryExpression::Multiply(_, _) => Value::Number(l.to_number() * r.to_number()),
            BinaryExpression::Divide(_, _) => Value::Number(l.to_number() / r.to_number()),
            BinaryExpression::Modulo(_, _) => Value::Number(l.to_number() % r.to_number()),
            BinaryExpression::Equals(_, _) => Value::Boolean(l.loose_equals(&r)),
            BinaryExpression::NotEquals(_, _) => Value::Boolean(!l.loose_equals(&r)),
            BinaryExpression::StrictEquals(_, _) => Value::Boolean(l.strict_equals(&r)),
            BinaryExpression::StrictNotEquals(_, _) => Value::Boolean(!l.strict_equals(&r)),
            BinaryExpression::BitOr(_, _) => Value::Number((l.to_int32() | r.to_int32()) as f64),
            BinaryExpression::BitAnd(_, _) => Value::Number((l.to_int32() & r.to_int32()) as f64),
            BinaryExpression::BitXor(_, _) => Value::Number((l.to_int32() ^ r.to_int32()) as f64),
            BinaryExpression::LeftShift(_, _) => {
                Value::Number(l.to_int32().wrapping_shl(r.to_uint32() & 31) as f64)
            }
            BinaryExpression::RightShift(_, _) => {
                Value::Number(l.to_int32().wrapping_shr(r.to_uint32() & 31) as f64)
            }
            BinaryExpression::UnsignedRightShift(_, _) => {
                Value::Number(l.to_uint32().wrapping_shr(r.to_uint32() & 31) as f64)
            }
            BinaryExpression::LessThan(_, _) => {
                Value::Boolean(compare_values(l, r) == Some(Ordering::Less))
            }
            BinaryExpression::LessThanEquals(_, _) => Value::Boolean(matches!(
                compare_values(l, r),
                Some(Ordering::Less) | Some(Ordering::Equal)
            )),
            BinaryExpression::GreaterThan(_, _) => {
                Value::Boolean(compare_values(l, r) == Some(Ordering::Greater))
            }
            BinaryExpression::GreaterThanEquals(_, _) => Value::Boolean(matches!(
                compare_values(l, r),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            )),
            BinaryExpression::LogicalAnd(_, _) | BinaryExpression::LogicalOr(_, _) => {
                return Err(JsError::Internal(format!(
                    "Logical operator '{}' was not short circuited",
                    binop.op_str()
                )))
            }
        };

        Ok(val)
    }

    fn eval_unary_expr(&mut self, unary: &UnaryExpression, scope: &Scope) -> Result<Value> {
        let val = match unary {
            UnaryExpression::BitNot(e) => Value::Number(!self.eval_expr(e, scope)?.to_int32() as f64),
            UnaryExpression::Not(e) => Value::Boolean(!self.eval_expr(e, scope)?.to_boolean()),
            UnaryExpression::Minus(e) => Value::Number(-self.eval_expr(e, scope)?.to_number()),
            UnaryExpression::Plus(e) => Value::Number(self.eval_expr(e, scope)?.to_number()),
            UnaryExpression::TypeOf(e) => {
                // `typeof` is the one place an undeclared name is not an error
                let undeclared = match &**e {
                    Expression::PrimaryExpression(PrimaryExpression::Identifier(ident)) => {
                        scope.lookup(ident).is_none()
                    }
                    _ => false,
                };

                if undeclared {
                    Value::String("undefined".to_string())
                } else {
                    Value::String(self.eval_expr(e, scope)?.typeof_str().to_string())
                }
            }
        };

        Ok(val)
    }

    fn eval_update_expr(&mut self, update: &UpdateExpression, scope: &Scope) -> Result<Value> {
        let reference = self.eval_reference(update.target(), scope)?;
        let old = self.get_reference(&reference, scope)?.to_number();

        let (new, result) = match update {
            UpdateExpression::PreIncrement(_) => (old + 1.0, old + 1.0),
            UpdateExpression::PreDecrement(_) => (old - 1.0, old - 1.0),
            UpdateExpression::PostIncrement(_) => (old + 1.0, old),
            UpdateExpression::PostDecrement(_) => (old - 1.0, old),
        };

        self.put_reference(&reference, Value::Number(new), scope)?;

        Ok(Value::Number(result))
    }

    /// Evaluates where the left hand side of an assignment should write to
    fn eval_reference(&mut self, expr: &Expression, scope: &Scope) -> Result<Reference> {
        match expr {
            Expression::PrimaryExpression(PrimaryExpression::Identifier(ident)) => {
                Ok(Reference::Variable(ident.clone()))
            }
            Expression::PrimaryExpression(PrimaryExpression::Paren(e)) => {
                self.eval_reference(e, scope)
            }
            Expression::FieldAccess(e, field) => {
                let obj = self.eval_expr(e, scope)?;
                Ok(Reference::Property(obj, field.to_string()))
            }
            Expression::ArrayIndex(e, index) => {
                let obj = self.eval_expr(e, scope)?;
                let key = self.eval_expr(index, scope)?.to_string();
                Ok(Reference::Property(obj, key))
            }
            _ => Err(JsError::Syntax(
                "Invalid left-hand side in assignment".to_string(),
            )),
        }
    }

    fn get_reference(&self, reference: &Reference, scope: &Scope) -> Result<Value> {
        match reference {
            Reference::Variable(ident) => scope.get(ident),
            Reference::Property(obj, key) => obj.get_property(key),
        }
    }

    fn put_reference(&self, reference: &Reference, val: Value, scope: &Scope) -> Result<()> {
        match reference {
            Reference::Variable(ident) => scope.assign(ident, val),
            Reference::Property(obj, key) => obj.set_property(key, val),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> Result<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);

        let val = match builtin {
            Builtin::Log | Builtin::Print => {
                let line = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(" ");
                writeln!(self.sink, "{}", line)?;

                Value::Undefined
            }
            Builtin::Error => return Err(JsError::Test(arg(0).to_string())),
            Builtin::IsNaN => Value::Boolean(arg(0).to_number().is_nan()),
            Builtin::IsFinite => Value::Boolean(arg(0).to_number().is_finite()),
            Builtin::String => match args.first() {
                Some(v) => Value::String(v.to_string()),
                None => Value::String(String::new()),
            },
            Builtin::Number => match args.first() {
                Some(v) => Value::Number(v.to_number()),
                None => Value::Number(0.0),
            },
            Builtin::Boolean => Value::Boolean(arg(0).to_boolean()),
            Builtin::ErrorCtor(kind) => {
                let message = match arg(0) {
                    Value::Undefined => String::new(),
                    v => v.to_string(),
                };

                Value::error_object(&kind.to_string(), &message)
            }
        };

        Ok(val)
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value> {
        if self.call_depth >= self.max_call_depth {
            return Err(JsError::Range(
                "Maximum call stack size exceeded".to_string(),
            ));
        }

        let definition = &closure.definition;
        let scope = closure.scope.function();
        let mut args = args.into_iter();
        for param in &definition.params {
            scope.declare(param.clone(), args.next().unwrap_or(Value::Undefined), true);
        }
        hoist_vars(&definition.body, &scope);

        trace!(
            "Calling function '{}' at depth {}",
            definition.name.as_ref().map_or("", |n| n.0.as_str()),
            self.call_depth
        );

        self.call_depth += 1;
        let ret = self.eval_stmts(&definition.body, &scope);
        self.call_depth -= 1;

        match ret? {
            Completion::Return(v) => Ok(v),
            Completion::Normal(_) => Ok(Value::Undefined),
            Completion::Break | Completion::Continue => Err(JsError::Internal(
                "Unhandled control flow completion in function body".to_string(),
            )),
        }
    }

    pub fn call_function(&mut self, func: &Function, args: Vec<Value>) -> Result<Value> {
        match func {
            Function::Builtin(builtin) => self.call_builtin(*builtin, args),
            Function::Closure(closure) => self.call_closure(closure, args),
        }
    }

    fn eval_exprs(&mut self, exprs: &[Expression], scope: &Scope) -> Result<Vec<Value>> {
        let mut vals = Vec::with_capacity(exprs.len());
        for expr in exprs {
            vals.push(self.eval_expr(expr, scope)?);
        }

        Ok(vals)
    }

    fn eval_expr(&mut self, expr: &Expression, scope: &Scope) -> Result<Value> {
        match expr {
            Expression::PrimaryExpression(pe) => self.eval_primary_expr(pe, scope),
            Expression::FieldAccess(e, field) => self.eval_expr(e, scope)?.get_property(&field.0),
            Expression::ArrayIndex(e, index) => {
                let obj = self.eval_expr(e, scope)?;
                let key = self.eval_expr(index, scope)?.to_string();
                obj.get_property(&key)
            }
            Expression::FunctionCall(callee, args) => {
                let func = self.eval_expr(callee, scope)?;
                let args = self.eval_exprs(args, scope)?;

                match func {
                    Value::Function(func) => self.call_function(&func, args),
                    _ => Err(JsError::Type(format!(
                        "{} is not a function",
                        describe(callee)
                    ))),
                }
            }
            Expression::New(callee, args) => {
                let func = self.eval_expr(callee, scope)?;
                let args = self.eval_exprs(args, scope)?;

                match func {
                    Value::Function(Function::Builtin(b)) if b.is_constructor() => {
                        self.call_builtin(b, args)
                    }
                    _ => Err(JsError::Type(format!(
                        "{} is not a constructor",
                        describe(callee)
                    ))),
                }
            }
            Expression::BinaryExpression(binop) => self.eval_binop_expr(binop, scope),
            Expression::UnaryExpression(unary) => self.eval_unary_expr(unary, scope),
            Expression::UpdateExpression(update) => self.eval_update_expr(update, scope),
            Expression::Assign(op, lhs, rhs) => {
                // The target is resolved before the right hand side runs
                let reference = self.eval_reference(lhs, scope)?;
                let val = match op {
                    AssignOp::Assign => self.eval_expr(rhs, scope)?,
                    op => {
                        let old = self.get_reference(&reference, scope)?;
                        let rhs = self.eval_expr(rhs, scope)?;
                        apply_assign_op(*op, old, rhs)
                    }
                };

                self.put_reference(&reference, val.clone(), scope)?;

                Ok(val)
            }
            Expression::Conditional(cond, t, f) => {
                if self.eval_expr(cond, scope)?.to_boolean() {
                    self.eval_expr(t, scope)
                } else {
                    self.eval_expr(f, scope)
                }
            }
        }
    }

    fn eval_declaration(
        &mut self,
        kind: DeclarationKind,
        declarators: &[(Identifier, Option<Expression>)],
        scope: &Scope,
    ) -> Result<()> {
        for (ident, init) in declarators {
            let val = match init {
                Some(e) => Some(self.eval_expr(e, scope)?),
                None => None,
            };

            match kind {
                // Already hoisted, only the initializer runs here. The nearest binding wins so a
                // `var` inside `catch (e)` initializes the catch parameter.
                DeclarationKind::Var => {
                    if let Some(val) = val {
                        scope.assign(ident, val)?;
                    }
                }
                DeclarationKind::Let => {
                    scope.declare(ident.clone(), val.unwrap_or(Value::Undefined), true)
                }
                DeclarationKind::Const => {
                    scope.declare(ident.clone(), val.unwrap_or(Value::Undefined), false)
                }
            };
        }

        Ok(())
    }

    /// Run a loop body, returning `Some(completion)` if the loop must stop
    fn eval_loop_body(
        &mut self,
        body: &Statement,
        scope: &Scope,
        last: &mut Option<Value>,
    ) -> Result<Option<Completion>> {
        match self.eval_stmt(body, scope)? {
            Completion::Normal(v) => {
                if v.is_some() {
                    *last = v;
                }

                Ok(None)
            }
            Completion::Continue => Ok(None),
            Completion::Break => Ok(Some(Completion::Normal(last.take()))),
            r @ Completion::Return(_) => Ok(Some(r)),
        }
    }

    fn eval_while(&mut self, cond: &Expression, body: &Statement, scope: &Scope) -> Result<Completion> {
        let mut last = None;
        while self.eval_expr(cond, scope)?.to_boolean() {
            if let Some(done) = self.eval_loop_body(body, scope, &mut last)? {
                return Ok(done);
            }
        }

        Ok(Completion::Normal(last))
    }

    fn eval_do_while(
        &mut self,
        body: &Statement,
        cond: &Expression,
        scope: &Scope,
    ) -> Result<Completion> {
        let mut last = None;
        loop {
            if let Some(done) = self.eval_loop_body(body, scope, &mut last)? {
                return Ok(done);
            }

            if !self.eval_expr(cond, scope)?.to_boolean() {
                break;
            }
        }

        Ok(Completion::Normal(last))
    }

    fn eval_for(
        &mut self,
        init: Option<&Statement>,
        cond: Option<&Expression>,
        update: Option<&Expression>,
        body: &Statement,
        scope: &Scope,
    ) -> Result<Completion> {
        // `let`/`const` bindings in the loop head get a fresh copy per iteration so closures
        // created in the body capture that iteration's value
        let per_iteration: Vec<(Identifier, bool)> = match init {
            Some(Statement::Declaration(
                kind @ (DeclarationKind::Let | DeclarationKind::Const),
                declarators,
            )) => declarators
                .iter()
                .map(|(ident, _)| (ident.clone(), *kind == DeclarationKind::Let))
                .collect(),
            _ => Vec::new(),
        };

        let mut iter_scope = scope.child();
        if let Some(init) = init {
            self.eval_stmt(init, &iter_scope)?;
        }

        let mut last = None;
        loop {
            if let Some(cond) = cond {
                if !self.eval_expr(cond, &iter_scope)?.to_boolean() {
                    break;
                }
            }

            if let Some(done) = self.eval_loop_body(body, &iter_scope, &mut last)? {
                return Ok(done);
            }

            if !per_iteration.is_empty() {
                let next = scope.child();
                for (ident, mutable) in &per_iteration {
                    let val = iter_scope.lookup(ident).unwrap_or(Value::Undefined);
                    next.declare(ident.clone(), val, *mutable);
                }
                iter_scope = next;
            }

            if let Some(update) = update {
                self.eval_expr(update, &iter_scope)?;
            }
        }

        Ok(Completion::Normal(last))
    }

    fn eval_try(
        &mut self,
        body: &[Statement],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Statement]>,
        scope: &Scope,
    ) -> Result<Completion> {
        let mut result = self.eval_stmts(body, &scope.child());

        if let Some(handler) = handler {
            result = match result {
                Err(e) if e.is_catchable() => {
                    trace!("Caught {}", e);
                    let catch_scope = scope.child();
                    catch_scope.declare(handler.param.clone(), e.into_value(), true);
                    self.eval_stmts(&handler.body, &catch_scope)
                }
                r => r,
            };
        }

        if let Some(finalizer) = finalizer {
            // An abrupt `finally` overrides whatever the try/catch produced
            match self.eval_stmts(finalizer, &scope.child())? {
                Completion::Normal(_) => (),
                abrupt => return Ok(abrupt),
            };
        }

        result
    }

    fn eval_block_stmt(&mut self, block: &BlockStatement, scope: &Scope) -> Result<Completion> {
        match block {
            BlockStatement::If(cond, true_body, false_body) => {
                if self.eval_expr(cond, scope)?.to_boolean() {
                    self.eval_stmt(true_body, scope)
                } else if let Some(false_body) = false_body {
                    self.eval_stmt(false_body, scope)
                } else {
                    Ok(Completion::Normal(None))
                }
            }
            BlockStatement::While(cond, body) => self.eval_while(cond, body, scope),
            BlockStatement::DoWhile(body, cond) => self.eval_do_while(body, cond, scope),
            BlockStatement::For(init, cond, update, body) => self.eval_for(
                init.as_deref(),
                cond.as_ref(),
                update.as_ref(),
                body,
                scope,
            ),
            BlockStatement::Block(stmts) => self.eval_stmts(stmts, &scope.child()),
            BlockStatement::Try(body, handler, finalizer) => {
                self.eval_try(body, handler.as_ref(), finalizer.as_deref(), scope)
            }
        }
    }

    fn eval_stmt(&mut self, stmt: &Statement, scope: &Scope) -> Result<Completion> {
        let completion = match stmt {
            Statement::Declaration(kind, declarators) => {
                self.eval_declaration(*kind, declarators, scope)?;
                Completion::Normal(None)
            }
            // Bound when the enclosing statement list was entered
            Statement::FunctionDeclaration(_) => Completion::Normal(None),
            Statement::BlockStatement(block) => self.eval_block_stmt(block, scope)?,
            Statement::JumpStatement(jump) => match jump {
                JumpStatement::Break => Completion::Break,
                JumpStatement::Continue => Completion::Continue,
                JumpStatement::Return(value) => match value {
                    Some(e) => Completion::Return(self.eval_expr(e, scope)?),
                    None => Completion::Return(Value::Undefined),
                },
                JumpStatement::Throw(e) => return Err(JsError::Thrown(self.eval_expr(e, scope)?)),
            },
            Statement::ExpressionStatement(expr) => {
                Completion::Normal(Some(self.eval_expr(expr, scope)?))
            }
            Statement::Empty => Completion::Normal(None),
        };

        Ok(completion)
    }

    /// Run a statement list in `scope`
    ///
    /// Normal completion carries the value of the last expression statement that produced one
    fn eval_stmts(&mut self, stmts: &[Statement], scope: &Scope) -> Result<Completion> {
        hoist_functions(stmts, scope);

        let mut last = None;
        for stmt in stmts {
            match self.eval_stmt(stmt, scope)? {
                Completion::Normal(Some(v)) => last = Some(v),
                Completion::Normal(None) => (),
                abrupt => return Ok(abrupt),
            }
        }

        Ok(Completion::Normal(last))
    }

    /// Create a new `Eval` instance
    ///
    /// `sink` is where output should be written. eg. output of `log()` calls
    ///
    /// `max_call_depth` bounds how deeply script functions may recurse
    pub fn new(sink: &'a mut dyn Write, max_call_depth: usize) -> Self {
        Self {
            sink,
            global: Scope::global(),
            call_depth: 0,
            max_call_depth,
        }
    }

    pub fn sink(&mut self) -> &mut (dyn Write + 'a) {
        &mut *self.sink
    }

    /// Evaluate a program in the global scope
    ///
    /// Returns the value of the last expression statement, if any. Globals persist between
    /// calls.
    pub fn eval(&mut self, stmts: &[Statement]) -> Result<Option<Value>> {
        let global = self.global.clone();
        hoist_vars(stmts, &global);

        // A previous program may have bailed out of a call with an error
        self.call_depth = 0;

        match self.eval_stmts(stmts, &global)? {
            Completion::Normal(v) => Ok(v),
            c => Err(JsError::Internal(format!(
                "Unhandled control flow completion: {:?}",
                c
            ))),
        }
    }
}

#[cfg(test)]
fn run_with_depth(prog: &str, max_call_depth: usize) -> (Result<Option<Value>>, String) {
    use crate::lang::parse::parse;

    let mut output = Vec::new();
    let res = {
        let mut eval = Eval::new(&mut output, max_call_depth);
        parse(prog).and_then(|stmts| eval.eval(&stmts))
    };

    (res, String::from_utf8(output).expect("Output not utf-8"))
}

#[cfg(test)]
fn run(prog: &str) -> (Result<Option<Value>>, String) {
    run_with_depth(prog, 100)
}

#[test]
fn test_expression() {
    let tests = vec![
        ("log(~8);", "-9\n"),
        ("log(-8);", "-8\n"),
        ("log(!8);", "false\n"),
        ("log(!0);", "true\n"),
        ("log(5 + 5);", "10\n"),
        ("log(100 - 3);", "97\n"),
        ("log(100 / 8);", "12.5\n"),
        ("log(-7 % 3);", "-1\n"),
        ("log(1 / 0, -1 / 0, 0 / 0);", "Infinity -Infinity NaN\n"),
        ("log(1 + '2', '3' * '4');", "12 12\n"),
        ("log(1 == '1', 1 === '1', null == undefined);", "true false true\n"),
        ("log(7 & 1, 0 | 1 | 2, 1 ^ 3);", "1 3 2\n"),
        ("log(1 << 3, -16 >> 2, -1 >>> 28);", "8 -4 15\n"),
        ("log(1 < 3, 3 <= 3, 'b' > 'a', 3 >= 4);", "true true true false\n"),
        ("log(NaN < 1, NaN >= 1);", "false false\n"),
        ("log(0 || 'x', 1 && 'y', null && f());", "x y null\n"),
        ("log(true ? 'a' : 'b');", "a\n"),
        ("log(typeof 1, typeof 'a', typeof null, typeof log);", "number string object function\n"),
        ("log(typeof undeclared);", "undefined\n"),
        ("log([1, [2, 3]] + '', {} + '');", "1,2,3 [object Object]\n"),
        ("log(String(12), Number('0x1f'), Boolean(''), isNaN('x'));", "12 31 false true\n"),
        ("log(isFinite(1), isFinite('2'), isFinite('x'), isFinite(1 / 0));", "true true false false\n"),
        ("$PRINT('a', 1);", "a 1\n"),
        // Strings compare by UTF-16 code unit, not by UTF-8 byte
        ("log('\\uFF61' < '\\uD83D\\uDE00', 'ab' < 'b', 'a' < 'ab');", "false true true\n"),
    ];

    for (input, expected) in tests {
        let (res, output) = run(input);
        assert!(res.is_ok(), "{}: {:?}", input, res);
        assert_eq!(output, expected, "{}", input);
    }
}

#[test]
fn test_assignment() {
    let tests = vec![
        ("var x = 1; x += 2; x *= 3; log(x);", "9\n"),
        ("var s = 'a'; s += 1; log(s);", "a1\n"),
        ("var i = 0; log(i++, i, ++i, i--, --i);", "0 1 2 2 0\n"),
        ("a = b = 3; log(a, b);", "3 3\n"),
        ("var o = {n: 1}; o.n++; o['n'] += 10; log(o.n);", "12\n"),
        ("log(v); var v = 5; log(v);", "undefined\n5\n"),
    ];

    for (input, expected) in tests {
        let (res, output) = run(input);
        assert!(res.is_ok(), "{}: {:?}", input, res);
        assert_eq!(output, expected, "{}", input);
    }

    let (res, _) = run("const c = 1; c = 2;");
    assert!(matches!(res, Err(JsError::Type(_))));
}

#[test]
fn test_control_flow() {
    let tests = vec![
        (
            "var x = 0; while (true) { if (x == 3) { log(x); break; } x = x + 1; }",
            "3\n",
        ),
        ("var n = 0; do { n++; } while (n < 5) log(n);", "5\n"),
        (
            "for (var i = 0; i < 5; i++) { if (i % 2) continue; log(i); }",
            "0\n2\n4\n",
        ),
        (
            "var fs = []; for (let i = 0; i < 3; i++) { fs[i] = function () { return i; }; } log(fs[0](), fs[2]());",
            "0 2\n",
        ),
        ("if (0) log('no'); else if (1) log('yes');", "yes\n"),
        ("let x = 1; { let x = 2; log(x); } log(x);", "2\n1\n"),
    ];

    for (input, expected) in tests {
        let (res, output) = run(input);
        assert!(res.is_ok(), "{}: {:?}", input, res);
        assert_eq!(output, expected, "{}", input);
    }
}

#[test]
fn test_factorial() {
    let (res, output) = run(include_str!("../../demos/factorial.js"));
    assert!(res.is_ok(), "{:?}", res);
    assert_eq!(output, "1! = 1\n5! = 120\n11! = 39916800\n");
}

#[test]
fn test_closure_counters() {
    let (res, output) = run(include_str!("../../demos/closure.js"));
    assert!(res.is_ok(), "{:?}", res);
    assert_eq!(output, "Counter 1:\n0\n1\n2\nCounter 2:\n0\n1\n2\n");
}

#[test]
fn test_semicolon_fixture_runs() {
    let (res, output) = run(include_str!(
        "../../sputnik/07_Lexical_Conventions/7.9_Automatic_Semicolon_Insertion/S7.9_A8_T4.js"
    ));
    assert_eq!(res.ok(), Some(Some(Value::Number(1.0))));
    assert_eq!(output, "");
}

#[test]
fn test_functions() {
    let tests = vec![
        ("function f(a, b) { return b; } log(f(1));", "undefined\n"),
        ("function f() {} log(f(1, 2));", "undefined\n"),
        ("log(g()); function g() { return 'hoisted'; }", "hoisted\n"),
        (
            "var fact = function me(n) { return n < 2 ? 1 : n * me(n - 1); }; log(fact(5));",
            "120\n",
        ),
        ("function f(a) { a = 2; return a; } var a = 1; log(f(a), a);", "2 1\n"),
        ("log(log.name, (function (a, b) {}).length);", "log 2\n"),
    ];

    for (input, expected) in tests {
        let (res, output) = run(input);
        assert!(res.is_ok(), "{}: {:?}", input, res);
        assert_eq!(output, expected, "{}", input);
    }

    let (res, _) = run("var x = 1; x();");
    match res {
        Err(JsError::Type(msg)) => assert_eq!(msg, "x is not a function"),
        r => panic!("Unexpected result: {:?}", r),
    }

    let (res, _) = run("var o = {}; o.missing();");
    match res {
        Err(JsError::Type(msg)) => assert_eq!(msg, "o.missing is not a function"),
        r => panic!("Unexpected result: {:?}", r),
    }

    let (res, _) = run("function f() {} new f();");
    match res {
        Err(JsError::Type(msg)) => assert_eq!(msg, "f is not a constructor"),
        r => panic!("Unexpected result: {:?}", r),
    }

    let (res, output) = run("var e = new TypeError('t'); log(e.name, e.message);");
    assert!(res.is_ok(), "{:?}", res);
    assert_eq!(output, "TypeError t\n");
}

#[test]
fn test_recursion_limit() {
    let (res, _) = run_with_depth("function f(n) { return f(n + 1); } f(0);", 20);
    match res {
        Err(JsError::Range(msg)) => assert_eq!(msg, "Maximum call stack size exceeded"),
        r => panic!("Unexpected result: {:?}", r),
    }

    // The error is catchable and the depth is restored afterwards
    let prog = r#"
        function f() { return f(); }
        try { f(); } catch (e) { log(e.name); }
        function g(n) { return n == 0 ? 0 : g(n - 1); }
        log(g(10));
    "#;
    let (res, output) = run_with_depth(prog, 20);
    assert!(res.is_ok(), "{:?}", res);
    assert_eq!(output, "RangeError\n0\n");
}

#[test]
fn test_try_catch_finally() {
    let tests = vec![
        ("try { throw 1; } catch (e) { log(e); }", "1\n"),
        ("try { undefinedVar; } catch (e) { log(e.name, e.message); }", "ReferenceError undefinedVar is not defined\n"),
        ("try { null.x; } catch (e) { log(e.name); }", "TypeError\n"),
        ("try { log('a'); } finally { log('b'); }", "a\nb\n"),
        (
            "try { throw new TypeError('bad'); } catch (e) { log(e); } finally { log('done'); }",
            "TypeError: bad\ndone\n",
        ),
        (
            "function f() { try { return 1; } finally { log('cleanup'); } } log(f());",
            "cleanup\n1\n",
        ),
        ("function f() { try { return 1; } finally { return 2; } } log(f());", "2\n"),
        (
            "var e = 'outer'; try { throw 'inner'; } catch (e) { log(e); } log(e);",
            "inner\nouter\n",
        ),
        // A `var` initializer inside `catch` writes the catch parameter
        (
            "try { throw 1; } catch (e) { var e = 2; log(e); } log(e);",
            "2\nundefined\n",
        ),
        (
            "for (var i = 0; i < 5; i++) { try { if (i == 1) continue; if (i == 2) break; log(i); } finally { log('f' + i); } } log(i);",
            "0\nf0\nf1\nf2\n2\n",
        ),
        (
            "var n = 0; while (true) { try { n++; if (n > 2) break; } finally { log(n); } }",
            "1\n2\n3\n",
        ),
    ];

    for (input, expected) in tests {
        let (res, output) = run(input);
        assert!(res.is_ok(), "{}: {:?}", input, res);
        assert_eq!(output, expected, "{}", input);
    }

    let (res, output) = run("try { throw 'x'; } finally { log('f'); }");
    assert!(matches!(res, Err(JsError::Thrown(Value::String(_)))));
    assert_eq!(output, "f\n");

    // `$ERROR` fails the test and cannot be swallowed
    let (res, _) = run("try { $ERROR('boom'); } catch (e) {}");
    match res {
        Err(JsError::Test(msg)) => assert_eq!(msg, "boom"),
        r => panic!("Unexpected result: {:?}", r),
    }
}

#[test]
fn test_arrays_and_objects() {
    let tests = vec![
        ("var a = [1, 2]; a[4] = 5; log(a.length, a);", "5 1,2,,,5\n"),
        ("var a = [1, 2, 3]; a.length = 1; log(a);", "1\n"),
        ("var a = [1]; var b = a; b[0] = 9; log(a[0], a === b);", "9 true\n"),
        ("var o = {a: 1, 'b c': 2}; o.d = 3; log(o.a, o['b c'], o.d, o.nope);", "1 2 3 undefined\n"),
        ("log('hello'.length, 'hello'[1]);", "5 e\n"),
        ("var o = {inner: {n: 1}}; o.inner.n = 2; log(o.inner.n);", "2\n"),
        ("var a = [1]; a.length = 3; log(a.length, a[2], a);", "3 undefined 1,,\n"),
        ("var a = []; a['18446744073709551615'] = 1; a[4294967295] = 2; log(a.length);", "0\n"),
    ];

    for (input, expected) in tests {
        let (res, output) = run(input);
        assert!(res.is_ok(), "{}: {:?}", input, res);
        assert_eq!(output, expected, "{}", input);
    }

    let (res, _) = run("var u; u.x;");
    match res {
        Err(JsError::Type(msg)) => assert!(msg.starts_with("Cannot read properties of undefined")),
        r => panic!("Unexpected result: {:?}", r),
    }

    let (res, _) = run("var n = null; n.x = 1;");
    match res {
        Err(JsError::Type(msg)) => {
            assert_eq!(msg, "Cannot set properties of null (setting 'x')")
        }
        r => panic!("Unexpected result: {:?}", r),
    }

    let (res, _) = run("var a = []; a.length = 4294967295;");
    assert!(matches!(res, Err(JsError::Range(_))));
}

#[test]
fn test_globals_persist() {
    use crate::lang::parse::parse;

    let mut output = Vec::new();
    {
        let mut eval = Eval::new(&mut output, 100);
        let first = parse("var counter = 1; function bump() { counter++; }")
            .expect("Failed to parse");
        assert!(eval.eval(&first).is_ok());

        let second = parse("bump(); counter;").expect("Failed to parse");
        let second = eval.eval(&second);
        assert_eq!(second.ok(), Some(Some(Value::Number(2.0))));
    }
    assert!(output.is_empty());
}
