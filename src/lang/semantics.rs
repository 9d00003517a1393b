//! This module implements semantic analysis on the AST.
//!
//! JavaScript is dynamically typed so there is no type checking here. Instead the analyzer
//! reports the "early errors" the grammar alone does not catch: jumps outside of loops or
//! functions, invalid assignment targets, and `let`/`const` declarations that clash with another
//! declaration of the same name. All of these are `SyntaxError`s raised before any statement runs.

use std::collections::HashSet;

use crate::lang::ast::*;
use crate::lang::error::{JsError, Result};

/// Names declared in one scope
#[derive(Clone, Default)]
struct Frame {
    /// `let` and `const`
    lexical: HashSet<Identifier>,
    /// `var`s declared in or hoisted through this scope, plus parameters and function-level
    /// function declarations
    vars: HashSet<Identifier>,
    /// Functions declared directly inside a block
    functions: HashSet<Identifier>,
    function_boundary: bool,
}

impl Frame {
    fn new(function_boundary: bool) -> Self {
        Self {
            function_boundary,
            ..Default::default()
        }
    }
}

pub struct SemanticAnalyzer {
    loop_depth: u32,
    function_depth: u32,
    /// Innermost scope last. The first frame is the global scope.
    scopes: Vec<Frame>,
}

fn syntax_error<T>(msg: String) -> Result<T> {
    Err(JsError::Syntax(msg))
}

fn redeclared<T>(ident: &Identifier) -> Result<T> {
    syntax_error(format!("Identifier '{}' has already been declared", ident))
}

/// Whether `expr` may appear on the left hand side of an assignment
fn is_valid_target(expr: &Expression) -> bool {
    match expr {
        Expression::PrimaryExpression(PrimaryExpression::Identifier(_))
        | Expression::FieldAccess(_, _)
        | Expression::ArrayIndex(_, _) => true,
        Expression::PrimaryExpression(PrimaryExpression::Paren(inner)) => is_valid_target(inner),
        _ => false,
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            loop_depth: 0,
            function_depth: 0,
            scopes: vec![Frame::new(true)],
        }
    }

    fn current(&mut self) -> Result<&mut Frame> {
        self.scopes
            .last_mut()
            .ok_or_else(|| JsError::Internal("Scope stack is empty".to_string()))
    }

    fn declare_lexical(&mut self, ident: &Identifier) -> Result<()> {
        let frame = self.current()?;
        if frame.lexical.contains(ident)
            || frame.vars.contains(ident)
            || frame.functions.contains(ident)
        {
            return redeclared(ident);
        }
        frame.lexical.insert(ident.clone());

        Ok(())
    }

    /// A `var` is visible in every scope up to the enclosing function
    fn declare_var(&mut self, ident: &Identifier) -> Result<()> {
        for frame in self.scopes.iter_mut().rev() {
            if frame.lexical.contains(ident)
                || (!frame.function_boundary && frame.functions.contains(ident))
            {
                return redeclared(ident);
            }
            frame.vars.insert(ident.clone());

            if frame.function_boundary {
                break;
            }
        }

        Ok(())
    }

    /// Function declarations act like `var` at function level and like `let` inside blocks
    fn declare_function(&mut self, ident: &Identifier) -> Result<()> {
        let frame = self.current()?;
        if frame.lexical.contains(ident) {
            return redeclared(ident);
        }

        if frame.function_boundary {
            frame.vars.insert(ident.clone());
        } else if frame.vars.contains(ident) {
            return redeclared(ident);
        } else {
            frame.functions.insert(ident.clone());
        }

        Ok(())
    }

    fn analyze_expr(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::PrimaryExpression(primary) => match primary {
                PrimaryExpression::Identifier(_)
                | PrimaryExpression::Constant(_)
                | PrimaryExpression::Str(_) => Ok(()),
                PrimaryExpression::Paren(e) => self.analyze_expr(e),
                PrimaryExpression::Array(items) => self.analyze_exprs(items),
                PrimaryExpression::Object(props) => {
                    for (_, value) in props {
                        self.analyze_expr(value)?;
                    }

                    Ok(())
                }
                PrimaryExpression::Function(func) => self.analyze_function(func),
            },
            Expression::FieldAccess(e, _) => self.analyze_expr(e),
            Expression::ArrayIndex(e, index) => {
                self.analyze_expr(e)?;
                self.analyze_expr(index)
            }
            Expression::FunctionCall(callee, args) | Expression::New(callee, args) => {
                self.analyze_expr(callee)?;
                self.analyze_exprs(args)
            }
            Expression::BinaryExpression(binop) => {
                let (lhs, rhs) = binop.operands();
                self.analyze_expr(lhs)?;
                self.analyze_expr(rhs)
            }
            Expression::UnaryExpression(unop) => match unop {
                UnaryExpression::BitNot(e)
                | UnaryExpression::Not(e)
                | UnaryExpression::Minus(e)
                | UnaryExpression::Plus(e)
                | UnaryExpression::TypeOf(e) => self.analyze_expr(e),
            },
            Expression::UpdateExpression(update) => {
                let target = update.target();
                if !is_valid_target(target) {
                    return syntax_error(
                        "Invalid left-hand side expression in update operation".to_string(),
                    );
                }

                self.analyze_expr(target)
            }
            Expression::Assign(_, lhs, rhs) => {
                if !is_valid_target(lhs) {
                    return syntax_error("Invalid left-hand side in assignment".to_string());
                }

                self.analyze_expr(lhs)?;
                self.analyze_expr(rhs)
            }
            Expression::Conditional(cond, t, f) => {
                self.analyze_expr(cond)?;
                self.analyze_expr(t)?;
                self.analyze_expr(f)
            }
        }
    }

    fn analyze_exprs(&mut self, exprs: &[Expression]) -> Result<()> {
        for expr in exprs {
            self.analyze_expr(expr)?;
        }

        Ok(())
    }

    /// Function bodies start with a clean slate: a `break` inside a function nested in a loop
    /// is still illegal
    fn analyze_function(&mut self, func: &FunctionDefinition) -> Result<()> {
        let loop_depth = self.loop_depth;
        self.loop_depth = 0;
        self.function_depth += 1;

        let mut frame = Frame::new(true);
        frame.vars.extend(func.params.iter().cloned());
        self.scopes.push(frame);

        let ret = self.analyze_stmts(&func.body);

        self.scopes.pop();
        self.function_depth -= 1;
        self.loop_depth = loop_depth;

        ret
    }

    fn analyze_stmts(&mut self, stmts: &[Statement]) -> Result<()> {
        for stmt in stmts {
            self.analyze_stmt(stmt)?;
        }

        Ok(())
    }

    /// Analyze `stmts` in a fresh block scope
    fn analyze_block(&mut self, stmts: &[Statement]) -> Result<()> {
        self.scopes.push(Frame::new(false));
        let ret = self.analyze_stmts(stmts);
        self.scopes.pop();

        ret
    }

    fn analyze_loop_body(&mut self, body: &Statement) -> Result<()> {
        self.loop_depth += 1;
        let ret = self.analyze_stmt(body);
        self.loop_depth -= 1;

        ret
    }

    fn analyze_declaration(
        &mut self,
        kind: DeclarationKind,
        declarators: &[(Identifier, Option<Expression>)],
    ) -> Result<()> {
        for (ident, init) in declarators {
            if let Some(init) = init {
                self.analyze_expr(init)?;
            }

            match kind {
                DeclarationKind::Var => self.declare_var(ident)?,
                DeclarationKind::Const if init.is_none() => {
                    return syntax_error("Missing initializer in const declaration".to_string())
                }
                DeclarationKind::Let | DeclarationKind::Const => self.declare_lexical(ident)?,
            };
        }

        Ok(())
    }

    fn analyze_for(
        &mut self,
        init: Option<&Statement>,
        cond: Option<&Expression>,
        update: Option<&Expression>,
        body: &Statement,
    ) -> Result<()> {
        if let Some(init) = init {
            self.analyze_stmt(init)?;
        }
        if let Some(cond) = cond {
            self.analyze_expr(cond)?;
        }
        if let Some(update) = update {
            self.analyze_expr(update)?;
        }

        self.analyze_loop_body(body)
    }

    fn analyze_block_stmt(&mut self, block: &BlockStatement) -> Result<()> {
        match block {
            BlockStatement::If(cond, true_body, false_body) => {
                self.analyze_expr(cond)?;
                self.analyze_stmt(true_body)?;
                if let Some(false_body) = false_body {
                    self.analyze_stmt(false_body)?;
                }

                Ok(())
            }
            BlockStatement::While(cond, body) => {
                self.analyze_expr(cond)?;
                self.analyze_loop_body(body)
            }
            BlockStatement::DoWhile(body, cond) => {
                self.analyze_loop_body(body)?;
                self.analyze_expr(cond)
            }
            BlockStatement::For(init, cond, update, body) => {
                // `let` in the loop head is scoped to the loop
                self.scopes.push(Frame::new(false));
                let ret = self.analyze_for(init.as_deref(), cond.as_ref(), update.as_ref(), body);
                self.scopes.pop();

                ret
            }
            BlockStatement::Block(stmts) => self.analyze_block(stmts),
            BlockStatement::Try(body, handler, finalizer) => {
                self.analyze_block(body)?;
                if let Some(handler) = handler {
                    self.analyze_block(&handler.body)?;
                }
                if let Some(finalizer) = finalizer {
                    self.analyze_block(finalizer)?;
                }

                Ok(())
            }
        }
    }

    fn analyze_stmt(&mut self, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::Declaration(kind, declarators) => {
                self.analyze_declaration(*kind, declarators)
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(name) = &func.name {
                    self.declare_function(name)?;
                }

                self.analyze_function(func)
            }
            Statement::BlockStatement(block) => self.analyze_block_stmt(block),
            Statement::JumpStatement(jump) => match jump {
                JumpStatement::Break | JumpStatement::Continue => {
                    if self.loop_depth == 0 {
                        return syntax_error(format!("Illegal '{}' statement", jump));
                    }

                    Ok(())
                }
                JumpStatement::Return(value) => {
                    if self.function_depth == 0 {
                        return syntax_error("Illegal 'return' statement".to_string());
                    }

                    match value {
                        Some(v) => self.analyze_expr(v),
                        None => Ok(()),
                    }
                }
                JumpStatement::Throw(value) => self.analyze_expr(value),
            },
            Statement::ExpressionStatement(expr) => self.analyze_expr(expr),
            Statement::Empty => Ok(()),
        }
    }

    /// Analyze a program
    ///
    /// Names declared at the top level are remembered across calls, so a REPL session cannot
    /// declare the same `let` twice
    pub fn analyze(&mut self, stmts: &[Statement]) -> Result<()> {
        // Restore the stack in case a previous call bailed out half way through
        self.scopes.truncate(1);
        self.loop_depth = 0;
        self.function_depth = 0;

        // A rejected program must not leave its declarations behind
        let globals = self
            .scopes
            .first()
            .cloned()
            .unwrap_or_else(|| Frame::new(true));
        let ret = self.analyze_stmts(stmts);
        if ret.is_err() {
            self.scopes = vec![globals];
        }

        ret
    }
}

#[cfg(test)]
fn analyze(stmts: &[Statement]) -> Result<()> {
    SemanticAnalyzer::new().analyze(stmts)
}

#[cfg(test)]
fn parse(prog: &str) -> Vec<Statement> {
    use crate::lang::parse::parse;
    parse(prog).expect("Failed to parse")
}

#[test]
fn test_jump_outside_loop() {
    let bad = vec![
        "break;",
        "continue;",
        "if (x) { break; }",
        "while (true) { function f() { break; } }",
    ];
    for prog in bad {
        assert!(
            matches!(analyze(&parse(prog)), Err(JsError::Syntax(_))),
            "{}",
            prog
        );
    }

    let good = vec![
        "while (true) { break; continue; }",
        "do { if (x) break; } while (true)",
        "for (;;) { { continue; } }",
    ];
    for prog in good {
        assert!(analyze(&parse(prog)).is_ok(), "{}", prog);
    }
}

#[test]
fn test_return_outside_function() {
    assert!(analyze(&parse("return 1;")).is_err());
    assert!(analyze(&parse("function f() { if (x) { return 1; } }")).is_ok());
    assert!(analyze(&parse("var g = function () { return; };")).is_ok());
}

#[test]
fn test_assignment_targets() {
    let bad = vec!["1 = 2;", "f() = 3;", "a + b = 1;", "++1;", "(a + b)++;"];
    for prog in bad {
        assert!(analyze(&parse(prog)).is_err(), "{}", prog);
    }

    let good = vec!["a = 1;", "a.b = 1;", "a[0] += 1;", "(a) = 1;", "x++;", "--o.count;"];
    for prog in good {
        assert!(analyze(&parse(prog)).is_ok(), "{}", prog);
    }
}

#[test]
fn test_lexical_declarations() {
    assert!(analyze(&parse("let x = 1; let x = 2;")).is_err());
    assert!(analyze(&parse("let x = 1; const x = 2;")).is_err());
    assert!(analyze(&parse("const c;")).is_err());
    assert!(analyze(&parse("var v = 1; var v = 2;")).is_ok());
    assert!(analyze(&parse("let x = 1; { let x = 2; }")).is_ok());
    assert!(analyze(&parse("for (let i = 0; i < 1; i++) {} let i = 3;")).is_ok());

    // Top level declarations persist between programs
    let mut analyzer = SemanticAnalyzer::new();
    assert!(analyzer.analyze(&parse("let y = 1;")).is_ok());
    assert!(analyzer.analyze(&parse("let y = 2;")).is_err());
    assert!(analyzer.analyze(&parse("let z = 1; break;")).is_err());
    assert!(analyzer.analyze(&parse("let z = 2;")).is_ok());
    assert!(analyzer.analyze(&parse("var w = 1;")).is_ok());
    assert!(analyzer.analyze(&parse("let w = 2;")).is_err());
}

#[test]
fn test_var_and_function_conflicts() {
    let bad = vec![
        "let x = 1; var x = 2;",
        "var x = 1; let x = 2;",
        "let x = 1; { var x = 2; }",
        "{ var x = 1; } let x = 2;",
        "let f; function f() {}",
        "function f() {} let f;",
        "const g = 1; function g() {}",
        "{ function f() {} var f; }",
        "{ var f; function f() {} }",
        "function h(a) { let a; }",
        "for (let i = 0; i < 1; i++) { var i; }",
    ];
    for prog in bad {
        match analyze(&parse(prog)) {
            Err(JsError::Syntax(msg)) => {
                assert!(msg.contains("has already been declared"), "{}", msg)
            }
            other => panic!("{} was not rejected: {:?}", prog, other),
        }
    }

    let good = vec![
        "var x; var x;",
        "var f; function f() {}",
        "function f() {} function f() {}",
        "{ var x; } { let x; }",
        "let x; function g() { var x; }",
        "function h(a) { var a; }",
        "try { throw 1; } catch (e) { var e = 2; }",
        "{ function f() {} } var f;",
    ];
    for prog in good {
        assert!(analyze(&parse(prog)).is_ok(), "{}", prog);
    }
}
