//! This module implements the parser for jsrs' JavaScript subset.
//!
//! The grammar is written as a PEG (https://en.wikipedia.org/wiki/Parsing_expression_grammar)
//! with `pom` combinators. The usual PEG caveats apply:
//!
//! * A PEG is order sensitive. Longer tokens must be tried before their prefixes (`===` before
//!   `==`, `>>>` before `>>`) and keywords before identifiers.
//!
//! * PEGs may not have left recursion. Operator precedence is implemented with a "precedence
//!   ladder": lower precedence operators sit higher up in the call chain so they bind later.
//!
//! * Automatic semicolon insertion falls out of the statement terminator rule: a statement ends at
//!   `;`, at a line terminator, before `}`, or at end of input. Expressions are parsed greedily
//!   across line terminators, so a terminator only ends a statement when the next token cannot
//!   continue it. Restricted productions (`return`, `throw`, postfix `++`/`--`) only look at the
//!   current line.

use std::char::decode_utf16;
use std::char::REPLACEMENT_CHARACTER;
use std::collections::{HashSet, VecDeque};
use std::iter::FromIterator;
use std::rc::Rc;
use std::str::FromStr;

use lazy_static::lazy_static;
use pom::parser::{any, call, end, is_a, list, none_of, one_of, sym, tag, Parser};

use crate::lang::ast::*;
use crate::lang::error::{JsError, Result};
use crate::lang::value::number_to_string;

const LINE_TERMINATORS: &str = "\n\r\u{2028}\u{2029}";
const INLINE_WHITESPACE: &str = " \t\u{b}\u{c}\u{a0}\u{feff}";
const WHITESPACE: &str = " \t\u{b}\u{c}\u{a0}\u{feff}\n\r\u{2028}\u{2029}";

lazy_static! {
    static ref RESERVED_WORDS: HashSet<&'static str> = [
        "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
        "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
        "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this",
        "throw", "true", "try", "typeof", "var", "void", "while", "with",
    ]
    .iter()
    .cloned()
    .collect();
}

/// Macro to left fold a series of binary expressions
///
/// Left fold creates left-to-right associativity, ie:
///     1 + 2 + 3 + 4 => ((1 + 2) + 3) + 4
macro_rules! left_fold_binop {
    ($binop_ty: expr, $lhs: expr, $rest: expr) => {{
        let binop_create_fn =
            |_op, e, ee| -> BinaryExpression { $binop_ty(Box::new(e), Box::new(ee)) };

        // Assign dummy operators b/c we already know the binop type and ignore the operator
        // argument in `binop_create_fn`
        let rest = $rest
            .drain(0..)
            .map(|e| ("", e))
            .collect::<Vec<(&str, Expression)>>();

        left_fold_binop_multiop!(binop_create_fn, $lhs, rest)
    }};
}

/// Same as `left_fold_binop` except intead of taking one binop type, takes a function,
/// `binop_create_fn`, that creates an `BinaryExpression` based on the operator
macro_rules! left_fold_binop_multiop {
    ($binop_create_fn: expr, $lhs: expr, $rest: expr) => {{
        let func = || -> Expression {
            // Each entry is the deque is a tuple of (operation, expression)
            let mut deque: VecDeque<(&str, Expression)> = $rest.into();

            let mut expr = $lhs;
            while let Some((op, e)) = deque.pop_front() {
                expr = Expression::BinaryExpression($binop_create_fn(op, expr, e));
            }

            expr
        };

        func()
    }};
}

fn ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn line_comment<'a>() -> Parser<'a, char, ()> {
    (tag("//") * none_of(LINE_TERMINATORS).repeat(0..)).discard()
}

fn block_comment<'a>() -> Parser<'a, char, ()> {
    (tag("/*") * (!tag("*/") * any()).repeat(0..) - tag("*/")).discard()
}

/// A block comment that stays on the current line
fn inline_block_comment<'a>() -> Parser<'a, char, ()> {
    (tag("/*") * (!tag("*/") * none_of(LINE_TERMINATORS)).repeat(0..) - tag("*/")).discard()
}

/// Whitespace and comments, including line terminators
fn space<'a>() -> Parser<'a, char, ()> {
    (one_of(WHITESPACE).discard() | line_comment() | block_comment())
        .repeat(0..)
        .discard()
}

/// Whitespace and comments that do not cross a line terminator
fn hspace<'a>() -> Parser<'a, char, ()> {
    (one_of(INLINE_WHITESPACE).discard() | line_comment() | inline_block_comment())
        .repeat(0..)
        .discard()
}

/// Succeeds (without consuming) when no line terminator precedes the next token
fn no_line_break<'a>() -> Parser<'a, char, ()> {
    (hspace() * !one_of(LINE_TERMINATORS)).discard()
}

/// Matches `word` only when it is not the prefix of a longer identifier
fn keyword<'a>(word: &'static str) -> Parser<'a, char, ()> {
    (tag(word) - !is_a(ident_part)).discard()
}

fn identifier_name<'a>() -> Parser<'a, char, String> {
    (is_a(ident_start) + is_a(ident_part).repeat(0..))
        .collect()
        .map(String::from_iter)
}

fn identifier<'a>() -> Parser<'a, char, Identifier> {
    identifier_name().convert(|name| {
        if RESERVED_WORDS.contains(name.as_str()) {
            Err(format!("'{}' is a reserved word", name))
        } else {
            Ok(Identifier(name))
        }
    })
}

fn number<'a>() -> Parser<'a, char, f64> {
    let digits = || one_of("0123456789").repeat(1..);
    let hex = (sym('0') * one_of("xX") * is_a(|c: char| c.is_ascii_hexdigit()).repeat(1..))
        .map(String::from_iter)
        .convert(|digits| u64::from_str_radix(&digits, 16))
        .map(|n| n as f64);
    let mantissa = (digits() + (sym('.') + one_of("0123456789").repeat(0..)).opt()).discard()
        | (sym('.') + digits()).discard();
    let exponent = one_of("eE") + one_of("+-").opt() + digits();
    let decimal = (mantissa + exponent.opt())
        .collect()
        .map(String::from_iter)
        .convert(|s| f64::from_str(&s));

    (hex | decimal) - !is_a(ident_part)
}

fn escape_sequence<'a>() -> Parser<'a, char, String> {
    let special_char = sym('n').map(|_| '\n')
        | sym('t').map(|_| '\t')
        | sym('r').map(|_| '\r')
        | sym('b').map(|_| '\x08')
        | sym('f').map(|_| '\x0C')
        | sym('v').map(|_| '\x0B')
        | (sym('0') - !is_a(|c: char| c.is_ascii_digit())).map(|_| '\0');
    let hex_char = sym('x')
        * is_a(|c: char| c.is_ascii_hexdigit())
            .repeat(2)
            .map(String::from_iter)
            .convert(|digits| u8::from_str_radix(&digits, 16))
            .map(char::from);
    // `\` followed by a line terminator continues the string on the next line
    let continuation = one_of(LINE_TERMINATORS).map(|_| String::new());
    // `\u` and `\x` only escape when followed by enough hex digits
    let identity = !one_of("ux") * none_of(LINE_TERMINATORS);
    let escaped = (special_char | hex_char | identity).map(String::from);

    sym('\\') * (continuation | escaped)
}

fn utf16_string<'a>() -> Parser<'a, char, String> {
    let utf16_char = tag("\\u")
        * is_a(|c: char| c.is_ascii_hexdigit())
            .repeat(4)
            .map(String::from_iter)
            .convert(|digits| u16::from_str_radix(&digits, 16));

    utf16_char.repeat(1..).map(|chars| {
        decode_utf16(chars)
            .map(|r| r.unwrap_or(REPLACEMENT_CHARACTER))
            .collect::<String>()
    })
}

fn quoted_string<'a>(quote: char, plain: &'static str) -> Parser<'a, char, String> {
    let char_string = none_of(plain).repeat(1..).map(String::from_iter);
    let string = sym(quote) * (char_string | utf16_string() | escape_sequence()).repeat(0..)
        - sym(quote);

    string.map(|strings| strings.concat())
}

fn string<'a>() -> Parser<'a, char, String> {
    quoted_string('"', "\\\"\n\r") | quoted_string('\'', "\\'\n\r")
}

fn constant<'a>() -> Parser<'a, char, Constant> {
    number().map(Constant::Number)
        | keyword("true").map(|_| Constant::Boolean(true))
        | keyword("false").map(|_| Constant::Boolean(false))
        | keyword("null").map(|_| Constant::Null)
}

fn function_definition<'a>() -> Parser<'a, char, FunctionDefinition> {
    let params = sym('(') * list(space() * identifier(), space() * sym(',')) - space() - sym(')');
    let body = sym('{') * call(stmts) - space() - sym('}');

    (keyword("function") * (space() * identifier()).opt() - space() + params - space() + body)
        .map(|((name, params), body)| FunctionDefinition { name, params, body })
}

fn primary_expr<'a>() -> Parser<'a, char, Expression> {
    let function = call(function_definition).map(|f| PrimaryExpression::Function(Rc::new(f)));
    let array = (sym('[') * list(call(assign_expr), space() * sym(','))
        - (space() * sym(',')).opt()
        - space()
        - sym(']'))
    .map(PrimaryExpression::Array);
    let property_name =
        identifier_name() | string() | number().map(number_to_string);
    let property = space() * property_name - space() - sym(':') + call(assign_expr);
    let object = (sym('{') * list(property, space() * sym(','))
        - (space() * sym(',')).opt()
        - space()
        - sym('}'))
    .map(PrimaryExpression::Object);
    let paren = (sym('(') * call(expr) - space() - sym(')'))
        .map(|e| PrimaryExpression::Paren(Box::new(e)));

    let primary = function
        | array
        | object
        | paren
        | constant().map(PrimaryExpression::Constant)
        | string().map(PrimaryExpression::Str)
        | identifier().map(PrimaryExpression::Identifier);

    primary.map(Expression::PrimaryExpression)
}

enum PostfixOp {
    FunctionCall(Vec<Expression>),
    ArrayIndex(Expression),
    FieldAccess(Identifier),
}

/// NB: postfix operators are left-to-right associativity, so fold-left
fn fold_postfix(primary: Expression, ops: Vec<PostfixOp>) -> Expression {
    ops.into_iter().fold(primary, |expr, op| match op {
        PostfixOp::FunctionCall(args) => Expression::FunctionCall(Box::new(expr), args),
        PostfixOp::ArrayIndex(index) => Expression::ArrayIndex(Box::new(expr), Box::new(index)),
        PostfixOp::FieldAccess(field) => Expression::FieldAccess(Box::new(expr), field),
    })
}

fn arguments<'a>() -> Parser<'a, char, Vec<Expression>> {
    sym('(') * list(call(assign_expr), space() * sym(',')) - space() - sym(')')
}

fn field_access<'a>() -> Parser<'a, char, PostfixOp> {
    (sym('.') * space() * identifier_name()).map(|name| PostfixOp::FieldAccess(Identifier(name)))
}

fn array_index<'a>() -> Parser<'a, char, PostfixOp> {
    (sym('[') * call(expr) - space() - sym(']')).map(PostfixOp::ArrayIndex)
}

fn new_expr<'a>() -> Parser<'a, char, Expression> {
    let member = (call(primary_expr) + (space() * (field_access() | array_index())).repeat(0..))
        .map(|(primary, rest)| fold_postfix(primary, rest));

    (keyword("new") * space() * (call(new_expr) | member) + (space() * arguments()).opt())
        .map(|(callee, args)| Expression::New(Box::new(callee), args.unwrap_or_default()))
}

fn call_expr<'a>() -> Parser<'a, char, Expression> {
    let op = arguments().map(PostfixOp::FunctionCall) | field_access() | array_index();
    let parser = (call(new_expr) | call(primary_expr)) + (space() * op).repeat(0..);

    parser.map(|(primary, rest)| fold_postfix(primary, rest))
}

fn postfix_expr<'a>() -> Parser<'a, char, Expression> {
    // No line terminator is allowed between the operand and a postfix operator
    let ops = tag("++") | tag("--");
    let parser = call(call_expr) + (hspace() * ops).opt();

    parser.map(|(expr, op)| match op {
        Some("++") => Expression::UpdateExpression(UpdateExpression::PostIncrement(Box::new(expr))),
        Some(_) => Expression::UpdateExpression(UpdateExpression::PostDecrement(Box::new(expr))),
        None => expr,
    })
}

fn unary_expr<'a>() -> Parser<'a, char, Expression> {
    let ops = tag("++")
        | tag("--")
        | (tag("typeof") - !is_a(ident_part))
        | tag("~")
        | tag("!")
        | tag("-")
        | tag("+");
    let unary = (ops - space()).repeat(0..) + call(postfix_expr);

    // NB: unary expression are right-to-left associativity, so fold-right
    unary.map(|(mut ops, expr)| {
        let mut expr = expr;
        while let Some(op) = ops.pop() {
            let inner = Box::new(expr);
            expr = match op {
                "++" => Expression::UpdateExpression(UpdateExpression::PreIncrement(inner)),
                "--" => Expression::UpdateExpression(UpdateExpression::PreDecrement(inner)),
                "typeof" => Expression::UnaryExpression(UnaryExpression::TypeOf(inner)),
                "~" => Expression::UnaryExpression(UnaryExpression::BitNot(inner)),
                "!" => Expression::UnaryExpression(UnaryExpression::Not(inner)),
                "-" => Expression::UnaryExpression(UnaryExpression::Minus(inner)),
                "+" => Expression::UnaryExpression(UnaryExpression::Plus(inner)),
                _ => panic!("Unhandled unary operator: {}", op),
            }
        }

        expr
    })
}

fn mult_expr<'a>() -> Parser<'a, char, Expression> {
    let ops = (tag("*") | tag("/") | tag("%")) - !sym('=');
    let mult_div_mod = call(unary_expr) + (space() * ops - space() + call(unary_expr)).repeat(0..);

    mult_div_mod.map(|(lhs, rest)| {
        let binop_create_fn = |op, lhs, rhs| match op {
            "*" => BinaryExpression::Multiply(Box::new(lhs), Box::new(rhs)),
            "/" => BinaryExpression::Divide(Box::new(lhs), Box::new(rhs)),
            "%" => BinaryExpression::Modulo(Box::new(lhs), Box::new(rhs)),
            _ => panic!("Unhandled mult operator: {}", op),
        };

        left_fold_binop_multiop!(binop_create_fn, lhs, rest)
    })
}

fn add_expr<'a>() -> Parser<'a, char, Expression> {
    // NB: `+` must not be the start of `++` or `+=` (same for `-`)
    let ops = (tag("+") - !one_of("+=")) | (tag("-") - !one_of("-="));
    let plus_minus = call(mult_expr) + (space() * ops - space() + call(mult_expr)).repeat(0..);

    plus_minus.map(|(lhs, rest)| {
        let binop_create_fn = |op, lhs, rhs| match op {
            "+" => BinaryExpression::Plus(Box::new(lhs), Box::new(rhs)),
            "-" => BinaryExpression::Minus(Box::new(lhs), Box::new(rhs)),
            _ => panic!("Unhandled addition operator: {}", op),
        };

        left_fold_binop_multiop!(binop_create_fn, lhs, rest)
    })
}

fn shift_expr<'a>() -> Parser<'a, char, Expression> {
    let ops = (tag(">>>") | tag(">>") | tag("<<")) - !sym('=');
    let shifts = call(add_expr) + (space() * ops - space() + call(add_expr)).repeat(0..);

    shifts.map(|(lhs, rest)| {
        let binop_create_fn = |op, lhs, rhs| match op {
            "<<" => BinaryExpression::LeftShift(Box::new(lhs), Box::new(rhs)),
            ">>" => BinaryExpression::RightShift(Box::new(lhs), Box::new(rhs)),
            ">>>" => BinaryExpression::UnsignedRightShift(Box::new(lhs), Box::new(rhs)),
            _ => panic!("Unhandled shift operator: {}", op),
        };

        left_fold_binop_multiop!(binop_create_fn, lhs, rest)
    })
}

fn relation_expr<'a>() -> Parser<'a, char, Expression> {
    // NB: order matters for PEGs -- must keep the longer symbol first if the latter is a substring
    //
    // ie. `<=` must be before `<` otherwise `<` will be parsed
    let ops = tag("<=") | tag(">=") | (tag("<") - !sym('<')) | (tag(">") - !sym('>'));
    let lt_lte_gt_gte = call(shift_expr) + (space() * ops - space() + call(shift_expr)).repeat(0..);

    lt_lte_gt_gte.map(|(lhs, rest)| {
        let binop_create_fn = |op, lhs, rhs| match op {
            "<" => BinaryExpression::LessThan(Box::new(lhs), Box::new(rhs)),
            "<=" => BinaryExpression::LessThanEquals(Box::new(lhs), Box::new(rhs)),
            ">" => BinaryExpression::GreaterThan(Box::new(lhs), Box::new(rhs)),
            ">=" => BinaryExpression::GreaterThanEquals(Box::new(lhs), Box::new(rhs)),
            _ => panic!("Unhandled relational operator: {}", op),
        };

        left_fold_binop_multiop!(binop_create_fn, lhs, rest)
    })
}

fn eq_expr<'a>() -> Parser<'a, char, Expression> {
    let ops = tag("===") | tag("!==") | tag("==") | tag("!=");
    let eq_neq = call(relation_expr) + (space() * ops - space() + call(relation_expr)).repeat(0..);

    eq_neq.map(|(lhs, rest)| {
        let binop_create_fn = |op, lhs, rhs| match op {
            "==" => BinaryExpression::Equals(Box::new(lhs), Box::new(rhs)),
            "!=" => BinaryExpression::NotEquals(Box::new(lhs), Box::new(rhs)),
            "===" => BinaryExpression::StrictEquals(Box::new(lhs), Box::new(rhs)),
            "!==" => BinaryExpression::StrictNotEquals(Box::new(lhs), Box::new(rhs)),
            _ => panic!("Unhandled equality operator: {}", op),
        };

        left_fold_binop_multiop!(binop_create_fn, lhs, rest)
    })
}

fn bit_and_expr<'a>() -> Parser<'a, char, Expression> {
    let op = sym('&') - !one_of("&=");
    let band = call(eq_expr) + (space() * op * space() * call(eq_expr)).repeat(0..);
    band.map(|(lhs, mut rhs)| left_fold_binop!(BinaryExpression::BitAnd, lhs, rhs))
}

fn bit_xor_expr<'a>() -> Parser<'a, char, Expression> {
    let op = sym('^') - !sym('=');
    let bxor = call(bit_and_expr) + (space() * op * space() * call(bit_and_expr)).repeat(0..);
    bxor.map(|(lhs, mut rhs)| left_fold_binop!(BinaryExpression::BitXor, lhs, rhs))
}

fn bit_or_expr<'a>() -> Parser<'a, char, Expression> {
    let op = sym('|') - !one_of("|=");
    let bor = call(bit_xor_expr) + (space() * op * space() * call(bit_xor_expr)).repeat(0..);
    bor.map(|(lhs, mut rhs)| left_fold_binop!(BinaryExpression::BitOr, lhs, rhs))
}

fn and_expr<'a>() -> Parser<'a, char, Expression> {
    let land = call(bit_or_expr) + (space() * tag("&&") * space() * call(bit_or_expr)).repeat(0..);
    land.map(|(lhs, mut rhs)| left_fold_binop!(BinaryExpression::LogicalAnd, lhs, rhs))
}

fn or_expr<'a>() -> Parser<'a, char, Expression> {
    let lor = call(and_expr) + (space() * tag("||") * space() * call(and_expr)).repeat(0..);
    lor.map(|(lhs, mut rhs)| left_fold_binop!(BinaryExpression::LogicalOr, lhs, rhs))
}

fn conditional_expr<'a>() -> Parser<'a, char, Expression> {
    let branches = space() * sym('?') * call(assign_expr) - space() - sym(':') + call(assign_expr);

    (call(or_expr) + branches.opt()).map(|(cond, branches)| match branches {
        Some((t, f)) => Expression::Conditional(Box::new(cond), Box::new(t), Box::new(f)),
        None => cond,
    })
}

fn assign_op<'a>() -> Parser<'a, char, AssignOp> {
    tag("+=").map(|_| AssignOp::Plus)
        | tag("-=").map(|_| AssignOp::Minus)
        | tag("*=").map(|_| AssignOp::Multiply)
        | tag("/=").map(|_| AssignOp::Divide)
        | tag("%=").map(|_| AssignOp::Modulo)
        | (sym('=') - !sym('=')).map(|_| AssignOp::Assign)
}

/// NB: assignment is right associative, so the right hand side recurses
fn assignment<'a>() -> Parser<'a, char, Expression> {
    let rhs = space() * assign_op() + call(assign_expr);

    (call(conditional_expr) + rhs.opt()).map(|(lhs, rhs)| match rhs {
        Some((op, rhs)) => Expression::Assign(op, Box::new(lhs), Box::new(rhs)),
        None => lhs,
    })
}

/// Parse a single (non-sequence) expression
///
/// Consumes leading whitespace
fn assign_expr<'a>() -> Parser<'a, char, Expression> {
    space() * call(assignment)
}

/// Parse an expression
///
/// Consumes leading whitespace
fn expr<'a>() -> Parser<'a, char, Expression> {
    assign_expr()
}

/// Where a statement that needs a `;` is allowed to end
fn stmt_end<'a>() -> Parser<'a, char, ()> {
    let semicolon = (hspace() * sym(';')).discard();
    let line_break = hspace() * (one_of(LINE_TERMINATORS).discard() | block_comment());
    let close_brace = (space() * -sym('}')).discard();
    let eof = space() * end();

    semicolon | line_break | close_brace | eof
}

fn declaration<'a>() -> Parser<'a, char, Statement> {
    let kind = keyword("var").map(|_| DeclarationKind::Var)
        | keyword("let").map(|_| DeclarationKind::Let)
        | keyword("const").map(|_| DeclarationKind::Const);
    let declarator = || space() * identifier() + (space() * sym('=') * call(assign_expr)).opt();
    let declarators = declarator() + (space() * sym(',') * declarator()).repeat(0..);

    (kind + declarators).map(|(kind, (first, mut rest))| {
        rest.insert(0, first);
        Statement::Declaration(kind, rest)
    })
}

fn block<'a>() -> Parser<'a, char, Vec<Statement>> {
    sym('{') * call(stmts) - space() - sym('}')
}

fn if_else_stmt<'a>() -> Parser<'a, char, BlockStatement> {
    let if_stmt = keyword("if") * space() * sym('(') * call(expr) - space() - sym(')') + call(stmt);
    let else_stmt = space() * keyword("else") * call(stmt);

    (if_stmt + else_stmt.opt()).map(|((cond, true_body), false_body)| {
        BlockStatement::If(cond, Box::new(true_body), false_body.map(Box::new))
    })
}

fn try_stmt<'a>() -> Parser<'a, char, BlockStatement> {
    let catch_clause = (space() * keyword("catch") * space() * sym('(') * space() * identifier()
        - space()
        - sym(')')
        - space()
        + call(block))
    .map(|(param, body)| CatchClause { param, body });
    let finally_clause = space() * keyword("finally") * space() * call(block);

    (keyword("try") * space() * call(block) + catch_clause.opt() + finally_clause.opt()).convert(
        |((body, handler), finalizer)| {
            if handler.is_none() && finalizer.is_none() {
                Err("Missing catch or finally after try")
            } else {
                Ok(BlockStatement::Try(body, handler, finalizer))
            }
        },
    )
}

fn block_stmt<'a>() -> Parser<'a, char, Statement> {
    let block_body = call(block).map(BlockStatement::Block);
    let while_stmt =
        (keyword("while") * space() * sym('(') * call(expr) - space() - sym(')') + call(stmt))
            .map(|(cond, body)| BlockStatement::While(cond, Box::new(body)));
    // A `;` after `do ... while (...)` is always optional
    let do_while_stmt = (keyword("do") * call(stmt) - space() - keyword("while") - space()
        - sym('(')
        + call(expr)
        - space()
        - sym(')')
        - (hspace() * sym(';')).opt())
    .map(|(body, cond)| BlockStatement::DoWhile(Box::new(body), cond));
    let for_init = call(declaration).map(Box::new)
        | call(expr).map(|e| Box::new(Statement::ExpressionStatement(e)));
    let for_stmt = (keyword("for") * space() * sym('(') * space() * for_init.opt()
        - space()
        - sym(';')
        + call(expr).opt()
        - space()
        - sym(';')
        + call(expr).opt()
        - space()
        - sym(')')
        + call(stmt))
    .map(|(((init, cond), update), body)| {
        BlockStatement::For(init, cond, update, Box::new(body))
    });

    (block_body | if_else_stmt() | while_stmt | do_while_stmt | for_stmt | try_stmt())
        .map(Statement::BlockStatement)
}

fn jump_stmt<'a>() -> Parser<'a, char, Statement> {
    let break_stmt = keyword("break").map(|_| JumpStatement::Break);
    let continue_stmt = keyword("continue").map(|_| JumpStatement::Continue);
    let return_stmt =
        (keyword("return") * (no_line_break() * call(expr)).opt()).map(JumpStatement::Return);
    let throw_stmt = (keyword("throw") * no_line_break() * call(expr)).map(JumpStatement::Throw);

    (break_stmt | continue_stmt | return_stmt | throw_stmt).map(Statement::JumpStatement)
}

fn function_decl<'a>() -> Parser<'a, char, Statement> {
    call(function_definition).convert(|f| {
        if f.name.is_some() {
            Ok(Statement::FunctionDeclaration(Rc::new(f)))
        } else {
            Err("Function statements require a function name")
        }
    })
}

fn expr_stmt<'a>() -> Parser<'a, char, Statement> {
    expr().map(Statement::ExpressionStatement)
}

fn empty_stmt<'a>() -> Parser<'a, char, Statement> {
    sym(';').map(|_| Statement::Empty)
}

/// Parse a statment
///
/// Consumes leading whitespace
fn stmt<'a>() -> Parser<'a, char, Statement> {
    // NB: keywords must come first otherwise they may be parsed as identifiers
    let terminated = (call(declaration) | jump_stmt() | expr_stmt()) - stmt_end();

    space() * (empty_stmt() | block_stmt() | function_decl() | terminated)
}

/// Parse a series of statements
fn stmts<'a>() -> Parser<'a, char, Vec<Statement>> {
    call(stmt).repeat(0..)
}

/// Returns the position (in chars) a parse error points at, if any
fn error_position(err: &pom::Error) -> Option<usize> {
    match err {
        pom::Error::Mismatch { position, .. }
        | pom::Error::Conversion { position, .. }
        | pom::Error::Expect { position, .. }
        | pom::Error::Custom { position, .. } => Some(*position),
        _ => None,
    }
}

/// Build a syntax error pointing at `position` in `input`
fn syntax_error(input: &[char], position: Option<usize>) -> JsError {
    let position = match position {
        Some(p) if p < input.len() => p,
        _ => return JsError::Syntax("Unexpected end of input".to_string()),
    };

    let line = input[..position].iter().filter(|c| **c == '\n').count() + 1;
    let line_start = input[..position]
        .iter()
        .rposition(|c| *c == '\n')
        .map_or(0, |p| p + 1);
    let column = position - line_start + 1;
    let token: String = input[position..]
        .iter()
        .take_while(|c| !LINE_TERMINATORS.contains(**c))
        .take(20)
        .collect();

    JsError::Syntax(format!(
        "Unexpected token '{}' at line {}, column {}",
        token.trim_end(),
        line,
        column
    ))
}

pub fn parse(input: &str) -> Result<Vec<Statement>> {
    let input: Vec<char> = input.chars().collect();
    let program = stmts() - space() - end();

    program
        .parse(&input)
        .map_err(|e| syntax_error(&input, error_position(&e)))
}

#[cfg(test)]
fn ident_expr(name: &str) -> Expression {
    Expression::PrimaryExpression(PrimaryExpression::Identifier(Identifier(name.to_string())))
}

#[cfg(test)]
fn num_expr(n: f64) -> Expression {
    Expression::PrimaryExpression(PrimaryExpression::Constant(Constant::Number(n)))
}

#[test]
fn test_string() {
    {
        let data = vec![
            (r#""hello world""#, "hello world"),
            (r#""hello world\n""#, "hello world\n"),
            (r#"'single \'quoted\''"#, "single 'quoted'"),
            (r#""tab\there""#, "tab\there"),
            (r#""\x41\u0042""#, "AB"),
            (r#""\ud83d\ude00""#, "😀"),
            (r#""\q\$""#, "q$"),
            ("\"line \\\ncontinued\"", "line continued"),
            (r#""❤""#, "❤"),
            (r#""""#, ""),
        ];

        for (input, expected) in data {
            let input: Vec<char> = input.chars().collect();
            assert_eq!(string().parse(&input), Ok(expected.to_string()));
        }
    }
    {
        let data = vec![
            r#"hello world""#,
            r#""unterminated"#,
            "\"new\nline\"",
            r#""\u12""#,
            r#""\u12G4""#,
            r#""\x4""#,
            r#"'\xZZ'"#,
        ];

        for input in data {
            let input: Vec<char> = input.chars().collect();
            assert!(string().parse(&input).is_err());
        }
    }
}

#[test]
fn test_number() {
    {
        let data = vec![
            ("0", 0.0),
            ("42", 42.0),
            ("3.25", 3.25),
            (".5", 0.5),
            ("5.", 5.0),
            ("1e3", 1000.0),
            ("2.5E-1", 0.25),
            ("0x1F", 31.0),
        ];

        for (input, expected) in data {
            let input: Vec<char> = input.chars().collect();
            assert_eq!(number().parse(&input), Ok(expected));
        }
    }
    {
        let data = vec!["abc", "3abc", "0x", "."];

        for input in data {
            let input: Vec<char> = input.chars().collect();
            assert!(number().parse(&input).is_err());
        }
    }
}

#[test]
fn test_identifier() {
    let good = vec!["x", "_private", "$ERROR", "camelCase9", "undefined", "letter"];
    for input in good {
        let chars: Vec<char> = input.chars().collect();
        assert_eq!(identifier().parse(&chars), Ok(Identifier(input.to_string())));
    }

    let bad = vec!["var", "function", "9lives", "try", "typeof"];
    for input in bad {
        let chars: Vec<char> = input.chars().collect();
        assert!(identifier().parse(&chars).is_err(), "{} parsed", input);
    }
}

#[test]
fn test_comments_are_whitespace() {
    let stmts = parse("// leading\n/* block\n comment */ x /* inline */ = 1; // trailing")
        .expect("Failed to parse");
    assert_eq!(
        stmts,
        vec![Statement::ExpressionStatement(Expression::Assign(
            AssignOp::Assign,
            Box::new(ident_expr("x")),
            Box::new(num_expr(1.0)),
        ))]
    );
}

#[test]
fn test_precedence() {
    let stmts = parse("1 + 2 * 3 - 4;").expect("Failed to parse");
    assert_eq!(
        stmts,
        vec![Statement::ExpressionStatement(Expression::BinaryExpression(
            BinaryExpression::Minus(
                Box::new(Expression::BinaryExpression(BinaryExpression::Plus(
                    Box::new(num_expr(1.0)),
                    Box::new(Expression::BinaryExpression(BinaryExpression::Multiply(
                        Box::new(num_expr(2.0)),
                        Box::new(num_expr(3.0)),
                    ))),
                ))),
                Box::new(num_expr(4.0)),
            )
        ))]
    );

    let stmts = parse("a = b = c || d && e;").expect("Failed to parse");
    assert_eq!(
        stmts,
        vec![Statement::ExpressionStatement(Expression::Assign(
            AssignOp::Assign,
            Box::new(ident_expr("a")),
            Box::new(Expression::Assign(
                AssignOp::Assign,
                Box::new(ident_expr("b")),
                Box::new(Expression::BinaryExpression(BinaryExpression::LogicalOr(
                    Box::new(ident_expr("c")),
                    Box::new(Expression::BinaryExpression(BinaryExpression::LogicalAnd(
                        Box::new(ident_expr("d")),
                        Box::new(ident_expr("e")),
                    ))),
                ))),
            )),
        ))]
    );
}

#[test]
fn test_postfix_expr() {
    let stmts = parse("foo(1).bar[2]();").expect("Failed to parse");
    assert_eq!(
        stmts,
        vec![Statement::ExpressionStatement(Expression::FunctionCall(
            Box::new(Expression::ArrayIndex(
                Box::new(Expression::FieldAccess(
                    Box::new(Expression::FunctionCall(
                        Box::new(ident_expr("foo")),
                        vec![num_expr(1.0)],
                    )),
                    Identifier("bar".to_string()),
                )),
                Box::new(num_expr(2.0)),
            )),
            vec![],
        ))]
    );
}

#[test]
fn test_empty_statements_with_line_terminators() {
    let stmts = parse(include_str!(
        "../../sputnik/07_Lexical_Conventions/7.9_Automatic_Semicolon_Insertion/S7.9_A8_T4.js"
    ))
    .expect("Failed to parse");

    let expressions = stmts
        .iter()
        .filter(|s| matches!(s, Statement::ExpressionStatement(_)))
        .count();
    let empties = stmts.iter().filter(|s| **s == Statement::Empty).count();
    assert_eq!(expressions, 4);
    assert_eq!(empties, 4);
}

#[test]
fn test_semicolon_insertion() {
    let ok = vec![
        "x = 1\ny = 2",
        "{ 1 }",
        "var a = 1, b\nlog(a)",
        "if (a) b = 1\nelse b = 2",
        "do x++; while (x < 3) log(x)",
        "var f = function () { return 1 }\nf()",
        "x\n++y",
        "a /* multi\nline */ b",
    ];
    for input in ok {
        assert!(parse(input).is_ok(), "failed to parse: {}", input);
    }

    let bad = vec!["x = 1 y = 2", "var a = 1 var b = 2", "throw\n1", "1 = 2 3"];
    for input in bad {
        assert!(parse(input).is_err(), "parsed: {}", input);
    }
}

#[test]
fn test_restricted_productions() {
    // `return` followed by a line terminator returns undefined
    let stmts = parse("function f() { return\n1 }").expect("Failed to parse");
    match &stmts[0] {
        Statement::FunctionDeclaration(f) => {
            assert_eq!(f.body[0], Statement::JumpStatement(JumpStatement::Return(None)));
            assert_eq!(f.body[1], Statement::ExpressionStatement(num_expr(1.0)));
        }
        s => panic!("Unexpected statement: {:?}", s),
    }

    // Postfix `++` must be on the same line as its operand
    let stmts = parse("x\n++y").expect("Failed to parse");
    assert_eq!(
        stmts,
        vec![
            Statement::ExpressionStatement(ident_expr("x")),
            Statement::ExpressionStatement(Expression::UpdateExpression(
                UpdateExpression::PreIncrement(Box::new(ident_expr("y")))
            )),
        ]
    );
}

#[test]
fn test_try_statement() {
    assert!(parse("try {} catch (e) {}").is_ok());
    assert!(parse("try {} finally {}").is_ok());
    assert!(parse("try {} catch (e) {} finally {}").is_ok());
    assert!(parse("try {}").is_err());
    assert!(parse(include_str!(
        "../../sputnik/12_Statement/12.14_The_try_Statement/S12.14_A16_T13.js"
    ))
    .is_err());
}

#[test]
fn test_syntax_error_position() {
    match parse("var x = 1;\nvar = 2;") {
        Err(JsError::Syntax(msg)) => assert!(msg.contains("line 2"), "{}", msg),
        r => panic!("Unexpected parse result: {:?}", r),
    }
}
