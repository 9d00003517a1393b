use std::fmt;
use std::rc::Rc;

#[derive(Debug, PartialEq)]
pub enum UnaryExpression {
    /// `~`
    BitNot(Box<Expression>),
    /// `!`
    Not(Box<Expression>),
    /// `-`
    Minus(Box<Expression>),
    /// `+`
    Plus(Box<Expression>),
    /// `typeof`
    TypeOf(Box<Expression>),
}

#[derive(Debug, PartialEq)]
pub enum UpdateExpression {
    /// `++x`
    PreIncrement(Box<Expression>),
    /// `--x`
    PreDecrement(Box<Expression>),
    /// `x++`
    PostIncrement(Box<Expression>),
    /// `x--`
    PostDecrement(Box<Expression>),
}

impl UpdateExpression {
    pub fn target(&self) -> &Expression {
        match self {
            UpdateExpression::PreIncrement(e)
            | UpdateExpression::PreDecrement(e)
            | UpdateExpression::PostIncrement(e)
            | UpdateExpression::PostDecrement(e) => e,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum BinaryExpression {
    /// `+`
    Plus(Box<Expression>, Box<Expression>),
    /// `-`
    Minus(Box<Expression>, Box<Expression>),
    /// `*`
    Multiply(Box<Expression>, Box<Expression>),
    /// `/`
    Divide(Box<Expression>, Box<Expression>),
    /// `%`
    Modulo(Box<Expression>, Box<Expression>),
    /// `==`
    Equals(Box<Expression>, Box<Expression>),
    /// `!=`
    NotEquals(Box<Expression>, Box<Expression>),
    /// `===`
    StrictEquals(Box<Expression>, Box<Expression>),
    /// `!==`
    StrictNotEquals(Box<Expression>, Box<Expression>),
    /// `&&`
    LogicalAnd(Box<Expression>, Box<Expression>),
    /// `||`
    LogicalOr(Box<Expression>, Box<Expression>),
    /// `|`
    BitOr(Box<Expression>, Box<Expression>),
    /// `&`
    BitAnd(Box<Expression>, Box<Expression>),
    /// `^`
    BitXor(Box<Expression>, Box<Expression>),
    /// `<<`
    LeftShift(Box<Expression>, Box<Expression>),
    /// `>>`
    RightShift(Box<Expression>, Box<Expression>),
    /// `>>>`
    UnsignedRightShift(Box<Expression>, Box<Expression>),
    /// `<`
    LessThan(Box<Expression>, Box<Expression>),
    /// `<=`
    LessThanEquals(Box<Expression>, Box<Expression>),
    /// `>`
    GreaterThan(Box<Expression>, Box<Expression>),
    /// `>=`
    GreaterThanEquals(Box<Expression>, Box<Expression>),
}

impl BinaryExpression {
    pub fn op_str(&self) -> &str {
        match self {
            BinaryExpression::Plus(_, _) => "+",
            BinaryExpression::Minus(_, _) => "-",
            BinaryExpression::Multiply(_, _) => "*",
            BinaryExpression::Divide(_, _) => "/",
            BinaryExpression::Modulo(_, _) => "%",
            BinaryExpression::Equals(_, _) => "==",
            BinaryExpression::NotEquals(_, _) => "!=",
            BinaryExpression::StrictEquals(_, _) => "===",
            BinaryExpression::StrictNotEquals(_, _) => "!==",
            BinaryExpression::LogicalAnd(_, _) => "&&",
            BinaryExpression::LogicalOr(_, _) => "||",
            BinaryExpression::BitOr(_, _) => "|",
            BinaryExpression::BitAnd(_, _) => "&",
            BinaryExpression::BitXor(_, _) => "^",
            BinaryExpression::LeftShift(_, _) => "<<",
            BinaryExpression::RightShift(_, _) => ">>",
            BinaryExpression::UnsignedRightShift(_, _) => ">>>",
            BinaryExpression::LessThan(_, _) => "<",
            BinaryExpression::LessThanEquals(_, _) => "<=",
            BinaryExpression::GreaterThan(_, _) => ">",
            BinaryExpression::GreaterThanEquals(_, _) => ">=",
        }
    }

    /// Returns (lhs, rhs)
    pub fn operands(&self) -> (&Expression, &Expression) {
        match self {
            BinaryExpression::Plus(l, r)
            | BinaryExpression::Minus(l, r)
            | BinaryExpression::Multiply(l, r)
            | BinaryExpression::Divide(l, r)
            | BinaryExpression::Modulo(l, r)
            | BinaryExpression::Equals(l, r)
            | BinaryExpression::NotEquals(l, r)
            | BinaryExpression::StrictEquals(l, r)
            | BinaryExpression::StrictNotEquals(l, r)
            | BinaryExpression::LogicalAnd(l, r)
            | BinaryExpression::LogicalOr(l, r)
            | BinaryExpression::BitOr(l, r)
            | BinaryExpression::BitAnd(l, r)
            | BinaryExpression::BitXor(l, r)
            | BinaryExpression::LeftShift(l, r)
            | BinaryExpression::RightShift(l, r)
            | BinaryExpression::UnsignedRightShift(l, r)
            | BinaryExpression::LessThan(l, r)
            | BinaryExpression::LessThanEquals(l, r)
            | BinaryExpression::GreaterThan(l, r)
            | BinaryExpression::GreaterThanEquals(l, r) => (l, r),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Plus,
    /// `-=`
    Minus,
    /// `*=`
    Multiply,
    /// `/=`
    Divide,
    /// `%=`
    Modulo,
}

#[derive(Debug, PartialEq)]
pub enum Constant {
    Number(f64),
    Boolean(bool),
    Null,
}

#[derive(Debug, PartialEq, Hash, PartialOrd, Ord, Eq, Clone)]
pub struct Identifier(pub String);

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A function literal or declaration
///
/// Shared behind an `Rc` so every closure created from it can point at the same body.
#[derive(Debug, PartialEq)]
pub struct FunctionDefinition {
    pub name: Option<Identifier>,
    pub params: Vec<Identifier>,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq)]
pub enum PrimaryExpression {
    Identifier(Identifier),
    Constant(Constant),
    Str(String),
    Paren(Box<Expression>),
    Array(Vec<Expression>),
    /// (key, value) in source order
    Object(Vec<(String, Expression)>),
    Function(Rc<FunctionDefinition>),
}

#[derive(Debug, PartialEq)]
pub enum Expression {
    PrimaryExpression(PrimaryExpression),
    /// (expression, field)
    FieldAccess(Box<Expression>, Identifier),
    /// (expression, index)
    ArrayIndex(Box<Expression>, Box<Expression>),
    /// (function, arguments)
    FunctionCall(Box<Expression>, Vec<Expression>),
    /// (constructor, arguments)
    New(Box<Expression>, Vec<Expression>),
    BinaryExpression(BinaryExpression),
    UnaryExpression(UnaryExpression),
    UpdateExpression(UpdateExpression),
    /// (operator, target, value)
    Assign(AssignOp, Box<Expression>, Box<Expression>),
    /// (condition, true_expr, false_expr)
    Conditional(Box<Expression>, Box<Expression>, Box<Expression>),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclarationKind::Var => "var",
            DeclarationKind::Let => "let",
            DeclarationKind::Const => "const",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug, PartialEq)]
pub struct CatchClause {
    pub param: Identifier,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq)]
pub enum BlockStatement {
    /// (condition, true_body, false_body)
    If(Expression, Box<Statement>, Option<Box<Statement>>),
    /// (condition, body)
    While(Expression, Box<Statement>),
    /// (body, condition)
    DoWhile(Box<Statement>, Expression),
    /// (init, condition, update, body)
    For(
        Option<Box<Statement>>,
        Option<Expression>,
        Option<Expression>,
        Box<Statement>,
    ),
    Block(Vec<Statement>),
    /// (body, handler, finalizer)
    Try(Vec<Statement>, Option<CatchClause>, Option<Vec<Statement>>),
}

#[derive(Debug, PartialEq)]
pub enum JumpStatement {
    Break,
    Continue,
    Return(Option<Expression>),
    Throw(Expression),
}

impl fmt::Display for JumpStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JumpStatement::Break => "break",
            JumpStatement::Continue => "continue",
            JumpStatement::Return(_) => "return",
            JumpStatement::Throw(_) => "throw",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug, PartialEq)]
pub enum Statement {
    /// (kind, [(name, initializer)])
    Declaration(DeclarationKind, Vec<(Identifier, Option<Expression>)>),
    FunctionDeclaration(Rc<FunctionDefinition>),
    BlockStatement(BlockStatement),
    JumpStatement(JumpStatement),
    ExpressionStatement(Expression),
    Empty,
}
