use std::fmt;

use lazy_static::lazy_static;

/// Functions provided by the host rather than written in script
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Builtin {
    /// Write arguments to the output sink
    Log,
    /// `$PRINT`, what Sputnik fixtures use instead of `log`
    Print,
    /// `$ERROR`, fails the current test
    Error,
    IsNaN,
    IsFinite,
    String,
    Number,
    Boolean,
    /// Error constructors, keyed by the error name
    ErrorCtor(ErrorKind),
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ErrorKind {
    Error,
    TypeError,
    ReferenceError,
    SyntaxError,
    RangeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Error => write!(f, "Error"),
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ReferenceError => write!(f, "ReferenceError"),
            ErrorKind::SyntaxError => write!(f, "SyntaxError"),
            ErrorKind::RangeError => write!(f, "RangeError"),
        }
    }
}

impl Builtin {
    /// Whether `new` may be applied to the builtin
    pub fn is_constructor(&self) -> bool {
        matches!(self, Builtin::ErrorCtor(_))
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Builtin::Log => write!(f, "log"),
            Builtin::Print => write!(f, "$PRINT"),
            Builtin::Error => write!(f, "$ERROR"),
            Builtin::IsNaN => write!(f, "isNaN"),
            Builtin::IsFinite => write!(f, "isFinite"),
            Builtin::String => write!(f, "String"),
            Builtin::Number => write!(f, "Number"),
            Builtin::Boolean => write!(f, "Boolean"),
            Builtin::ErrorCtor(kind) => write!(f, "{}", kind),
        }
    }
}

lazy_static! {
    pub static ref FUNCTIONS: Vec<Builtin> = vec![
        Builtin::Log,
        Builtin::Print,
        Builtin::Error,
        Builtin::IsNaN,
        Builtin::IsFinite,
        Builtin::String,
        Builtin::Number,
        Builtin::Boolean,
        Builtin::ErrorCtor(ErrorKind::Error),
        Builtin::ErrorCtor(ErrorKind::TypeError),
        Builtin::ErrorCtor(ErrorKind::ReferenceError),
        Builtin::ErrorCtor(ErrorKind::SyntaxError),
        Builtin::ErrorCtor(ErrorKind::RangeError),
    ];
}

#[test]
fn test_names_are_unique() {
    let mut names: Vec<String> = FUNCTIONS.iter().map(|f| f.to_string()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), FUNCTIONS.len());
    assert!(names.contains(&"$ERROR".to_string()));
}
