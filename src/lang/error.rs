use std::fmt;
use std::io;

use crate::lang::value::Value;

/// Errors raised while parsing or running a script
///
/// Every variant except `Test` and `Internal` can be observed (and caught) by script code.
#[derive(Debug, Clone)]
pub enum JsError {
    Syntax(String),
    Type(String),
    Reference(String),
    Range(String),
    /// A value thrown by a `throw` statement
    Thrown(Value),
    /// Raised by the `$ERROR` test hook
    Test(String),
    /// Host failures (I/O and the like)
    Internal(String),
}

pub type Result<T> = std::result::Result<T, JsError>;

impl JsError {
    /// Name of the error kind, as shown in conformance reports
    pub fn kind(&self) -> &'static str {
        match self {
            JsError::Syntax(_) => "SyntaxError",
            JsError::Type(_) => "TypeError",
            JsError::Reference(_) => "ReferenceError",
            JsError::Range(_) => "RangeError",
            JsError::Thrown(_) => "Thrown",
            JsError::Test(_) => "TestError",
            JsError::Internal(_) => "InternalError",
        }
    }

    pub fn is_catchable(&self) -> bool {
        !matches!(self, JsError::Test(_) | JsError::Internal(_))
    }

    /// Convert into the value a `catch` clause binds
    pub fn into_value(self) -> Value {
        match self {
            JsError::Thrown(v) => v,
            JsError::Syntax(msg) => Value::error_object("SyntaxError", &msg),
            JsError::Type(msg) => Value::error_object("TypeError", &msg),
            JsError::Reference(msg) => Value::error_object("ReferenceError", &msg),
            JsError::Range(msg) => Value::error_object("RangeError", &msg),
            JsError::Test(msg) => Value::error_object("TestError", &msg),
            JsError::Internal(msg) => Value::error_object("InternalError", &msg),
        }
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsError::Thrown(v) => {
                if v.is_error_object() {
                    write!(f, "{}", v)
                } else {
                    write!(f, "Uncaught {}", v.repr())
                }
            }
            JsError::Syntax(msg)
            | JsError::Type(msg)
            | JsError::Reference(msg)
            | JsError::Range(msg)
            | JsError::Test(msg)
            | JsError::Internal(msg) => write!(f, "{}: {}", self.kind(), msg),
        }
    }
}

impl From<io::Error> for JsError {
    fn from(e: io::Error) -> Self {
        JsError::Internal(e.to_string())
    }
}

#[test]
fn test_display() {
    assert_eq!(
        JsError::Type("x is not a function".to_string()).to_string(),
        "TypeError: x is not a function"
    );
    assert_eq!(
        JsError::Thrown(Value::Number(3.0)).to_string(),
        "Uncaught 3"
    );
    assert_eq!(
        JsError::Thrown(Value::String("oops".to_string())).to_string(),
        "Uncaught \"oops\""
    );
    assert_eq!(
        JsError::Thrown(Value::error_object("RangeError", "bad")).to_string(),
        "RangeError: bad"
    );
}

#[test]
fn test_catchable() {
    assert!(JsError::Reference("x".to_string()).is_catchable());
    assert!(JsError::Thrown(Value::Null).is_catchable());
    assert!(!JsError::Test("x".to_string()).is_catchable());
    assert!(!JsError::Internal("x".to_string()).is_catchable());
}
