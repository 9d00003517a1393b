use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::lang::ast::FunctionDefinition;
use crate::lang::error::{JsError, Result};
use crate::lang::functions::Builtin;
use crate::lang::variables::Scope;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    /// All numbers are IEEE-754 doubles
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
    Function(Function),
}

/// A shared, mutable array
///
/// Cloning an `Array` shares the underlying storage
#[derive(Clone)]
pub struct Array(pub Rc<RefCell<Vec<Value>>>);

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ObjectClass {
    Plain,
    /// Created by one of the error constructors or raised by the engine
    Error,
}

pub struct ObjectData {
    pub class: ObjectClass,
    /// (key, value) in insertion order
    pub properties: Vec<(String, Value)>,
}

impl ObjectData {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set(&mut self, key: &str, val: Value) {
        match self.properties.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = val,
            None => self.properties.push((key.to_string(), val)),
        }
    }
}

/// A shared, mutable object
#[derive(Clone)]
pub struct Object(pub Rc<RefCell<ObjectData>>);

/// A user defined function together with the scope it was created in
pub struct Closure {
    pub definition: Rc<FunctionDefinition>,
    pub scope: Scope,
}

#[derive(Clone)]
pub enum Function {
    Builtin(Builtin),
    Closure(Rc<Closure>),
}

impl Function {
    pub fn name(&self) -> String {
        match self {
            Function::Builtin(b) => b.to_string(),
            Function::Closure(c) => c
                .definition
                .name
                .as_ref()
                .map_or_else(String::new, |n| n.to_string()),
        }
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        match self {
            Function::Builtin(_) => 1,
            Function::Closure(c) => c.definition.params.len(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin(b) => write!(f, "function {}() {{ [native code] }}", b),
            Function::Closure(c) => {
                let params = c
                    .definition
                    .params
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, "function {}({}) {{ ... }}", self.name(), params)
            }
        }
    }
}

/// Format a number the way JavaScript's `ToString` does
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    } else if n == 0.0 {
        // Covers -0 as well
        return "0".to_string();
    } else if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        // Rust prints `1e21` / `1.5e-7`; JavaScript wants an explicit exponent sign
        let s = format!("{:e}", n);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    } else {
        format!("{}", n)
    }
}

/// Parse a string the way JavaScript's `ToNumber` does
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => (),
    };

    // Rust's float parser also accepts `inf` and `nan` spellings
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }

    s.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }

    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// Arrays are stored densely, so growing one past this many elements is refused
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Returns the array index `key` names, if any
///
/// Indices are canonical integers below 2^32 - 1. Anything else is an ordinary property name.
pub fn array_index(key: &str) -> Option<usize> {
    let idx = key.parse::<u32>().ok()?;
    if idx == u32::MAX || idx.to_string() != key {
        return None;
    }

    Some(idx as usize)
}

fn check_array_length(len: usize) -> Result<()> {
    if len > MAX_ARRAY_LENGTH {
        return Err(JsError::Range(format!(
            "Array length {} exceeds the supported maximum of {}",
            len, MAX_ARRAY_LENGTH
        )));
    }

    Ok(())
}

impl Value {
    pub fn new_array(values: Vec<Value>) -> Self {
        Value::Array(Array(Rc::new(RefCell::new(values))))
    }

    pub fn new_object(properties: Vec<(String, Value)>) -> Self {
        Value::Object(Object(Rc::new(RefCell::new(ObjectData {
            class: ObjectClass::Plain,
            properties,
        }))))
    }

    /// Create an error object, ie. what `new TypeError(message)` evaluates to
    pub fn error_object(name: &str, message: &str) -> Self {
        Value::Object(Object(Rc::new(RefCell::new(ObjectData {
            class: ObjectClass::Error,
            properties: vec![
                ("name".to_string(), Value::String(name.to_string())),
                ("message".to_string(), Value::String(message.to_string())),
            ],
        }))))
    }

    pub fn is_error_object(&self) -> bool {
        match self {
            Value::Object(o) => o.0.borrow().class == ObjectClass::Error,
            _ => false,
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) | Value::Object(_) => string_to_number(&self.to_string()),
            Value::Function(_) => f64::NAN,
        }
    }

    pub fn to_int32(&self) -> i32 {
        to_int32(self.to_number())
    }

    pub fn to_uint32(&self) -> u32 {
        to_uint32(self.to_number())
    }

    pub fn typeof_str(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Number(l), Value::Number(r)) => l == r,
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Array(l), Value::Array(r)) => Rc::ptr_eq(&l.0, &r.0),
            (Value::Object(l), Value::Object(r)) => Rc::ptr_eq(&l.0, &r.0),
            (Value::Function(Function::Builtin(l)), Value::Function(Function::Builtin(r))) => {
                l == r
            }
            (Value::Function(Function::Closure(l)), Value::Function(Function::Closure(r))) => {
                Rc::ptr_eq(l, r)
            }
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Null) | (Value::Null, Value::Undefined) => true,
            (Value::Undefined, _) | (Value::Null, _) | (_, Value::Undefined) | (_, Value::Null) => {
                self.strict_equals(other)
            }
            (Value::Number(n), Value::String(_)) => *n == other.to_number(),
            (Value::String(_), Value::Number(n)) => self.to_number() == *n,
            (Value::Boolean(b), _) => Value::Number(if *b { 1.0 } else { 0.0 }).loose_equals(other),
            (_, Value::Boolean(b)) => self.loose_equals(&Value::Number(if *b { 1.0 } else { 0.0 })),
            (Value::Array(_), Value::Number(_) | Value::String(_))
            | (Value::Object(_), Value::Number(_) | Value::String(_))
            | (Value::Function(_), Value::Number(_) | Value::String(_)) => {
                Value::String(self.to_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::String(_), Value::Array(_))
            | (Value::Number(_) | Value::String(_), Value::Object(_))
            | (Value::Number(_) | Value::String(_), Value::Function(_)) => {
                self.loose_equals(&Value::String(other.to_string()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// Read `self[key]`
    pub fn get_property(&self, key: &str) -> Result<Value> {
        let val = match self {
            Value::Undefined | Value::Null => {
                return Err(JsError::Type(format!(
                    "Cannot read properties of {} (reading '{}')",
                    self, key
                )))
            }
            Value::String(s) => {
                if key == "length" {
                    Value::Number(s.encode_utf16().count() as f64)
                } else if let Some(idx) = array_index(key) {
                    s.encode_utf16()
                        .nth(idx)
                        .map_or(Value::Undefined, |c| {
                            Value::String(String::from_utf16_lossy(&[c]))
                        })
                } else {
                    Value::Undefined
                }
            }
            Value::Array(arr) => {
                let vec = arr.0.borrow();
                if key == "length" {
                    Value::Number(vec.len() as f64)
                } else {
                    array_index(key)
                        .and_then(|idx| vec.get(idx).cloned())
                        .unwrap_or(Value::Undefined)
                }
            }
            Value::Object(obj) => obj.0.borrow().get(key).unwrap_or(Value::Undefined),
            Value::Function(func) => match key {
                "name" => Value::String(func.name()),
                "length" => Value::Number(func.arity() as f64),
                _ => Value::Undefined,
            },
            Value::Boolean(_) | Value::Number(_) => Value::Undefined,
        };

        Ok(val)
    }

    /// Write `self[key] = val`
    ///
    /// Writes to primitives and to non-index keys of arrays are dropped, as in sloppy mode
    pub fn set_property(&self, key: &str, val: Value) -> Result<()> {
        match self {
            Value::Undefined | Value::Null => {
                return Err(JsError::Type(format!(
                    "Cannot set properties of {} (setting '{}')",
                    self, key
                )))
            }
            Value::Array(arr) => {
                let mut vec = arr.0.borrow_mut();
                if key == "length" {
                    let n = val.to_number();
                    if n < 0.0 || n.trunc() != n || n > u32::MAX as f64 {
                        return Err(JsError::Range("Invalid array length".to_string()));
                    }
                    let len = n as usize;
                    check_array_length(len)?;
                    vec.resize(len, Value::Undefined);
                } else if let Some(idx) = array_index(key) {
                    if idx >= vec.len() {
                        let len = idx
                            .checked_add(1)
                            .ok_or_else(|| JsError::Range("Invalid array length".to_string()))?;
                        check_array_length(len)?;
                        vec.resize(len, Value::Undefined);
                    }
                    vec[idx] = val;
                }
            }
            Value::Object(obj) => obj.0.borrow_mut().set(key, val),
            Value::Boolean(_) | Value::Number(_) | Value::String(_) | Value::Function(_) => (),
        };

        Ok(())
    }

    /// Representation shown when a REPL echoes a value
    pub fn repr(&self) -> String {
        let mut seen = Vec::new();
        self.repr_guarded(&mut seen)
    }

    fn repr_guarded(&self, seen: &mut Vec<*const ()>) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            Value::Array(arr) => {
                let ptr = Rc::as_ptr(&arr.0) as *const ();
                if seen.contains(&ptr) {
                    return "[Circular]".to_string();
                }

                seen.push(ptr);
                let items = arr
                    .0
                    .borrow()
                    .iter()
                    .map(|v| v.repr_guarded(seen))
                    .collect::<Vec<String>>();
                seen.pop();

                format!("[{}]", items.join(", "))
            }
            Value::Object(obj) if !self.is_error_object() => {
                let ptr = Rc::as_ptr(&obj.0) as *const ();
                if seen.contains(&ptr) {
                    return "[Circular]".to_string();
                }

                seen.push(ptr);
                let props = obj
                    .0
                    .borrow()
                    .properties
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.repr_guarded(seen)))
                    .collect::<Vec<String>>();
                seen.pop();

                if props.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", props.join(", "))
                }
            }
            v => v.to_string(),
        }
    }

    fn to_string_guarded(&self, seen: &mut Vec<*const ()>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Array(arr) => {
                let ptr = Rc::as_ptr(&arr.0) as *const ();
                if seen.contains(&ptr) {
                    return String::new();
                }

                seen.push(ptr);
                let items = arr
                    .0
                    .borrow()
                    .iter()
                    .map(|v| match v {
                        Value::Undefined | Value::Null => String::new(),
                        v => v.to_string_guarded(seen),
                    })
                    .collect::<Vec<String>>();
                seen.pop();

                items.join(",")
            }
            Value::Object(obj) => {
                let obj = obj.0.borrow();
                match obj.class {
                    ObjectClass::Plain => "[object Object]".to_string(),
                    ObjectClass::Error => {
                        let name = obj
                            .get("name")
                            .map_or_else(|| "Error".to_string(), |v| v.to_string_guarded(seen));
                        let message = obj
                            .get("message")
                            .map_or_else(String::new, |v| v.to_string_guarded(seen));

                        if message.is_empty() {
                            name
                        } else {
                            format!("{}: {}", name, message)
                        }
                    }
                }
            }
            Value::Function(func) => func.to_string(),
        }
    }
}

/// `ToString`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = Vec::new();
        write!(f, "{}", self.to_string_guarded(&mut seen))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

/// Strict (`===`) equality
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.strict_equals(other)
    }
}

#[test]
fn test_number_to_string() {
    let data = vec![
        (0.0, "0"),
        (-0.0, "0"),
        (1.0, "1"),
        (-42.0, "-42"),
        (0.5, "0.5"),
        (0.1 + 0.2, "0.30000000000000004"),
        (39916800.0, "39916800"),
        (1e20, "100000000000000000000"),
        (1e21, "1e+21"),
        (1.5e-7, "1.5e-7"),
        (0.000001, "0.000001"),
        (f64::NAN, "NaN"),
        (f64::INFINITY, "Infinity"),
        (f64::NEG_INFINITY, "-Infinity"),
    ];

    for (input, expected) in data {
        assert_eq!(number_to_string(input), expected);
    }
}

#[test]
fn test_to_number() {
    let data = vec![
        (Value::Null, 0.0),
        (Value::Boolean(true), 1.0),
        (Value::String("".to_string()), 0.0),
        (Value::String("  12  ".to_string()), 12.0),
        (Value::String("0x10".to_string()), 16.0),
        (Value::String("1e3".to_string()), 1000.0),
        (Value::String("-Infinity".to_string()), f64::NEG_INFINITY),
        (Value::new_array(vec![]), 0.0),
        (Value::new_array(vec![Value::Number(7.0)]), 7.0),
    ];
    for (input, expected) in data {
        assert_eq!(input.to_number(), expected, "{:?}", input);
    }

    let nans = vec![
        Value::Undefined,
        Value::String("abc".to_string()),
        Value::String("inf".to_string()),
        Value::String("1 2".to_string()),
        Value::new_object(vec![]),
    ];
    for input in nans {
        assert!(input.to_number().is_nan(), "{:?}", input);
    }
}

#[test]
fn test_to_boolean() {
    let falsy = vec![
        Value::Undefined,
        Value::Null,
        Value::Boolean(false),
        Value::Number(0.0),
        Value::Number(-0.0),
        Value::Number(f64::NAN),
        Value::String(String::new()),
    ];
    for v in falsy {
        assert!(!v.to_boolean(), "{:?}", v);
    }

    let truthy = vec![
        Value::Number(-1.0),
        Value::String("0".to_string()),
        Value::new_array(vec![]),
        Value::new_object(vec![]),
    ];
    for v in truthy {
        assert!(v.to_boolean(), "{:?}", v);
    }
}

#[test]
fn test_int32() {
    assert_eq!(to_int32(4294967295.0), -1);
    assert_eq!(to_int32(2147483648.0), -2147483648);
    assert_eq!(to_int32(-1.5), -1);
    assert_eq!(to_int32(f64::NAN), 0);
    assert_eq!(to_uint32(-1.0), 4294967295);
}

#[test]
fn test_to_string() {
    let arr = Value::new_array(vec![
        Value::Number(1.0),
        Value::Undefined,
        Value::String("a".to_string()),
        Value::Null,
    ]);
    assert_eq!(arr.to_string(), "1,,a,");
    assert_eq!(Value::new_object(vec![]).to_string(), "[object Object]");
    assert_eq!(
        Value::error_object("TypeError", "bad").to_string(),
        "TypeError: bad"
    );
    assert_eq!(Value::error_object("Error", "").to_string(), "Error");

    // Self referencing arrays must not recurse forever
    if let Value::Array(inner) = &arr {
        inner.0.borrow_mut().push(arr.clone());
    }
    assert_eq!(arr.to_string(), "1,,a,,");
}

#[test]
fn test_equality() {
    let one = Value::Number(1.0);
    let one_str = Value::String("1".to_string());
    assert!(one.loose_equals(&one_str));
    assert!(!one.strict_equals(&one_str));
    assert!(Value::Null.loose_equals(&Value::Undefined));
    assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
    assert!(Value::Boolean(true).loose_equals(&one));
    assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));

    let arr = Value::new_array(vec![]);
    assert!(arr.strict_equals(&arr.clone()));
    assert!(!arr.strict_equals(&Value::new_array(vec![])));
    assert!(arr.loose_equals(&Value::String(String::new())));
}

#[test]
fn test_properties() {
    let arr = Value::new_array(vec![Value::Number(1.0)]);
    arr.set_property("3", Value::Number(4.0))
        .expect("Failed to set index");
    assert_eq!(arr.get_property("length").expect("no length"), Value::Number(4.0));
    assert_eq!(arr.get_property("1").expect("no index"), Value::Undefined);

    arr.set_property("length", Value::Number(1.0))
        .expect("Failed to truncate");
    assert_eq!(arr.to_string(), "1");
    assert!(matches!(
        arr.set_property("length", Value::Number(-1.0)),
        Err(JsError::Range(_))
    ));

    let s = Value::String("abc".to_string());
    assert_eq!(s.get_property("length").expect("no length"), Value::Number(3.0));
    assert_eq!(
        s.get_property("1").expect("no index"),
        Value::String("b".to_string())
    );

    let obj = Value::new_object(vec![("a".to_string(), Value::Number(1.0))]);
    obj.set_property("b", Value::Boolean(true))
        .expect("Failed to set property");
    assert_eq!(obj.repr(), "{ a: 1, b: true }");
    assert_eq!(obj.get_property("c").expect("lookup failed"), Value::Undefined);

    assert!(matches!(
        Value::Null.get_property("x"),
        Err(JsError::Type(_))
    ));
    match Value::Null.set_property("x", Value::Number(1.0)) {
        Err(JsError::Type(msg)) => {
            assert_eq!(msg, "Cannot set properties of null (setting 'x')")
        }
        r => panic!("Unexpected result: {:?}", r),
    }

    // Growing through `length` pads with `undefined`
    let arr = Value::new_array(vec![Value::Number(1.0)]);
    arr.set_property("length", Value::Number(3.0))
        .expect("Failed to extend");
    assert_eq!(arr.repr(), "[1, undefined, undefined]");
}

#[test]
fn test_array_index() {
    assert_eq!(array_index("0"), Some(0));
    assert_eq!(array_index("4294967294"), Some(4294967294));
    assert_eq!(array_index("4294967295"), None);
    assert_eq!(array_index("18446744073709551615"), None);
    assert_eq!(array_index("01"), None);
    assert_eq!(array_index("-1"), None);
    assert_eq!(array_index("1.5"), None);
}

#[test]
fn test_array_limits() {
    let arr = Value::new_array(vec![]);

    // Not indices, so these are dropped like any other named property
    arr.set_property("18446744073709551615", Value::Number(1.0))
        .expect("Failed to set huge key");
    arr.set_property("4294967295", Value::Number(1.0))
        .expect("Failed to set huge key");
    assert_eq!(arr.get_property("length").expect("no length"), Value::Number(0.0));

    // Valid but too large to store densely
    assert!(matches!(
        arr.set_property("4294967294", Value::Number(1.0)),
        Err(JsError::Range(_))
    ));
    assert!(matches!(
        arr.set_property("length", Value::Number(4294967295.0)),
        Err(JsError::Range(_))
    ));
    assert!(matches!(
        arr.set_property("length", Value::Number(4294967296.0)),
        Err(JsError::Range(_))
    ));
    assert_eq!(arr.get_property("length").expect("no length"), Value::Number(0.0));
}

#[test]
fn test_repr() {
    let v = Value::new_array(vec![
        Value::String("a".to_string()),
        Value::Number(2.0),
        Value::new_object(vec![]),
    ]);
    assert_eq!(v.repr(), r#"["a", 2, {}]"#);
    assert_eq!(Value::Undefined.repr(), "undefined");
    assert_eq!(
        Value::error_object("RangeError", "too big").repr(),
        "RangeError: too big"
    );
    assert_eq!(
        Value::new_array(vec![Value::error_object("Error", "e")]).repr(),
        "[Error: e]"
    );
}
