use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context};
use log::debug;

use crate::lang::error::Result;
use crate::lang::eval::Eval;
use crate::lang::parse::parse;
use crate::lang::semantics::SemanticAnalyzer;
use crate::lang::value::Value;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

#[derive(Clone, Debug)]
pub struct Config {
    /// Echo the value of each evaluated program to the sink (useful when a human is at a REPL)
    pub interactive: bool,
    /// How deeply script functions may recurse before a `RangeError`
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interactive: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

pub struct Runtime<'a> {
    semantics: SemanticAnalyzer,
    eval: Eval<'a>,
    interactive: bool,
}

impl<'a> Runtime<'a> {
    /// Create a new `Runtime` instance
    ///
    /// `sink` is where output should be written. eg. output of `log()` calls
    pub fn new(sink: &'a mut dyn Write, config: Config) -> Self {
        let semantics = SemanticAnalyzer::new();
        let eval = Eval::new(sink, config.max_call_depth);

        Self {
            semantics,
            eval,
            interactive: config.interactive,
        }
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    /// Parse, check and run `source` in the global scope
    ///
    /// Returns the value of the last expression statement (`undefined` if there is none)
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        // Parse input into AST
        let stmts = parse(source)?;
        debug!("Parsed {} top level statements", stmts.len());

        // Perform semantic analysis
        self.semantics.analyze(&stmts)?;

        // Evaluate AST
        let val = self.eval.eval(&stmts)?;

        if self.interactive {
            if let Some(v) = &val {
                writeln!(self.eval.sink(), "{}", v.repr())?;
            }
        }

        Ok(val.unwrap_or(Value::Undefined))
    }

    /// Read and run a script file
    pub fn eval_file(&mut self, path: &Path) -> anyhow::Result<Value> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        debug!("Evaluating {}", path.display());

        // Script errors hold `Rc`s and cannot cross into `anyhow` as-is
        self.eval(&source).map_err(|e| anyhow!("{}", e))
    }
}

#[test]
fn test_interactive() {
    let mut output = Vec::new();
    {
        let config = Config {
            interactive: true,
            ..Default::default()
        };
        let mut runtime = Runtime::new(&mut output, config);
        assert!(runtime.eval("2 + 3;").is_ok());
        assert!(runtime.eval("var x = 1;").is_ok());
        assert!(runtime.eval("'str'").is_ok());
        assert!(runtime.eval("[1, 'a']").is_ok());
    }
    assert_eq!(
        String::from_utf8(output).expect("Output not utf-8"),
        "5\n\"str\"\n[1, \"a\"]\n"
    );
}

#[test]
fn test_state_persists() {
    let mut output = Vec::new();
    {
        let mut runtime = Runtime::new(&mut output, Config::default());
        assert!(runtime.eval("function add(a, b) { return a + b; }").is_ok());
        assert!(runtime.eval("let total = add(2, 3);").is_ok());
        assert_eq!(runtime.eval("total").ok(), Some(Value::Number(5.0)));

        // Early errors reject the whole program before anything runs
        assert!(runtime.eval("log('ran'); break;").is_err());
        assert!(runtime.eval("let total = 1;").is_err());
    }
    assert!(output.is_empty());
}

#[test]
fn test_errors() {
    use crate::lang::error::JsError;

    let mut output = Vec::new();
    let mut runtime = Runtime::new(&mut output, Config::default());
    assert!(matches!(runtime.eval("var = 1"), Err(JsError::Syntax(_))));
    assert!(matches!(runtime.eval("1 = 1"), Err(JsError::Syntax(_))));
    assert!(matches!(runtime.eval("nope"), Err(JsError::Reference(_))));
    assert!(matches!(runtime.eval("throw 1"), Err(JsError::Thrown(_))));
    assert!(matches!(
        runtime.eval("let shadowed = 1; var shadowed = 2; log(shadowed);"),
        Err(JsError::Syntax(_))
    ));
    assert!(matches!(
        runtime.eval(include_str!(
            "../../sputnik/12_Statement/12.14_The_try_Statement/S12.14_A16_T13.js"
        )),
        Err(JsError::Syntax(_))
    ));
}

#[test]
fn test_eval_file() {
    let mut output = Vec::new();
    {
        let mut runtime = Runtime::new(&mut output, Config::default());
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/factorial.js");
        assert!(runtime.eval_file(&path).is_ok());
        assert!(runtime.eval_file(Path::new("does/not/exist.js")).is_err());
    }
    assert_eq!(
        String::from_utf8(output).expect("Output not utf-8"),
        "1! = 1\n5! = 120\n11! = 39916800\n"
    );
}
