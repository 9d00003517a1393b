//! Sputnik style conformance runner
//!
//! Every `.js` file under a directory is run in a fresh runtime. A test passes if it runs without
//! error, or, for tests marked `@negative`, if it fails with an error the script itself caused.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use walkdir::WalkDir;

use crate::input::is_negative_test;
use crate::lang::error::JsError;
use crate::lang::runtime::{Config, Runtime};

const OK: &str = "OK";

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Pass,
    /// (kind, message), eg. ("TypeError", "x is not a function")
    Fail(String, String),
}

impl Outcome {
    fn from_error(e: JsError) -> Self {
        let kind = e.kind().to_string();
        match e {
            JsError::Thrown(v) if v.is_error_object() => {
                let field = |name: &str| {
                    v.get_property(name)
                        .map(|p| p.to_string())
                        .unwrap_or_default()
                };
                Outcome::Fail(field("name"), field("message"))
            }
            JsError::Thrown(v) => Outcome::Fail("UncaughtError".to_string(), v.repr()),
            JsError::Syntax(msg)
            | JsError::Type(msg)
            | JsError::Reference(msg)
            | JsError::Range(msg)
            | JsError::Test(msg)
            | JsError::Internal(msg) => Outcome::Fail(kind, msg),
        }
    }

    fn kind(&self) -> &str {
        match self {
            Outcome::Pass => OK,
            Outcome::Fail(kind, _) => kind,
        }
    }
}

pub struct TestResult {
    pub path: PathBuf,
    pub outcome: Outcome,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Pass => write!(f, "{}: {}", self.path.display(), OK),
            Outcome::Fail(kind, msg) => write!(f, "{}: {}: {}", self.path.display(), kind, msg),
        }
    }
}

pub struct Report {
    pub results: Vec<TestResult>,
}

impl Report {
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == Outcome::Pass)
            .count()
    }

    /// Number of results per outcome kind
    pub fn recap(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.outcome.kind()).or_insert(0) += 1;
        }

        counts
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{}", result)?;
        }

        writeln!(f)?;
        writeln!(f, "Recap:")?;
        for (kind, count) in self.recap() {
            writeln!(f, "{}:\t{}", kind, count)?;
        }

        let total = self.results.len();
        let passed = self.passed();
        let percent = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };
        writeln!(f, "Passed: {}/{} = {:.1}%", passed, total, percent)
    }
}

/// Recursively collect `.js` files under `dir`, sorted by path
///
/// Symlinks are not followed.
pub fn find_tests(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut tests = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let is_test = entry.file_type().is_file()
            && entry.path().extension().map_or(false, |ext| ext == "js");
        if is_test {
            tests.push(entry.into_path());
        }
    }

    Ok(tests)
}

/// Run one test's source and decide whether it passed
pub fn run_source(source: &str, config: &Config) -> Outcome {
    let mut sink = io::sink();
    let mut runtime = Runtime::new(&mut sink, config.clone());
    let negative = is_negative_test(source);

    match runtime.eval(source) {
        Ok(_) if negative => Outcome::Fail(
            "NegativeTestError".to_string(),
            "expected an error but evaluation succeeded".to_string(),
        ),
        Ok(_) => Outcome::Pass,
        // Harness failures (`$ERROR`, host errors) never count as the expected error
        Err(e) if negative && e.is_catchable() => {
            debug!("Negative test failed as expected: {}", e);
            Outcome::Pass
        }
        Err(e) => Outcome::from_error(e),
    }
}

pub fn run_test(path: &Path, config: &Config) -> Result<TestResult> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let outcome = run_source(&source, config);

    Ok(TestResult {
        path: path.to_path_buf(),
        outcome,
    })
}

/// Run every test under `dir`
pub fn run_dir(dir: &Path, config: &Config) -> Result<Report> {
    let tests = find_tests(dir)?;
    info!("Running {} tests under {}", tests.len(), dir.display());

    let mut results = Vec::with_capacity(tests.len());
    for path in tests {
        let result = run_test(&path, config)?;
        debug!("{}", result);
        results.push(result);
    }

    Ok(Report { results })
}

#[cfg(test)]
fn write_file(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create directory");
    }
    fs::write(path, contents).expect("Failed to write test file");
}

#[test]
fn test_run_source() {
    let config = Config::default();
    let data = vec![
        ("var x = 1;", Outcome::Pass),
        (
            "undefinedFn();",
            Outcome::Fail(
                "ReferenceError".to_string(),
                "undefinedFn is not defined".to_string(),
            ),
        ),
        (
            "throw new RangeError('r');",
            Outcome::Fail("RangeError".to_string(), "r".to_string()),
        ),
        (
            "throw 'str';",
            Outcome::Fail("UncaughtError".to_string(), "\"str\"".to_string()),
        ),
        (
            "if (1 !== 2) $ERROR('#1: wrong');",
            Outcome::Fail("TestError".to_string(), "#1: wrong".to_string()),
        ),
        ("// @negative\nvar = 1;", Outcome::Pass),
        ("// @negative\nnull.x;", Outcome::Pass),
        (
            "// @negative\n$ERROR('no');",
            Outcome::Fail("TestError".to_string(), "no".to_string()),
        ),
        (
            "// @negative\nvar ok = 1;",
            Outcome::Fail(
                "NegativeTestError".to_string(),
                "expected an error but evaluation succeeded".to_string(),
            ),
        ),
    ];

    for (source, expected) in data {
        assert_eq!(run_source(source, &config), expected, "{}", source);
    }
}

#[test]
fn test_bundled_sputnik() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("sputnik");
    let report = run_dir(&dir, &Config::default()).expect("Failed to run tests");

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.passed(), 2);
    assert!(report.to_string().ends_with("Passed: 2/2 = 100.0%\n"));
}

#[test]
fn test_run_dir() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_file(dir.path(), "b/ok.js", "var a = [1, 2]; if (a.length !== 2) $ERROR('len');");
    write_file(dir.path(), "a/type.js", "var x = 1; x();");
    write_file(dir.path(), "c/negative.js", "/* @negative */ try {}");
    write_file(dir.path(), "notes.txt", "not a test");

    let tests = find_tests(dir.path()).expect("Failed to find tests");
    let names: Vec<&str> = tests
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .collect();
    assert_eq!(names, vec!["type.js", "ok.js", "negative.js"]);

    let report = run_dir(dir.path(), &Config::default()).expect("Failed to run tests");
    let output = report.to_string();
    let lines: Vec<&str> = output.lines().collect();

    assert!(lines[0].ends_with("type.js: TypeError: x is not a function"));
    assert!(lines[1].ends_with("ok.js: OK"));
    assert!(lines[2].ends_with("negative.js: OK"));
    assert_eq!(report.recap().get("OK"), Some(&2));
    assert_eq!(report.recap().get("TypeError"), Some(&1));
    assert_eq!(lines.last(), Some(&"Passed: 2/3 = 66.7%"));
}

#[cfg(unix)]
#[test]
fn test_symlink_cycle() {
    use std::os::unix::fs::symlink;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_file(dir.path(), "a/t.js", "var t = 1;");
    symlink(dir.path(), dir.path().join("a").join("loop")).expect("Failed to create symlink");
    symlink(dir.path().join("a/t.js"), dir.path().join("link.js"))
        .expect("Failed to create symlink");

    let tests = find_tests(dir.path()).expect("Failed to find tests");
    assert_eq!(tests, vec![dir.path().join("a").join("t.js")]);
}

#[test]
fn test_missing_dir() {
    assert!(run_dir(Path::new("/does/not/exist"), &Config::default()).is_err());
}
