use std::io;
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{error, info};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{config::Config as EditorConfig, Editor, Helper};
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

mod conformance;
mod input;
mod lang;
mod repl;

use input::fixup_input;
use lang::runtime::{Config, Runtime, DEFAULT_MAX_CALL_DEPTH};
use repl::ReplHelper;

const HISTORY_FILE: &str = ".jsrs_history";
const PROMPT: &str = "> ";
const EXIT_COMMAND: &str = ".exit";
/// Script calls recurse on the native stack of the interpreter thread
const STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "jsrs", version, about = "A small JavaScript interpreter")]
struct Opt {
    /// Script to run
    file: Option<PathBuf>,

    /// Evaluate CODE instead of a file
    #[arg(short, long, value_name = "CODE", conflicts_with = "file")]
    eval: Option<String>,

    /// Run every `.js` file under DIR as a conformance test
    #[arg(short, long, value_name = "DIR", conflicts_with_all = ["file", "eval", "interactive"])]
    test: Option<PathBuf>,

    /// Enter the REPL after running a script
    #[arg(short, long)]
    interactive: bool,

    /// Show debug output
    #[arg(short, long)]
    debug: bool,

    /// Maximum depth of nested script function calls
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    };

    match SimpleLogger::init(filter, LogConfig::default()) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to init logger: {}", e),
    }
}

fn init_editor() -> Result<Editor<ReplHelper, DefaultHistory>> {
    let config = EditorConfig::builder().auto_add_history(true).build();
    let mut editor = match Editor::with_config(config) {
        Ok(e) => e,
        Err(e) => bail!("Failed to init editor: {}", e),
    };
    editor.set_helper(Some(ReplHelper::new()));

    Ok(editor)
}

fn init_history<H: Helper>(editor: &mut Editor<H, DefaultHistory>) {
    if editor.load_history(HISTORY_FILE).is_err() {
        info!("No history loaded from {}", HISTORY_FILE);
    }
}

fn save_history<H: Helper>(editor: &mut Editor<H, DefaultHistory>) -> Result<()> {
    match editor.save_history(HISTORY_FILE) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to save history: {}", e),
    }
}

fn welcome() {
    println!(
        r#"jsrs (a small JavaScript interpreter) v{}"#,
        env!("CARGO_PKG_VERSION")
    );
    println!("Type '{}' to quit", EXIT_COMMAND);
    println!();
}

fn repl(runtime: &mut Runtime) -> Result<()> {
    let mut editor = init_editor()?;
    init_history(&mut editor);
    welcome();
    runtime.set_interactive(true);

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                info!("read: {}", &line);

                let trimmed = line.trim();
                if trimmed == EXIT_COMMAND {
                    break;
                } else if trimmed.is_empty() {
                    continue;
                }

                if let Err(e) = runtime.eval(&fixup_input(&line)) {
                    eprintln!("{}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("Press Ctrl-D or type '{}' to quit", EXIT_COMMAND);
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                break;
            }
            Err(e) => {
                error!("Unexpected error: {}", e);
                break;
            }
        }
    }

    save_history(&mut editor)
}

fn run(opts: Opt) -> Result<()> {
    let config = Config {
        interactive: false,
        max_call_depth: opts.max_call_depth,
    };

    if let Some(dir) = &opts.test {
        let report = conformance::run_dir(dir, &config)?;
        print!("{}", report);
        return Ok(());
    }

    let mut stdout = io::stdout();
    let mut runtime = Runtime::new(&mut stdout, config);

    if let Some(code) = &opts.eval {
        runtime.eval(code).map_err(|e| anyhow!("{}", e))?;
    } else if let Some(file) = &opts.file {
        runtime.eval_file(file)?;
    } else {
        return repl(&mut runtime);
    }

    if opts.interactive {
        repl(&mut runtime)
    } else {
        Ok(())
    }
}

fn main() -> Result<()> {
    let opts = Opt::parse();
    init_logging(opts.debug)?;

    let interpreter = thread::Builder::new()
        .name("jsrs".to_string())
        .stack_size(STACK_SIZE)
        .spawn(move || run(opts))
        .context("Failed to spawn interpreter thread")?;

    match interpreter.join() {
        Ok(ret) => ret,
        Err(_) => bail!("Interpreter thread panicked"),
    }
}
