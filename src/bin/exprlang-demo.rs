// ABOUTME: Thin CLI/REPL front-end over the engine facade — compile+run a file, or read-eval-print

use clap::Parser;
use exprlang::{Engine, EngineOptions, Environment};
use rustyline::error::ReadlineError;
use rustyline::{Config, Editor};
use std::path::PathBuf;

/// Run exprlang expressions from a file or an interactive prompt.
#[derive(Parser, Debug)]
#[command(name = "exprlang")]
#[command(version = exprlang::config::VERSION)]
#[command(about = "An embeddable expression evaluation engine")]
struct CliArgs {
    /// Expression file to execute (omit to start the REPL)
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let engine = Engine::new(EngineOptions::default());
    let env = Environment::new();

    if let Some(path) = args.script {
        let source = std::fs::read_to_string(&path)?;
        match engine.eval(&source, &env) {
            Ok(value) => println!("{value}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    run_repl(&engine, &env)
}

fn run_repl(engine: &Engine, env: &Environment) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::builder().auto_add_history(true).build();
    let mut rl: Editor<(), rustyline::history::DefaultHistory> = Editor::with_config(config)?;

    let history_file = ".exprlang_history";
    let _ = rl.load_history(history_file);

    println!("exprlang {} — type an expression, or :quit to exit", exprlang::config::VERSION);

    loop {
        let readline = rl.readline("expr> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ":quit" || line == ":exit" {
                    println!("Goodbye!");
                    break;
                }
                match engine.eval(line, env) {
                    Ok(value) => println!("=> {value}"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(history_file);
    Ok(())
}
