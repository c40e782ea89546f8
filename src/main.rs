use rill::session::Session;
use std::env;
use std::io::{self, Write};
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => run_prompt(),
        2 => run_file(&args[1]),
        _ => {
            println!("Usage: rill [script]");
            process::exit(64);
        }
    }
}

fn run_file(path: &str) {
    let mut session = Session::new();
    match session.run_file(path) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Could not read '{}': {}", path, err);
            process::exit(66);
        }
    }
}

fn run_prompt() {
    let mut session = Session::new();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!();
                break;
            }
            Ok(_) => (),
        }
        session.reset();
        if let Some(echo) = session.run(&line, true) {
            println!("{}", echo);
        }
    }
}
