use std::io::{self, Read};
use std::{env, fs, process};

use rlisp::run;

fn main() {
    tracing_subscriber::fmt::init();

    let source = match read_source() {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    match run(&source) {
        Ok(values) => {
            for value in values {
                println!("{}", value);
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn read_source() -> io::Result<String> {
    match env::args().nth(1) {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(source)
        }
    }
}
