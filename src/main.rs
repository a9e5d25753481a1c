use std::env;
use std::process::exit;

use lox::error::{self, Error};
use lox::Lox;

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let args: Vec<String> = env::args().collect();
    let mut lox = Lox::new();
    match &args[..] {
        [_, file_path] => {
            match lox.run_file(file_path) {
                Ok(()) => (),
                Err(Error::Io(e)) => {
                    eprintln!("{e}");
                    exit(74);
                }
                Err(Error::Parse) => exit(65),
                Err(Error::Runtime { .. }) => {
                    unreachable!("runtime errors are reported and absorbed inside Lox::run")
                }
                Err(Error::Return { .. }) | Err(Error::Break) => {
                    unreachable!("resolver statically forbids return/break from escaping")
                }
            }

            if error::had_static_error() {
                exit(65);
            }
            if error::had_runtime_error() {
                exit(70);
            }
        }
        [_] => lox.run_prompt()?,
        _ => {
            eprintln!("Usage: lox [script]");
            exit(64)
        }
    }
    Ok(())
}
