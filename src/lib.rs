pub mod class;
pub mod environment;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod object;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod syntax;
pub mod token;

use std::io::{self, BufRead, Write};

use error::Error;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;
use syntax::Stmt;

/// The CLI driver: owns the interpreter across an entire run so that top-level
/// declarations in a REPL session persist from one line to the next.
pub struct Lox {
    interpreter: Interpreter,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    pub fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
        }
    }

    pub fn run_file(&mut self, file_path: &str) -> Result<(), Error> {
        let contents = std::fs::read_to_string(file_path)?;
        self.run(contents, false)
    }

    pub fn run_prompt(&mut self) -> Result<(), Error> {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        loop {
            print!("> ");
            io::stdout().flush().ok();

            let mut line = String::new();
            if handle.read_line(&mut line)? == 0 {
                // EOF (Ctrl-D): end the session quietly.
                println!();
                return Ok(());
            }

            // A static error on one line shouldn't poison the next; a runtime
            // error, per spec, is never cleared within a session.
            error::reset_static_error();
            let _ = self.run(line, true);
        }
    }

    fn run(&mut self, source: String, repl: bool) -> Result<(), Error> {
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens();

        let mut parser = Parser::new(tokens);
        let statements = parser.parse()?;

        // Scan or parse errors mean this unit never runs - resolving
        // something that doesn't parse is pointless.
        if error::had_static_error() {
            return Ok(());
        }

        let mut resolver = Resolver::new(&mut self.interpreter);
        resolver.resolve_stmts(&statements);

        if resolver.had_error {
            return Ok(());
        }

        // In the REPL, a lone expression statement prints its value instead
        // of running silently - this is the only place the driver peeks into
        // AST shape.
        let result = if repl {
            if let [Stmt::Expression { expression }] = statements.as_slice() {
                self.interpreter
                    .evaluate_top_level(expression)
                    .map(|value| println!("{}", value.stringify()))
            } else {
                self.interpreter.interpret(&statements)
            }
        } else {
            self.interpreter.interpret(&statements)
        };

        // A runtime error aborts the statement stream but isn't propagated
        // further - it's reported here and the flag it sets is what drives
        // the process exit code.
        if let Err(Error::Runtime { token, message }) = &result {
            error::runtime_error(token, message);
            return Ok(());
        }

        result
    }
}
