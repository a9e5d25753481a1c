use std::sync::atomic::{AtomicBool, Ordering};

use crate::object::Object;
use crate::token::{Token, TokenType};

// Two independent flags, per the book's diagnostic sink: a static error
// (scan/parse/resolve) suppresses execution entirely, a runtime error only
// aborts the statement stream currently running. The REPL clears the first
// between lines and never the second.
static HAD_STATIC_ERROR: AtomicBool = AtomicBool::new(false);
static HAD_RUNTIME_ERROR: AtomicBool = AtomicBool::new(false);

pub fn had_static_error() -> bool {
    HAD_STATIC_ERROR.load(Ordering::SeqCst)
}

pub fn had_runtime_error() -> bool {
    HAD_RUNTIME_ERROR.load(Ordering::SeqCst)
}

pub fn reset_static_error() {
    HAD_STATIC_ERROR.store(false, Ordering::SeqCst);
}

pub fn error(line: i32, message: &str) {
    report(line, "", message);
}

pub fn error_at_token(token: &Token, message: &str) {
    if token.token_type == TokenType::Eof {
        report(token.line, " at end", message);
    } else {
        report(token.line, &format!(" at '{}'", token.lexeme), message);
    }
}

pub fn runtime_error(token: &Token, message: &str) {
    eprintln!("{}\n[line {}]", message, token.line);
    HAD_RUNTIME_ERROR.store(true, Ordering::SeqCst);
}

fn report(line: i32, where_: &str, message: &str) {
    eprintln!("[line {line}] Error{where_}: {message}");
    HAD_STATIC_ERROR.store(true, Ordering::SeqCst);
}

// Parser and resolver errors both go through `error_at_token`, which sets
// `HAD_STATIC_ERROR`; `Error::Parse` is just the signal that tells the
// caller to stop building this declaration and enter panic-mode recovery.
pub fn parser_error(token: &Token, message: &str) -> Error {
    error_at_token(token, message);
    Error::Parse
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error")]
    Parse,

    #[error("{message}")]
    Runtime { token: Token, message: String },

    // Non-local control flow, not a user-visible error: caught by the
    // function-call frame that invoked the body currently unwinding.
    #[error("return signal escaped its function")]
    Return { value: Object },

    // Same idea, caught by the nearest enclosing `while` invocation.
    #[error("break signal escaped its loop")]
    Break,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn runtime(token: &Token, message: impl Into<String>) -> Error {
        Error::Runtime {
            token: token.clone(),
            message: message.into(),
        }
    }
}
