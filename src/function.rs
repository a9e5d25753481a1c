use crate::environment::Environment;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::object::Object;
use crate::syntax::Stmt;
use crate::token::{Token, TokenType};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Function {
    // These are functions that the interpreter exposes to user code but that
    // are implemented in the host language. Sometimes these are called
    // primitives, external functions, or foreign functions. To add a native
    // function, the book uses anonymous class instances that implement the
    // LoxCallable interface; here a boxed closure plays that role.
    Native {
        name: &'static str,
        arity: usize,
        body: Rc<dyn Fn(&[Object]) -> Object>,
    },

    // LoxFunction in the book. `declaration` is the Function statement the
    // parser produced; sharing it via `Rc` means `bind` can produce a new
    // closure-over-closure without cloning the body, and two `Function`
    // values compare equal only when they share both declaration and
    // closure - exactly the "callables compare by identity" rule.
    User {
        declaration: Rc<Stmt>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    },
}

fn this_token() -> Token {
    Token::new(TokenType::This, "this", 0)
}

impl Function {
    pub fn new_user(declaration: Rc<Stmt>, closure: Rc<RefCell<Environment>>, is_initializer: bool) -> Self {
        debug_assert!(matches!(*declaration, Stmt::Function { .. }));
        Function::User {
            declaration,
            closure,
            is_initializer,
        }
    }

    // We pass in the interpreter in case the class implementing
    // call() needs it. We also give it the list of evaluated
    // argument values. The implementer's job is then to return the
    // value that the call expression produces.
    pub fn call(&self, interpreter: &mut Interpreter, arguments: &[Object]) -> Result<Object, Error> {
        match self {
            Function::Native { body, .. } => Ok(body(arguments)),
            Function::User {
                declaration,
                closure,
                is_initializer,
            } => {
                let Stmt::Function { params, body, .. } = declaration.as_ref() else {
                    unreachable!("Function::User always wraps a Stmt::Function")
                };

                // Each call gets its own environment extending the closure,
                // otherwise recursion and re-entrant calls to the same
                // function would clobber each other's locals.
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                for (param, argument) in params.iter().zip(arguments.iter()) {
                    environment
                        .borrow_mut()
                        .define(param.lexeme.clone(), argument.clone());
                }

                let result = interpreter.execute_block(body, environment);

                if *is_initializer {
                    // `init` always yields the instance it initialized,
                    // whether it falls off the end or returns early - but
                    // any other error (a runtime error, not a return) must
                    // still propagate instead of being swallowed here.
                    return match result {
                        Ok(()) | Err(Error::Return { .. }) => {
                            closure.borrow().get_at(0, &this_token())
                        }
                        Err(other) => Err(other),
                    };
                }

                match result {
                    Err(Error::Return { value }) => Ok(value),
                    Err(other) => Err(other),
                    Ok(()) => Ok(Object::Null),
                }
            }
        }
    }

    // We create a new environment nestled inside the method's original
    // closure - a closure-within-a-closure. When the method is called, that
    // becomes the parent of the method body's environment. We declare
    // "this" as a variable in that environment and bind it to the given
    // instance, the instance that the method is being accessed from.
    pub fn bind(&self, instance: Object) -> Self {
        match self {
            Function::Native { .. } => unreachable!("native functions are never bound"),
            Function::User {
                declaration,
                closure,
                is_initializer,
            } => {
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                environment
                    .borrow_mut()
                    .define("this".to_string(), instance);
                Function::User {
                    declaration: Rc::clone(declaration),
                    closure: environment,
                    is_initializer: *is_initializer,
                }
            }
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native { arity, .. } => *arity,
            Function::User { declaration, .. } => {
                let Stmt::Function { params, .. } = declaration.as_ref() else {
                    unreachable!()
                };
                params.len()
            }
        }
    }

    // Identity, not structural, equality - two `Function`s are "the same
    // callable" only when they were produced from the same declaration and
    // closure (or, for natives, the same underlying host function).
    pub fn is_same(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Native { body: a, .. }, Function::Native { body: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            (
                Function::User {
                    declaration: d1,
                    closure: c1,
                    ..
                },
                Function::User {
                    declaration: d2,
                    closure: c2,
                    ..
                },
            ) => Rc::ptr_eq(d1, d2) && Rc::ptr_eq(c1, c2),
            _ => false,
        }
    }

    fn name(&self) -> &str {
        match self {
            Function::Native { name, .. } => name,
            Function::User { declaration, .. } => {
                let Stmt::Function { name, .. } = declaration.as_ref() else {
                    unreachable!()
                };
                &name.lexeme
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { .. } => write!(f, "<native_fn {}>", self.name()),
            Function::User { .. } => write!(f, "<fn {}>", self.name()),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn make_user(name: &str) -> Function {
        let declaration = Rc::new(Stmt::Function {
            name: Token::new(TokenType::Identifier, name, 1),
            params: vec![],
            body: vec![],
        });
        let closure = Rc::new(RefCell::new(Environment::new()));
        Function::new_user(declaration, closure, false)
    }

    #[test]
    fn bound_copies_share_declaration_but_not_closure() {
        let f = make_user("method");
        let bound_a = f.bind(Object::Number(1.0));
        let bound_b = f.bind(Object::Number(2.0));
        assert!(!bound_a.is_same(&bound_b));
    }

    #[test]
    fn same_value_is_same_as_itself() {
        let f = make_user("method");
        assert!(f.is_same(&f.clone()));
    }
}
