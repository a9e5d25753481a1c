use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::class::LoxInstance;
use crate::environment::Environment;
use crate::error::Error;
use crate::function::Function;
use crate::object::{format_number, Object};
use crate::syntax::{expr, stmt, Expr, LiteralValue, NodeId, Stmt};
use crate::token::{Token, TokenType};

/// Walks the resolved AST directly, applying the evaluation rules and
/// driving control flow. `locals` is the resolver's side-table: for every
/// `Variable`/`Assign`/`This`/`Super` node it knows about, the interpreter
/// walks exactly that many enclosing frames instead of searching the chain.
pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<NodeId, usize>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals.borrow_mut().define(
            "clock".to_string(),
            Object::Callable(Function::Native {
                name: "clock",
                arity: 0,
                body: Rc::new(|_args| {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .expect("system clock before the epoch");
                    Object::Number(now.as_secs_f64())
                }),
            }),
        );

        Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
        }
    }

    // The resolver pokes resolution data directly into the interpreter as it
    // walks the tree, so by the time `interpret` runs, `locals` already has
    // everything it needs.
    pub fn resolve(&mut self, id: NodeId, depth: usize) {
        self.locals.insert(id, depth);
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }

    /// Evaluates a single expression without executing it as a statement -
    /// used by the REPL to print the value of a bare expression line.
    pub fn evaluate_top_level(&mut self, expression: &Expr) -> Result<Object, Error> {
        self.evaluate(expression)
    }

    fn execute(&mut self, statement: &Stmt) -> Result<(), Error> {
        statement.accept(self)
    }

    // Runs `statements` with `environment` as the current frame, restoring
    // the previous frame on every exit path: normal completion, a runtime
    // error, or a `return`/`break` signal unwinding through it.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<(), Error> {
        let previous = mem::replace(&mut self.environment, environment);
        let result = statements.iter().try_for_each(|s| self.execute(s));
        self.environment = previous;
        result
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Object, Error> {
        expr.accept(self)
    }

    fn lookup_variable(&self, id: NodeId, name: &Token) -> Result<Object, Error> {
        match self.locals.get(&id) {
            Some(&distance) => self.environment.borrow().get_at(distance, name),
            None => self.globals.borrow().get(name),
        }
    }
}

fn check_number_operand(operator: &Token, operand: &Object) -> Result<f64, Error> {
    match operand {
        Object::Number(n) => Ok(*n),
        _ => Err(Error::runtime(operator, "Operand must be a number.")),
    }
}

fn check_number_operands(operator: &Token, left: &Object, right: &Object) -> Result<(f64, f64), Error> {
    match (left, right) {
        (Object::Number(l), Object::Number(r)) => Ok((*l, *r)),
        _ => Err(Error::runtime(operator, "Operands must be numbers.")),
    }
}

impl expr::Visitor<Object> for Interpreter {
    fn visit_assign_expr(&mut self, id: NodeId, name: &Token, value: &Expr) -> Result<Object, Error> {
        let value = self.evaluate(value)?;
        match self.locals.get(&id) {
            Some(&distance) => self
                .environment
                .borrow_mut()
                .assign_at(distance, name, value.clone())?,
            None => self.globals.borrow_mut().assign(name, value.clone())?,
        }
        Ok(value)
    }

    fn visit_binary_expr(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Object, Error> {
        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => {
                let (l, r) = check_number_operands(operator, &l, &r)?;
                Ok(Object::Number(l - r))
            }
            TokenType::Slash => {
                let (l, r) = check_number_operands(operator, &l, &r)?;
                if r == 0.0 {
                    return Err(Error::runtime(operator, "Operands must not be zero."));
                }
                Ok(Object::Number(l / r))
            }
            TokenType::Star => {
                let (l, r) = check_number_operands(operator, &l, &r)?;
                Ok(Object::Number(l * r))
            }
            TokenType::Plus => match (&l, &r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Number(a + b)),
                (Object::String(a), Object::String(b)) => Ok(Object::String(format!("{a}{b}"))),
                (Object::String(a), Object::Number(b)) => {
                    Ok(Object::String(format!("{a}{}", format_number(*b))))
                }
                (Object::Number(a), Object::String(b)) => {
                    Ok(Object::String(format!("{}{b}", format_number(*a))))
                }
                _ => Err(Error::runtime(
                    operator,
                    "Operands must be two numbers or two strings.",
                )),
            },
            TokenType::Greater => {
                let (l, r) = check_number_operands(operator, &l, &r)?;
                Ok(Object::Boolean(l > r))
            }
            TokenType::GreaterEqual => {
                let (l, r) = check_number_operands(operator, &l, &r)?;
                Ok(Object::Boolean(l >= r))
            }
            TokenType::Less => {
                let (l, r) = check_number_operands(operator, &l, &r)?;
                Ok(Object::Boolean(l < r))
            }
            TokenType::LessEqual => {
                let (l, r) = check_number_operands(operator, &l, &r)?;
                Ok(Object::Boolean(l <= r))
            }
            TokenType::BangEqual => Ok(Object::Boolean(!l.equals(&r))),
            TokenType::EqualEqual => Ok(Object::Boolean(l.equals(&r))),
            _ => unreachable!("parser never produces this operator in a binary expression"),
        }
    }

    fn visit_call_expr(&mut self, callee: &Expr, paren: &Token, arguments: &[Expr]) -> Result<Object, Error> {
        let callee = self.evaluate(callee)?;

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument)?);
        }

        match callee {
            Object::Callable(function) => {
                if args.len() != function.arity() {
                    return Err(Error::runtime(
                        paren,
                        format!(
                            "Expected {} arguments but got {}.",
                            function.arity(),
                            args.len()
                        ),
                    ));
                }
                function.call(self, &args)
            }
            Object::Class(class) => {
                let arity = class.borrow().arity();
                if args.len() != arity {
                    return Err(Error::runtime(
                        paren,
                        format!("Expected {} arguments but got {}.", arity, args.len()),
                    ));
                }
                let instance = LoxInstance::new_instance(&class);
                if let Some(initializer) = class.borrow().find_method("init") {
                    initializer.bind(instance.clone()).call(self, &args)?;
                }
                Ok(instance)
            }
            _ => Err(Error::runtime(paren, "Can only call functions and classes.")),
        }
    }

    fn visit_get_expr(&mut self, object: &Expr, name: &Token) -> Result<Object, Error> {
        let object = self.evaluate(object)?;
        match &object {
            Object::Instance(instance) => instance.borrow().get(name, &object),
            _ => Err(Error::runtime(name, "Only instances have properties.")),
        }
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<Object, Error> {
        self.evaluate(expression)
    }

    fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<Object, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => Object::Boolean(*b),
            LiteralValue::Null => Object::Null,
            LiteralValue::Number(n) => Object::Number(*n),
            LiteralValue::String(s) => Object::String(s.clone()),
        })
    }

    fn visit_logical_expr(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Object, Error> {
        let left = self.evaluate(left)?;

        match operator.token_type {
            TokenType::Or if left.is_truthy() => return Ok(left),
            TokenType::And if !left.is_truthy() => return Ok(left),
            TokenType::Or | TokenType::And => (),
            _ => unreachable!("parser never produces this operator in a logical expression"),
        }

        self.evaluate(right)
    }

    fn visit_set_expr(&mut self, object: &Expr, name: &Token, value: &Expr) -> Result<Object, Error> {
        let object = self.evaluate(object)?;
        match object {
            Object::Instance(instance) => {
                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }
            _ => Err(Error::runtime(name, "Only instances have fields.")),
        }
    }

    fn visit_super_expr(&mut self, id: NodeId, keyword: &Token, method: &Token) -> Result<Object, Error> {
        let distance = *self
            .locals
            .get(&id)
            .expect("resolver always resolves 'super' locally");
        let superclass = self.environment.borrow().get_at(distance, keyword)?;
        let Object::Class(superclass) = superclass else {
            unreachable!("resolver only binds 'super' to a class value")
        };

        // `this` lives one frame closer than `super` - see Function::bind,
        // which nests the method's own closure one level inside the
        // superclass binding.
        let this_token = Token::new(TokenType::This, "this", keyword.line);
        let instance = self.environment.borrow().get_at(distance - 1, &this_token)?;

        let method = superclass
            .borrow()
            .find_method(&method.lexeme)
            .ok_or_else(|| Error::runtime(method, format!("Undefined property '{}'.", method.lexeme)))?;

        Ok(Object::Callable(method.bind(instance)))
    }

    fn visit_this_expr(&mut self, id: NodeId, keyword: &Token) -> Result<Object, Error> {
        self.lookup_variable(id, keyword)
    }

    fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<Object, Error> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => Ok(Object::Number(-check_number_operand(operator, &right)?)),
            TokenType::Bang => Ok(Object::Boolean(!right.is_truthy())),
            _ => unreachable!("parser never produces this operator in a unary expression"),
        }
    }

    fn visit_variable_expr(&mut self, id: NodeId, name: &Token) -> Result<Object, Error> {
        self.lookup_variable(id, name)
    }
}

impl stmt::Visitor<()> for Interpreter {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        let environment = Rc::new(RefCell::new(Environment::from(&self.environment)));
        self.execute_block(statements, environment)
    }

    fn visit_break_stmt(&mut self, _keyword: &Token) -> Result<(), Error> {
        Err(Error::Break)
    }

    fn visit_class_stmt(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &[Stmt],
    ) -> Result<(), Error> {
        let superclass_class = match superclass {
            Some(superclass_expr) => {
                let value = self.evaluate(superclass_expr)?;
                match value {
                    Object::Class(class) => Some(class),
                    _ => {
                        let Expr::Variable { name, .. } = superclass_expr else {
                            unreachable!("the parser only ever names a superclass by variable")
                        };
                        return Err(Error::runtime(name, "Superclass must be a class."));
                    }
                }
            }
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Null);

        // Methods close over a scope that binds `super`, mirroring how
        // `Function::bind` nests a `this` scope inside a method's closure.
        let methods_closure = match &superclass_class {
            Some(superclass) => {
                let env = Rc::new(RefCell::new(Environment::from(&self.environment)));
                env.borrow_mut()
                    .define("super".to_string(), Object::Class(Rc::clone(superclass)));
                env
            }
            None => Rc::clone(&self.environment),
        };

        let mut methods_map = HashMap::new();
        for method in methods {
            let Stmt::Function { name: method_name, .. } = method else {
                unreachable!("class bodies only ever contain Function statements")
            };
            let is_initializer = method_name.lexeme == "init";
            let declaration = Rc::new(method.clone());
            let function = Function::new_user(declaration, Rc::clone(&methods_closure), is_initializer);
            methods_map.insert(method_name.lexeme.clone(), function);
        }

        let class = crate::class::LoxClass::new(name.lexeme.clone(), superclass_class, methods_map);
        let class = Object::Class(Rc::new(RefCell::new(class)));

        self.environment.borrow_mut().assign(name, class)?;
        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.evaluate(expression)?;
        Ok(())
    }

    fn visit_function_stmt(&mut self, name: &Token, params: &[Token], body: &[Stmt]) -> Result<(), Error> {
        let declaration = Rc::new(Stmt::Function {
            name: name.clone(),
            params: params.to_vec(),
            body: body.to_vec(),
        });
        let function = Function::new_user(declaration, Rc::clone(&self.environment), false);
        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Callable(function));
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<(), Error> {
        if self.evaluate(condition)?.is_truthy() {
            self.execute(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.execute(else_branch)
        } else {
            Ok(())
        }
    }

    fn visit_null_stmt(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        let value = self.evaluate(expression)?;
        println!("{}", value.stringify());
        Ok(())
    }

    fn visit_return_stmt(&mut self, _keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        let value = match value {
            Some(expr) => self.evaluate(expr)?,
            None => Object::Null,
        };
        Err(Error::Return { value })
    }

    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        let value = match initializer {
            Some(expr) => self.evaluate(expr)?,
            None => Object::Null,
        };
        self.environment.borrow_mut().define(name.lexeme.clone(), value);
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        while self.evaluate(condition)?.is_truthy() {
            match self.execute(body) {
                Err(Error::Break) => break,
                other => other?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    fn eval(source: &str) -> Object {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let statements = parser.parse().unwrap();
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve_stmts(&statements);
        assert!(!resolver.had_error);
        let Stmt::Expression { expression } = &statements[0] else {
            panic!("expected a single expression statement");
        };
        interpreter.evaluate_top_level(expression).unwrap()
    }

    #[test]
    fn string_plus_number_stringifies_the_number() {
        assert!(matches!(eval(r#""a" + 1;"#), Object::String(s) if s == "a1"));
    }

    #[test]
    fn number_plus_string_stringifies_the_number() {
        assert!(matches!(eval(r#"1 + "a";"#), Object::String(s) if s == "1a"));
    }

    #[test]
    fn whole_number_division_result_trims_trailing_zero() {
        assert!(matches!(eval("6 / 2;"), Object::Number(n) if n == 3.0));
    }

    #[test]
    fn division_by_negative_zero_is_a_runtime_error() {
        let mut scanner = Scanner::new("1 / -0.0;".to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let statements = parser.parse().unwrap();
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve_stmts(&statements);
        assert!(interpreter.interpret(&statements).is_err());
    }

    #[test]
    fn logical_and_short_circuits_without_evaluating_the_right_operand() {
        assert!(matches!(eval("false and (1/0);"), Object::Boolean(false)));
    }
}
