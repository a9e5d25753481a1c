use std::collections::HashMap;

use crate::error::{error_at_token, Error};
use crate::interpreter::Interpreter;
use crate::syntax::{expr, stmt, Expr, LiteralValue, NodeId, Stmt};
use crate::token::Token;

// Tracks whether the code currently being visited is inside a function body,
// and if so what kind - an `init` method needs different static rules than
// an ordinary method or function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Single pass over the statement list: binds each variable-referring
/// expression to a scope depth and enforces the static rules from the
/// language's scoping and class rules (`return` only in functions, `this`
/// only in methods, no self-inheriting classes, and so on).
pub struct Resolver<'i> {
    interpreter: &'i mut Interpreter,
    // Only local block scopes are tracked here; globals are more dynamic in
    // Lox; a name the resolver can't find anywhere in this stack is assumed
    // global and left unresolved.
    scopes: Vec<HashMap<String, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
    pub had_error: bool,
}

impl<'i> Resolver<'i> {
    pub fn new(interpreter: &'i mut Interpreter) -> Self {
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            had_error: false,
        }
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        let _ = statement.accept(self);
    }

    pub fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement);
        }
    }

    fn resolve_expr(&mut self, expression: &Expr) {
        let _ = expression.accept(self);
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    // Binds the name to "not ready yet" in the innermost scope, so a
    // reference to it inside its own initializer can be caught.
    fn declare(&mut self, name: &Token) {
        let already_declared = self
            .scopes
            .last()
            .is_some_and(|scope| scope.contains_key(&name.lexeme));
        if already_declared {
            self.report(name, "Already a variable with this name in this scope.");
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    // Walks the scope stack from innermost to outermost; the first scope
    // holding the name gives the depth. A name found in no scope is global
    // and is left out of `locals` entirely.
    fn resolve_local(&mut self, id: NodeId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, depth);
                return;
            }
        }
    }

    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], kind: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(body);
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn report(&mut self, token: &Token, message: &str) {
        error_at_token(token, message);
        self.had_error = true;
    }
}

impl<'i> expr::Visitor<()> for Resolver<'i> {
    fn visit_assign_expr(&mut self, id: NodeId, name: &Token, value: &Expr) -> Result<(), Error> {
        self.resolve_expr(value);
        self.resolve_local(id, name);
        Ok(())
    }

    fn visit_binary_expr(&mut self, left: &Expr, _operator: &Token, right: &Expr) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_call_expr(&mut self, callee: &Expr, _paren: &Token, arguments: &[Expr]) -> Result<(), Error> {
        self.resolve_expr(callee);
        for argument in arguments {
            self.resolve_expr(argument);
        }
        Ok(())
    }

    // Property dispatch is dynamic; only the object expression needs
    // resolving, never the property name.
    fn visit_get_expr(&mut self, object: &Expr, _name: &Token) -> Result<(), Error> {
        self.resolve_expr(object);
        Ok(())
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_literal_expr(&mut self, _value: &LiteralValue) -> Result<(), Error> {
        Ok(())
    }

    fn visit_logical_expr(&mut self, left: &Expr, _operator: &Token, right: &Expr) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_set_expr(&mut self, object: &Expr, _name: &Token, value: &Expr) -> Result<(), Error> {
        self.resolve_expr(value);
        self.resolve_expr(object);
        Ok(())
    }

    fn visit_super_expr(&mut self, id: NodeId, keyword: &Token, _method: &Token) -> Result<(), Error> {
        match self.current_class {
            ClassType::None => self.report(keyword, "Can't use 'super' outside of a class."),
            ClassType::Class => {
                self.report(keyword, "Can't use 'super' in a class with no superclass.")
            }
            ClassType::Subclass => {}
        }
        self.resolve_local(id, keyword);
        Ok(())
    }

    fn visit_this_expr(&mut self, id: NodeId, keyword: &Token) -> Result<(), Error> {
        if self.current_class == ClassType::None {
            self.report(keyword, "Can't use 'this' outside of a class.");
        } else {
            self.resolve_local(id, keyword);
        }
        Ok(())
    }

    fn visit_unary_expr(&mut self, _operator: &Token, right: &Expr) -> Result<(), Error> {
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_variable_expr(&mut self, id: NodeId, name: &Token) -> Result<(), Error> {
        // A reference to `x` that finds it "not ready yet" in the innermost
        // scope means `x` is being read inside its own initializer.
        if let Some(scope) = self.scopes.last() {
            if scope.get(&name.lexeme) == Some(&false) {
                self.report(name, "Can't read local variable in its own initializer.");
            }
        }
        self.resolve_local(id, name);
        Ok(())
    }
}

impl<'i> stmt::Visitor<()> for Resolver<'i> {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        self.begin_scope();
        self.resolve_stmts(statements);
        self.end_scope();
        Ok(())
    }

    // Legality of `break` outside a loop is a syntactic property, tracked
    // and reported by the parser instead - nothing to do here.
    fn visit_break_stmt(&mut self, _keyword: &Token) -> Result<(), Error> {
        Ok(())
    }

    fn visit_class_stmt(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &[Stmt],
    ) -> Result<(), Error> {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(superclass_expr) = superclass {
            let Expr::Variable {
                name: superclass_name,
                ..
            } = superclass_expr
            else {
                unreachable!("the parser only ever names a superclass by variable")
            };

            if superclass_name.lexeme == name.lexeme {
                self.report(superclass_name, "A class can't inherit from itself.");
            }

            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass_expr);

            self.begin_scope();
            self.scopes
                .last_mut()
                .expect("scope just pushed")
                .insert("super".to_string(), true);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .expect("scope just pushed")
            .insert("this".to_string(), true);

        for method in methods {
            let Stmt::Function { name, params, body } = method else {
                unreachable!("class bodies only ever contain Function statements")
            };
            let kind = if name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(params, body, kind);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    // Unlike variables, a function's name is defined eagerly, before its
    // body is resolved, so the function can recursively call itself.
    fn visit_function_stmt(&mut self, name: &Token, params: &[Token], body: &[Stmt]) -> Result<(), Error> {
        self.declare(name);
        self.define(name);
        self.resolve_function(params, body, FunctionType::Function);
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(then_branch);
        if let Some(else_branch) = else_branch {
            self.resolve_stmt(else_branch);
        }
        Ok(())
    }

    fn visit_null_stmt(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_return_stmt(&mut self, keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        if self.current_function == FunctionType::None {
            self.report(keyword, "Can't return from top-level code.");
        }

        if let Some(value) = value {
            if self.current_function == FunctionType::Initializer {
                self.report(keyword, "Can't return a value from an initializer.");
            }
            self.resolve_expr(value);
        }
        Ok(())
    }

    // Declaring then resolving then defining (rather than declare+define
    // immediately) is what lets `var a = a;` be caught: `a` exists in scope
    // but isn't "ready" while its own initializer is resolved.
    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        self.declare(name);
        if let Some(initializer) = initializer {
            self.resolve_expr(initializer);
        }
        self.define(name);
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn resolve(source: &str) -> bool {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let statements = parser.parse().unwrap();
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve_stmts(&statements);
        resolver.had_error
    }

    #[test]
    fn return_at_top_level_is_a_static_error() {
        assert!(resolve("return 1;"));
    }

    #[test]
    fn this_outside_a_class_is_a_static_error() {
        assert!(resolve("print this;"));
    }

    #[test]
    fn super_with_no_superclass_is_a_static_error() {
        assert!(resolve("class A { test() { super.method(); } }"));
    }

    #[test]
    fn class_inheriting_from_itself_is_a_static_error() {
        assert!(resolve("class Oops < Oops {}"));
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_is_a_static_error() {
        assert!(resolve("{ var a = a; }"));
    }

    #[test]
    fn duplicate_local_in_the_same_scope_is_a_static_error() {
        assert!(resolve("{ var a = 1; var a = 2; }"));
    }

    #[test]
    fn duplicate_global_is_allowed() {
        assert!(!resolve("var a = 1; var a = 2;"));
    }

    #[test]
    fn value_returning_initializer_is_a_static_error() {
        assert!(resolve("class Foo { init() { return 1; } }"));
    }

    #[test]
    fn bare_return_from_initializer_is_allowed() {
        assert!(!resolve("class Foo { init() { return; } }"));
    }
}
