use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::function::Function;
use crate::object::Object;
use crate::token::Token;

// The instance stores the state, the class stores the behaviour
#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<RefCell<LoxClass>>>,
    pub methods: HashMap<String, Function>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<RefCell<LoxClass>>>,
        methods: HashMap<String, Function>,
    ) -> Self {
        LoxClass {
            name,
            superclass,
            methods,
        }
    }

    // Walks this class's own methods first, then its superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Function> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.borrow().find_method(name))
    }

    // A class's call arity is its initializer's; a class with no `init`
    // takes no arguments.
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }
}

impl fmt::Display for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug)]
pub struct LoxInstance {
    pub class: Rc<RefCell<LoxClass>>,
    fields: HashMap<String, Object>,
}

impl LoxInstance {
    // Returns a new `LoxInstance` wrapped in an `Object::Instance`
    pub fn new_instance(class: &Rc<RefCell<LoxClass>>) -> Object {
        let instance = LoxInstance {
            class: Rc::clone(class),
            fields: HashMap::new(),
        };

        Object::Instance(Rc::new(RefCell::new(instance)))
    }

    // Returns a member field of this instance.
    // instance - A reference to this instance as an object, used to bind
    // `this` if the lookup resolves to a method rather than a field.
    pub fn get(&self, name: &Token, instance: &Object) -> Result<Object, Error> {
        if let Some(field) = self.fields.get(&name.lexeme) {
            Ok(field.clone())
        } else if let Some(method) = self.class.borrow().find_method(&name.lexeme) {
            Ok(Object::Callable(method.bind(instance.clone())))
        } else {
            Err(Error::runtime(
                name,
                format!("Undefined property '{}'.", name.lexeme),
            ))
        }
    }

    // Since Lox allows freely creating new fields on instances, there's no
    // need to see if the key is already present.
    pub fn set(&mut self, name: &Token, value: Object) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

impl fmt::Display for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class.borrow().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn ident(name: &str) -> Token {
        Token::new(TokenType::Identifier, name, 1)
    }

    #[test]
    fn find_method_walks_the_superclass_chain() {
        let mut base_methods = HashMap::new();
        base_methods.insert(
            "greet".to_string(),
            Function::Native {
                name: "greet",
                arity: 0,
                body: Rc::new(|_| Object::Null),
            },
        );
        let base = Rc::new(RefCell::new(LoxClass::new(
            "Base".to_string(),
            None,
            base_methods,
        )));

        let derived =
            LoxClass::new("Derived".to_string(), Some(Rc::clone(&base)), HashMap::new());
        assert!(derived.find_method("greet").is_some());
        assert!(derived.find_method("missing").is_none());
    }

    #[test]
    fn instance_fields_shadow_methods_of_the_same_name() {
        let class = Rc::new(RefCell::new(LoxClass::new(
            "Point".to_string(),
            None,
            HashMap::new(),
        )));
        let instance = LoxInstance::new_instance(&class);
        let Object::Instance(cell) = &instance else {
            unreachable!()
        };
        cell.borrow_mut().set(&ident("x"), Object::Number(3.0));
        assert!(matches!(
            cell.borrow().get(&ident("x"), &instance),
            Ok(Object::Number(n)) if n == 3.0
        ));
    }
}
