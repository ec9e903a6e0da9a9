use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;
use log::{debug, error};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a scope frame.  Blocks, calls and closures all hold
/// frames through this type; a frame lives as long as any holder does.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: EnvRef) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_ref(self) -> EnvRef {
        Rc::new(RefCell::new(self))
    }

    pub fn enclosing(&self) -> Option<EnvRef> {
        self.enclosing.clone()
    }

    /// Bind `name` in this frame only, overwriting any previous binding here.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Dynamic lookup: this frame, then each enclosing frame up to the root.
    pub fn get(&self, name: &Token) -> Result<Value> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            ))
        }
    }

    /// Dynamic assignment to the nearest frame that already binds `name`.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<()> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(LoxError::runtime(
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            ))
        }
    }

    /// The frame exactly `distance` links above `env` (`0` is `env` itself).
    pub fn ancestor(env: &EnvRef, distance: usize) -> Option<EnvRef> {
        let mut frame: EnvRef = Rc::clone(env);

        for _ in 0..distance {
            let parent: EnvRef = frame.borrow().enclosing.clone()?;
            frame = parent;
        }

        Some(frame)
    }

    /// Resolved read.  `None` means the resolver and the runtime disagree
    /// about the scope layout.
    pub fn get_at(env: &EnvRef, distance: usize, name: &str) -> Option<Value> {
        let value: Option<Value> = Self::ancestor(env, distance)
            .and_then(|frame| frame.borrow().values.get(name).cloned());

        if value.is_none() {
            error!("No binding for '{}' at distance {}", name, distance);
        }

        value
    }

    /// Resolved write into the frame `distance` links up.  Returns `false`
    /// under the same inconsistency as [`get_at`](Self::get_at).
    pub fn assign_at(env: &EnvRef, distance: usize, name: &str, value: Value) -> bool {
        let Some(frame) = Self::ancestor(env, distance) else {
            error!("No frame at distance {} for '{}'", distance, name);
            return false;
        };

        let mut frame = frame.borrow_mut();

        match frame.values.get_mut(name) {
            Some(slot) => {
                debug!("Assigned '{}' at distance {}", name, distance);
                *slot = value;
                true
            }
            None => {
                error!("No binding for '{}' at distance {}", name, distance);
                false
            }
        }
    }
}
