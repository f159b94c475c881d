use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interpreter::value::Value;

/// One frame of the scope chain: a name→value map plus an optional parent.
/// The root frame holds the process-wide globals; children are created on
/// block entry and function calls and dropped when the frame exits.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn root() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn child_of(parent: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(parent)),
        }))
    }

    /// Introduces or overwrites a name in this frame.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Reads a name from this frame only.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    /// Assigns an existing name in this frame; fails if it was never
    /// declared here.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Walks exactly `distance` parents, then reads. `None` when either the
    /// chain is shorter than promised or the name is absent at that depth.
    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &str) -> Option<Value> {
        Self::ancestor(env, distance).and_then(|frame| frame.borrow().get(name))
    }

    /// Walks exactly `distance` parents, then assigns.
    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &str,
        value: Value,
    ) -> bool {
        match Self::ancestor(env, distance) {
            Some(frame) => frame.borrow_mut().assign(name, value),
            None => false,
        }
    }

    fn ancestor(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
    ) -> Option<Rc<RefCell<Environment>>> {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let parent = current.borrow().enclosing.clone()?;
            current = parent;
        }
        Some(current)
    }
}
