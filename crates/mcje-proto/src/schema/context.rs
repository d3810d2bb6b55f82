//! Container context chain used by `switch` to inspect sibling fields.
//!
//! Every container establishes a new link while its fields are read or
//! written; `compareTo` paths walk slash-separated segments, with leading
//! `..` segments climbing toward the outermost container.

use serde_json::{Map, Value};

/// One link of the context chain. Borrows the container object being built
/// (read side) or being serialized (write side).
#[derive(Debug, Clone, Copy)]
pub struct ContextChain<'a> {
    pub map: &'a Map<String, Value>,
    pub parent: Option<&'a ContextChain<'a>>,
}

impl<'a> ContextChain<'a> {
    pub fn root(map: &'a Map<String, Value>) -> Self {
        Self { map, parent: None }
    }

    /// Resolve a `compareTo` path against this chain.
    pub fn resolve(&self, path: &str) -> Option<&'a Value> {
        let mut node = self;
        let mut segments = path.split('/').peekable();
        while segments.peek() == Some(&"..") {
            segments.next();
            node = node.parent?;
        }

        let mut current: Option<&Value> = None;
        for segment in segments {
            current = match current {
                None => node.map.get(segment),
                Some(Value::Object(obj)) => obj.get(segment),
                Some(_) => None,
            };
            current?;
        }
        current
    }
}
