//! Hierarchical variable scopes and `${...}` resolution.
//!
//! The tree is an arena of [`ScopeNode`]s addressed by [`ScopeId`]. Interior
//! nodes group children, leaves carry a [`ValueNode`]. A value may itself
//! contain references; those are resolved lazily relative to the scope that
//! owns the value and memoized until the next write.

pub mod file;
pub mod template;

use crate::error::{Error, Result};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use template::Token;
use tracing::debug;

/// Capability for objects that want scope writes mirrored back to them.
pub trait PropertySource {
    fn get_property(&self, name: &str) -> Option<Value>;
    /// Returns false when the object has no writable property `name`.
    fn set_property(&mut self, name: &str, value: Value) -> bool;
}

pub type SharedSource = Rc<RefCell<dyn PropertySource>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

pub struct ValueNode {
    raw: Value,
    resolved: Option<Value>,
    source: Option<(SharedSource, String)>,
}

impl ValueNode {
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

impl fmt::Debug for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueNode")
            .field("raw", &self.raw)
            .field("resolved", &self.resolved)
            .field("source", &self.source.as_ref().map(|(_, p)| p))
            .finish()
    }
}

#[derive(Debug)]
pub struct ScopeNode {
    name: String,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    value: Option<ValueNode>,
}

impl ScopeNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&ValueNode> {
        self.value.as_ref()
    }
}

#[derive(Debug)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![ScopeNode {
                name: String::new(),
                parent: None,
                children: Vec::new(),
                value: None,
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.nodes[id.0].parent
    }

    pub fn child(&self, parent: ScopeId, name: &str) -> Option<ScopeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].name == name)
    }

    pub fn children(&self, parent: ScopeId) -> &[ScopeId] {
        &self.nodes[parent.0].children
    }

    /// Dotted path from the root, e.g. `job.input`.
    pub fn path_of(&self, id: ScopeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            if node.parent.is_some() {
                names.push(node.name.clone());
            }
            cursor = node.parent;
        }
        names.reverse();
        names
    }

    fn display_name(&self, id: ScopeId) -> String {
        let path = self.path_of(id);
        if path.is_empty() {
            "<root>".to_string()
        } else {
            path.join(".")
        }
    }

    pub fn create_child(&mut self, parent: ScopeId, name: &str) -> Result<ScopeId> {
        if self.nodes[parent.0].value.is_some() {
            return Err(Error::ScopeHasValue(self.display_name(parent)));
        }
        if self.child(parent, name).is_some() {
            return Err(Error::DuplicateScope {
                parent: self.display_name(parent),
                name: name.to_string(),
            });
        }
        let id = ScopeId(self.nodes.len());
        self.nodes.push(ScopeNode {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            value: None,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Detaches the child `name` and its subtree. Returns false if absent.
    pub fn remove_child(&mut self, parent: ScopeId, name: &str) -> bool {
        match self.child(parent, name) {
            Some(id) => {
                self.nodes[parent.0].children.retain(|c| *c != id);
                self.nodes[id.0].parent = None;
                self.invalidate();
                true
            }
            None => false,
        }
    }

    pub fn set_value(&mut self, id: ScopeId, value: Value) -> Result<()> {
        self.store(id, value, None)
    }

    /// Binds `id` to `property` of `source`: the current property value becomes
    /// the scope value and later [`ScopeTree::set`] calls are written back.
    pub fn bind(&mut self, id: ScopeId, source: SharedSource, property: &str) -> Result<()> {
        let current = source.borrow().get_property(property);
        let value = current.ok_or_else(|| Error::NotAValue(self.display_name(id)))?;
        self.store(id, value, Some((source, property.to_string())))
    }

    fn store(&mut self, id: ScopeId, value: Value, source: Option<(SharedSource, String)>) -> Result<()> {
        if !self.nodes[id.0].children.is_empty() {
            return Err(Error::ScopeHasChildren(self.display_name(id)));
        }
        let source = match (source, self.nodes[id.0].value.take()) {
            (Some(s), _) => Some(s),
            (None, Some(old)) => old.source,
            (None, None) => None,
        };
        self.nodes[id.0].value = Some(ValueNode {
            raw: value,
            resolved: None,
            source,
        });
        self.invalidate();
        Ok(())
    }

    /// Creates (or reuses) the child `name` of `parent` and stores `value` there.
    pub fn put(&mut self, parent: ScopeId, name: &str, value: Value) -> Result<ScopeId> {
        let id = match self.child(parent, name) {
            Some(id) => id,
            None => self.create_child(parent, name)?,
        };
        self.set_value(id, value)?;
        Ok(id)
    }

    /// Drops every memoized resolution.
    pub fn invalidate(&mut self) {
        for node in &mut self.nodes {
            if let Some(v) = node.value.as_mut() {
                v.resolved = None;
            }
        }
    }

    /// Finds the node a reference path lands on when looked up from `from`.
    ///
    /// Returns the node and the number of path segments consumed; segments
    /// left over after a value node are file fields.
    pub fn lookup(&self, from: ScopeId, path: &[String]) -> Option<(ScopeId, usize)> {
        let first = path.first()?;
        let mut current = self.find_anchor(from, first)?;
        let mut consumed = 1;
        for segment in &path[1..] {
            match self.child(current, segment) {
                Some(next) => {
                    current = next;
                    consumed += 1;
                }
                None if self.nodes[current.0].value.is_some() => break,
                None => return None,
            }
        }
        Some((current, consumed))
    }

    fn find_anchor(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        if let Some(child) = self.child(from, name) {
            return Some(child);
        }
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = &self.nodes[id.0];
            if node.parent.is_some() && node.name == name {
                return Some(id);
            }
            if let Some(child) = self.child(id, name) {
                return Some(child);
            }
            cursor = node.parent;
        }
        // references may cross into sibling subtrees
        let mut ancestor = self.nodes[from.0].parent.or(Some(from));
        while let Some(id) = ancestor {
            if let Some(found) = self.breadth_first(id, name) {
                return Some(found);
            }
            ancestor = self.nodes[id.0].parent;
        }
        None
    }

    fn breadth_first(&self, start: ScopeId, name: &str) -> Option<ScopeId> {
        let mut queue: VecDeque<ScopeId> = self.nodes[start.0].children.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            let node = &self.nodes[id.0];
            if node.name == name {
                return Some(id);
            }
            queue.extend(node.children.iter().copied());
        }
        None
    }

    /// Resolves `text` relative to `scope`.
    ///
    /// A lone reference keeps the native type of its value; anything else is
    /// rendered to a string, or to a list of strings when a reference yields a
    /// list.
    pub fn get(&mut self, scope: ScopeId, text: &str) -> Result<Value> {
        let mut visiting = Vec::new();
        self.render(scope, text, &mut visiting)
    }

    /// Resolves every reference inside `value` relative to `scope`.
    pub fn resolve(&mut self, scope: ScopeId, value: &Value) -> Result<Value> {
        let mut visiting = Vec::new();
        self.resolve_value(scope, value, &mut visiting)
    }

    /// Resolves the value stored at `id`, memoizing the result.
    pub fn resolve_at(&mut self, id: ScopeId) -> Result<Value> {
        let reference = self.display_name(id);
        let mut visiting = Vec::new();
        self.resolve_node(id, &reference, &mut visiting)
    }

    /// Writes `value` to the node named by the single reference `text`.
    pub fn set(&mut self, scope: ScopeId, text: &str, value: Value) -> Result<()> {
        let path = template::single_reference(text)
            .ok_or_else(|| Error::NotSingleReference(text.to_string()))?;
        let reference = path.join(".");
        let (id, consumed) = self
            .lookup(scope, &path)
            .ok_or_else(|| Error::UnresolvedReference(reference.clone()))?;
        if consumed != path.len() || self.nodes[id.0].value.is_none() {
            return Err(Error::NotAValue(reference));
        }
        self.set_value(id, value.clone())?;
        if let Some((source, property)) = self.nodes[id.0].value.as_ref().and_then(|v| v.source.as_ref()) {
            if !source.borrow_mut().set_property(property, value) {
                debug!(reference = %reference, property = %property, "Source has no writable property, skipping write-back");
            }
        }
        Ok(())
    }

    fn resolve_value(&mut self, scope: ScopeId, value: &Value, visiting: &mut Vec<ScopeId>) -> Result<Value> {
        match value {
            Value::Str(s) if s.contains("${") => self.render(scope, s, visiting),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.resolve_value(scope, item, visiting)? {
                        Value::List(inner) if !item.is_list() => out.extend(inner),
                        other => out.push(other),
                    }
                }
                Ok(Value::List(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn render(&mut self, scope: ScopeId, text: &str, visiting: &mut Vec<ScopeId>) -> Result<Value> {
        let tokens = template::tokenize(text);
        if let [Token::Reference(path)] = tokens.as_slice() {
            return self.resolve_reference(scope, path, visiting);
        }

        let mut parts = Vec::with_capacity(tokens.len());
        let mut width: Option<usize> = None;
        for token in tokens {
            match token {
                Token::Literal(s) => parts.push(Value::Str(s)),
                Token::Reference(path) => {
                    let value = self.resolve_reference(scope, &path, visiting)?;
                    if let Value::List(items) = &value {
                        match width {
                            Some(w) if w != items.len() => {
                                return Err(Error::BroadcastMismatch {
                                    template: text.to_string(),
                                    left: w,
                                    right: items.len(),
                                });
                            }
                            _ => width = Some(items.len()),
                        }
                    }
                    parts.push(value);
                }
            }
        }

        match width {
            None => Ok(Value::Str(parts.iter().map(Value::render).collect())),
            Some(n) => {
                let rendered = (0..n)
                    .map(|i| {
                        let line: String = parts
                            .iter()
                            .map(|part| match part {
                                Value::List(items) => items[i].render(),
                                scalar => scalar.render(),
                            })
                            .collect();
                        Value::Str(line)
                    })
                    .collect();
                Ok(Value::List(rendered))
            }
        }
    }

    fn resolve_reference(&mut self, scope: ScopeId, path: &[String], visiting: &mut Vec<ScopeId>) -> Result<Value> {
        let reference = path.join(".");
        let (id, consumed) = self
            .lookup(scope, path)
            .ok_or_else(|| Error::UnresolvedReference(reference.clone()))?;
        if self.nodes[id.0].value.is_none() {
            return Err(Error::NotAValue(reference));
        }
        let value = self.resolve_node(id, &reference, visiting)?;
        file::derive(value, &path[consumed..], &reference)
    }

    fn resolve_node(&mut self, id: ScopeId, reference: &str, visiting: &mut Vec<ScopeId>) -> Result<Value> {
        let raw = match &self.nodes[id.0].value {
            Some(ValueNode { resolved: Some(v), .. }) => return Ok(v.clone()),
            Some(v) => v.raw.clone(),
            None => return Err(Error::NotAValue(reference.to_string())),
        };
        if visiting.contains(&id) {
            return Err(Error::SelfReference(reference.to_string()));
        }

        visiting.push(id);
        let context = self.nodes[id.0].parent.unwrap_or(id);
        let resolved = self.resolve_value(context, &raw, visiting);
        visiting.pop();

        let resolved = resolved?;
        if let Some(v) = self.nodes[id.0].value.as_mut() {
            v.resolved = Some(resolved.clone());
        }
        Ok(resolved)
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}
