//! The endpoint group tree.
//!
//! Each node owns the children keyed by their raw segment text and a
//! per-method handler table. Children are kept in three buckets so the
//! matching order is fixed:
//!
//! 1. literal children, looked up by exact text
//! 2. capture children, tried in registration order
//! 3. the wildcard child `*`
//!
//! While walking a request path the deepest wildcard child able to serve
//! the request method is remembered as the fallback. When a segment cannot
//! be matched the walk stops at that fallback and the unmatched remainder
//! of the path is absorbed by it.

use crate::error::{ConfigError, DispatchError};
use crate::params::PathParams;
use crate::pattern::{split_path, MatchKind, Segment};
use axum::http::Method;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Method a handler is registered under. `Any` is the `*` method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodKey {
    Exact(Method),
    Any,
}

impl From<Method> for MethodKey {
    fn from(method: Method) -> Self {
        MethodKey::Exact(method)
    }
}

impl FromStr for MethodKey {
    type Err = axum::http::method::InvalidMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            Ok(MethodKey::Any)
        } else {
            Method::from_str(&s.to_uppercase()).map(MethodKey::Exact)
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKey::Exact(method) => write!(f, "{}", method),
            MethodKey::Any => write!(f, "*"),
        }
    }
}

/// A registered handler plus the template it was registered under.
#[derive(Debug, Clone)]
pub struct HandlerEntry<V> {
    pub handler: V,
    pub path: String,
}

/// How a resolved handler was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Matched,
    Fallback,
}

/// Successful result of [`EndpointGroup::resolve`].
#[derive(Debug)]
pub struct Resolved<'a, V> {
    pub entry: &'a HandlerEntry<V>,
    pub params: PathParams,
    pub resolution: Resolution,
}

/// A node of the routing tree.
#[derive(Debug)]
pub struct EndpointGroup<V> {
    segment: Segment,
    literals: BTreeMap<String, EndpointGroup<V>>,
    captures: Vec<EndpointGroup<V>>,
    wildcard: Option<Box<EndpointGroup<V>>>,
    handlers: HashMap<Method, HandlerEntry<V>>,
    any: Option<HandlerEntry<V>>,
}

impl<V> Default for EndpointGroup<V> {
    fn default() -> Self {
        Self::root()
    }
}

impl<V> EndpointGroup<V> {
    /// Creates an empty root node.
    pub fn root() -> Self {
        Self::with_segment(Segment::root())
    }

    fn with_segment(segment: Segment) -> Self {
        Self {
            segment,
            literals: BTreeMap::new(),
            captures: Vec::new(),
            wildcard: None,
            handlers: HashMap::new(),
            any: None,
        }
    }

    /// Raw segment text this node was created from.
    pub fn group_name(&self) -> &str {
        self.segment.raw()
    }

    pub fn can_match_literal(&self) -> bool {
        self.segment.kind() == MatchKind::Literal
    }

    pub fn is_wildcard(&self) -> bool {
        self.segment.kind() == MatchKind::Wildcard
    }

    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty() || self.any.is_some()
    }

    /// True if a request with `method` can be served at this node.
    pub fn handles(&self, method: &Method) -> bool {
        self.any.is_some() || self.handlers.contains_key(method)
    }

    /// Exact method first, then the `*` method.
    pub fn handler_for(&self, method: &Method) -> Option<&HandlerEntry<V>> {
        self.handlers.get(method).or(self.any.as_ref())
    }

    /// Inserts `handler` under `method` at the node addressed by `template`,
    /// creating intermediate nodes as needed.
    pub fn insert(
        &mut self,
        template: &str,
        method: MethodKey,
        handler: V,
    ) -> Result<(), ConfigError> {
        let mut current = self;
        for raw in split_path(template) {
            current = current.child_or_insert(raw)?;
        }

        current.add_handler(
            method,
            HandlerEntry {
                handler,
                path: template.to_string(),
            },
        )
    }

    fn child_or_insert(&mut self, raw: &str) -> Result<&mut EndpointGroup<V>, ConfigError> {
        if let Some(index) = self.captures.iter().position(|c| c.group_name() == raw) {
            return Ok(&mut self.captures[index]);
        }

        let segment = Segment::compile(raw)?;
        match segment.kind() {
            MatchKind::Literal => Ok(self
                .literals
                .entry(raw.to_string())
                .or_insert_with(|| EndpointGroup::with_segment(segment))),
            MatchKind::Wildcard => Ok(self
                .wildcard
                .get_or_insert_with(|| Box::new(EndpointGroup::with_segment(segment)))
                .as_mut()),
            MatchKind::Capture => {
                self.captures.push(EndpointGroup::with_segment(segment));
                let index = self.captures.len() - 1;
                Ok(&mut self.captures[index])
            }
        }
    }

    fn add_handler(&mut self, method: MethodKey, entry: HandlerEntry<V>) -> Result<(), ConfigError> {
        let occupied = match &method {
            MethodKey::Exact(m) => self.handlers.contains_key(m),
            MethodKey::Any => self.any.is_some(),
        };
        if occupied {
            return Err(ConfigError::DuplicateHandler {
                method: method.to_string(),
                path: entry.path,
            });
        }

        match method {
            MethodKey::Exact(m) => {
                self.handlers.insert(m, entry);
            }
            MethodKey::Any => self.any = Some(entry),
        }
        Ok(())
    }

    fn match_child(&self, value: &str) -> Option<(&EndpointGroup<V>, Vec<(String, String)>)> {
        if let Some(child) = self.literals.get(value) {
            return Some((child, Vec::new()));
        }

        for child in &self.captures {
            if let Some(params) = child.segment.matches(value) {
                return Some((child, params));
            }
        }

        self.wildcard.as_deref().map(|child| (child, Vec::new()))
    }

    /// Resolves `(method, path)` to a handler and its path parameters.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Resolved<'_, V>, DispatchError> {
        let mut current = self;
        let mut bound: Vec<(String, String)> = Vec::new();
        // deepest wildcard able to serve the method, with the number of
        // parameters bound when it was recorded
        let mut fallback: Option<(&EndpointGroup<V>, usize)> = None;
        let mut resolution = Resolution::Matched;

        for value in split_path(path) {
            if let Some(wildcard) = current.wildcard.as_deref() {
                if wildcard.handles(method) {
                    fallback = Some((wildcard, bound.len()));
                }
            }

            match current.match_child(value) {
                Some((child, params)) => {
                    bound.extend(params);
                    current = child;
                }
                None => match fallback {
                    Some((node, len)) => {
                        bound.truncate(len);
                        current = node;
                        resolution = Resolution::Fallback;
                        break;
                    }
                    None => return Err(DispatchError::NotFound),
                },
            }
        }

        if let Some(entry) = current.handler_for(method) {
            return Ok(Resolved {
                entry,
                params: bound.into_iter().collect(),
                resolution,
            });
        }

        if current.has_handlers() {
            return Err(DispatchError::MethodNotSupported);
        }

        if current.is_wildcard() {
            if let Some(entry) = current
                .wildcard
                .as_deref()
                .and_then(|nested| nested.handler_for(method))
            {
                return Ok(Resolved {
                    entry,
                    params: bound.into_iter().collect(),
                    resolution: Resolution::Fallback,
                });
            }
        }

        // purely structural node: the recorded fallback still applies
        if resolution == Resolution::Matched {
            if let Some((node, len)) = fallback {
                if let Some(entry) = node.handler_for(method) {
                    bound.truncate(len);
                    return Ok(Resolved {
                        entry,
                        params: bound.into_iter().collect(),
                        resolution: Resolution::Fallback,
                    });
                }
            }
        }

        Err(DispatchError::NotFound)
    }

    /// All registered `(method, template)` pairs, sorted.
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut routes = Vec::new();
        self.collect_routes(&mut routes);
        routes.sort();
        routes
    }

    fn collect_routes(&self, routes: &mut Vec<(String, String)>) {
        for (method, entry) in &self.handlers {
            routes.push((method.to_string(), entry.path.clone()));
        }
        if let Some(entry) = &self.any {
            routes.push(("*".to_string(), entry.path.clone()));
        }

        for child in self.literals.values() {
            child.collect_routes(routes);
        }
        for child in &self.captures {
            child.collect_routes(routes);
        }
        if let Some(child) = &self.wildcard {
            child.collect_routes(routes);
        }
    }
}
