//! Ordered tag routing.
//!
//! A [`Router`] maps a wire discriminator (`"response.text.delta"`) to a kind.
//! Exact patterns are checked first; prefix patterns are then tried top to
//! bottom and the first match wins, so more specific prefixes must be listed
//! before the shorter prefixes they extend.

use thiserror::Error;

/// How a route matches a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// The tag equals the pattern.
    Exact(&'static str),
    /// The tag starts with the pattern.
    Prefix(&'static str),
}

impl Pattern {
    /// Returns true if `tag` matches this pattern.
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            Pattern::Exact(p) => tag == *p,
            Pattern::Prefix(p) => tag.starts_with(p),
        }
    }

    /// The literal text of the pattern.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Exact(p) | Pattern::Prefix(p) => p,
        }
    }
}

/// A single (pattern, kind) entry.
#[derive(Debug, Clone, Copy)]
pub struct Route<K> {
    pub pattern: Pattern,
    pub kind: K,
}

impl<K> Route<K> {
    /// Creates an exact-match route.
    pub const fn exact(tag: &'static str, kind: K) -> Self {
        Self {
            pattern: Pattern::Exact(tag),
            kind,
        }
    }

    /// Creates a prefix route.
    pub const fn prefix(prefix: &'static str, kind: K) -> Self {
        Self {
            pattern: Pattern::Prefix(prefix),
            kind,
        }
    }
}

/// Problems found by [`Router::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTableError {
    /// A prefix route can never match because an earlier prefix covers it.
    #[error("route {later:?} is shadowed by earlier prefix {earlier:?}")]
    Shadowed {
        earlier: &'static str,
        later: &'static str,
    },

    /// Two exact routes use the same tag.
    #[error("duplicate exact route {0:?}")]
    Duplicate(&'static str),
}

/// A static, ordered routing table.
#[derive(Debug, Clone, Copy)]
pub struct Router<K: 'static> {
    routes: &'static [Route<K>],
}

impl<K: Copy> Router<K> {
    /// Wraps a static table.
    pub const fn new(routes: &'static [Route<K>]) -> Self {
        Self { routes }
    }

    /// Returns the kind for `tag`, or `None` if nothing matches.
    pub fn classify(&self, tag: &str) -> Option<K> {
        self.routes
            .iter()
            .find(|r| matches!(r.pattern, Pattern::Exact(_)) && r.pattern.matches(tag))
            .or_else(|| {
                self.routes
                    .iter()
                    .find(|r| matches!(r.pattern, Pattern::Prefix(_)) && r.pattern.matches(tag))
            })
            .map(|r| r.kind)
    }

    /// The underlying table.
    pub fn routes(&self) -> &'static [Route<K>] {
        self.routes
    }

    /// Checks that every route is reachable.
    pub fn validate(&self) -> Result<(), RouteTableError> {
        for (i, route) in self.routes.iter().enumerate() {
            for earlier in &self.routes[..i] {
                match (earlier.pattern, route.pattern) {
                    (Pattern::Exact(a), Pattern::Exact(b)) if a == b => {
                        return Err(RouteTableError::Duplicate(a));
                    }
                    (Pattern::Prefix(a), Pattern::Prefix(b)) if b.starts_with(a) => {
                        return Err(RouteTableError::Shadowed {
                            earlier: a,
                            later: b,
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Returns the action suffix of a dotted tag (`"delta"` for `"response.text.delta"`).
pub fn action(tag: &str) -> &str {
    tag.rsplit('.').next().unwrap_or(tag)
}
