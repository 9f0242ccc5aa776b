//! Core shared types and identifiers

use std::fmt;

/// Kind of platform resource the harness creates and must later delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Org,
    Space,
    App,
    Drain,
    SpaceDrain,
}

impl ResourceKind {
    /// Teardown level: everything at level 0 goes before spaces, spaces before orgs.
    pub fn teardown_level(self) -> u8 {
        match self {
            ResourceKind::App | ResourceKind::Drain | ResourceKind::SpaceDrain => 0,
            ResourceKind::Space => 1,
            ResourceKind::Org => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Org => "org",
            ResourceKind::Space => "space",
            ResourceKind::App => "app",
            ResourceKind::Drain => "drain",
            ResourceKind::SpaceDrain => "space-drain",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a provisioned resource. Two handles are the same resource iff
/// kind and name match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn org(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Org, name)
    }

    pub fn space(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Space, name)
    }

    pub fn app(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::App, name)
    }

    pub fn drain(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Drain, name)
    }

    pub fn space_drain(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::SpaceDrain, name)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_levels_follow_hierarchy() {
        assert!(ResourceKind::App.teardown_level() < ResourceKind::Space.teardown_level());
        assert!(ResourceKind::Drain.teardown_level() < ResourceKind::Space.teardown_level());
        assert!(ResourceKind::SpaceDrain.teardown_level() < ResourceKind::Space.teardown_level());
        assert!(ResourceKind::Space.teardown_level() < ResourceKind::Org.teardown_level());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(ResourceHandle::app("LOG-EMITTER-1--abc").to_string(), "app 'LOG-EMITTER-1--abc'");
        assert_eq!(ResourceHandle::space_drain("d").to_string(), "space-drain 'd'");
    }
}
