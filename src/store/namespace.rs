use nanoid::nanoid;

use crate::TestNamespaceConfig;

/// Root of every key written by this engine
pub const NAMESPACE_ROOT: &str = "/chamber/v0.1";

/// Inserted after the root when running against a test namespace
pub const NAMESPACE_TEST: &str = "/test";

/// Effective key namespace of a connected store
///
/// Caller keys are relative; `users/alice` lives at
/// `<namespace>/users/alice` in the backing store. No relative key can
/// address anything outside the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: String,
}

impl Namespace {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    /// root + optional test segment + configured suffix
    pub fn effective(
        test: &TestNamespaceConfig,
        suffix: &str,
    ) -> Self {
        let mut root = NAMESPACE_ROOT.to_string();
        if test.use_test_namespace {
            root.push_str(NAMESPACE_TEST);
            if test.uniquify {
                root.push('-');
                root.push_str(&nanoid!(10));
            }
        }
        root.push_str(suffix);
        Self { root }
    }

    pub fn as_str(&self) -> &str {
        &self.root
    }

    /// Backing store key of a relative key or prefix
    pub fn qualify(
        &self,
        key: &str,
    ) -> String {
        format!("{}/{}", self.root, key)
    }

    /// Relative key of a backing store key; `None` when outside the namespace
    pub fn strip<'a>(
        &self,
        full: &'a str,
    ) -> Option<&'a str> {
        full.strip_prefix(self.root.as_str())?.strip_prefix('/')
    }
}
