//! Interned identifiers.
//!
//! Atoms, string literals, type names and operator symbols are interned into
//! a [`StringInterner`] and referred to by a 32-bit [`Name`]. One interner is
//! shared read-only across all compilation units of a build, so it is
//! `Sync` and guarded by a `parking_lot::RwLock`.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Interned string identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    /// Create from a raw index. Only meaningful for names produced by the
    /// same interner; tests use it to fabricate distinct names.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }

    /// Get the raw index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

struct InternerInner {
    map: FxHashMap<&'static str, Name>,
    strings: Vec<&'static str>,
}

/// Thread-safe string interner.
///
/// Interned strings are leaked to obtain `'static` lifetimes; an interner
/// lives for the whole build, so the leak is bounded by the number of
/// distinct identifiers.
pub struct StringInterner {
    inner: RwLock<InternerInner>,
}

/// Interner shared between parallel compilation units.
pub type SharedInterner = Arc<StringInterner>;

impl StringInterner {
    /// Create an interner with the empty string at index 0.
    pub fn new() -> Self {
        let mut map = FxHashMap::default();
        map.insert("", Name::EMPTY);
        StringInterner {
            inner: RwLock::new(InternerInner {
                map,
                strings: vec![""],
            }),
        }
    }

    /// Create a shareable interner.
    pub fn shared() -> SharedInterner {
        Arc::new(Self::new())
    }

    /// Intern a string.
    pub fn intern(&self, s: &str) -> Name {
        if let Some(&name) = self.inner.read().map.get(s) {
            return name;
        }

        let mut guard = self.inner.write();
        if let Some(&name) = guard.map.get(s) {
            return name;
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = u32::try_from(guard.strings.len())
            .unwrap_or_else(|_| panic!("interner exceeded {} strings", u32::MAX));
        let name = Name(idx);
        guard.strings.push(leaked);
        guard.map.insert(leaked, name);
        name
    }

    /// Look up the string for a name.
    ///
    /// Names from a different interner resolve to the empty string.
    pub fn lookup(&self, name: Name) -> &'static str {
        self.inner
            .read()
            .strings
            .get(name.0 as usize)
            .copied()
            .unwrap_or("")
    }

    /// Number of interned strings (including the empty string).
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// Whether only the empty string is interned.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}
