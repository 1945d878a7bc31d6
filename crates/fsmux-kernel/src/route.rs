//! Path classification.
//!
//! The namespace is flat. A path names the secure store when, after the
//! relative markers are dropped, it starts with the literal `SL:` prefix;
//! everything else belongs to the general store.

use fsmux_types::SECURE_PREFIX;

/// The backend a path routes to, with the backend-local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    General(&'a str),
    Secure(&'a str),
}

impl<'a> Route<'a> {
    /// Backend-local name.
    pub fn name(&self) -> &'a str {
        match *self {
            Route::General(name) | Route::Secure(name) => name,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Route::Secure(_))
    }
}

/// Drop one leading `.`, then one leading `/`.
pub fn strip_relative(path: &str) -> &str {
    let path = path.strip_prefix('.').unwrap_or(path);
    path.strip_prefix('/').unwrap_or(path)
}

/// Route a path to its backend.
pub fn classify_path(path: &str) -> Route<'_> {
    let path = strip_relative(path);
    match path.strip_prefix(SECURE_PREFIX) {
        Some(name) => Route::Secure(name),
        None => Route::General(path),
    }
}
