//! Bearer credential and the process-wide slot it lives in.

use std::fmt;
use std::sync::Arc;

use http::HeaderValue;
use parking_lot::RwLock;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Opaque wrapper around a secret string value.
///
/// `Debug` and `Display` both print `[REDACTED]`. Use [`expose`](Self::expose)
/// for controlled access when building headers or request bodies.
///
/// The backing buffer is zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read-only access to the underlying secret.
    ///
    /// Callers must not log or persist the returned slice outside a
    /// [`CredentialStore`].
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// An opaque bearer token.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Credential(SecretString);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token))
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.expose().is_empty()
    }

    /// Render the `Authorization` header value, marked sensitive.
    ///
    /// Returns `None` when the token contains bytes that are not allowed in a
    /// header value.
    #[must_use]
    pub fn bearer_header(&self) -> Option<HeaderValue> {
        let raw = Zeroizing::new(format!("Bearer {}", self.0.expose()));
        let mut value = HeaderValue::from_str(&raw).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The process-wide credential slot.
///
/// Implementations never fail: an unreadable backing store reads as "no
/// credential" and a failed write is logged.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<Credential>;

    fn store(&self, credential: Credential);

    fn clear(&self);
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn load(&self) -> Option<Credential> {
        (**self).load()
    }

    fn store(&self, credential: Credential) {
        (**self).store(credential);
    }

    fn clear(&self) {
        (**self).clear();
    }
}

/// Credential slot held in process memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: RwLock::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credential> {
        self.slot.read().clone()
    }

    fn store(&self, credential: Credential) {
        *self.slot.write() = Some(credential);
    }

    fn clear(&self) {
        self.slot.write().take();
    }
}
