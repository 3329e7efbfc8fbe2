//! Object identity semantics.
//!
//! The wrapped library identifies an object by an opaque token that stays the
//! same no matter how many times the object is reopened. Tokens are only
//! meaningful to the library that issued them, so the registry never compares
//! them itself; it asks an [`Identity`] implementation supplied by the
//! library collaborator.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Size of a library object token in bytes.
pub const TOKEN_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("token comparison failed: {0}")]
    Comparison(String),
    #[error("token comparison failed")]
    Library(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, IdentityError>;

/// Token comparison supplied by the wrapped library.
///
/// `compare_identity` may call back into the library; it is a blocking call
/// and must not re-enter the registry.
pub trait Identity {
    /// Raw handle of the object on whose behalf the comparison is made.
    type Handle;
    /// Opaque, copyable object token.
    type Token: Clone + fmt::Debug;

    fn compare_identity(
        &self,
        handle: &Self::Handle,
        token_a: &Self::Token,
        token_b: &Self::Token,
    ) -> Result<Ordering>;

    /// Convenience wrapper returning whether two tokens name the same object.
    fn same_object(
        &self,
        handle: &Self::Handle,
        token_a: &Self::Token,
        token_b: &Self::Token,
    ) -> Result<bool> {
        Ok(self.compare_identity(handle, token_a, token_b)? == Ordering::Equal)
    }
}

/// Fixed-size byte token, the layout most libraries use for object addresses.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectToken([u8; TOKEN_SIZE]);

impl ObjectToken {
    pub const fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a token whose leading bytes hold `address` (little endian).
    pub fn from_address(address: u64) -> Self {
        let mut bytes = [0u8; TOKEN_SIZE];
        bytes[..8].copy_from_slice(&address.to_le_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ObjectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectToken(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Identity for libraries whose tokens compare bytewise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteIdentity;

impl Identity for ByteIdentity {
    type Handle = ();
    type Token = ObjectToken;

    fn compare_identity(
        &self,
        _handle: &Self::Handle,
        token_a: &Self::Token,
        token_b: &Self::Token,
    ) -> Result<Ordering> {
        Ok(token_a.as_bytes().cmp(token_b.as_bytes()))
    }
}
