//! The transaction capability the node is generic over.

use std::{
    any::{type_name, Any},
    fmt,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::CodecError;

/// Identity of a transaction: the SHA-256 digest of its canonical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Computes the hash of the given canonical transaction bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Returns the raw digest.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// Minimal capability every transaction type handled by the node must provide.
///
/// The node never inspects a transaction beyond this trait; everything else is the business of the
/// application that defines the concrete type.
pub trait Tx: Any + Clone + fmt::Debug + Send + Sync {
    /// Canonical binary encoding of the transaction.
    fn bytes(&self) -> &[u8];

    /// Identity of the transaction.
    fn hash(&self) -> TxHash {
        TxHash::digest(self.bytes())
    }

    /// Type urls of the messages carried by the transaction, in order.
    fn msg_type_urls(&self) -> Vec<&str>;

    /// Gas the sender is willing to spend.
    fn gas_limit(&self) -> u64;
}

/// A type-erased transaction as produced by a dynamic decoder.
///
/// Decoders configured at runtime don't know which `T` the node was instantiated with, so they
/// hand out boxed values that have to be narrowed back down with [`downcast_tx`].
pub trait AnyTx: fmt::Debug + Send + Sync {
    /// Name of the concrete type behind the box.
    fn type_name(&self) -> &'static str;

    /// Canonical bytes of the transaction.
    fn tx_bytes(&self) -> &[u8];

    /// Borrows the transaction as [`Any`] so it can be inspected.
    fn as_any(&self) -> &dyn Any;

    /// Converts the box into a [`Any`] so it can be downcast.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Tx> AnyTx for T {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn tx_bytes(&self) -> &[u8] {
        self.bytes()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Narrows a type-erased transaction down to `T`.
///
/// Fails with [`CodecError::TypeMismatch`] if the box holds anything else.
pub fn downcast_tx<T: Tx>(tx: Box<dyn AnyTx>) -> Result<T, CodecError> {
    let found = tx.type_name();
    tx.into_any()
        .downcast::<T>()
        .map(|tx| *tx)
        .map_err(|_| CodecError::TypeMismatch {
            expected: type_name::<T>(),
            found,
        })
}

/// Decodes raw bytes into transactions of type `T`.
pub trait TxCodec<T: Tx>: Send + Sync + fmt::Debug {
    /// Decodes the canonical binary encoding.
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Decodes the JSON encoding.
    fn decode_json(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Alpha(Vec<u8>);

    impl Tx for Alpha {
        fn bytes(&self) -> &[u8] {
            &self.0
        }

        fn msg_type_urls(&self) -> Vec<&str> {
            vec!["/alpha.Msg"]
        }

        fn gas_limit(&self) -> u64 {
            1
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Beta(Vec<u8>);

    impl Tx for Beta {
        fn bytes(&self) -> &[u8] {
            &self.0
        }

        fn msg_type_urls(&self) -> Vec<&str> {
            Vec::new()
        }

        fn gas_limit(&self) -> u64 {
            0
        }
    }

    #[test]
    fn test_downcast_to_same_type() {
        let boxed: Box<dyn AnyTx> = Box::new(Alpha(vec![1, 2, 3]));
        let tx = downcast_tx::<Alpha>(boxed).expect("same type must downcast");
        assert_eq!(tx, Alpha(vec![1, 2, 3]));
    }

    #[test]
    fn test_downcast_to_other_type_is_mismatch() {
        let boxed: Box<dyn AnyTx> = Box::new(Alpha(vec![1]));
        let err = downcast_tx::<Beta>(boxed).unwrap_err();
        match err {
            CodecError::TypeMismatch { expected, found } => {
                assert!(expected.ends_with("Beta"));
                assert!(found.ends_with("Alpha"));
            }
            other => panic!("expected type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_hash_is_digest_of_bytes() {
        let tx = Alpha(b"hello".to_vec());
        assert_eq!(tx.hash(), TxHash::digest(b"hello"));
        assert_eq!(tx.hash().to_string().len(), 64);
    }
}
