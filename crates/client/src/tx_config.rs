//! Encoders and decoders for the node's transaction type.

use std::{any::type_name, fmt, sync::Arc};

use bincode::Options;
use notsim_core::{AnyTx, DecodeError, EncodeError, Tx};
use serde::{de::DeserializeOwned, Serialize};

/// Upper bound on the size of an encoded transaction.
pub const MAX_TX_BYTES: u64 = 1 << 20;

/// Decodes raw bytes into a type-erased transaction.
pub type TxDecoder = Arc<dyn Fn(&[u8]) -> Result<Box<dyn AnyTx>, DecodeError> + Send + Sync>;

/// Encodes a type-erased transaction.
pub type TxEncoder = Arc<dyn Fn(&dyn AnyTx) -> Result<Vec<u8>, EncodeError> + Send + Sync>;

/// Binary and JSON codecs for one transaction type, chosen at runtime.
#[derive(Clone)]
pub struct TxConfig {
    tx_type: &'static str,
    decoder: TxDecoder,
    json_decoder: TxDecoder,
    encoder: TxEncoder,
    json_encoder: TxEncoder,
}

impl fmt::Debug for TxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxConfig")
            .field("tx_type", &self.tx_type)
            .finish_non_exhaustive()
    }
}

fn binary_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_TX_BYTES)
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Binary encoding of `value`, the canonical bytes of a transaction.
pub fn encode_binary<V: Serialize>(value: &V) -> Result<Vec<u8>, EncodeError> {
    binary_options()
        .serialize(value)
        .map_err(|err| EncodeError(err.to_string()))
}

/// Decodes the binary encoding produced by [`encode_binary`].
pub fn decode_binary<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, DecodeError> {
    binary_options()
        .deserialize(bytes)
        .map_err(|err| DecodeError::new(err.to_string()))
}

fn narrow<T: Tx>(tx: &dyn AnyTx) -> Result<&T, EncodeError> {
    tx.as_any().downcast_ref::<T>().ok_or_else(|| {
        EncodeError(format!(
            "expected {}, got {}",
            type_name::<T>(),
            tx.type_name()
        ))
    })
}

impl TxConfig {
    /// Codecs for `T`: `bincode` for the binary form and `serde_json` for JSON.
    pub fn for_type<T>() -> Self
    where
        T: Tx + Serialize + DeserializeOwned,
    {
        Self {
            tx_type: type_name::<T>(),
            decoder: Arc::new(|bytes: &[u8]| {
                decode_binary::<T>(bytes).map(|tx| Box::new(tx) as Box<dyn AnyTx>)
            }),
            json_decoder: Arc::new(|bytes: &[u8]| {
                serde_json::from_slice::<T>(bytes)
                    .map(|tx| Box::new(tx) as Box<dyn AnyTx>)
                    .map_err(|err| DecodeError::new(err.to_string()))
            }),
            encoder: Arc::new(|tx: &dyn AnyTx| encode_binary(narrow::<T>(tx)?)),
            json_encoder: Arc::new(|tx: &dyn AnyTx| {
                serde_json::to_vec(narrow::<T>(tx)?).map_err(|err| EncodeError(err.to_string()))
            }),
        }
    }

    /// Name of the transaction type the codecs produce.
    pub fn tx_type(&self) -> &'static str {
        self.tx_type
    }

    /// Binary decoder.
    pub fn tx_decoder(&self) -> &TxDecoder {
        &self.decoder
    }

    /// JSON decoder.
    pub fn tx_json_decoder(&self) -> &TxDecoder {
        &self.json_decoder
    }

    /// Binary encoder.
    pub fn tx_encoder(&self) -> &TxEncoder {
        &self.encoder
    }

    /// JSON encoder.
    pub fn tx_json_encoder(&self) -> &TxEncoder {
        &self.json_encoder
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        nonce: u64,
        #[serde(skip)]
        cached: Vec<u8>,
    }

    impl Tx for Ping {
        fn bytes(&self) -> &[u8] {
            &self.cached
        }

        fn msg_type_urls(&self) -> Vec<&str> {
            vec!["/ping.MsgPing"]
        }

        fn gas_limit(&self) -> u64 {
            self.nonce
        }
    }

    #[test]
    fn test_binary_codec() {
        let config = TxConfig::for_type::<Ping>();
        let tx = Ping {
            nonce: 7,
            cached: Vec::new(),
        };
        let bytes = (config.tx_encoder())(&tx).unwrap();
        let decoded = (config.tx_decoder())(&bytes).unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<Ping>(), Some(&tx));
    }

    #[test]
    fn test_json_codec() {
        let config = TxConfig::for_type::<Ping>();
        let decoded = (config.tx_json_decoder())(br#"{"nonce":3}"#).unwrap();
        let bytes = (config.tx_json_encoder())(decoded.as_ref()).unwrap();
        assert_eq!(bytes, br#"{"nonce":3}"#);
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let config = TxConfig::for_type::<Ping>();
        let mut bytes = encode_binary(&Ping {
            nonce: 1,
            cached: Vec::new(),
        })
        .unwrap();
        bytes.push(0);
        assert!((config.tx_decoder())(&bytes).is_err());
        assert!((config.tx_decoder())(&[1, 2]).is_err());
    }

    #[test]
    fn test_encoder_rejects_foreign_type() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Other;

        impl Tx for Other {
            fn bytes(&self) -> &[u8] {
                &[]
            }

            fn msg_type_urls(&self) -> Vec<&str> {
                Vec::new()
            }

            fn gas_limit(&self) -> u64 {
                0
            }
        }

        let config = TxConfig::for_type::<Ping>();
        let err = (config.tx_encoder())(&Other).unwrap_err();
        assert!(err.0.contains("Other"));
    }
}
