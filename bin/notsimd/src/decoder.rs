//! Transaction decoder handed to the consensus engine.

use std::{any::type_name, fmt, marker::PhantomData};

use notsim_client::TxConfig;
use notsim_core::{downcast_tx, CodecError, Tx, TxCodec};

/// Decodes with the client's codecs, then narrows the result to `T`.
pub(crate) struct GenericTxDecoder<T> {
    tx_config: TxConfig,
    _tx: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for GenericTxDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericTxDecoder")
            .field("tx_config", &self.tx_config)
            .field("target", &type_name::<T>())
            .finish()
    }
}

impl<T: Tx> GenericTxDecoder<T> {
    pub(crate) fn new(tx_config: TxConfig) -> Self {
        Self {
            tx_config,
            _tx: PhantomData,
        }
    }
}

impl<T: Tx> TxCodec<T> for GenericTxDecoder<T> {
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let tx = (self.tx_config.tx_decoder())(bytes)?;
        downcast_tx(tx)
    }

    fn decode_json(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let tx = (self.tx_config.tx_json_decoder())(bytes)?;
        downcast_tx(tx)
    }
}
