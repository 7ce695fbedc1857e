//! The simulation application's transaction type.

use std::collections::BTreeMap;

use notsim_client::tx_config::encode_binary;
use notsim_core::{EncodeError, Tx};
use serde::{Deserialize, Serialize};

/// One message of a transaction: a routed type url plus its string fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    /// Route of the message, `/<module>.Msg/<Name>`.
    pub type_url: String,

    /// Message fields by name.
    pub fields: BTreeMap<String, String>,
}

impl Msg {
    /// A message for `type_url` without fields.
    pub fn new(type_url: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// The signed part of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    /// Messages, executed in order.
    pub messages: Vec<Msg>,

    /// Free-form note.
    pub memo: String,

    /// Hex address of the signer.
    pub signer: String,

    /// Fee paid, in the base denom.
    pub fee: u64,

    /// Gas the signer is willing to spend.
    pub gas_limit: u64,

    /// Hex signatures over the body.
    pub signatures: Vec<String>,
}

/// A transaction of the simulation application.
///
/// The canonical bytes are computed once, when the transaction is built or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TxBody", into = "TxBody")]
pub struct SimTx {
    body: TxBody,
    bytes: Vec<u8>,
}

impl SimTx {
    /// Builds a transaction from its body.
    pub fn new(body: TxBody) -> Result<Self, EncodeError> {
        let bytes = encode_binary(&body)?;
        Ok(Self { body, bytes })
    }

    /// The body.
    pub fn body(&self) -> &TxBody {
        &self.body
    }

    /// The messages.
    pub fn messages(&self) -> &[Msg] {
        &self.body.messages
    }
}

impl TryFrom<TxBody> for SimTx {
    type Error = EncodeError;

    fn try_from(body: TxBody) -> Result<Self, Self::Error> {
        Self::new(body)
    }
}

impl From<SimTx> for TxBody {
    fn from(tx: SimTx) -> Self {
        tx.body
    }
}

impl Tx for SimTx {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn msg_type_urls(&self) -> Vec<&str> {
        self.body
            .messages
            .iter()
            .map(|msg| msg.type_url.as_str())
            .collect()
    }

    fn gas_limit(&self) -> u64 {
        self.body.gas_limit
    }
}

#[cfg(test)]
mod tests {
    use notsim_client::TxConfig;
    use notsim_core::{downcast_tx, TxHash};
    use proptest::prelude::*;

    use super::*;

    fn send(to: &str, amount: u64) -> SimTx {
        SimTx::new(TxBody {
            messages: vec![Msg::new("/bank.Msg/Send")
                .field("to_address", to)
                .field("amount", amount.to_string())],
            memo: "hi".to_string(),
            signer: "ab".repeat(20),
            fee: 10,
            gas_limit: 200_000,
            signatures: vec!["00".to_string()],
        })
        .unwrap()
    }

    #[test]
    fn test_identity_is_hash_of_canonical_bytes() {
        let tx = send("alice", 5);
        assert_eq!(tx.hash(), TxHash::digest(&encode_binary(tx.body()).unwrap()));
        assert_ne!(tx.hash(), send("alice", 6).hash());
        assert_eq!(tx.msg_type_urls(), ["/bank.Msg/Send"]);
    }

    #[test]
    fn test_json_form_is_the_body() {
        let tx = send("bob", 1);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["messages"][0]["type_url"], "/bank.Msg/Send");
        assert!(json.get("bytes").is_none());
    }

    proptest! {
        #[test]
        fn proptest_codecs_preserve_transactions(
            to in "[a-z]{1,12}",
            amount in any::<u64>(),
            memo in ".{0,32}",
            gas_limit in any::<u64>(),
        ) {
            let mut body = send(&to, amount).body().clone();
            body.memo = memo;
            body.gas_limit = gas_limit;
            let tx = SimTx::new(body).unwrap();
            let config = TxConfig::for_type::<SimTx>();

            let bytes = (config.tx_encoder())(&tx).unwrap();
            prop_assert_eq!(&bytes, &tx.bytes().to_vec());
            let decoded = downcast_tx::<SimTx>((config.tx_decoder())(&bytes).unwrap()).unwrap();
            prop_assert_eq!(&decoded, &tx);

            let json = (config.tx_json_encoder())(&tx).unwrap();
            let decoded = downcast_tx::<SimTx>((config.tx_json_decoder())(&json).unwrap()).unwrap();
            prop_assert_eq!(decoded.hash(), tx.hash());
        }
    }
}
