//! Core types shared by every crate of the node.
//!
//! This crate lies at the bottom of the crate-hierarchy in this workspace i.e., it does not depend
//! on any other crate in this workspace. It defines the minimal transaction capability that the
//! rest of the node is generic over, and the codec contract used to move transactions in and out
//! of raw bytes.

pub mod errors;
pub mod transaction;

pub use errors::{CodecError, DecodeError, EncodeError};
pub use transaction::{downcast_tx, AnyTx, Tx, TxCodec, TxHash};
