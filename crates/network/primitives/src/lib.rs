//! Wire-level building blocks shared by the sybil node: the typed pubsub RPC
//! model, its protobuf schema and the length-delimited stream codec.

pub mod rpc;
pub mod stream;
