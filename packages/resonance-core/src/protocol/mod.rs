//! Wire protocols: UDP discovery and the Slimproto TCP control connection.

pub mod discovery;
pub mod slimproto;
