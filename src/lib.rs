pub mod contracts;
pub mod rpc;
pub mod tx;
pub mod wallet;
