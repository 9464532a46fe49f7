pub mod bytes;
pub mod connection;
pub mod crypto;
pub mod entropy;
pub mod error;
pub mod fec;
pub mod frame;
pub mod packet;
pub mod visitor;
pub mod wire;

pub mod framer;

pub const MINI_QUICHE_VERSION: u32 = 0b0000_0010;
