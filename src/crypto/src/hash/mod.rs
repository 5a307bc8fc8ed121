pub mod blake3;

pub use self::blake3::{hash_bytes, hash_pair, EMPTY_HASH};
