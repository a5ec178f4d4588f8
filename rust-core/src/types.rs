// Fixed-width primitives shared by every module.

pub type Hash = [u8; 32];
pub type PublicKey = [u8; 32];
pub type Signature = [u8; 64];
pub type TransactionId = Hash;

/// Account address: first 20 bytes of sha256(public key).
pub type Address = [u8; 20];

pub const ZERO_HASH: Hash = [0u8; 32];
pub const ADDRESS_LENGTH: usize = 20;
pub const SIGNATURE_LENGTH: usize = 64;

/// Upper bound for any balance, stake or transferred amount (fits a signed 64-bit integer).
pub const MAX_TRANSACTION_AMOUNT: u64 = i64::MAX as u64;

/// Height of a block in the chain.
pub type Height = u32;

/// Lowercase hex, used for ids, addresses and keys in messages and logs.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
