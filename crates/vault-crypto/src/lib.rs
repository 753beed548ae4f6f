/// Vault Crypto Library
///
/// At-rest encryption for stored files. Payloads are sealed as Fernet tokens
/// (AES-128-CBC + HMAC-SHA256), keyed from the process secret.
///
/// Tokens are byte-compatible with any conforming Fernet implementation, so
/// files written by earlier deployments keep decrypting as long as the
/// secret is unchanged.

pub mod fernet;
pub mod keys;

pub use fernet::{Codec, CodecError};
pub use keys::derive_key;
