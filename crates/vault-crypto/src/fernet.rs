use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::keys::FernetKey;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const VERSION: u8 = 0x80;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
const BLOCK_LEN: usize = 16;
/// version + timestamp + iv
const HEADER_LEN: usize = 1 + 8 + IV_LEN;
/// Header, one cipher block and the tag.
const MIN_TOKEN_LEN: usize = HEADER_LEN + BLOCK_LEN + TAG_LEN;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Malformed, tampered with, or sealed under a different key.
    /// Deliberately carries no detail about which check failed.
    #[error("invalid token")]
    InvalidToken,
}

/// Seals and opens stored file payloads.
///
/// Each `encrypt` draws a fresh IV and stamps the current time, so the same
/// plaintext never produces the same token twice. Tokens carry no expiry
/// check: a valid token decrypts regardless of age.
#[derive(Debug, Clone)]
pub struct Codec {
    key: FernetKey,
}

impl Codec {
    fn new(key: FernetKey) -> Self {
        Self { key }
    }

    pub fn from_secret(secret: &str) -> Self {
        Self::new(FernetKey::from_secret(secret))
    }

    /// Encrypt `plaintext` into a url-safe base64 Fernet token (ASCII bytes).
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.encrypt_with(plaintext, iv, now)
    }

    pub(crate) fn encrypt_with(&self, plaintext: &[u8], iv: [u8; IV_LEN], timestamp: u64) -> Vec<u8> {
        let ciphertext = Aes128CbcEnc::new(&self.key.encryption.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
        token.push(VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);

        let tag = self.mac(&token).finalize().into_bytes();
        token.extend_from_slice(&tag);

        URL_SAFE.encode(token).into_bytes()
    }

    /// Verify and decrypt a token produced by [`Codec::encrypt`] (or any
    /// Fernet implementation holding the same key).
    ///
    /// The HMAC is checked before any decryption happens; on failure nothing
    /// of the plaintext is returned.
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, CodecError> {
        let data = URL_SAFE
            .decode(token)
            .map_err(|_| CodecError::InvalidToken)?;

        if data.len() < MIN_TOKEN_LEN || data[0] != VERSION {
            return Err(CodecError::InvalidToken);
        }

        let (signed, tag) = data.split_at(data.len() - TAG_LEN);
        self.mac(signed)
            .verify_slice(tag)
            .map_err(|_| CodecError::InvalidToken)?;

        let iv = &signed[9..HEADER_LEN];
        let ciphertext = &signed[HEADER_LEN..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CodecError::InvalidToken);
        }

        Aes128CbcDec::new_from_slices(&self.key.encryption, iv)
            .map_err(|_| CodecError::InvalidToken)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CodecError::InvalidToken)
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key.signing)
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        mac
    }
}
