pub const KEY_LEN: usize = 32;

/// Turn the process secret into 32 bytes of key material.
///
/// Takes the first 32 bytes of the UTF-8 secret and right-pads short secrets
/// with ASCII `'0'`. This is not a KDF: a short secret yields a key with a
/// predictable tail. Stored ciphertext depends on this exact mapping, so it
/// must not change without re-encrypting every file.
pub fn derive_key(secret: &str) -> [u8; KEY_LEN] {
    let mut key = [b'0'; KEY_LEN];
    let bytes = secret.as_bytes();
    let n = bytes.len().min(KEY_LEN);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

/// A Fernet key: the first half signs, the second half encrypts.
#[derive(Clone)]
pub(crate) struct FernetKey {
    pub(crate) signing: [u8; 16],
    pub(crate) encryption: [u8; 16],
}

impl FernetKey {
    pub(crate) fn new(bytes: [u8; KEY_LEN]) -> Self {
        let mut signing = [0u8; 16];
        let mut encryption = [0u8; 16];
        signing.copy_from_slice(&bytes[..16]);
        encryption.copy_from_slice(&bytes[16..]);
        Self {
            signing,
            encryption,
        }
    }

    pub(crate) fn from_secret(secret: &str) -> Self {
        Self::new(derive_key(secret))
    }
}

// Fernet tooling exchanges keys as url-safe base64; used to pin the derived
// keys against reference values.
#[cfg(test)]
impl FernetKey {
    pub(crate) fn to_base64(&self) -> String {
        use base64::{Engine as _, engine::general_purpose::URL_SAFE};

        let mut bytes = [0u8; KEY_LEN];
        bytes[..16].copy_from_slice(&self.signing);
        bytes[16..].copy_from_slice(&self.encryption);
        URL_SAFE.encode(bytes)
    }

    pub(crate) fn from_base64(encoded: &str) -> Option<Self> {
        use base64::{Engine as _, engine::general_purpose::URL_SAFE};

        let bytes = URL_SAFE.decode(encoded).ok()?;
        let key: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self::new(key))
    }
}

impl std::fmt::Debug for FernetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FernetKey(..)")
    }
}
