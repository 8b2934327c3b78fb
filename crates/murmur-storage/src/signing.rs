use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs `(key, expires)` pairs so retrieval URLs can be verified without
/// any server-side state.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// True when `signature` matches and `expires` is still in the future
    /// relative to `now` (both unix seconds).
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if expires <= now {
            return false;
        }
        let Ok(raw) = hex::decode(signature) else {
            return false;
        };
        self.mac(key, expires).verify_slice(&raw).is_ok()
    }
}
