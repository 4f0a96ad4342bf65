use crate::protocol::{AuthMethod, KEY_HASH_LEN};
use md5::{Digest, Md5};
use std::collections::HashSet;

/// KeyHash is the MD5 digest of a private key, the only form in which a
/// key ever crosses the wire
pub type KeyHash = [u8; KEY_HASH_LEN];

/// key_hash digests a configured private key
pub fn key_hash(key: &str) -> KeyHash {
    Md5::digest(key.as_bytes()).into()
}

/// AuthorizedKeys holds the key hashes a server accepts
#[derive(Debug, Clone, Default)]
pub struct AuthorizedKeys(HashSet<KeyHash>);

/// AuthorizedKeys implementation block
impl AuthorizedKeys {
    /// from_keys hashes every configured private key
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(keys.into_iter().map(|k| key_hash(k.as_ref())).collect())
    }

    pub fn contains(&self, hash: &[u8]) -> bool {
        <KeyHash>::try_from(hash).is_ok_and(|hash| self.0.contains(&hash))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// select_auth_method picks the method answered to a SOCKS5 method
/// selection message. Only no-auth is offered to local applications, so
/// it is selected whatever the client lists
pub fn select_auth_method(_client_methods: &[u8]) -> AuthMethod {
    AuthMethod::NoAuth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_known_key() {
        let expected = [
            0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1,
            0x7f, 0x72,
        ];
        assert_eq!(key_hash("abc"), expected);
    }

    #[test]
    fn authorized_keys_lookup() {
        let keys = AuthorizedKeys::from_keys(["alpha", "beta", "alpha"]);
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&key_hash("beta")));
        assert!(!keys.contains(&key_hash("gamma")));
        assert!(!keys.contains(&[0u8; 4]));
    }

    #[test]
    fn no_auth_is_always_selected() {
        assert_eq!(select_auth_method(&[0x02]), AuthMethod::NoAuth);
        assert_eq!(select_auth_method(&[]), AuthMethod::NoAuth);
    }
}
