use crate::error::CryptoError;
use cfb_mode::cipher::KeyIvInit;
use md5::{Digest, Md5};
use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};
use std::fmt;
use std::str::FromStr;

type Aes128CfbBufEnc = cfb_mode::BufEncryptor<aes::Aes128>;
type Aes128CfbBufDec = cfb_mode::BufDecryptor<aes::Aes128>;

/// CipherKind names the symmetric ciphers available on the hikari leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Plain,
    Rc4,
    Aes128Cfb,
}

impl FromStr for CipherKind {
    type Err = CryptoError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "plain" => Ok(CipherKind::Plain),
            "rc4" => Ok(CipherKind::Rc4),
            "aes" | "aes-128-cfb" => Ok(CipherKind::Aes128Cfb),
            _ => Err(CryptoError::UnsupportedCipher(name.to_string())),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CipherKind::Plain => "plain",
            CipherKind::Rc4 => "rc4",
            CipherKind::Aes128Cfb => "aes-128-cfb",
        };
        f.write_str(name)
    }
}

/// Endpoint is the end of the hikari leg a cipher session belongs to. The
/// client encrypts upstream and decrypts downstream, the server the reverse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Client,
    Server,
}

/// Direction is one flow of the hikari leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Client to server
    Upstream,
    /// Server to client
    Downstream,
}

/// Endpoint implementation block
impl Endpoint {
    fn outbound(self) -> Direction {
        match self {
            Endpoint::Client => Direction::Upstream,
            Endpoint::Server => Direction::Downstream,
        }
    }

    fn inbound(self) -> Direction {
        match self {
            Endpoint::Client => Direction::Downstream,
            Endpoint::Server => Direction::Upstream,
        }
    }
}

/// Material is the key and IV of one direction
#[derive(Clone)]
struct Material {
    key: [u8; 16],
    iv: [u8; 16],
}

/// CipherSpec is the cipher chosen at startup together with the key
/// material derived from the shared secret
#[derive(Clone)]
pub struct CipherSpec {
    kind: CipherKind,
    upstream: Material,
    downstream: Material,
}

impl fmt::Debug for CipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSpec")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn md5_concat(first: &[u8], second: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(first);
    hasher.update(second);
    hasher.finalize().into()
}

/// CipherSpec implementation block
impl CipherSpec {
    /// new selects a cipher by name and derives the material of both
    /// directions:
    ///
    /// | direction  | key                  | iv                  |
    /// |------------|----------------------|---------------------|
    /// | upstream   | MD5(secret)          | MD5(key || secret)  |
    /// | downstream | MD5(key || iv_down)  | MD5(iv || secret)   |
    ///
    /// rc4 only uses the key column
    pub fn new(name: &str, secret: &str) -> Result<Self, CryptoError> {
        let kind: CipherKind = name.parse()?;
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }

        let key: [u8; 16] = Md5::digest(secret.as_bytes()).into();
        let iv = md5_concat(&key, secret.as_bytes());
        let iv_down = md5_concat(&iv, secret.as_bytes());

        Ok(Self {
            kind,
            upstream: Material { key, iv },
            downstream: Material {
                key: md5_concat(&key, &iv_down),
                iv: iv_down,
            },
        })
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    fn material(&self, direction: Direction) -> &Material {
        match direction {
            Direction::Upstream => &self.upstream,
            Direction::Downstream => &self.downstream,
        }
    }

    /// session builds fresh encrypt and decrypt states for one connection
    /// seen from `endpoint`
    pub fn session(&self, endpoint: Endpoint) -> Result<CipherSession, CryptoError> {
        let out = self.material(endpoint.outbound());
        let inb = self.material(endpoint.inbound());

        let (encryptor, decryptor) = match self.kind {
            CipherKind::Plain => (Encryptor::Plain, Decryptor::Plain),
            CipherKind::Rc4 => {
                let enc = Rc4::<U16>::new_from_slice(&out.key)
                    .map_err(|_| CryptoError::InvalidKey("rc4"))?;
                let dec = Rc4::<U16>::new_from_slice(&inb.key)
                    .map_err(|_| CryptoError::InvalidKey("rc4"))?;
                (Encryptor::Rc4(Box::new(enc)), Decryptor::Rc4(Box::new(dec)))
            }
            CipherKind::Aes128Cfb => {
                let enc = Aes128CfbBufEnc::new_from_slices(&out.key, &out.iv)
                    .map_err(|_| CryptoError::InvalidKey("aes-128-cfb"))?;
                let dec = Aes128CfbBufDec::new_from_slices(&inb.key, &inb.iv)
                    .map_err(|_| CryptoError::InvalidKey("aes-128-cfb"))?;
                (Encryptor::Aes(Box::new(enc)), Decryptor::Aes(Box::new(dec)))
            }
        };

        Ok(CipherSession {
            encryptor,
            decryptor,
        })
    }
}

enum Encryptor {
    Plain,
    Rc4(Box<Rc4<U16>>),
    Aes(Box<Aes128CfbBufEnc>),
}

enum Decryptor {
    Plain,
    Rc4(Box<Rc4<U16>>),
    Aes(Box<Aes128CfbBufDec>),
}

/// CipherSession holds the stream states of one hikari connection. The
/// keystream continues from one frame to the next, so both ends must
/// process frames in the order they were sent
pub struct CipherSession {
    encryptor: Encryptor,
    decryptor: Decryptor,
}

impl fmt::Debug for CipherSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSession").finish_non_exhaustive()
    }
}

/// CipherSession implementation block
impl CipherSession {
    /// encrypt transforms outbound bytes in place
    pub fn encrypt(&mut self, data: &mut [u8]) {
        match &mut self.encryptor {
            Encryptor::Plain => {}
            Encryptor::Rc4(cipher) => cipher.apply_keystream(data),
            Encryptor::Aes(cipher) => cipher.encrypt(data),
        }
    }

    /// decrypt transforms inbound bytes in place
    pub fn decrypt(&mut self, data: &mut [u8]) {
        match &mut self.decryptor {
            Decryptor::Plain => {}
            Decryptor::Rc4(cipher) => cipher.apply_keystream(data),
            Decryptor::Aes(cipher) => cipher.decrypt(data),
        }
    }
}
