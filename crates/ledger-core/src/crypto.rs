//! Cryptographic primitives for the client endpoint.
//!
//! Three concerns, all built on the dalek / RustCrypto stack:
//!   1. Ed25519 signatures — the node signs handshake tokens, clients sign
//!      their nonce replies. Ed25519 hashes with SHA-512 internally.
//!   2. Sealed delivery — the freshly generated session key travels to the
//!      client encrypted under the client's X25519 key (ephemeral ECIES
//!      with ChaCha20-Poly1305 and an HKDF-SHA256 wrap key).
//!   3. The symmetric command envelope — ChaCha20-Poly1305 under the
//!      session key, random 12-byte nonce prefix on the wire.
//!
//! Private key material is zeroized on drop. There is no unsafe code in
//! this module.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of the server nonce issued on `connect`.
pub const SERVER_NONCE_LEN: usize = 48;

/// Length of a symmetric session key.
pub const SESSION_KEY_LEN: usize = 32;

/// Length of a packed client key: Ed25519 verifying key followed by
/// X25519 public key.
pub const CLIENT_KEY_LEN: usize = 64;

const SEAL_NONCE_LEN: usize = 12;
const SEAL_CONTEXT: &[u8] = b"ledger.session-token.v1";

/// Generate the 48-byte random server nonce.
pub fn generate_nonce() -> [u8; SERVER_NONCE_LEN] {
    let mut nonce = [0u8; SERVER_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Verify a detached Ed25519 signature under a raw 32-byte public key.
pub fn verify_signature(
    public_key: &[u8; 32],
    data: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::BadSignature)?;
    let sig = Signature::from_slice(signature).map_err(|_| CryptoError::BadSignature)?;
    key.verify(data, &sig).map_err(|_| CryptoError::BadSignature)
}

// ── Node identity ─────────────────────────────────────────────────────────────

/// The node's long-term Ed25519 signing key.
///
/// Generated once and stored persistently; the public half is what clients
/// pin to authenticate handshake tokens.
pub struct NodeKey {
    signing: SigningKey,
}

impl NodeKey {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct from stored seed bytes. The public key is derived
    /// deterministically from the seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Serialize the seed for persistent storage (mode 0600 on disk).
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing.sign(data).to_bytes()
    }
}

// ── Client identity ───────────────────────────────────────────────────────────

/// A client's public identity as presented on `/connect`.
///
/// Packed wire form is 64 bytes: the Ed25519 verifying key (signatures)
/// followed by the X25519 public key (sealed session-key delivery).
#[derive(Debug, Clone)]
pub struct ClientKey {
    verify: VerifyingKey,
    seal: PublicKey,
}

impl ClientKey {
    pub fn parse(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != CLIENT_KEY_LEN {
            return Err(CryptoError::BadClientKey(format!(
                "expected {} bytes, got {}",
                CLIENT_KEY_LEN,
                bytes.len()
            )));
        }
        let mut verify_bytes = [0u8; 32];
        verify_bytes.copy_from_slice(&bytes[..32]);
        let verify = VerifyingKey::from_bytes(&verify_bytes)
            .map_err(|_| CryptoError::BadClientKey("invalid Ed25519 point".into()))?;
        let mut seal_bytes = [0u8; 32];
        seal_bytes.copy_from_slice(&bytes[32..]);
        Ok(Self {
            verify,
            seal: PublicKey::from(seal_bytes),
        })
    }

    pub fn to_bytes(&self) -> [u8; CLIENT_KEY_LEN] {
        let mut out = [0u8; CLIENT_KEY_LEN];
        out[..32].copy_from_slice(&self.verify.to_bytes());
        out[32..].copy_from_slice(self.seal.as_bytes());
        out
    }

    /// Verify a client signature over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let sig = Signature::from_slice(signature).map_err(|_| CryptoError::BadSignature)?;
        self.verify
            .verify(data, &sig)
            .map_err(|_| CryptoError::BadSignature)
    }

    /// Encrypt `plaintext` so that only the holder of the matching client
    /// secret can read it.
    ///
    /// Wire form: ephemeral X25519 public key (32) ‖ nonce (12) ‖ ciphertext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.seal);

        let key = derive_wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), self.seal.as_bytes())?;
        let cipher =
            ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::BadKeyLength)?;

        let mut nonce = [0u8; SEAL_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut out = Vec::with_capacity(32 + SEAL_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

/// A client's full keypair. The endpoint itself only ever sees [`ClientKey`];
/// this type exists for client tooling and tests.
pub struct ClientKeypair {
    signing: SigningKey,
    seal: StaticSecret,
}

impl ClientKeypair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            seal: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn public(&self) -> ClientKey {
        ClientKey {
            verify: self.signing.verifying_key(),
            seal: PublicKey::from(&self.seal),
        }
    }

    pub fn public_bytes(&self) -> [u8; CLIENT_KEY_LEN] {
        self.public().to_bytes()
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing.sign(data).to_bytes()
    }

    /// Open a blob produced by [`ClientKey::seal`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < 32 + SEAL_NONCE_LEN + 16 {
            return Err(CryptoError::OpenFailed);
        }
        let mut ephemeral_bytes = [0u8; 32];
        ephemeral_bytes.copy_from_slice(&sealed[..32]);
        let ephemeral_public = PublicKey::from(ephemeral_bytes);
        let shared = self.seal.diffie_hellman(&ephemeral_public);

        let own_public = PublicKey::from(&self.seal);
        let key = derive_wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), own_public.as_bytes())?;
        let cipher =
            ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::BadKeyLength)?;

        let nonce = &sealed[32..32 + SEAL_NONCE_LEN];
        cipher
            .decrypt(Nonce::from_slice(nonce), &sealed[32 + SEAL_NONCE_LEN..])
            .map_err(|_| CryptoError::OpenFailed)
    }
}

fn derive_wrap_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut info = Vec::with_capacity(SEAL_CONTEXT.len() + 64);
    info.extend_from_slice(SEAL_CONTEXT);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);

    let mut key = [0u8; 32];
    hk.expand(&info, &mut key)
        .map_err(|_| CryptoError::BadKeyLength)?;
    Ok(key)
}

// ── Session key ───────────────────────────────────────────────────────────────

/// A symmetric session key for the command envelope.
///
/// Wire format per message: 12-byte random nonce ‖ ChaCha20-Poly1305
/// ciphertext (plaintext + 16-byte tag).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionKey").field(&"<redacted>").finish()
    }
}

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SESSION_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::BadKeyLength)?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| CryptoError::BadKeyLength)?;
        let mut nonce = [0u8; SEAL_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut out = Vec::with_capacity(SEAL_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < SEAL_NONCE_LEN + 16 {
            return Err(CryptoError::DecryptFailed);
        }
        let cipher =
            ChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| CryptoError::BadKeyLength)?;
        cipher
            .decrypt(
                Nonce::from_slice(&ciphertext[..SEAL_NONCE_LEN]),
                &ciphertext[SEAL_NONCE_LEN..],
            )
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("malformed client key: {0}")]
    BadClientKey(String),

    #[error("signature does not verify")]
    BadSignature,

    #[error("sealed blob is malformed or cannot be opened")]
    OpenFailed,

    #[error("encryption failure")]
    EncryptFailed,

    #[error("ciphertext is malformed or cannot be decrypted")]
    DecryptFailed,

    #[error("key material has wrong length")]
    BadKeyLength,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
