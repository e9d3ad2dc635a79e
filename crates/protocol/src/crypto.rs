//! Cryptographic primitives for the peerwire protocol.
//!
//! This module wraps the three primitives the protocol is built on:
//!
//! - **ML-DSA-65** signatures for identity: servers sign their ephemeral
//!   KEM key with a long-lived root key, clients sign the server challenge
//!   with their per-session keypair (which doubles as their session
//!   identity).
//! - **ML-KEM-768** key encapsulation to establish the shared symmetric
//!   key without prior shared state.
//! - **AES-256-GCM** with a 16-byte random IV per frame for transport
//!   encryption.
//!
//! Key and signature material crosses the wire hex-encoded inside the
//! handshake control tuples, so every wrapper type here offers `from_hex`
//! and `to_hex`.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use pqcrypto_mldsa::mldsa65;
use pqcrypto_mlkem::mlkem768;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProtocolError, Result};

/// Length of the per-frame initialization vector in bytes.
pub const IV_LENGTH: usize = 16;

/// Length of the symmetric key produced by encapsulation.
pub const SYMMETRIC_KEY_LENGTH: usize = 32;

/// Length of the random challenge string issued during the handshake.
pub const CHALLENGE_LENGTH: usize = 64;

/// AES-256-GCM parameterized with the protocol's 16-byte IV.
type FrameCipher = AesGcm<Aes256, U16>;

/// A 16-byte initialization vector.
pub type Iv = [u8; IV_LENGTH];

// ============================================================================
// Signatures (ML-DSA-65)
// ============================================================================

/// A detached ML-DSA-65 signature.
#[derive(Clone)]
pub struct Signature(mldsa65::DetachedSignature);

impl Signature {
    /// Parses a signature from its hex wire encoding.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)?;
        let sig = mldsa65::DetachedSignature::from_bytes(&bytes)
            .map_err(|e| ProtocolError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self(sig))
    }

    /// Returns the hex wire encoding of this signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({} bytes)", self.0.as_bytes().len())
    }
}

/// An ML-DSA-65 public key used to verify signatures.
///
/// This covers both roles the protocol needs: the trusted root public keys
/// a client uses to authenticate servers, and the self-certifying client
/// public key that doubles as the session identity.
#[derive(Clone)]
pub struct VerifyingKey(mldsa65::PublicKey);

impl VerifyingKey {
    /// Parses a public key from its hex wire encoding.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)?;
        let key = mldsa65::PublicKey::from_bytes(&bytes)
            .map_err(|e| ProtocolError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self(key))
    }

    /// Returns the hex wire encoding of this public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Verifies a detached signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        mldsa65::verify_detached_signature(&signature.0, message, &self.0)
            .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
    }

    /// Derives the session key (hex-encoded public key) for this identity.
    pub fn session_key(&self) -> SessionKey {
        SessionKey(self.to_hex())
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.session_key().fingerprint())
    }
}

/// An ML-DSA-65 secret key used to produce signatures.
///
/// Servers load one of these as their root signing key; clients hold one
/// inside their [`IdentityKeyPair`].
#[derive(Clone)]
pub struct SigningKey(mldsa65::SecretKey);

impl SigningKey {
    /// Parses a secret key from hex (as produced by key generation).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)?;
        let key = mldsa65::SecretKey::from_bytes(&bytes)
            .map_err(|e| ProtocolError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self(key))
    }

    /// Returns the hex encoding of this secret key.
    ///
    /// **Security warning**: only use this for secure storage.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Produces a detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(mldsa65::detached_sign(message, &self.0))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

/// A full ML-DSA-65 keypair.
///
/// Used as a server's root identity (signing ephemeral KEM keys) or as a
/// client's session identity (signing challenges). For clients the public
/// half, hex-encoded, *is* the session key.
#[derive(Clone)]
pub struct IdentityKeyPair {
    public: VerifyingKey,
    secret: SigningKey,
}

impl IdentityKeyPair {
    /// Generates a new random keypair.
    pub fn generate() -> Self {
        let (public, secret) = mldsa65::keypair();
        Self {
            public: VerifyingKey(public),
            secret: SigningKey(secret),
        }
    }

    /// Reconstructs a keypair from hex-encoded halves.
    pub fn from_hex(public_hex: &str, secret_hex: &str) -> Result<Self> {
        Ok(Self {
            public: VerifyingKey::from_hex(public_hex)?,
            secret: SigningKey::from_hex(secret_hex)?,
        })
    }

    /// Returns the public half.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.public
    }

    /// Returns the secret half.
    pub fn signing_key(&self) -> &SigningKey {
        &self.secret
    }

    /// Derives the session key for this identity.
    pub fn session_key(&self) -> SessionKey {
        self.public.session_key()
    }

    /// Produces a detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("session_key", &self.session_key().fingerprint())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Session key
// ============================================================================

/// A session identity: the client's public key, hex-encoded.
///
/// This string is both the cryptographic identity presented during the
/// handshake and the lookup key for session resumption.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wraps an already hex-encoded public key.
    ///
    /// The key material is validated; arbitrary strings are rejected.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let _ = VerifyingKey::from_hex(hex_str)?;
        Ok(Self(hex_str.to_string()))
    }

    /// Returns the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the verifying key behind this session identity.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_hex(&self.0)
    }

    /// Generates a short human-readable fingerprint for logging.
    ///
    /// The full session key is a couple of kilobytes of hex; the
    /// fingerprint is the first 8 bytes of its SHA-256 hash formatted as
    /// groups of 4 hex characters, e.g. `a1b2:c3d4:e5f6:7890`.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(self.0.as_bytes());
        hash[..8]
            .chunks(2)
            .map(|chunk| format!("{:02x}{:02x}", chunk[0], chunk[1]))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

// ============================================================================
// Key encapsulation (ML-KEM-768)
// ============================================================================

/// The public half of an ephemeral KEM keypair.
#[derive(Clone)]
pub struct KemPublicKey(mlkem768::PublicKey);

impl KemPublicKey {
    /// Parses a KEM public key from its hex wire encoding.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)?;
        let key = mlkem768::PublicKey::from_bytes(&bytes)
            .map_err(|e| ProtocolError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self(key))
    }

    /// Returns the hex wire encoding of this public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Returns the raw key bytes (the message servers sign).
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Encapsulates a fresh symmetric key under this public key.
    ///
    /// Returns the encapsulated ciphertext (to send to the key's owner)
    /// and the derived symmetric key (kept locally).
    pub fn encapsulate(&self) -> (Vec<u8>, SymmetricKey) {
        let (shared, ciphertext) = mlkem768::encapsulate(&self.0);
        let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
        key.copy_from_slice(shared.as_bytes());
        (ciphertext.as_bytes().to_vec(), SymmetricKey(key))
    }
}

impl std::fmt::Debug for KemPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KemPublicKey({} bytes)", self.0.as_bytes().len())
    }
}

/// An ephemeral ML-KEM-768 keypair, generated by the server per handshake.
pub struct KemKeyPair {
    public: KemPublicKey,
    secret: mlkem768::SecretKey,
}

impl KemKeyPair {
    /// Generates a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let (public, secret) = mlkem768::keypair();
        Self {
            public: KemPublicKey(public),
            secret,
        }
    }

    /// Returns the public half.
    pub fn public_key(&self) -> &KemPublicKey {
        &self.public
    }

    /// Decapsulates the peer's ciphertext to recover the symmetric key.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<SymmetricKey> {
        let ciphertext = mlkem768::Ciphertext::from_bytes(ciphertext)
            .map_err(|e| ProtocolError::InvalidKeyMaterial(e.to_string()))?;
        let shared = mlkem768::decapsulate(&ciphertext, &self.secret);
        let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
        key.copy_from_slice(shared.as_bytes());
        Ok(SymmetricKey(key))
    }
}

impl std::fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Symmetric encryption (AES-256-GCM)
// ============================================================================

/// The negotiated symmetric key for a session.
///
/// Wraps AES-256-GCM with the protocol's 16-byte random IV per frame.
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LENGTH]);

impl SymmetricKey {
    /// Builds a key from raw bytes. Intended for tests and key import.
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Encrypts `plaintext` under a fresh random IV.
    ///
    /// Returns the IV alongside the ciphertext; the frame codec places the
    /// IV on the wire in front of the ciphertext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Iv, Vec<u8>)> {
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);
        let cipher = FrameCipher::new(Key::<FrameCipher>::from_slice(&self.0));
        let ciphertext = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext)
            .map_err(|_| ProtocolError::Encryption("aead seal failed".to_string()))?;
        Ok((iv, ciphertext))
    }

    /// Decrypts and authenticates `ciphertext` under the given IV.
    pub fn open(&self, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = FrameCipher::new(Key::<FrameCipher>::from_slice(&self.0));
        cipher
            .decrypt(Nonce::<U16>::from_slice(iv), ciphertext)
            .map_err(|_| ProtocolError::Decryption("aead open failed".to_string()))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

// ============================================================================
// Challenge generation
// ============================================================================

/// Generates the random alphanumeric challenge string the server issues to
/// prove possession of the derived key and to bind the client's signature.
pub fn random_challenge() -> String {
    OsRng
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(CHALLENGE_LENGTH)
        .map(char::from)
        .collect()
}
