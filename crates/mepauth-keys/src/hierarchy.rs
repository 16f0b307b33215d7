//! Root key and work key management.
//!
//! The root key is never stored. It is re-derived on demand from three
//! components XOR-ed together (the operator-supplied component, a random
//! component persisted in the key directory and a component embedded in the
//! binary) and stretched with PBKDF2-HMAC-SHA256 over a persisted salt.
//!
//! The root key only decrypts the work key. The work key seals every other
//! secret (caller secret keys, the token signing key password) and is cached
//! for the lifetime of the process once decrypted.

use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aws_lc_rs::pbkdf2;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cipher::{self, KEY_LEN, NONCE_LEN};
use crate::error::KeyError;
use crate::fs::{read_file, write_owner_only};

/// Minimum length of the operator-supplied key component, in bytes.
pub const MIN_USER_COMPONENT_LEN: usize = 256;

/// Length of the random file component, in bytes.
pub const FILE_COMPONENT_LEN: usize = 256;

/// Length of the PBKDF2 salt, in bytes.
pub const SALT_LEN: usize = 16;

const PBKDF2_ITERATIONS: NonZeroU32 = NonZeroU32::new(10_000).unwrap();

const EMBEDDED_COMPONENT: &[u8] =
    b"q8Vn2xLr7TfK0cZm4WpJ9sYb3HdG6uEa1NkQ5oRi8XvCtB2lMz7yFh0gDwSe4UjP";

/// Locations of the persisted key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    /// Random root-key component.
    pub component: PathBuf,
    /// PBKDF2 salt.
    pub salt: PathBuf,
    /// Work key encrypted under the root key.
    pub work_key: PathBuf,
    /// Nonce of the encrypted work key.
    pub work_key_nonce: PathBuf,
}

impl KeyPaths {
    /// Standard file names under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            component: dir.join("root_key_component"),
            salt: dir.join("root_key_salt"),
            work_key: dir.join("work_key"),
            work_key_nonce: dir.join("work_key_nonce"),
        }
    }
}

/// Check the operator-supplied key component.
///
/// # Errors
///
/// Returns [`KeyError::ComponentTooShort`] when the component is shorter than
/// [`MIN_USER_COMPONENT_LEN`] bytes.
pub fn validate_user_component(component: &[u8]) -> Result<(), KeyError> {
    if component.len() < MIN_USER_COMPONENT_LEN {
        return Err(KeyError::ComponentTooShort {
            min: MIN_USER_COMPONENT_LEN,
        });
    }
    Ok(())
}

/// The decrypted work key, shared and wiped when the last handle drops.
#[derive(Clone)]
pub struct WorkKey(Arc<Zeroizing<[u8; KEY_LEN]>>);

impl WorkKey {
    fn expose(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkKey(<redacted>)")
    }
}

/// A secret encrypted under the work key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    /// Ciphertext with the GCM tag appended.
    pub ciphertext: Vec<u8>,
    /// The nonce used for this ciphertext.
    pub nonce: [u8; NONCE_LEN],
}

impl SealedSecret {
    /// Hex-encode as `(ciphertext, nonce)` for storage in a record.
    #[must_use]
    pub fn to_hex(&self) -> (String, String) {
        (hex::encode(&self.ciphertext), hex::encode(self.nonce))
    }

    /// Decode a hex `(ciphertext, nonce)` pair.
    ///
    /// Malformed input is reported as [`KeyError::Decryption`].
    pub fn from_hex(ciphertext: &str, nonce: &str) -> Result<Self, KeyError> {
        let ciphertext = hex::decode(ciphertext).map_err(|_| KeyError::Decryption)?;
        let nonce = hex::decode(nonce).map_err(|_| KeyError::Decryption)?;
        let nonce = nonce.try_into().map_err(|_| KeyError::Decryption)?;
        Ok(Self { ciphertext, nonce })
    }
}

/// The key hierarchy rooted in a key directory.
pub struct KeyHierarchy {
    paths: KeyPaths,
    user_component: Zeroizing<Vec<u8>>,
    work_key: RwLock<Option<WorkKey>>,
}

impl fmt::Debug for KeyHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHierarchy")
            .field("paths", &self.paths)
            .field("work_key_cached", &self.work_key.read().is_some())
            .finish_non_exhaustive()
    }
}

impl KeyHierarchy {
    /// Create a hierarchy over `paths` with the operator-supplied component.
    ///
    /// # Errors
    ///
    /// Rejects a component shorter than [`MIN_USER_COMPONENT_LEN`] bytes.
    pub fn new(paths: KeyPaths, user_component: Zeroizing<Vec<u8>>) -> Result<Self, KeyError> {
        validate_user_component(&user_component)?;
        Ok(Self {
            paths,
            user_component,
            work_key: RwLock::new(None),
        })
    }

    /// The key-material locations.
    #[must_use]
    pub fn paths(&self) -> &KeyPaths {
        &self.paths
    }

    /// Make sure root-key material and an encrypted work key exist.
    ///
    /// - Component or salt missing: both are regenerated, and since the root
    ///   key changes, a new work key is generated too.
    /// - Work key or its nonce missing: a new work key is generated.
    /// - Everything present: nothing is written.
    pub fn init_root_key_and_work_key(&self) -> Result<(), KeyError> {
        let root_present = self.paths.component.exists() && self.paths.salt.exists();
        let work_key_present = self.paths.work_key.exists() && self.paths.work_key_nonce.exists();

        if !root_present {
            if self.paths.component.exists() || self.paths.salt.exists() {
                warn!("incomplete root key material found, regenerating");
            }
            let component = cipher::random_bytes::<FILE_COMPONENT_LEN>();
            let salt = cipher::random_bytes::<SALT_LEN>();
            write_owner_only(&self.paths.component, &*component)?;
            write_owner_only(&self.paths.salt, &*salt)?;
            info!("generated root key component and salt");
        }

        if !root_present || !work_key_present {
            let root_key = self.derive_root_key()?;
            let work_key = cipher::generate_key();
            let nonce = cipher::generate_nonce();
            let sealed = cipher::encrypt(&*work_key, &*root_key, &nonce)?;
            write_owner_only(&self.paths.work_key, &sealed)?;
            write_owner_only(&self.paths.work_key_nonce, &nonce)?;
            *self.work_key.write() = None;
            info!("generated work key");
        } else {
            debug!("root key material and work key already present");
        }

        Ok(())
    }

    /// Derive the root key from the three components and the salt.
    pub fn derive_root_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>, KeyError> {
        let file_component = read_file(&self.paths.component)?;
        if file_component.len() != FILE_COMPONENT_LEN {
            return Err(KeyError::Malformed {
                path: self.paths.component.clone(),
            });
        }
        let salt = read_file(&self.paths.salt)?;
        if salt.len() != SALT_LEN {
            return Err(KeyError::Malformed {
                path: self.paths.salt.clone(),
            });
        }

        let mixed = mix_components(&[
            self.user_component.as_slice(),
            file_component.as_slice(),
            EMBEDDED_COMPONENT,
        ]);
        let mut root_key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            PBKDF2_ITERATIONS,
            &salt,
            &mixed,
            &mut *root_key,
        );
        Ok(root_key)
    }

    /// The decrypted work key, decrypting and caching it on first use.
    pub fn work_key(&self) -> Result<WorkKey, KeyError> {
        if let Some(key) = self.work_key.read().as_ref() {
            return Ok(key.clone());
        }

        let mut slot = self.work_key.write();
        if let Some(key) = slot.as_ref() {
            return Ok(key.clone());
        }

        let root_key = self.derive_root_key()?;
        let sealed = read_file(&self.paths.work_key)?;
        let nonce = read_file(&self.paths.work_key_nonce)?;
        let plaintext = cipher::decrypt(&sealed, &*root_key, &nonce)?;
        if plaintext.len() != KEY_LEN {
            return Err(KeyError::Decryption);
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&plaintext);
        let key = WorkKey(Arc::new(key));
        *slot = Some(key.clone());
        debug!("work key decrypted and cached");
        Ok(key)
    }

    /// Encrypt `plaintext` under the work key with a fresh nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret, KeyError> {
        let work_key = self.work_key()?;
        let nonce = cipher::generate_nonce();
        let ciphertext = cipher::encrypt(plaintext, work_key.expose(), &nonce)?;
        Ok(SealedSecret { ciphertext, nonce })
    }

    /// Decrypt a secret sealed by [`KeyHierarchy::seal`].
    pub fn open(&self, sealed: &SealedSecret) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let work_key = self.work_key()?;
        cipher::decrypt(&sealed.ciphertext, work_key.expose(), &sealed.nonce)
    }

    /// Seal `plaintext` and persist ciphertext and nonce to two files.
    pub fn seal_to_files(
        &self,
        plaintext: &[u8],
        ciphertext_path: &Path,
        nonce_path: &Path,
    ) -> Result<(), KeyError> {
        let sealed = self.seal(plaintext)?;
        write_owner_only(ciphertext_path, &sealed.ciphertext)?;
        write_owner_only(nonce_path, &sealed.nonce)
    }

    /// Read a secret persisted by [`KeyHierarchy::seal_to_files`].
    pub fn open_from_files(
        &self,
        ciphertext_path: &Path,
        nonce_path: &Path,
    ) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let ciphertext = read_file(ciphertext_path)?;
        let nonce = read_file(nonce_path)?;
        let nonce: [u8; NONCE_LEN] = nonce
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::Decryption)?;
        self.open(&SealedSecret {
            ciphertext: ciphertext.to_vec(),
            nonce,
        })
    }
}

/// XOR the components together; shorter components repeat cyclically and the
/// result is as long as the longest one.
fn mix_components(components: &[&[u8]]) -> Zeroizing<Vec<u8>> {
    let len = components.iter().map(|c| c.len()).max().unwrap_or(0);
    let mut mixed = Zeroizing::new(vec![0u8; len]);
    for component in components.iter().filter(|c| !c.is_empty()) {
        for (i, byte) in mixed.iter_mut().enumerate() {
            *byte ^= component[i % component.len()];
        }
    }
    mixed
}
