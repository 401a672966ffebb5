use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SecretStore, StoreError};

/// Current on-disk format version.
const VAULT_VERSION: u8 = 1;

/// Argon2 salt length in bytes.
const SALT_LEN: usize = 16;

/// ChaCha20-Poly1305 nonce length in bytes.
const NONCE_LEN: usize = 12;

#[derive(Serialize, Deserialize)]
struct VaultFile {
    version: u8,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

struct Vault {
    cipher: ChaCha20Poly1305,
    salt: Vec<u8>,
    entries: HashMap<String, String>,
}

/// Secrets sealed in a single file with ChaCha20-Poly1305.
///
/// The key is derived from a passphrase with Argon2id and a random per-file
/// salt. Every write re-seals the whole map under a fresh nonce and replaces
/// the file via rename, so a crash mid-write leaves the previous contents.
pub struct EncryptedFileStore {
    path: PathBuf,
    vault: Mutex<Vault>,
}

impl EncryptedFileStore {
    /// Open the vault at `path`, creating an empty one if the file is absent.
    pub fn open(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, StoreError> {
        let path = path.into();

        let vault = if path.exists() {
            let contents = std::fs::read(&path)
                .map_err(|e| StoreError::Unavailable(format!("Failed to read vault: {}", e)))?;
            let file: VaultFile = serde_json::from_slice(&contents)
                .map_err(|e| StoreError::Corrupt(format!("Failed to parse vault: {}", e)))?;
            Self::unseal(file, passphrase)?
        } else {
            let mut salt = vec![0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            Vault {
                cipher: derive_cipher(passphrase, &salt)?,
                salt,
                entries: HashMap::new(),
            }
        };

        debug!(path = %path.display(), entries = vault.entries.len(), "Opened encrypted vault");

        Ok(Self {
            path,
            vault: Mutex::new(vault),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unseal(file: VaultFile, passphrase: &str) -> Result<Vault, StoreError> {
        if file.version != VAULT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "Unsupported vault version {}",
                file.version
            )));
        }
        if file.nonce.len() != NONCE_LEN {
            return Err(StoreError::Corrupt("Invalid nonce length".to_string()));
        }

        let cipher = derive_cipher(passphrase, &file.salt)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&file.nonce), file.ciphertext.as_ref())
            .map_err(|_| {
                StoreError::Corrupt("Wrong passphrase or tampered vault".to_string())
            })?;
        let entries: HashMap<String, String> = serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::Corrupt(format!("Failed to parse vault contents: {}", e)))?;

        Ok(Vault {
            cipher,
            salt: file.salt,
            entries,
        })
    }

    fn seal_and_write(&self, vault: &Vault) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(&vault.entries)
            .map_err(|e| StoreError::Unavailable(format!("Failed to encode vault: {}", e)))?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = vault
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| StoreError::Unavailable("Failed to encrypt vault".to_string()))?;

        let file = VaultFile {
            version: VAULT_VERSION,
            salt: vault.salt.clone(),
            nonce: nonce.to_vec(),
            ciphertext,
        };
        let contents = serde_json::to_vec(&file)
            .map_err(|e| StoreError::Unavailable(format!("Failed to encode vault: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("Failed to create vault dir: {}", e)))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)
            .map_err(|e| StoreError::Unavailable(format!("Failed to write vault: {}", e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Unavailable(format!("Failed to replace vault: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vault>, StoreError> {
        self.vault
            .lock()
            .map_err(|_| StoreError::Unavailable("vault lock poisoned".to_string()))
    }
}

fn derive_cipher(passphrase: &str, salt: &[u8]) -> Result<ChaCha20Poly1305, StoreError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| StoreError::Unavailable(format!("Key derivation failed: {}", e)))?;
    Ok(ChaCha20Poly1305::new(Key::from_slice(&key)))
}

impl SecretStore for EncryptedFileStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut vault = self.lock()?;
        let previous = vault.entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.seal_and_write(&vault) {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => vault.entries.insert(key.to_string(), old),
                None => vault.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.entries.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut vault = self.lock()?;
        let Some(previous) = vault.entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.seal_and_write(&vault) {
            vault.entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        {
            let store = EncryptedFileStore::open(&path, "correct horse").unwrap();
            store.set("primary_token", "tok-123").unwrap();
            store.set("pin_attempts", "2").unwrap();
            store.delete("pin_attempts").unwrap();
        }

        let reopened = EncryptedFileStore::open(&path, "correct horse").unwrap();
        assert_eq!(
            reopened.get("primary_token").unwrap().as_deref(),
            Some("tok-123")
        );
        assert_eq!(reopened.get("pin_attempts").unwrap(), None);
    }

    #[test]
    fn test_vault_does_not_contain_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = EncryptedFileStore::open(&path, "passphrase").unwrap();
        store.set("biometric_password", "hunter2-secret").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("hunter2-secret"));
        assert!(!raw.contains("biometric_password"));
    }

    #[test]
    fn test_wrong_passphrase_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = EncryptedFileStore::open(&path, "right").unwrap();
        store.set("k", "v").unwrap();

        let result = EncryptedFileStore::open(&path, "wrong");
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_delete_missing_key_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = EncryptedFileStore::open(&path, "p").unwrap();
        store.delete("absent").unwrap();
        assert!(!path.exists());
    }
}
