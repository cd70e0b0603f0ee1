use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::info;
use rand::RngCore;

use crate::settings::ImapConfig;

const NONCE_LEN: usize = 12;

/// Mailbox password kept on disk, AES-GCM encrypted with a locally generated key.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    key_file: PathBuf,
    password_file: PathBuf,
}

impl CredentialStore {
    pub fn new(key_file: impl Into<PathBuf>, password_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
            password_file: password_file.into(),
        }
    }

    pub fn from_config(config: &ImapConfig) -> Self {
        Self::new(&config.key_file, &config.password_file)
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        let key = if self.key_file.exists() {
            // Read existing key
            let key_bytes = fs::read(&self.key_file)?;
            Aes256Gcm::new_from_slice(&key_bytes)
                .map_err(|e| anyhow::anyhow!("Failed to create cipher from key: {}", e))?
        } else {
            // Generate new key
            let mut key_bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key_bytes);
            write_private(&self.key_file, &key_bytes)?;
            Aes256Gcm::new_from_slice(&key_bytes)
                .map_err(|e| anyhow::anyhow!("Failed to create cipher from new key: {}", e))?
        };
        Ok(key)
    }

    pub fn encrypt(&self, password: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, password.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to encrypt password: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let combined = BASE64
            .decode(encrypted.trim())
            .map_err(|e| anyhow::anyhow!("Failed to decode base64: {}", e))?;
        if combined.len() <= NONCE_LEN {
            bail!("Stored password is truncated");
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("Failed to decrypt password: {}", e))?;

        String::from_utf8(plaintext)
            .map_err(|e| anyhow::anyhow!("Failed to convert decrypted bytes to string: {}", e))
    }

    pub fn store(&self, password: &str) -> Result<()> {
        let encrypted = self.encrypt(password)?;
        write_private(&self.password_file, encrypted.as_bytes())?;
        info!("Password stored in {}", self.password_file.display());
        Ok(())
    }

    /// Stored password, or a prompted one that is then stored.
    pub fn password(&self, login: &str) -> Result<String> {
        if self.password_file.exists() {
            // Read and decrypt stored password
            let encrypted = fs::read_to_string(&self.password_file)?;
            return self.decrypt(&encrypted);
        }

        // Get new password and store it
        let password = rpassword::prompt_password(format!("Enter the password for {}: ", login))?;
        self.store(&password)?;
        Ok(password)
    }
}

fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("key"), dir.path().join("password"))
    }

    #[test]
    fn test_stored_password_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.store("s3cret").unwrap();
        assert!(dir.path().join("key").exists());
        assert_ne!(fs::read_to_string(dir.path().join("password")).unwrap(), "s3cret");
        assert_eq!(store.password("helpdesk").unwrap(), "s3cret");
    }

    #[test]
    fn test_decrypt_with_other_key_fails() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        let encrypted = store_in(&first).encrypt("s3cret").unwrap();
        assert!(store_in(&second).decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let short = BASE64.encode([0u8; 4]);
        assert!(store_in(&dir).decrypt(&short).is_err());
    }
}
