//! License keys: verification, local caching and display masking.
//!
//! The cached `isPro` flag may be stale. [`LicenseManager::status`]
//! re-verifies it on every check and keeps trusting it when the
//! verification endpoint cannot be reached.

use crate::store::{KvStore, KvStoreExt, StoreError, IS_PRO, LICENSE_KEY};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest run of asterisks shown by [`mask_key`].
const MAX_MASK_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum LicenseError {
    #[error("Please enter a license key")]
    EmptyKey,
    #[error("Invalid or expired key")]
    InvalidKey,
    #[error("Failed to verify license. Please check your connection. ({0})")]
    Network(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Anything that can decide whether a license key is valid.
///
/// `Ok(false)` means the key was rejected; `Err(LicenseError::Network)` means
/// no answer was obtained.
#[async_trait]
pub trait LicenseVerifier: Send + Sync {
    async fn verify(&self, key: &str) -> Result<bool, LicenseError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    license_key: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct VerifyResponse {
    valid: Option<bool>,
    success: Option<bool>,
    message: Option<String>,
}

/// Verifies keys against the remote `/verify` endpoint.
pub struct HttpVerifier {
    client: Client,
    endpoint: Url,
}

impl HttpVerifier {
    pub fn new(endpoint: Url) -> Result<Self, LicenseError> {
        let client = Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .map_err(|e| LicenseError::Network(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl LicenseVerifier for HttpVerifier {
    async fn verify(&self, key: &str) -> Result<bool, LicenseError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&VerifyRequest { license_key: key })
            .send()
            .await
            .map_err(|e| LicenseError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "verification endpoint rejected key");
            return Ok(false);
        }

        // A body cut short is an outage; a body that is not the expected JSON is a rejection.
        let text = response
            .text()
            .await
            .map_err(|e| LicenseError::Network(e.to_string()))?;
        let body: VerifyResponse = serde_json::from_str(&text).unwrap_or_default();
        let valid = body.valid == Some(true) || body.success == Some(true);
        debug!(valid, reason = body.message.as_deref().unwrap_or(""), "verification response");
        Ok(valid)
    }
}

/// Verifies keys against a fixed list, comparing normalized forms.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyVerifier {
    keys: Vec<String>,
}

impl StaticKeyVerifier {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys.into_iter().map(|k| normalize_key(k.as_ref())).collect(),
        }
    }
}

#[async_trait]
impl LicenseVerifier for StaticKeyVerifier {
    async fn verify(&self, key: &str) -> Result<bool, LicenseError> {
        let key = normalize_key(key);
        Ok(!key.is_empty() && self.keys.iter().any(|valid| *valid == key))
    }
}

/// Trim and uppercase a key so comparisons ignore case and padding.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

/// Whether a user-supplied key matches a known key.
pub fn keys_match(candidate: &str, known: &str) -> bool {
    let candidate = normalize_key(candidate);
    !candidate.is_empty() && candidate == normalize_key(known)
}

/// Mask a key for display, keeping the first and last four characters.
///
/// Keys of eight characters or fewer are returned unchanged.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return key.to_string();
    }
    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();
    let middle = "*".repeat((chars.len() - 8).min(MAX_MASK_LEN));
    format!("{start}{middle}{end}")
}

/// Outcome of a license check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseStatus {
    /// The endpoint confirmed the stored key just now.
    Verified,
    /// The endpoint was unreachable; the cached flag is trusted.
    CachedOffline,
    /// No key, no cached flag, or the key was rejected.
    Unlicensed,
}

impl LicenseStatus {
    pub fn is_pro(self) -> bool {
        !matches!(self, LicenseStatus::Unlicensed)
    }
}

/// License state kept in a [`KvStore`].
pub struct LicenseManager {
    store: Arc<dyn KvStore>,
    verifier: Arc<dyn LicenseVerifier>,
}

impl LicenseManager {
    pub fn new(store: Arc<dyn KvStore>, verifier: Arc<dyn LicenseVerifier>) -> Self {
        Self { store, verifier }
    }

    /// Verify a key and, if accepted, store it as the active license.
    pub async fn activate(&self, key: &str) -> Result<(), LicenseError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(LicenseError::EmptyKey);
        }

        if !self.verifier.verify(key).await? {
            info!(key = %mask_key(key), "license key rejected");
            return Err(LicenseError::InvalidKey);
        }

        self.store
            .set_many(&[(LICENSE_KEY, json!(key)), (IS_PRO, json!(true))])?;
        info!(key = %mask_key(key), "license activated");
        Ok(())
    }

    /// Forget the stored key and cached flag.
    pub fn deactivate(&self) -> Result<(), LicenseError> {
        self.store.remove(LICENSE_KEY)?;
        self.store.set(IS_PRO, json!(false))?;
        Ok(())
    }

    /// The active key masked for display, if a verified key is cached.
    pub fn current_masked(&self) -> Result<Option<String>, LicenseError> {
        let (key, is_pro) = self.cached()?;
        Ok(key.filter(|_| is_pro).map(|k| mask_key(&k)))
    }

    /// Re-verify the cached license.
    pub async fn status(&self) -> Result<LicenseStatus, LicenseError> {
        let (key, is_pro) = self.cached()?;
        let key = match key {
            Some(key) if is_pro => key,
            _ => return Ok(LicenseStatus::Unlicensed),
        };

        match self.verifier.verify(&key).await {
            Ok(true) => Ok(LicenseStatus::Verified),
            Ok(false) => {
                warn!(key = %mask_key(&key), "cached license no longer valid");
                self.store.set(IS_PRO, json!(false))?;
                Ok(LicenseStatus::Unlicensed)
            }
            Err(LicenseError::Network(reason)) => {
                warn!(%reason, "could not verify license online, using cached status");
                Ok(LicenseStatus::CachedOffline)
            }
            Err(other) => Err(other),
        }
    }

    fn cached(&self) -> Result<(Option<String>, bool), LicenseError> {
        let key = self
            .store
            .get_as::<String>(LICENSE_KEY)?
            .filter(|k| !k.trim().is_empty());
        let is_pro = self.store.get_as::<bool>(IS_PRO)?.unwrap_or(false);
        Ok((key, is_pro))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use parking_lot::Mutex;

    /// Verifier returning a scripted answer and counting calls.
    struct ScriptedVerifier {
        answer: Mutex<Option<bool>>,
        calls: Mutex<usize>,
    }

    impl ScriptedVerifier {
        fn new(answer: Option<bool>) -> Self {
            Self {
                answer: Mutex::new(answer),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl LicenseVerifier for ScriptedVerifier {
        async fn verify(&self, _key: &str) -> Result<bool, LicenseError> {
            *self.calls.lock() += 1;
            match *self.answer.lock() {
                Some(answer) => Ok(answer),
                None => Err(LicenseError::Network("offline".into())),
            }
        }
    }

    fn setup(answer: Option<bool>) -> (LicenseManager, Arc<MemoryStore>, Arc<ScriptedVerifier>) {
        let store = Arc::new(MemoryStore::new());
        let verifier = Arc::new(ScriptedVerifier::new(answer));
        (
            LicenseManager::new(store.clone(), verifier.clone()),
            store,
            verifier,
        )
    }

    #[test]
    fn mask_keeps_ends() {
        assert_eq!(mask_key("PRO-2024-XXXX-XXXX-XXXX"), "PRO-************XXXX");
        assert_eq!(mask_key("ABCDEFGHIJ"), "ABCD**GHIJ");
    }

    #[test]
    fn mask_leaves_short_keys() {
        assert_eq!(mask_key("ABCDEFGH"), "ABCDEFGH");
        assert_eq!(mask_key("abc"), "abc");
        assert_eq!(mask_key(""), "");
    }

    #[test]
    fn mask_preserves_first_and_last_four() {
        for key in ["ABCDEFGHI", "PRO-2024-XXXX-XXXX-XXXX", "ÅÄÖ-1234-ÅÄÖ-5678"] {
            let masked = mask_key(key);
            let chars: Vec<char> = key.chars().collect();
            let masked_chars: Vec<char> = masked.chars().collect();
            assert_eq!(masked_chars[..4], chars[..4]);
            assert_eq!(masked_chars[masked_chars.len() - 4..], chars[chars.len() - 4..]);
            assert!(masked_chars[4..masked_chars.len() - 4].iter().all(|c| *c == '*'));
        }
    }

    #[test]
    fn lowercase_key_matches_stored_key() {
        assert!(keys_match("pro-2024-xxxx-xxxx-xxxx", "PRO-2024-XXXX-XXXX-XXXX"));
        assert!(keys_match("  PRO-2024-XXXX-XXXX-XXXX\n", "PRO-2024-XXXX-XXXX-XXXX"));
        assert!(!keys_match("", ""));
        assert!(!keys_match("PRO-2024-YYYY", "PRO-2024-XXXX"));
    }

    #[tokio::test]
    async fn static_verifier_normalizes() {
        let verifier = StaticKeyVerifier::new(["PRO-2024-XXXX-XXXX-XXXX"]);
        assert!(verifier.verify("pro-2024-xxxx-xxxx-xxxx").await.unwrap());
        assert!(!verifier.verify("INVALID-KEY").await.unwrap());
        assert!(!verifier.verify("   ").await.unwrap());
    }

    #[tokio::test]
    async fn activate_stores_verified_key() {
        let (manager, store, _) = setup(Some(true));
        manager.activate("  PRO-2024-XXXX-XXXX-XXXX ").await.unwrap();

        assert_eq!(
            store.get_as::<String>(LICENSE_KEY).unwrap().as_deref(),
            Some("PRO-2024-XXXX-XXXX-XXXX")
        );
        assert_eq!(store.get_as::<bool>(IS_PRO).unwrap(), Some(true));
        assert_eq!(
            manager.current_masked().unwrap().as_deref(),
            Some("PRO-************XXXX")
        );
    }

    #[tokio::test]
    async fn activate_rejects_empty_and_invalid() {
        let (manager, store, verifier) = setup(Some(false));
        assert!(matches!(manager.activate("  ").await, Err(LicenseError::EmptyKey)));
        assert_eq!(*verifier.calls.lock(), 0);

        assert!(matches!(
            manager.activate("BAD-KEY").await,
            Err(LicenseError::InvalidKey)
        ));
        assert_eq!(store.get(LICENSE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn activate_reports_network_failure() {
        let (manager, store, _) = setup(None);
        assert!(matches!(
            manager.activate("PRO-KEY-1234").await,
            Err(LicenseError::Network(_))
        ));
        assert_eq!(store.get(IS_PRO).unwrap(), None);
    }

    #[tokio::test]
    async fn status_without_key_skips_verification() {
        let (manager, store, verifier) = setup(Some(true));
        assert_eq!(manager.status().await.unwrap(), LicenseStatus::Unlicensed);

        // A flag without a key is not a license.
        store.set(IS_PRO, json!(true)).unwrap();
        assert_eq!(manager.status().await.unwrap(), LicenseStatus::Unlicensed);
        assert_eq!(*verifier.calls.lock(), 0);
    }

    #[tokio::test]
    async fn status_reverifies_cached_key() {
        let (manager, store, verifier) = setup(Some(true));
        store
            .set_many(&[(LICENSE_KEY, json!("PRO-KEY-1234")), (IS_PRO, json!(true))])
            .unwrap();

        assert_eq!(manager.status().await.unwrap(), LicenseStatus::Verified);
        assert_eq!(*verifier.calls.lock(), 1);
    }

    #[tokio::test]
    async fn rejected_key_clears_cached_flag() {
        let (manager, store, _) = setup(Some(false));
        store
            .set_many(&[(LICENSE_KEY, json!("PRO-KEY-1234")), (IS_PRO, json!(true))])
            .unwrap();

        assert_eq!(manager.status().await.unwrap(), LicenseStatus::Unlicensed);
        assert_eq!(store.get_as::<bool>(IS_PRO).unwrap(), Some(false));
        assert_eq!(manager.current_masked().unwrap(), None);
    }

    #[tokio::test]
    async fn offline_check_trusts_cached_flag() {
        let (manager, store, _) = setup(None);
        store
            .set_many(&[(LICENSE_KEY, json!("PRO-KEY-1234")), (IS_PRO, json!(true))])
            .unwrap();

        assert_eq!(manager.status().await.unwrap(), LicenseStatus::CachedOffline);
        assert_eq!(store.get_as::<bool>(IS_PRO).unwrap(), Some(true));
    }

    #[tokio::test]
    async fn deactivate_forgets_key() {
        let (manager, store, _) = setup(Some(true));
        manager.activate("PRO-KEY-1234").await.unwrap();
        manager.deactivate().unwrap();

        assert_eq!(store.get(LICENSE_KEY).unwrap(), None);
        assert_eq!(manager.status().await.unwrap(), LicenseStatus::Unlicensed);
    }
}
