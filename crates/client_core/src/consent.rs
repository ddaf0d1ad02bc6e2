//! Consent preferences: hydration, ambient opt-out detection, persistence and the signals
//! derived from them.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::domain::{ConsentPreferences, ConsentUpdate};
use storage::{SameSite, Storage, StoredCookie};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub const CONSENT_RECORD_KEY: &str = "fvai_consent_prefs_v1";
pub const DO_NOT_SELL_COOKIE: &str = "do_not_sell";
pub const US_PRIVACY_COOKIE: &str = "usprivacy";
const COOKIE_LIFETIME_DAYS: i64 = 365;

pub const HEADER_DO_NOT_SELL: &str = "X-Consent-Do-Not-Sell";
pub const HEADER_FUNCTIONAL: &str = "X-Consent-Functional";
pub const HEADER_ANALYTICS: &str = "X-Consent-Analytics";
pub const HEADER_MARKETING: &str = "X-Consent-Marketing";
pub const HEADER_GPC: &str = "Sec-GPC";

/// Local persistence used by the consent store.
#[async_trait]
pub trait ConsentStorage: Send + Sync {
    async fn load_record(&self, key: &str) -> Result<Option<String>>;
    async fn save_record(&self, key: &str, value: &str) -> Result<()>;
    async fn set_cookie(&self, cookie: &StoredCookie) -> Result<()>;
}

#[async_trait]
impl ConsentStorage for Storage {
    async fn load_record(&self, key: &str) -> Result<Option<String>> {
        Storage::load_record(self, key).await
    }

    async fn save_record(&self, key: &str, value: &str) -> Result<()> {
        Storage::save_record(self, key, value).await
    }

    async fn set_cookie(&self, cookie: &StoredCookie) -> Result<()> {
        Storage::set_cookie(self, cookie).await
    }
}

/// Platform-level opt-out declarations made outside the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmbientSignals {
    pub global_privacy_control: bool,
    pub do_not_track: bool,
}

impl AmbientSignals {
    pub fn opt_out_asserted(&self) -> bool {
        self.global_privacy_control || self.do_not_track
    }
}

/// Four-character compliance string for the opt-out-of-sale status.
pub fn compliance_string(do_not_sell: bool) -> &'static str {
    if do_not_sell {
        "1YNN"
    } else {
        "1---"
    }
}

/// The flag cookie and the compliance-string cookie mirroring the opt-out decision.
pub fn consent_cookies(do_not_sell: bool, now: DateTime<Utc>) -> [StoredCookie; 2] {
    let expires_at = now + Duration::days(COOKIE_LIFETIME_DAYS);
    let cookie = |name: &str, value: &str| StoredCookie {
        name: name.to_string(),
        value: value.to_string(),
        path: "/".to_string(),
        expires_at,
        secure: true,
        same_site: SameSite::Lax,
    };
    [
        cookie(DO_NOT_SELL_COOKIE, if do_not_sell { "1" } else { "0" }),
        cookie(US_PRIVACY_COOKIE, compliance_string(do_not_sell)),
    ]
}

/// Renders a cookie the way it would appear in a `Set-Cookie` header.
pub fn set_cookie_header(cookie: &StoredCookie) -> String {
    let mut header = format!(
        "{}={}; Path={}; Expires={}",
        cookie.name,
        cookie.value,
        cookie.path,
        cookie.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    if cookie.secure {
        header.push_str("; Secure");
    }
    header.push_str("; SameSite=");
    header.push_str(cookie.same_site.as_str());
    header
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Headers every outbound request carries. `Sec-GPC` is asserted when the user opted out
/// of sale or the platform declares global privacy control.
pub fn signal_headers(
    preferences: &ConsentPreferences,
    signals: AmbientSignals,
) -> [(&'static str, &'static str); 5] {
    [
        (HEADER_DO_NOT_SELL, flag(preferences.do_not_sell)),
        (HEADER_FUNCTIONAL, flag(preferences.functional)),
        (HEADER_ANALYTICS, flag(preferences.analytics)),
        (HEADER_MARKETING, flag(preferences.marketing)),
        (
            HEADER_GPC,
            flag(preferences.do_not_sell || signals.global_privacy_control),
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentSnapshot {
    pub preferences: ConsentPreferences,
    pub banner_visible: bool,
    pub privacy_center_open: bool,
}

impl Default for ConsentSnapshot {
    fn default() -> Self {
        Self {
            preferences: ConsentPreferences::default(),
            banner_visible: true,
            privacy_center_open: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConsentEvent {
    Changed(ConsentSnapshot),
}

/// How the store settled its initial preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOrigin {
    Stored,
    AmbientOptOut,
    AwaitingChoice,
}

pub struct ConsentPreferenceStore {
    storage: Arc<dyn ConsentStorage>,
    signals: AmbientSignals,
    current: RwLock<ConsentSnapshot>,
    write_lock: Mutex<()>,
    events: broadcast::Sender<ConsentEvent>,
}

impl ConsentPreferenceStore {
    pub fn new(storage: Arc<dyn ConsentStorage>, signals: AmbientSignals) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            storage,
            signals,
            current: RwLock::new(ConsentSnapshot::default()),
            write_lock: Mutex::new(()),
            events,
        })
    }

    /// Builds the store and runs first-start initialization.
    pub async fn load(storage: Arc<dyn ConsentStorage>, signals: AmbientSignals) -> Arc<Self> {
        let store = Self::new(storage, signals);
        store.initialize().await;
        store
    }

    pub fn signals(&self) -> AmbientSignals {
        self.signals
    }

    pub fn snapshot(&self) -> ConsentSnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn preferences(&self) -> ConsentPreferences {
        self.snapshot().preferences
    }

    pub fn is_banner_visible(&self) -> bool {
        self.snapshot().banner_visible
    }

    pub fn is_privacy_center_open(&self) -> bool {
        self.snapshot().privacy_center_open
    }

    pub fn signal_headers(&self) -> [(&'static str, &'static str); 5] {
        signal_headers(&self.preferences(), self.signals)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsentEvent> {
        self.events.subscribe()
    }

    pub async fn initialize(&self) -> ConsentOrigin {
        let _guard = self.write_lock.lock().await;

        let stored = match self.storage.load_record(CONSENT_RECORD_KEY).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!("consent: failed to read stored preferences: {err:#}");
                self.update(|current| current.banner_visible = true);
                return ConsentOrigin::AwaitingChoice;
            }
        };

        if let Some(raw) = stored {
            return match serde_json::from_str::<ConsentPreferences>(&raw) {
                Ok(mut preferences) => {
                    preferences.necessary = true;
                    let do_not_sell = preferences.do_not_sell;
                    self.update(|current| {
                        current.preferences = preferences;
                        current.banner_visible = false;
                    });
                    self.write_cookies(do_not_sell).await;
                    info!(do_not_sell, "consent: hydrated stored preferences");
                    ConsentOrigin::Stored
                }
                Err(err) => {
                    warn!("consent: stored preferences are unreadable: {err}");
                    self.update(|current| current.banner_visible = true);
                    ConsentOrigin::AwaitingChoice
                }
            };
        }

        if self.signals.opt_out_asserted() {
            info!(
                gpc = self.signals.global_privacy_control,
                dnt = self.signals.do_not_track,
                "consent: ambient opt-out detected, persisting minimal profile"
            );
            match self.persist_locked(ConsentPreferences::minimal()).await {
                Ok(_) => {
                    self.update(|current| current.banner_visible = false);
                    ConsentOrigin::AmbientOptOut
                }
                Err(err) => {
                    warn!("consent: failed to persist ambient opt-out: {err:#}");
                    self.update(|current| current.banner_visible = true);
                    ConsentOrigin::AwaitingChoice
                }
            }
        } else {
            self.update(|current| current.banner_visible = true);
            ConsentOrigin::AwaitingChoice
        }
    }

    pub async fn accept_all(&self) -> Result<ConsentPreferences> {
        self.commit(ConsentPreferences::accept_all(), false).await
    }

    pub async fn reject_non_essential(&self) -> Result<ConsentPreferences> {
        self.commit(ConsentPreferences::minimal(), false).await
    }

    /// Merges a partial update from the privacy center over the current preferences.
    pub async fn save_preferences(&self, update: ConsentUpdate) -> Result<ConsentPreferences> {
        let merged = update.apply_to(&self.preferences());
        self.commit(merged, true).await
    }

    pub fn open_privacy_center(&self) {
        self.update(|current| current.privacy_center_open = true);
    }

    pub fn close_privacy_center(&self) {
        self.update(|current| current.privacy_center_open = false);
    }

    async fn commit(
        &self,
        preferences: ConsentPreferences,
        close_privacy_center: bool,
    ) -> Result<ConsentPreferences> {
        let _guard = self.write_lock.lock().await;
        let result = self.persist_locked(preferences).await;
        self.update(|current| {
            current.banner_visible = false;
            if close_privacy_center {
                current.privacy_center_open = false;
            }
        });
        result
    }

    /// The single write path. Callers must hold `write_lock`.
    async fn persist_locked(&self, preferences: ConsentPreferences) -> Result<ConsentPreferences> {
        let enriched = ConsentPreferences {
            necessary: true,
            consent_given_at: Some(Utc::now()),
            ..preferences
        };
        self.update(|current| current.preferences = enriched.clone());

        let raw = serde_json::to_string(&enriched).context("failed to encode preferences")?;
        self.storage
            .save_record(CONSENT_RECORD_KEY, &raw)
            .await
            .context("failed to persist consent preferences")?;
        self.write_cookies(enriched.do_not_sell).await;

        info!(
            functional = enriched.functional,
            analytics = enriched.analytics,
            marketing = enriched.marketing,
            do_not_sell = enriched.do_not_sell,
            "consent: preferences persisted"
        );
        Ok(enriched)
    }

    async fn write_cookies(&self, do_not_sell: bool) {
        for cookie in consent_cookies(do_not_sell, Utc::now()) {
            match self.storage.set_cookie(&cookie).await {
                Ok(()) => debug!("consent: wrote cookie {}", set_cookie_header(&cookie)),
                Err(err) => warn!("consent: failed to write cookie {}: {err:#}", cookie.name),
            }
        }
    }

    fn update(&self, apply: impl FnOnce(&mut ConsentSnapshot)) {
        let snapshot = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            apply(&mut current);
            current.clone()
        };
        let _ = self.events.send(ConsentEvent::Changed(snapshot));
    }
}

#[cfg(test)]
#[path = "tests/consent_tests.rs"]
mod tests;
