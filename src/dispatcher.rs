//! Dispatch controller
//!
//! Owns the recipient list, the persisted send state and the pacing loop.
//! Each trigger processes at most one pending recipient; the busy flag
//! drops overlapping triggers instead of queueing them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::provider::WhatsifyClient;
use crate::state::SendState;
use crate::Result;

/// Result of one trigger. `Busy` means the trigger was dropped because a
/// previous one is still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Busy,
    Drained,
    Sent(String),
    Invalid { number: String, reason: String },
    Failed { number: String, error: String },
}

pub struct Dispatcher {
    client: WhatsifyClient,
    state: Mutex<SendState>,
    numbers_file: PathBuf,
    media_file: PathBuf,
    caption: String,
    validate_before_send: bool,
    min_delay_secs: u64,
    max_delay_secs: u64,
    busy: AtomicBool,
}

/// Clears the busy flag on every exit path of a trigger.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Dispatcher {
    pub fn new(client: WhatsifyClient, state: SendState, config: &Config) -> Self {
        Self {
            client,
            state: Mutex::new(state),
            numbers_file: config.numbers_file.clone(),
            media_file: config.media_file.clone(),
            caption: config.caption.clone(),
            validate_before_send: config.validate_before_send,
            min_delay_secs: config.min_delay_secs,
            max_delay_secs: config.max_delay_secs,
            busy: AtomicBool::new(false),
        }
    }

    /// Build the dispatcher from configuration: construct the gateway
    /// client and replay the logs.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = WhatsifyClient::new(
            &config.base_url,
            &config.api_secret,
            &config.account_id,
            config.timeout_secs,
        )?;
        let state = SendState::load(&config.sent_log, &config.failed_log)?;
        Ok(Self::new(client, state, config))
    }

    /// Startup checks: the media file must exist (fatal for the caller);
    /// the account status call is logged but never gates sending.
    pub async fn preflight(&self) -> Result<()> {
        if !self.media_file.exists() {
            return Err(crate::Error::MediaFileMissing(
                self.media_file.display().to_string(),
            ));
        }

        match self.client.account_status().await {
            Ok(_) => info!("Account connected and active"),
            Err(e) => warn!(error = %e, "Account status check failed"),
        }

        Ok(())
    }

    /// Lock the send state. A panic while the lock was held leaves the
    /// sets intact (the log line is appended before the insert), so a
    /// poisoned lock is recovered rather than propagated.
    fn state(&self) -> std::sync::MutexGuard<'_, SendState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Process at most one pending recipient.
    pub async fn trigger(&self) -> Result<TriggerOutcome> {
        if self.busy.swap(true, Ordering::SeqCst) {
            info!("Already processing, dropping trigger");
            return Ok(TriggerOutcome::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        let (number, remaining, sent, excluded) = {
            let state = self.state();
            let pending = state.pending(&self.numbers_file)?;
            match pending.first() {
                None => {
                    info!("All numbers processed, nothing left to send");
                    return Ok(TriggerOutcome::Drained);
                }
                Some(number) => (
                    number.clone(),
                    pending.len(),
                    state.sent_count(),
                    state.excluded_count(),
                ),
            }
        };

        info!(
            number = %number,
            sent,
            excluded,
            remaining,
            "Processing next recipient"
        );

        if self.validate_before_send {
            match self.client.validate_number(&number).await {
                Err(e) => {
                    // The check itself failed; excluded all the same, see DESIGN.md.
                    let reason = format!("validation failed: {}", e);
                    warn!(number = %number, reason = %reason, "Recipient marked invalid");
                    self.state().record_invalid(&number, &reason)?;
                    return Ok(TriggerOutcome::Invalid { number, reason });
                }
                Ok(false) => {
                    let reason = "not on whatsapp".to_string();
                    warn!(number = %number, "Recipient not on the network");
                    self.state().record_invalid(&number, &reason)?;
                    return Ok(TriggerOutcome::Invalid { number, reason });
                }
                Ok(true) => {}
            }
        }

        info!(number = %number, "Sending media message");
        match self.client.send_media(&number, &self.media_file, &self.caption).await {
            Ok(_) => {
                info!(number = %number, "SUCCESS");
                self.state().record_success(&number)?;
                Ok(TriggerOutcome::Sent(number))
            }
            Err(e) => {
                let error = e.to_string();
                error!(number = %number, error = %error, "Send failed");
                self.state().record_failure(&number, &error)?;
                Ok(TriggerOutcome::Failed { number, error })
            }
        }
    }

    /// Draw the next inter-send delay, uniform over the configured bounds.
    pub fn next_delay(&self) -> Duration {
        let secs = rand::thread_rng().gen_range(self.min_delay_secs..=self.max_delay_secs);
        Duration::from_secs(secs)
    }

    /// Pacing loop: one immediate attempt, then the random delay gates every
    /// following attempt. Runs until the future is dropped.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.trigger().await {
                error!(error = %e, "Trigger aborted");
            }

            let delay = self.next_delay();
            info!(seconds = delay.as_secs(), "Next message scheduled");
            sleep(delay).await;
        }
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent_count()
    }

    pub fn excluded_count(&self) -> usize {
        self.state().excluded_count()
    }
}
