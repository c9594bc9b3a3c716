use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{error, info, info_span};
use ureq::Agent;

use crate::error::NotifyError;
use crate::notify::Notifier;

pub const TWILIO_API_BASE_URL: &str = "https://api.twilio.com";

/// SMS transport over the Twilio REST API.
pub struct Twilio {
    messages_url: String,
    authorization: String,
    agent: Agent,
}

impl Twilio {
    pub fn new(account_sid: &str, auth_token: &str, timeout: Duration) -> Self {
        Self::with_base_url(TWILIO_API_BASE_URL, account_sid, auth_token, timeout)
    }

    pub fn with_base_url(base_url: &str, account_sid: &str, auth_token: &str, timeout: Duration) -> Self {
        let messages_url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            base_url.trim_end_matches('/'),
            account_sid
        );
        let credentials = STANDARD.encode(format!("{account_sid}:{auth_token}"));
        let agent = Agent::new_with_config(Agent::config_builder().timeout_global(Some(timeout)).build());
        Self { messages_url, authorization: format!("Basic {credentials}"), agent }
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }
}

impl std::fmt::Debug for Twilio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials stay out of logs.
        f.debug_struct("Twilio").field("messages_url", &self.messages_url).finish_non_exhaustive()
    }
}

impl Notifier for Twilio {
    fn send(&self, message: &str, recipient: &str, sender: &str) -> Result<(), NotifyError> {
        let result = {
            let _span = info_span!("twilio_send", to = %recipient).entered();
            self.agent
                .post(&self.messages_url)
                .header("Authorization", &self.authorization)
                .send_form([("To", recipient), ("From", sender), ("Body", message)])
        };
        match result {
            Ok(resp) => {
                info!(status = resp.status().as_u16(), to = %recipient, "Sent SMS");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, to = %recipient, "Failed to send SMS");
                Err(NotifyError::from_ureq(recipient, e))
            }
        }
    }
}
