use std::time::Duration;

use tracing::{error, info};
use ureq::Agent;

use crate::error::NotifyError;
use crate::notify::Notifier;

/// Discord webhook transport. Each recipient is a webhook URL; the sender becomes the
/// webhook's display name.
#[derive(Debug, Clone)]
pub struct Discord {
    agent: Agent,
}

impl Discord {
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::new_with_config(Agent::config_builder().timeout_global(Some(timeout)).build());
        Self { agent }
    }

    /// Post a simple text message to the webhook URL.
    pub fn post(&self, hook_url: &str, content: &str, username: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({ "content": content, "username": username });
        match self.agent.post(hook_url).send_json(payload) {
            Ok(resp) => {
                info!(status = resp.status().as_u16(), "Posted message to Discord webhook");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to post to Discord webhook");
                Err(NotifyError::from_ureq(hook_url, e))
            }
        }
    }
}

impl Notifier for Discord {
    fn send(&self, message: &str, recipient: &str, sender: &str) -> Result<(), NotifyError> {
        self.post(recipient, message, sender)
    }
}
