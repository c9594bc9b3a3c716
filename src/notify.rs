use std::sync::Arc;

use tracing::{info, warn};

use crate::error::NotifyError;
use crate::event::{NotificationEvent, ScoreUpdate};
use crate::game::Side;

/// Outbound message transport.
pub trait Notifier: Send + Sync {
    fn send(&self, message: &str, recipient: &str, sender: &str) -> Result<(), NotifyError>;
}

/// Outcome of delivering one message to one recipient.
#[derive(Debug)]
pub struct DeliveryResult {
    pub recipient: String,
    pub outcome: Result<(), NotifyError>,
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Fans a notification out to every recipient. Callers are responsible for dedup.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    sender: String,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, sender: impl Into<String>) -> Self {
        Self { notifier, sender: sender.into() }
    }

    /// Send `event` to each recipient. A failed recipient never stops delivery to the rest.
    pub fn dispatch(&self, event: &NotificationEvent, recipients: &[String]) -> Vec<DeliveryResult> {
        let message = format_message(event);
        let results: Vec<DeliveryResult> = recipients
            .iter()
            .map(|recipient| {
                let outcome = self.notifier.send(&message, recipient, &self.sender);
                if let Err(e) = &outcome {
                    warn!(game_id = %event.game_id(), recipient = %recipient, error = %e, "Delivery failed");
                }
                DeliveryResult { recipient: recipient.clone(), outcome }
            })
            .collect();
        let delivered = results.iter().filter(|r| r.is_delivered()).count();
        info!(
            game_id = %event.game_id(),
            kind = event.kind(),
            delivered,
            failed = results.len() - delivered,
            "Dispatched notification"
        );
        results
    }
}

/// Render the text message for an event.
pub fn format_message(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::PreGame(notice) => match notice.tracked {
            Side::Home => format!(
                "The {} play at home against the {}!  Game starts at {}.",
                notice.my_team, notice.opponent_full_name, notice.start_local
            ),
            Side::Away => format!(
                "The {} play the {} on the road at {}!  Game starts at {}.",
                notice.my_team, notice.opponent_full_name, notice.venue, notice.start_local
            ),
        },
        NotificationEvent::Score(update) => {
            let headline = if update.we_scored() { "score!!" } else { "score :(" };
            score_message(update, headline)
        }
        NotificationEvent::GameWinningScore(update) => {
            let headline = if update.we_scored() { "wins!!" } else { "wins :(" };
            score_message(update, headline)
        }
    }
}

fn score_message(update: &ScoreUpdate, headline: &str) -> String {
    format!(
        "{} {}\n\n{} {}, {} {} - {} {}\n\n{}",
        update.scorer(),
        headline,
        update.time_remaining,
        update.period,
        update.my_abbrev,
        update.my_score,
        update.opponent_abbrev,
        update.opponent_score,
        update.description
    )
}

/// Dry-run transport that only logs what would be sent.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: &str, recipient: &str, sender: &str) -> Result<(), NotifyError> {
        info!(recipient = %recipient, sender = %sender, message = %message, "Notification (dry run)");
        Ok(())
    }
}
