use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;

/// Something worth reporting to the fleet service.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// A game session started or ended.
    Session {
        game: String,
        result: SessionResult,
        at: DateTime<Utc>,
    },
    /// A transcript captured by the diary game.
    Transcript {
        text: String,
        session_id: Option<String>,
        at: DateTime<Utc>,
    },
    /// Reply to a remote PING.
    Pong { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResult {
    Started,
    Finished,
    Crashed,
}

impl SessionResult {
    /// Wire value expected by the telemetry table.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionResult::Started => "INICIO",
            SessionResult::Finished => "FIM",
            SessionResult::Crashed => "ERRO",
        }
    }
}

impl TelemetryEvent {
    pub fn session(game: &str, result: SessionResult) -> Self {
        TelemetryEvent::Session {
            game: game.to_string(),
            result,
            at: Utc::now(),
        }
    }

    pub fn transcript(text: &str, session_id: Option<String>) -> Self {
        TelemetryEvent::Transcript {
            text: text.to_string(),
            session_id,
            at: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        TelemetryEvent::Pong { at: Utc::now() }
    }
}

/// Fire-and-forget handle; the uploader task owns the receiving end.
#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl Telemetry {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record(&self, event: TelemetryEvent) {
        match &self.tx {
            Some(tx) => {
                // uploader gone means we are shutting down
                let _ = tx.send(event);
            }
            None => trace!(?event, "telemetry disabled"),
        }
    }
}
