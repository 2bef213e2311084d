use crate::protocol::{IntentKind, WorkerIntent};

use std::fmt;
use std::str::FromStr;

/// Line a subscriber sends once per topic right after connecting.
pub const SUBSCRIBE_COMMAND: &str = "SUBSCRIBE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Topic {
    #[value(name = "DEVOLUCION", alias = "return")]
    Return,
    #[value(name = "RENOVACION", alias = "renew")]
    Renew,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::Return, Topic::Renew];

    pub fn as_str(&self) -> &'static str {
        self.kind().as_str()
    }

    /// The intent kind carried by frames of this topic.
    pub fn kind(&self) -> IntentKind {
        match self {
            Topic::Return => IntentKind::Return,
            Topic::Renew => IntentKind::Renew,
        }
    }

    /// Deferred topic for `kind`; loans are never deferred.
    pub fn for_kind(kind: IntentKind) -> Option<Topic> {
        match kind {
            IntentKind::Loan => None,
            IntentKind::Return => Some(Topic::Return),
            IntentKind::Renew => Some(Topic::Renew),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEVOLUCION" => Ok(Topic::Return),
            "RENOVACION" => Ok(Topic::Renew),
            other => Err(FrameError::UnknownTopic(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has no topic separator")]
    MissingSeparator,
    #[error("unknown topic {0}")]
    UnknownTopic(String),
    #[error("undecodable intent: {0}")]
    Intent(String),
}

/// One published message: `"<TOPIC> <WorkerIntent JSON>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: Topic,
    pub intent: WorkerIntent,
}

impl Frame {
    pub fn new(topic: Topic, intent: WorkerIntent) -> Self {
        Self { topic, intent }
    }

    pub fn encode(&self) -> String {
        // WorkerIntent holds only strings and a unit enum.
        let body = serde_json::to_string(&self.intent).unwrap_or_default();
        format!("{} {}", self.topic, body)
    }

    pub fn decode(line: &str) -> Result<Self, FrameError> {
        let (topic, body) = line.split_once(' ').ok_or(FrameError::MissingSeparator)?;
        let topic: Topic = topic.parse()?;
        let intent = WorkerIntent::decode(body.as_bytes()).map_err(|e| FrameError::Intent(e.to_string()))?;

        Ok(Self { topic, intent })
    }
}
