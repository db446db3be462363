//! Notifications du moteur, diffusées sur un canal broadcast.

use tokio::sync::broadcast;

use crate::generators::StrategyKind;

pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RoundSaved { index: usize },
    HistoryUpdated { len: usize },
    GeneratorUpdated { method: StrategyKind, predictions: Vec<u8> },
    PatternCacheCleared { entries: usize },
}

impl EngineEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            EngineEvent::RoundSaved { .. } => "round-saved",
            EngineEvent::HistoryUpdated { .. } => "history-updated",
            EngineEvent::GeneratorUpdated { .. } => "generator-updated",
            EngineEvent::PatternCacheCleared { .. } => "pattern-cache-cleared",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Sans abonné, l'événement est perdu.
    pub fn publish(&self, event: EngineEvent) {
        log::trace!("Événement {}", event.topic());
        let _ = self.tx.send(event);
    }
}
