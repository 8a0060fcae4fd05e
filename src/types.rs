use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identificador opaco de um evento (UUID v4 em texto).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Gera um id novo com 128 bits aleatórios.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status de um evento, sempre derivado da presença de `end_time`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Resolved,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.pad("active"),
            Self::Resolved => f.pad("resolved"),
        }
    }
}

/// Struct de evento de falta de energia (forma canônica persistida)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutageEvent {
    pub id: EventId,
    pub created_at: DateTime<Utc>,
    pub location: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damages: Option<String>,
}

impl OutageEvent {
    pub fn status(&self) -> EventStatus {
        match self.end_time {
            Some(_) => EventStatus::Resolved,
            None => EventStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == EventStatus::Active
    }

    /// Aplica um patch parcial. `id` e `created_at` nunca são tocados.
    pub fn apply(&mut self, patch: OutageEventPatch) {
        if let Some(location) = patch.location {
            self.location = location.trim().to_string();
        }
        if let Some(start_time) = patch.start_time {
            self.start_time = start_time;
        }
        if let Some(end_time) = patch.end_time {
            self.end_time = end_time;
        }
        if let Some(estimated_duration) = patch.estimated_duration {
            self.estimated_duration = normalize_text(estimated_duration);
        }
        if let Some(cause) = patch.cause {
            self.cause = normalize_text(cause);
        }
        if let Some(damages) = patch.damages {
            self.damages = normalize_text(damages);
        }
    }
}

/// Rascunho de evento enviado pelo formulário; id e data de registro
/// são atribuídos pelo store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewOutageEvent {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub damages: Option<String>,
}

impl NewOutageEvent {
    pub fn new(location: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            location: location.into(),
            start_time: Some(start_time),
            ..Self::default()
        }
    }

    pub fn end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn estimated_duration(mut self, estimated_duration: impl Into<String>) -> Self {
        self.estimated_duration = Some(estimated_duration.into());
        self
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn damages(mut self, damages: impl Into<String>) -> Self {
        self.damages = Some(damages.into());
        self
    }
}

/// Patch parcial de um evento.
///
/// Em qualquer campo, `None` mantém o valor atual. Nos opcionais,
/// `Some(None)` limpa o campo (ex.: `"endTime": null` reabre o evento).
/// Campos desconhecidos no JSON, inclusive `id` e `createdAt`, são ignorados.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutageEventPatch {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "present")]
    pub end_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub estimated_duration: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub cause: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub damages: Option<Option<String>>,
}

impl OutageEventPatch {
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn end_time(mut self, end_time: Option<DateTime<Utc>>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn estimated_duration(mut self, estimated_duration: Option<String>) -> Self {
        self.estimated_duration = Some(estimated_duration);
        self
    }

    pub fn cause(mut self, cause: Option<String>) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn damages(mut self, damages: Option<String>) -> Self {
        self.damages = Some(damages);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// Campo presente no JSON (mesmo `null`) vira `Some(..)`; ausente fica no default.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Texto livre em branco é tratado como ausente.
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
