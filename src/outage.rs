//! outage.rs — Visões derivadas da coleção: duração calculada, ranking,
//! resumo por localização, prejuízos. Nada aqui altera o store; são
//! funções puras sobre um snapshot.

use crate::types::{EventId, EventStatus, OutageEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Duração em horas inteiras, arredondada para cima, mínimo de 1.
/// Evento ainda ativo conta até `now`.
pub fn duration_hours(event: &OutageEvent, now: DateTime<Utc>) -> i64 {
    let end = event.end_time.unwrap_or(now);
    let millis = (end - event.start_time).num_milliseconds();
    let hours = (millis as f64 / MILLIS_PER_HOUR).ceil() as i64;
    if hours > 0 { hours } else { 1 }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RankedEvent {
    #[serde(flatten)]
    pub event: OutageEvent,
    pub status: EventStatus,
    pub duration_hours: i64,
}

/// Eventos ordenados pela duração calculada, do mais longo ao mais curto.
/// Empates mantêm a ordem de inserção.
pub fn rank_by_duration(events: &[OutageEvent], now: DateTime<Utc>) -> Vec<RankedEvent> {
    let mut ranked: Vec<RankedEvent> = events
        .iter()
        .map(|event| RankedEvent {
            event: event.clone(),
            status: event.status(),
            duration_hours: duration_hours(event, now),
        })
        .collect();
    ranked.sort_by(|a, b| b.duration_hours.cmp(&a.duration_hours));
    ranked
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DurationSummary {
    pub count: usize,
    pub total_hours: i64,
    pub average_hours: i64,
}

pub fn summarize_durations(ranked: &[RankedEvent]) -> DurationSummary {
    let total_hours: i64 = ranked.iter().map(|r| r.duration_hours).sum();
    let average_hours = if ranked.is_empty() {
        0
    } else {
        (total_hours as f64 / ranked.len() as f64).round() as i64
    };
    DurationSummary {
        count: ranked.len(),
        total_hours,
        average_hours,
    }
}

/// Localização afetada e quantos eventos ela tem.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub location: String,
    pub count: usize,
    pub first_event: EventId,
}

/// Localizações únicas, na ordem em que aparecem pela primeira vez.
pub fn summarize_locations(events: &[OutageEvent]) -> Vec<LocationSummary> {
    let mut summaries: Vec<LocationSummary> = Vec::new();
    for event in events {
        match summaries.iter_mut().find(|s| s.location == event.location) {
            Some(summary) => summary.count += 1,
            None => summaries.push(LocationSummary {
                location: event.location.clone(),
                count: 1,
                first_event: event.id.clone(),
            }),
        }
    }
    summaries
}

pub fn at_location<'a>(events: &'a [OutageEvent], location: &str) -> Vec<&'a OutageEvent> {
    events.iter().filter(|e| e.location == location).collect()
}

/// Eventos com prejuízo descrito.
pub fn with_damages(events: &[OutageEvent]) -> Vec<&OutageEvent> {
    events
        .iter()
        .filter(|e| e.damages.as_deref().is_some_and(|d| !d.trim().is_empty()))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Overview {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
}

pub fn overview(events: &[OutageEvent]) -> Overview {
    let active = events.iter().filter(|e| e.is_active()).count();
    Overview {
        total: events.len(),
        active,
        resolved: events.len() - active,
    }
}
