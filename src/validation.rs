use crate::error::StoreError;
use crate::types::{NewOutageEvent, OutageEvent};
use chrono::{DateTime, Utc};

/// Valida o rascunho e devolve o início da interrupção.
pub fn validate_draft(draft: &NewOutageEvent) -> Result<DateTime<Utc>, StoreError> {
    if draft.location.trim().is_empty() {
        return Err(StoreError::validation("a localização é obrigatória"));
    }
    let Some(start_time) = draft.start_time else {
        return Err(StoreError::validation("o início da interrupção é obrigatório"));
    };
    if let Some(end_time) = draft.end_time {
        if end_time < start_time {
            return Err(StoreError::validation("o fim não pode ser anterior ao início"));
        }
    }
    Ok(start_time)
}

/// Invariantes de um registro pronto para persistir.
pub fn validate_event(event: &OutageEvent) -> Result<(), StoreError> {
    if event.location.trim().is_empty() {
        return Err(StoreError::validation("a localização é obrigatória"));
    }
    if let Some(end_time) = event.end_time {
        if end_time < event.start_time {
            return Err(StoreError::validation("o fim não pode ser anterior ao início"));
        }
    }
    Ok(())
}
