use crate::types::{EventId, OutageEvent};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Snapshot imutável da coleção, compartilhado entre consumidores.
pub type Snapshot = Arc<[OutageEvent]>;

/// O que mudou na coleção.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Loaded,
    Added(EventId),
    Updated(EventId),
    Deleted(EventId),
    Cleared,
}

/// Notificação entregue aos assinantes, sempre após a gravação confirmada.
#[derive(Debug, Clone)]
pub struct StoreNotification {
    pub change: StoreChange,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<StoreNotification>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sem assinantes não é erro: a notificação simplesmente não tem destino.
    pub fn publish(&self, notification: StoreNotification) {
        let change = notification.change.clone();
        match self.sender.send(notification) {
            Ok(count) => debug!("Mudança {:?} entregue a {} assinantes.", change, count),
            Err(_) => debug!("Mudança {:?} sem assinantes.", change),
        }
    }
}

/// Resultado de uma espera por notificação.
#[derive(Debug)]
pub enum Received {
    Notification(StoreNotification),
    /// O assinante ficou para trás e perdeu `n` notificações; a próxima
    /// chamada devolve as mais recentes.
    Lagged(u64),
    Closed,
}

/// Inscrição de um consumidor. Descartar (ou chamar `unsubscribe`) cancela.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<StoreNotification>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Received {
        match self.receiver.recv().await {
            Ok(notification) => Received::Notification(notification),
            Err(broadcast::error::RecvError::Lagged(n)) => Received::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => Received::Closed,
        }
    }

    /// Versão não bloqueante; `None` quando não há nada pendente.
    pub fn try_recv(&mut self) -> Option<Received> {
        match self.receiver.try_recv() {
            Ok(notification) => Some(Received::Notification(notification)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Received::Lagged(n)),
            Err(broadcast::error::TryRecvError::Closed) => Some(Received::Closed),
            Err(broadcast::error::TryRecvError::Empty) => None,
        }
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(change: StoreChange) -> StoreNotification {
        StoreNotification {
            change,
            snapshot: Arc::from(Vec::new()),
        }
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let bus = ChangeBus::new(8);
        let mut sub = bus.subscribe();
        bus.publish(notification(StoreChange::Loaded));
        bus.publish(notification(StoreChange::Cleared));

        match sub.recv().await {
            Received::Notification(n) => assert_eq!(n.change, StoreChange::Loaded),
            other => panic!("unexpected {other:?}"),
        }
        match sub.recv().await {
            Received::Notification(n) => assert_eq!(n.change, StoreChange::Cleared),
            other => panic!("unexpected {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn unsubscribe_drops_receiver() {
        let bus = ChangeBus::new(8);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(notification(StoreChange::Loaded));
    }

    #[test]
    fn slow_subscriber_sees_lag() {
        let bus = ChangeBus::new(2);
        let mut sub = bus.subscribe();
        for _ in 0..3 {
            bus.publish(notification(StoreChange::Cleared));
        }
        assert!(matches!(sub.try_recv(), Some(Received::Lagged(1))));
        assert!(matches!(sub.try_recv(), Some(Received::Notification(_))));
    }
}
