use congreso_core::ProgressEvent;
use tokio::sync::mpsc;

/// Sending half of a scrape's progress stream.
///
/// Sends wait for channel capacity, so a slow consumer slows the scrape
/// instead of growing an unbounded buffer. A dropped receiver is not an
/// error: the scrape keeps going and events are discarded.
#[derive(Clone, Debug)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub async fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use congreso_core::Chamber;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (progress, mut rx) = ProgressSender::channel(4);
        progress.emit(ProgressEvent::list_loaded(Chamber::Senadores, 2)).await;
        progress.emit(ProgressEvent::list_loaded(Chamber::Diputados, 3)).await;
        drop(progress);

        assert_eq!(rx.recv().await, Some(ProgressEvent::SenatorsListLoaded { total: 2 }));
        assert_eq!(rx.recv().await, Some(ProgressEvent::DeputiesListLoaded { total: 3 }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn closed_receiver_is_ignored() {
        let (progress, rx) = ProgressSender::channel(1);
        drop(rx);
        progress.emit(ProgressEvent::list_loaded(Chamber::Senadores, 0)).await;
    }
}
