mod lifecycle;
mod upload;

use crate::types::Event;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

/// Receive events until one matches the predicate
pub(super) async fn next_matching(
    rx: &mut Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    loop {
        let event = rx.recv().await.unwrap();
        if pred(&event) {
            return event;
        }
    }
}

/// Poll a condition until it holds or a generous deadline passes
pub(super) async fn eventually(mut check: impl AsyncFnMut() -> bool) {
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
