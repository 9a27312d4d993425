//! [`Subscription`]: a cancellable live stream of committed document states.
//!
//! Backends hand out one subscription per listener. Every committed change is
//! pushed in commit order; dropping (or [`Subscription::cancel`]ling) the
//! subscription unregisters it immediately.

use std::{
  pin::Pin,
  task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

pub struct Subscription<T> {
  rx:        mpsc::UnboundedReceiver<T>,
  on_cancel: Option<CancelFn>,
}

impl<T> Subscription<T> {
  /// Wrap a receiver. `on_cancel` runs exactly once, when the subscription is
  /// cancelled or dropped, and should unregister the sending half.
  pub fn new(
    rx: mpsc::UnboundedReceiver<T>,
    on_cancel: impl FnOnce() + Send + Sync + 'static,
  ) -> Self {
    Self { rx, on_cancel: Some(Box::new(on_cancel)) }
  }

  /// Wait for the next state. Returns `None` once the backend has gone away.
  pub async fn recv(&mut self) -> Option<T> { self.rx.recv().await }

  /// Take an already-delivered state without waiting.
  pub fn try_recv(&mut self) -> Option<T> { self.rx.try_recv().ok() }

  /// Stop delivery and release the registration.
  pub fn cancel(self) { drop(self) }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    if let Some(on_cancel) = self.on_cancel.take() {
      self.rx.close();
      on_cancel();
    }
  }
}

impl<T> Stream for Subscription<T> {
  type Item = T;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    self.get_mut().rx.poll_recv(cx)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  };

  use super::*;

  #[tokio::test]
  async fn delivers_in_order_and_cancels_on_drop() {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    let mut sub = Subscription::new(rx, move || flag.store(true, Ordering::SeqCst));

    tx.send(1).unwrap();
    tx.send(2).unwrap();
    assert_eq!(sub.recv().await, Some(1));
    assert_eq!(sub.try_recv(), Some(2));
    assert_eq!(sub.try_recv(), None);

    sub.cancel();
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(tx.send(3).is_err());
  }
}
