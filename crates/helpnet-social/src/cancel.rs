//! Caller-initiated cancellation of long-running imports.

use std::future::Future;

use tokio::sync::watch;

use crate::{Error, Result};

/// Held by the caller; dropping it without calling [`cancel`](Self::cancel)
/// never cancels anything.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
  pub fn cancel(&self) { self.0.send_replace(true); }
}

/// Observed by the operation at each suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Option<watch::Receiver<bool>>);

/// A connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
  let (tx, rx) = watch::channel(false);
  (CancelHandle(tx), CancelSignal(Some(rx)))
}

impl CancelSignal {
  /// A signal that never fires.
  pub fn never() -> Self { Self(None) }

  pub fn is_cancelled(&self) -> bool { self.0.as_ref().is_some_and(|rx| *rx.borrow()) }

  /// Resolves once cancellation is requested; pends forever otherwise.
  pub async fn cancelled(&self) {
    if let Some(rx) = &self.0 {
      let mut rx = rx.clone();
      let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
      if fired {
        return;
      }
    }
    std::future::pending::<()>().await;
  }

  /// Run `fut` unless cancellation wins the race. Cancellation is checked
  /// first, so an already-cancelled signal never starts `fut`'s work.
  pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
    tokio::select! {
      biased;
      () = self.cancelled() => Err(Error::Cancelled),
      out = fut => Ok(out),
    }
  }
}
