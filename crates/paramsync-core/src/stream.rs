// ── Reactive parameter streams ──
//
// Watch-backed views over the full record set, for consumers that prefer
// re-rendering from snapshots over handling individual changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::ParameterRecord;

type Records = Arc<Vec<Arc<ParameterRecord>>>;

/// A subscription to every parameter record.
///
/// Provides both point-in-time access and change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`.
pub struct ParameterStream {
    current: Records,
    receiver: watch::Receiver<Records>,
}

impl ParameterStream {
    pub(crate) fn new(mut receiver: watch::Receiver<Records>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Records as of creation or the last [`changed`](Self::changed).
    pub fn current(&self) -> &Records {
        &self.current
    }

    /// The latest records, which may be newer than [`current`](Self::current).
    pub fn latest(&self) -> Records {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publication. Returns `None` once the engine has
    /// been dropped.
    pub async fn changed(&mut self) -> Option<Records> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream`. The first item is the state at conversion
    /// time.
    pub fn into_stream(self) -> ParameterWatchStream {
        ParameterWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a fresh record set on every publication.
pub struct ParameterWatchStream {
    inner: WatchStream<Records>,
}

impl Stream for ParameterWatchStream {
    type Item = Records;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
