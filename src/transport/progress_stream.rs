use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use crate::upload::{TaskId, TaskProgress};

/// Byte accounting for one streamed upload body. Samples are throttled to the
/// update interval; the final count is always reported.
pub struct ProgressTracker {
    task_id: TaskId,
    total_bytes: u64,
    bytes_sent: u64,
    last_update: Option<Instant>,
    update_interval: Duration,
    progress_tx: mpsc::UnboundedSender<TaskProgress>,
}

impl ProgressTracker {
    pub fn new(
        task_id: TaskId,
        total_bytes: u64,
        update_interval: Duration,
        progress_tx: mpsc::UnboundedSender<TaskProgress>,
    ) -> Self {
        Self {
            task_id,
            total_bytes,
            bytes_sent: 0,
            last_update: None,
            update_interval,
            progress_tx,
        }
    }

    fn record(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;

        let due = self
            .last_update
            .map(|at| at.elapsed() >= self.update_interval)
            .unwrap_or(true);
        if due || self.bytes_sent >= self.total_bytes {
            self.send();
        }
    }

    fn finish(&mut self) {
        self.send();
    }

    fn send(&mut self) {
        self.last_update = Some(Instant::now());
        let _ = self.progress_tx.send(TaskProgress {
            task_id: self.task_id,
            bytes_uploaded: self.bytes_sent,
            total_bytes: self.total_bytes,
        });
    }
}

pin_project! {
    /// Forwards the inner byte stream unchanged while counting what passed.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        tracker: ProgressTracker,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, tracker: ProgressTracker) -> Self {
        Self { inner, tracker }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    this.tracker.record(chunk.len());
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                this.tracker.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Pending => Poll::Pending,
        }
    }
}
