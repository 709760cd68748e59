//! Bridge from blocking record sequences to async streams.

use futures::Stream;
use tokio::sync::mpsc;
use tracing::trace;

/// Drives `records` on tokio's blocking pool and yields them as a stream.
///
/// At most `buffer` items (minimum one) wait in the channel. Dropping the
/// stream stops the blocking task at its next send.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn into_async_stream<I>(records: I, buffer: usize) -> impl Stream<Item = I::Item> + Send + 'static
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::task::spawn_blocking(move || {
        for item in records {
            if tx.blocking_send(item).is_err() {
                trace!("Async consumer dropped, stopping blocking driver");
                break;
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}
