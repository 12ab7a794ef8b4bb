//! Pass-through from generated fragments to response body chunks.
//!
//! Each fragment is forwarded as soon as it arrives and in the order it
//! arrived. The relay never buffers and never polls its source ahead of the
//! consumer, so when the client goes away and the body is dropped, the
//! provider stream is dropped with it and no further deltas are read.

use crate::generator::FragmentStream;
use crate::types::{INTERRUPTED_MARKER, StreamFragment};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Body stream for one generation response.
    pub struct ResponseRelay {
        #[pin]
        source: FragmentStream,
        request_id: String,
        chunks: usize,
        bytes: usize,
        finished: bool,
    }

    impl PinnedDrop for ResponseRelay {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if !*this.finished {
                tracing::info!(
                    request_id = %this.request_id,
                    chunks = *this.chunks,
                    bytes = *this.bytes,
                    "client disconnected, generation stream released"
                );
            }
        }
    }
}

impl ResponseRelay {
    pub fn new(source: FragmentStream, request_id: impl Into<String>) -> Self {
        Self {
            source,
            request_id: request_id.into(),
            chunks: 0,
            bytes: 0,
            finished: false,
        }
    }
}

impl Stream for ResponseRelay {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }
        match this.source.poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                *this.finished = true;
                tracing::info!(
                    request_id = %this.request_id,
                    chunks = *this.chunks,
                    bytes = *this.bytes,
                    "generation relayed"
                );
                Poll::Ready(None)
            }
            Poll::Ready(Some(fragment)) => {
                // Nothing is relayed after an interruption notice.
                if fragment.is_terminal() {
                    *this.finished = true;
                    tracing::warn!(request_id = %this.request_id, "generation interrupted mid-stream");
                }
                let chunk = fragment.into_bytes();
                *this.chunks += 1;
                *this.bytes += chunk.len();
                Poll::Ready(Some(Ok(chunk)))
            }
        }
    }
}

/// Text of a fragment, for consumers that handle the stream themselves.
pub fn fragment_text(fragment: &StreamFragment) -> std::borrow::Cow<'_, str> {
    match fragment {
        StreamFragment::Text(t) => std::borrow::Cow::Borrowed(t.as_str()),
        StreamFragment::Interrupted(reason) => {
            std::borrow::Cow::Owned(format!("\n{}{}", INTERRUPTED_MARKER, reason))
        }
    }
}
