//! Digest-while-streaming wrapper for upload bodies.
//!
//! Each chunk handed to the store also goes through a [`Digester`]; when the
//! stream ends the hex digest is published on a [`DigestHandle`]. The manifest
//! can then record the checksum of exactly what was sent without reading the
//! file a second time.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::fs::checksum::Digester;

/// Receives the digest once the wrapped stream has been fully consumed.
#[derive(Debug, Clone, Default)]
pub struct DigestHandle {
    slot: Arc<Mutex<Option<StreamDigest>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDigest {
    pub checksum: String,
    pub bytes: u64,
}

impl DigestHandle {
    /// The digest, or `None` if the stream was not read to the end.
    pub fn get(&self) -> Option<StreamDigest> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn publish(&self, digest: StreamDigest) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(digest);
        }
    }
}

/// Stream wrapper that digests every chunk it yields
pub struct DigestStream<S> {
    inner: S,
    digester: Option<Box<dyn Digester>>,
    bytes_streamed: u64,
    handle: DigestHandle,
}

impl<S> DigestStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>>,
{
    pub fn new(inner: S, digester: Box<dyn Digester>) -> (Self, DigestHandle) {
        let handle = DigestHandle::default();
        let stream = Self {
            inner,
            digester: Some(digester),
            bytes_streamed: 0,
            handle: handle.clone(),
        };
        (stream, handle)
    }
}

impl<S> Stream for DigestStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = Pin::new(&mut self.inner);

        match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.bytes_streamed += bytes.len() as u64;
                if let Some(digester) = self.digester.as_mut() {
                    digester.update(&bytes);
                }
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => {
                // A failed read must not produce a digest
                self.digester = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(digester) = self.digester.take() {
                    let digest = StreamDigest {
                        checksum: digester.finalize_hex(),
                        bytes: self.bytes_streamed,
                    };
                    self.handle.publish(digest);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
