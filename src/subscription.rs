use crate::error::{AvrError, Result};
use crate::protocol::NativeRequest;
use crate::state::AttributeDelta;
use tokio::sync::{broadcast, mpsc};

/// Receiver for attribute deltas destined for the host
pub struct DeltaReceiver {
    rx: broadcast::Receiver<AttributeDelta>,
}

impl DeltaReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<AttributeDelta>) -> Self {
        Self { rx }
    }

    /// Receive the next delta
    ///
    /// Fails with [`AvrError::ConnectionClosed`] once the controller is dropped.
    /// Lagging skips the missed deltas.
    pub async fn recv(&mut self) -> Result<AttributeDelta> {
        loop {
            match self.rx.recv().await {
                Ok(delta) => return Ok(delta),
                Err(broadcast::error::RecvError::Closed) => return Err(AvrError::ConnectionClosed),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Delta receiver lagged by {} messages", n);
                }
            }
        }
    }

    /// Try to receive a delta without blocking
    ///
    /// Returns `None` if no delta is available. Lagging skips the missed deltas.
    pub fn try_recv(&mut self) -> Result<Option<AttributeDelta>> {
        loop {
            match self.rx.try_recv() {
                Ok(delta) => return Ok(Some(delta)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(AvrError::ConnectionClosed)
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Delta receiver lagged by {} messages", n);
                }
            }
        }
    }
}

/// Stream of routed requests, consumed by the device transport
pub struct RequestStream {
    rx: mpsc::UnboundedReceiver<NativeRequest>,
}

impl RequestStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<NativeRequest>) -> Self {
        Self { rx }
    }

    /// Wait for the next request; `None` once the controller is dropped
    pub async fn recv(&mut self) -> Option<NativeRequest> {
        self.rx.recv().await
    }

    /// Take a request if one is queued
    pub fn try_recv(&mut self) -> Option<NativeRequest> {
        self.rx.try_recv().ok()
    }
}
