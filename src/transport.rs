//! The BLE link as seen by the protocol core.
//!
//! Device discovery, connection and GATT subscription live behind this trait
//! so the dispatcher and uploader can be driven by the btleplug client
//! (`client::BleTransport`, feature `ble`) or by an in-memory fake in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::TransportError;

/// GATT operations the protocol core needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `bytes` to characteristic `id` and wait for the peripheral to
    /// acknowledge the write.
    async fn write_characteristic(&self, id: Uuid, bytes: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to notifications on characteristic `id`.
    ///
    /// Values arrive in transmission order; the stream ends when the link
    /// drops.
    async fn subscribe(&self, id: Uuid) -> Result<BoxStream<'static, Vec<u8>>, TransportError>;

    async fn is_connected(&self) -> bool;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn write_characteristic(&self, id: Uuid, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_characteristic(id, bytes).await
    }

    async fn subscribe(&self, id: Uuid) -> Result<BoxStream<'static, Vec<u8>>, TransportError> {
        (**self).subscribe(id).await
    }

    async fn is_connected(&self) -> bool {
        (**self).is_connected().await
    }
}
