//! Connection handle.

use crate::client::Client;
use crate::config::ClientOptions;
use crate::converter::Converter;
use crate::cursor::Cursor;
use crate::error::{MonkError, MonkResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A client plus the converter its cursors use.
///
/// Clones share the same client and closed flag.
#[derive(Debug, Clone)]
pub struct Connection {
    client: Arc<Client>,
    converter: Arc<Converter>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Connect over HTTP with the standard converter.
    pub fn connect(options: ClientOptions) -> MonkResult<Self> {
        Ok(Self::new(Arc::new(Client::new(options)?)))
    }

    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            converter: Arc::new(Converter::standard()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the converter used by cursors created afterwards.
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    pub fn cursor(&self) -> MonkResult<Cursor> {
        self.ensure_open()?;
        Ok(Cursor::new(self.clone()))
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn converter(&self) -> &Arc<Converter> {
        &self.converter
    }

    /// Close the connection and its client. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.client.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.client.is_closed()
    }

    pub(crate) fn ensure_open(&self) -> MonkResult<()> {
        if self.is_closed() {
            return Err(MonkError::programming("Connection has been closed"));
        }
        Ok(())
    }
}
