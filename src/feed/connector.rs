//! Feed transports
//!
//! A connector opens one feed session and yields its text payloads. The
//! stream ending means the session is over.

use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Payloads of one feed session
pub type FeedStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<FeedStream>;
}

/// WebSocket connection to `/api/v1/client/feed`
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self) -> Result<FeedStream> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Feed(format!("Cannot connect to {}: {}", self.url, e)))?;

        // Pings are answered by tungstenite while the stream is polled
        let payloads = socket.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(close)) => {
                    tracing::debug!(frame = ?close, "Feed close frame received");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(Error::Feed(e.to_string()))),
            }
        });

        Ok(payloads.boxed())
    }
}
