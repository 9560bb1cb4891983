use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::SplitStream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// One live notification stream from the record store.
///
/// `Some(Ok(frame))` is a text frame, `Some(Err(_))` a transport failure,
/// `None` a clean close. Implementations deal with non-text frames
/// themselves; callers only ever see text.
#[async_trait]
pub trait ChangeFeed: Send {
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// Opens a [`ChangeFeed`] against a realtime endpoint. The live facade takes
/// this as a seam so tests can script the stream.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChangeFeed>>;
}

/// Websocket-backed connector; the default in production.
pub struct WsFeedConnector;

#[async_trait]
impl FeedConnector for WsFeedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChangeFeed>> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        let (_, reader) = ws_stream.split();
        Ok(Box::new(WsChangeFeed { reader }))
    }
}

struct WsChangeFeed {
    reader: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

#[async_trait]
impl ChangeFeed for WsChangeFeed {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.reader.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(err) => return Some(Err(anyhow!("websocket receive failed: {err}"))),
            }
        }
    }
}
