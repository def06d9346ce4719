use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use secrecy::SecretString;
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{
    api::SlackApiClient,
    message::SlackMessage,
    socket::{ack_body, parse_frame, SocketFrame, SocketTransport, TransportError},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type FrameResult = Result<SocketFrame, TransportError>;

const FRAME_BUFFER: usize = 64;

/// Socket mode transport over a real WebSocket, opened through `apps.connections.open`.
pub struct WebSocketTransport {
    api: SlackApiClient,
    app_token: SecretString,
    sink: Arc<Mutex<Option<WsSink>>>,
    frames: Mutex<Option<mpsc::Receiver<FrameResult>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new(api: SlackApiClient, app_token: SecretString) -> Self {
        Self {
            api,
            app_token,
            sink: Arc::new(Mutex::new(None)),
            frames: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .api
            .open_connection(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        debug!("opened socket mode connection url");

        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (write, read) = stream.split();
        *self.sink.lock().await = Some(write);

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let reader = tokio::spawn(read_frames(read, self.sink.clone(), tx));
        *self.frames.lock().await = Some(rx);
        if let Some(previous) = self.reader.lock().await.replace(reader) {
            previous.abort();
        }

        info!("socket mode websocket established");
        Ok(())
    }

    async fn next_frame(&self) -> Result<Option<SocketFrame>, TransportError> {
        let mut frames = self.frames.lock().await;
        let Some(rx) = frames.as_mut() else {
            return Err(TransportError::Receive("websocket is not connected".to_owned()));
        };

        match rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }

    async fn acknowledge(
        &self,
        envelope_id: &str,
        payload: Option<&SlackMessage>,
    ) -> Result<(), TransportError> {
        let body = ack_body(envelope_id, payload)?;
        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(TransportError::Acknowledge("websocket is not connected".to_owned()));
        };

        sink.send(Message::Text(body.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.frames.lock().await.take();
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }

        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

async fn read_frames(
    mut read: SplitStream<WsStream>,
    sink: Arc<Mutex<Option<WsSink>>>,
    frames: mpsc::Sender<FrameResult>,
) {
    while let Some(message) = read.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => match parse_frame(text.as_str()) {
                Ok(Some(frame)) => Ok(frame),
                Ok(None) => continue,
                Err(error) => {
                    warn!(error = %error, "skipping undecodable socket mode frame");
                    continue;
                }
            },
            Ok(Message::Ping(data)) => {
                let mut guard = sink.lock().await;
                if let Some(sink) = guard.as_mut() {
                    if let Err(error) = sink.send(Message::Pong(data)).await {
                        warn!(error = %error, "failed to answer websocket ping");
                    }
                }
                continue;
            }
            Ok(Message::Close(close)) => {
                debug!(?close, "socket mode websocket closed by server");
                break;
            }
            Ok(_) => continue,
            Err(error) => Err(TransportError::Receive(error.to_string())),
        };

        let failed = frame.is_err();
        if frames.send(frame).await.is_err() || failed {
            break;
        }
    }
}
