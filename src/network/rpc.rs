use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::core::protocol::{Message, NodeAddress, Request, Response};
use crate::network::Transport;
use crate::utils::{P2PError, Result};

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Server side of the request/response surface. Errors returned here are
/// sent back to the caller as `Response::Error`.
#[async_trait::async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Result<Response>;
}

pub struct RpcServer;

impl RpcServer {
    /// Accept connections forever, serving each one on its own task.
    pub fn spawn(
        listener: TcpListener,
        handler: Arc<dyn RpcHandler>,
        max_message_size: usize,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("New connection from: {}", addr);
                        let handler = handler.clone();

                        tokio::spawn(async move {
                            if let Err(e) =
                                Self::handle_connection(stream, addr, handler, max_message_size)
                                    .await
                            {
                                warn!("Connection with {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }

    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<dyn RpcHandler>,
        max_message_size: usize,
    ) -> Result<()> {
        loop {
            let frame = match Transport::receive_data(&mut stream, max_message_size).await {
                Ok(frame) => frame,
                Err(P2PError::MessageTooLarge(len)) => {
                    let fault = P2PError::MessageTooLarge(len);
                    let reply = Message::with_id(Uuid::nil(), Response::error(&fault));
                    Transport::send_message(&mut stream, &reply).await?;
                    return Err(fault);
                }
                Err(e) => {
                    debug!("Connection closed by {}: {}", addr, e);
                    return Ok(());
                }
            };

            let message: Message<Request> = match serde_json::from_slice(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Malformed request from {}: {}", addr, e);
                    let fault = P2PError::ProtocolFault(format!("malformed request: {}", e));
                    let reply = Message::with_id(Uuid::nil(), Response::error(&fault));
                    Transport::send_message(&mut stream, &reply).await?;
                    continue;
                }
            };

            let operation = message.body.operation();
            debug!("{} from {} ({})", operation, addr, message.id);

            let response = match handler.handle(message.body).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("{} from {} failed: {}", operation, addr, e);
                    Response::error(&e)
                }
            };

            Transport::send_message(&mut stream, &Message::with_id(message.id, response)).await?;
        }
    }
}

/// Client side: one connection per call, bounded by `timeout` end to end.
#[derive(Debug, Clone)]
pub struct RpcClient {
    timeout: Duration,
    max_message_size: usize,
}

impl RpcClient {
    pub fn new(timeout: Duration, max_message_size: usize) -> Self {
        Self {
            timeout,
            max_message_size,
        }
    }

    pub async fn call(&self, addr: &NodeAddress, request: Request) -> Result<Response> {
        let operation = request.operation();
        let message = Message::new(request);

        let reply = tokio::time::timeout(self.timeout, self.exchange(addr, &message))
            .await
            .map_err(|_| {
                P2PError::Unreachable(format!(
                    "{} to {} timed out after {:?}",
                    operation, addr, self.timeout
                ))
            })??;

        if reply.id != message.id {
            // Frame-level rejections come back with a nil id.
            if reply.id.is_nil() {
                reply.body.into_result()?;
            }
            return Err(P2PError::ProtocolFault(format!(
                "{} to {}: response id {} does not match request {}",
                operation, addr, reply.id, message.id
            )));
        }

        reply.body.into_result()
    }

    async fn exchange(
        &self,
        addr: &NodeAddress,
        message: &Message<Request>,
    ) -> Result<Message<Response>> {
        let mut stream = Transport::connect(addr, self.timeout).await?;

        Transport::send_message(&mut stream, message)
            .await
            .map_err(|e| Self::classify(addr, e))?;
        Transport::receive_message(&mut stream, self.max_message_size)
            .await
            .map_err(|e| Self::classify(addr, e))
    }

    fn classify(addr: &NodeAddress, err: P2PError) -> P2PError {
        match err {
            P2PError::IoError(e) => P2PError::Unreachable(format!("{}: {}", addr, e)),
            P2PError::SerializationError(e) => {
                P2PError::ProtocolFault(format!("malformed response from {}: {}", addr, e))
            }
            P2PError::MessageTooLarge(len) => P2PError::ProtocolFault(format!(
                "response from {} too large: {} bytes",
                addr, len
            )),
            other => other,
        }
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), DEFAULT_MAX_MESSAGE_SIZE)
    }
}

/// Bind `host:port` and report the address peers should use. A port of 0
/// is resolved to the one the OS assigned.
pub async fn bind(host: &str, port: u16) -> Result<(TcpListener, NodeAddress)> {
    let listener = Transport::listen(host, port).await?;
    let local = listener.local_addr()?;
    let address = NodeAddress::new(host, local.port());
    info!("RPC endpoint ready at {}", address);
    Ok((listener, address))
}
