use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::core::protocol::NodeAddress;
use crate::utils::{P2PError, Result};

/// Length-prefixed framing: a big-endian `u32` length followed by the
/// payload.
pub struct Transport;

impl Transport {
    pub async fn connect(addr: &NodeAddress, connect_timeout: Duration) -> Result<TcpStream> {
        let target = addr.to_string();
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| P2PError::Unreachable(format!("Connection to {} timed out", target)))?
            .map_err(|e| P2PError::Unreachable(format!("Failed to connect to {}: {}", target, e)))?;

        stream.set_nodelay(true)?;
        debug!("Connected to {}", target);
        Ok(stream)
    }

    pub async fn listen(host: &str, port: u16) -> Result<TcpListener> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    pub async fn send_data<W>(stream: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let len = u32::try_from(data.len()).map_err(|_| P2PError::MessageTooLarge(data.len()))?;
        stream.write_u32(len).await?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    pub async fn receive_data<R>(stream: &mut R, max_size: usize) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let len = stream.read_u32().await? as usize;

        if len > max_size {
            return Err(P2PError::MessageTooLarge(len));
        }

        let mut buffer = vec![0u8; len];
        stream.read_exact(&mut buffer).await?;

        Ok(buffer)
    }

    pub async fn send_message<W, T>(stream: &mut W, message: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let serialized = serde_json::to_vec(message)?;
        Self::send_data(stream, &serialized).await
    }

    pub async fn receive_message<R, T>(stream: &mut R, max_size: usize) -> Result<T>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let buffer = Self::receive_data(stream, max_size).await?;
        Ok(serde_json::from_slice(&buffer)?)
    }
}
