//! Client: wires a channel, a session and an address space together

use crate::address_space::AddressSpace;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::{ConnectionStatus, Session};
use ijt_net_types::{Channel, ChannelError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A client for one remote server behind the bridge.
#[derive(Clone, Debug)]
pub struct Client {
    session: Arc<Session>,
    address_space: Arc<AddressSpace>,
}

impl Client {
    /// Create a new ClientBuilder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.address_space
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.session.status()
    }

    /// Connect and wait for the bridge to confirm.
    pub async fn connect(&self) -> Result<()> {
        self.session.connect()?;
        self.session.wait_connected().await
    }

    /// Close the remote connection and forget every cached node.
    pub async fn close(&self) -> Result<()> {
        self.session.close()?;
        self.address_space.reset().await;
        Ok(())
    }
}

/// Builder for Client.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    channel: Option<Arc<dyn Channel>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_call_timeout(timeout);
        self
    }

    /// The channel to the bridge (e.g. a `WsChannel`).
    pub fn channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Build the client. Must be called within a tokio runtime.
    pub fn build(self) -> Result<Client> {
        let channel = self
            .channel
            .ok_or_else(|| ClientError::Transport(ChannelError::Connect("no channel configured".to_string())))?;
        tracing::debug!(endpoint = %self.config.endpoint, "Building client");
        let session = Session::new(channel, self.config);
        let address_space = AddressSpace::new(session.clone());
        Ok(Client { session, address_space })
    }
}
