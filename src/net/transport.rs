/* This file is part of DChat
 *
 * Copyright (C) 2026 The DChat developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use async_trait::async_trait;
use fast_socks5::client::{Config, Socks5Stream};
use futures::{AsyncRead, AsyncWrite};
use log::debug;
use tokio_util::compat::TokioAsyncReadCompatExt;
use url::Url;

use crate::{Error, Result};

/// A dialed transport stream. Boxed so that the contactlist does not care
/// which transport produced a connection.
pub trait PtStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PtStream for T {}

/// Seam to the onion-routing transport. The core only ever asks for an
/// outbound connection to `<onion_id>:<lport>`; listening happens on a
/// plain local socket that the hidden service forwards to.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, onion_id: &str, lport: u16) -> Result<Box<dyn PtStream>>;
}

/// Dials through the Tor SOCKS5 proxy service.
pub struct TorDialer {
    socks_url: Url,
}

impl TorDialer {
    /// Create a new Tor dialer, e.g. with `socks5://127.0.0.1:9050`.
    pub fn new(socks_url: Url) -> Self {
        Self { socks_url }
    }
}

#[async_trait]
impl Dialer for TorDialer {
    async fn dial(&self, onion_id: &str, lport: u16) -> Result<Box<dyn PtStream>> {
        debug!(target: "net::transport", "dialing {}:{} via {}", onion_id, lport, self.socks_url);

        let socks_addr = self
            .socks_url
            .socket_addrs(|| None)
            .map_err(|e| Error::TransportError(e.to_string()))?[0]
            .to_string();

        let config = Config::default();

        let result = if !self.socks_url.username().is_empty() &&
            self.socks_url.password().is_some()
        {
            Socks5Stream::connect_with_password(
                socks_addr,
                onion_id.to_string(),
                lport,
                self.socks_url.username().to_string(),
                self.socks_url.password().unwrap().to_string(),
                config,
            )
            .await
        } else {
            Socks5Stream::connect(socks_addr, onion_id.to_string(), lport, config).await
        };

        let stream = result.map_err(|e| Error::TransportError(e.to_string()))?;
        Ok(Box::new(stream.compat()))
    }
}
