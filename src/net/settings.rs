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

use std::sync::Arc;

use serde::Deserialize;
use structopt::StructOpt;
use structopt_toml::StructOptToml;
use url::Url;

use super::contact::INIT_CONTACTS;

/// Atomic pointer to network settings.
pub type SettingsPtr = Arc<Settings>;

/// Default settings for the node. Can be manually configured.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Onion address of the local hidden service
    pub onion_id: String,
    /// TCP port the hidden service forwards inbound connections to
    pub listen_port: u16,
    /// Display name announced to peers
    pub nickname: String,
    /// Tor SOCKS5 proxy used for outbound connections
    pub socks_proxy: Url,
    /// Bootstrap peers to connect to on startup
    pub peers: Vec<Url>,
    /// Grow step of the contactlist
    pub init_contacts: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            onion_id: String::new(),
            listen_port: 0,
            nickname: "anonymous".to_string(),
            socks_proxy: Url::parse("socks5://127.0.0.1:9050").unwrap(),
            peers: Vec::new(),
            init_contacts: INIT_CONTACTS,
        }
    }
}

/// Defines the network settings.
#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[structopt()]
pub struct SettingsOpt {
    /// Onion address of the local hidden service
    #[structopt(long = "onion")]
    pub onion_id: Option<String>,

    /// TCP port the hidden service forwards to
    #[structopt(long = "lport")]
    pub listen_port: Option<u16>,

    /// Display name announced to peers
    #[structopt(short, long)]
    pub nickname: Option<String>,

    /// Tor SOCKS5 proxy used for outbound connections
    #[structopt(long)]
    pub socks_proxy: Option<Url>,

    /// Peer nodes to connect to (tor://<onion>:<port>)
    #[serde(default)]
    #[structopt(long)]
    pub peers: Vec<Url>,

    #[structopt(skip)]
    pub init_contacts: Option<usize>,
}

impl From<SettingsOpt> for Settings {
    fn from(opt: SettingsOpt) -> Self {
        let defaults = Settings::default();
        Self {
            onion_id: opt.onion_id.unwrap_or(defaults.onion_id),
            listen_port: opt.listen_port.unwrap_or(defaults.listen_port),
            nickname: opt.nickname.unwrap_or(defaults.nickname),
            socks_proxy: opt.socks_proxy.unwrap_or(defaults.socks_proxy),
            peers: opt.peers,
            init_contacts: opt.init_contacts.unwrap_or(defaults.init_contacts),
        }
    }
}
