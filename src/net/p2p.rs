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

use async_executor::Executor;
use futures::io::ReadHalf;
use log::{debug, error, info, warn};
use smol::{lock::Mutex, net::TcpListener};

use super::{
    contact::{Contact, ContactList},
    link::{Link, LinkPtr},
    message::{read_pdu, ContentType, Pdu},
    settings::{Settings, SettingsPtr},
    transport::{Dialer, PtStream},
};
use crate::{
    util::ui::print_dchat_msg,
    Error, Result,
};

/// Atomic pointer to the p2p node.
pub type P2pPtr = Arc<P2p>;

/// The local chat node: the self-descriptor, the contactlist, and the
/// seams to the transport. All contactlist mutations are serialized
/// behind one mutex, so the table only ever changes between I/O
/// suspension points.
pub struct P2p {
    /// Our own identity, never part of the contactlist
    pub(crate) me: Contact,
    pub(crate) contacts: Mutex<ContactList>,
    pub(crate) dialer: Arc<dyn Dialer>,
    settings: SettingsPtr,
    executor: Arc<Executor<'static>>,
}

impl P2p {
    pub fn new(
        settings: Settings,
        dialer: Arc<dyn Dialer>,
        executor: Arc<Executor<'static>>,
    ) -> P2pPtr {
        let me = Contact::with_identity(&settings.onion_id, settings.listen_port, &settings.nickname);
        let contacts = Mutex::new(ContactList::new(settings.init_contacts));

        Arc::new(Self { me, contacts, dialer, settings: Arc::new(settings), executor })
    }

    pub fn me(&self) -> &Contact {
        &self.me
    }

    pub fn settings(&self) -> SettingsPtr {
        self.settings.clone()
    }

    /// Snapshot of the occupied contact slots.
    pub async fn list_contacts(&self) -> Vec<Contact> {
        self.contacts.lock().await.iter().filter(|c| !c.is_empty()).cloned().collect()
    }

    /// Binds the local listening socket, spawns the accept loop and
    /// connects to the configured bootstrap peers.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        debug!(target: "net::p2p", "P2p::start() [BEGIN]");

        let listener = TcpListener::bind(("127.0.0.1", self.settings.listen_port)).await?;
        info!(target: "net::p2p", "Listening on 127.0.0.1:{}", self.settings.listen_port);

        self.executor.spawn(self.clone().accept_loop(listener)).detach();

        let peers = self.settings.peers.clone();
        for peer in peers {
            let (onion_id, lport) = match (peer.host_str(), peer.port()) {
                (Some(host), Some(port)) => (host.to_string(), port),
                _ => {
                    warn!(target: "net::p2p", "Skipping malformed peer url {}", peer);
                    continue
                }
            };

            if let Err(e) = self.clone().handle_local_conn_request(&onion_id, lport).await {
                warn!(target: "net::p2p", "Connection to peer {} failed: {}", peer, e);
            }
        }

        debug!(target: "net::p2p", "P2p::start() [END]");
        Ok(())
    }

    /// Closes every open connection and empties the contactlist.
    pub async fn stop(&self) {
        debug!(target: "net::p2p", "P2p::stop()");
        let mut contacts = self.contacts.lock().await;

        loop {
            let n = match contacts.iter().position(|c| !c.is_empty()) {
                Some(n) => n,
                None => break,
            };
            let _ = contacts.del_contact(n);
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(target: "net::p2p", "Failed accepting new connection: {}", e);
                    continue
                }
            };

            debug!(target: "net::p2p", "Accepted new connection from {}", peer_addr);

            if let Err(e) = self.clone().handle_remote_conn_request(Box::new(stream)).await {
                error!(target: "net::p2p", "Could not add remote contact: {}", e);
            }
        }
    }

    /// Handles an outbound connection request: dials the remote peer,
    /// stores it as an established contact and sends it our contactlist.
    /// Returns the slot index where the contact has been added.
    pub async fn handle_local_conn_request(
        self: Arc<Self>,
        onion_id: &str,
        lport: u16,
    ) -> Result<usize> {
        let stream = self.dialer.dial(onion_id, lport).await?;
        let (link, reader) = Link::new(stream);

        let n = {
            let mut contacts = self.contacts.lock().await;
            let n = contacts.add_contact(link.clone());

            // The dialed identity is known up front
            if let Some(contact) = contacts.get_mut(n) {
                contact.onion_id = onion_id.to_string();
                contact.lport = lport;
            }
            n
        };

        if let Err(e) = self.send_contacts(n).await {
            warn!(target: "net::p2p", "Sending of contactlist failed: {}", e);
            self.drop_link(&link).await;
            return Err(e)
        }

        self.clone().spawn_read_loop(link, reader);
        Ok(n)
    }

    /// Handles a connection request from a remote peer: stores the
    /// accepted socket as a temporary contact and sends it our
    /// contactlist. The slot stays temporary until the peer identifies
    /// itself with a discover PDU.
    pub async fn handle_remote_conn_request(
        self: Arc<Self>,
        stream: Box<dyn PtStream>,
    ) -> Result<usize> {
        let (link, reader) = Link::new(stream);

        let n = {
            let mut contacts = self.contacts.lock().await;
            let n = contacts.add_contact(link.clone());
            if let Some(contact) = contacts.get_mut(n) {
                contact.accepted = true;
            }
            n
        };

        info!(target: "net::p2p", "Remote host ({}) connected", n);

        if let Err(e) = self.send_contacts(n).await {
            warn!(target: "net::p2p", "Sending of contactlist failed: {}", e);
            self.drop_link(&link).await;
            return Err(e)
        }

        self.clone().spawn_read_loop(link, reader);
        Ok(n)
    }

    fn spawn_read_loop(self: Arc<Self>, link: LinkPtr, reader: ReadHalf<Box<dyn PtStream>>) {
        self.executor.clone().spawn(self.read_loop(link, reader)).detach();
    }

    /// Per-connection reader. Decodes PDUs off the link until the peer
    /// disconnects, the frame is rejected, or the link's slot is deleted.
    async fn read_loop(self: Arc<Self>, link: LinkPtr, mut reader: ReadHalf<Box<dyn PtStream>>) {
        loop {
            let stop_fut = async {
                link.wait_stop().await;
                Err(Error::ChannelStopped)
            };

            let pdu = match smol::future::or(read_pdu(&mut reader), stop_fut).await {
                Ok(pdu) => pdu,
                Err(Error::ChannelStopped) => break,
                Err(e) => {
                    if Self::is_eof_error(&e) {
                        info!(target: "net::p2p", "Contact disconnected");
                    } else {
                        error!(target: "net::p2p", "Read error on link: {}", e);
                    }
                    self.drop_link(&link).await;
                    break
                }
            };

            if let Err(e) = self.clone().handle_receive_pdu(&link, pdu).await {
                error!(target: "net::p2p", "Dropping contact: {}", e);
                self.drop_link(&link).await;
                break
            }
        }
    }

    /// Deletes the contact slot owning `link`, if it is still in the
    /// table, and closes the link either way.
    async fn drop_link(&self, link: &LinkPtr) {
        let mut contacts = self.contacts.lock().await;

        match contacts.index_of_link(link) {
            Some(n) => {
                if let Err(e) = contacts.del_contact(n) {
                    error!(target: "net::p2p", "del_contact() failed: {}", e);
                }
            }
            None => link.close(),
        }
    }

    /// Dispatches one inbound PDU: pins the sender identity on its slot,
    /// then acts on the content type.
    async fn handle_receive_pdu(self: Arc<Self>, link: &LinkPtr, pdu: Pdu) -> Result<()> {
        {
            let mut contacts = self.contacts.lock().await;
            let n = match contacts.index_of_link(link) {
                Some(n) => n,
                None => return Err(Error::ChannelStopped),
            };

            let contact = match contacts.get_mut(n) {
                Some(c) => c,
                None => return Err(Error::IndexOutOfBounds(n)),
            };

            // The first PDU of a newly connected peer has to be a
            // discover carrying its onion address and listening port
            if (contact.onion_id.is_empty() || contact.lport == 0) &&
                pdu.content_type != ContentType::ControlDiscover
            {
                error!(target: "net::p2p", "Contact '{}' omitted identification", n);
                return Err(Error::MalformedFrame("identification required"))
            }

            if !contact.name.is_empty() && contact.name != pdu.nickname {
                info!(
                    target: "net::p2p",
                    "'{}' changed nickname to '{}'", contact.name, pdu.nickname,
                );
            }

            if !contact.onion_id.is_empty() && contact.onion_id != pdu.onion_id {
                error!(target: "net::p2p", "'{}' changed Onion-ID", contact.name);
                return Err(Error::MalformedFrame("onion id changed"))
            }

            if contact.lport != 0 && contact.lport != pdu.lport {
                error!(target: "net::p2p", "'{}' changed listening port", contact.name);
                return Err(Error::MalformedFrame("listening port changed"))
            }

            contact.name = pdu.nickname.clone();
            contact.onion_id = pdu.onion_id.clone();
            contact.lport = pdu.lport;
        }

        match pdu.content_type {
            ContentType::TextPlain => {
                print_dchat_msg(&pdu.nickname, &pdu.content);
            }

            ContentType::ControlDiscover => {
                // Racing dials leave two connections to the same peer.
                // Resolve them now, before ingesting the peer list.
                {
                    let mut contacts = self.contacts.lock().await;
                    if let Some(n) = contacts.index_of_link(link) {
                        if let Some(dup) = contacts.check_duplicates(&self.me, n)? {
                            info!(target: "net::p2p", "Detected duplicate contact, removing it");
                            contacts.del_contact(dup)?;
                        }
                    }
                }

                let discovered = self.clone().receive_contacts(&pdu).await;
                if discovered.failed != 0 {
                    warn!(
                        target: "net::p2p",
                        "Could not add all contacts from the received contactlist",
                    );
                }
            }

            other => {
                warn!(target: "net::p2p", "Unhandled content type '{}'", other.name());
            }
        }

        Ok(())
    }

    /// Sends a text message to every established contact.
    pub async fn broadcast(&self, message: &str) -> Result<()> {
        let mut pdu =
            Pdu::new(ContentType::TextPlain, &self.me.onion_id, self.me.lport, &self.me.name)?;
        pdu.content = message.to_string();

        let links: Vec<LinkPtr> = {
            let contacts = self.contacts.lock().await;
            contacts
                .iter()
                .filter(|c| c.is_established())
                .filter_map(|c| c.link.clone())
                .collect()
        };

        for link in links {
            if let Err(e) = link.send(&pdu).await {
                warn!(target: "net::p2p", "Broadcast to contact failed: {}", e);
                self.drop_link(&link).await;
            }
        }

        Ok(())
    }

    fn is_eof_error(err: &Error) -> bool {
        match err {
            Error::Io(ioerr) => ioerr == &std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
