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

use log::{error, warn};

use super::{
    contact::{contact_to_string, string_to_contact, Contact, ContactMatch},
    message::{ContentType, Pdu},
    p2p::P2p,
};
use crate::{Error, Result};

/// Outcome of ingesting a discover payload. `failed != 0` marks a partial
/// result: some lines could not be parsed or some peers not be reached.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Discovered {
    /// Peers that were unknown and have been connected to
    pub new: usize,
    /// Peers that were already in the contactlist, ourselves included
    pub known: usize,
    /// Lines that failed to parse or peers that failed to connect
    pub failed: usize,
}

impl P2p {
    /// Sends our contactlist to the contact at slot `n` as a discover
    /// PDU. The recipient itself and temporary slots are left out of the
    /// payload; a contact that fails to serialize is skipped. Returns the
    /// amount of bytes written.
    ///
    /// The payload is assembled under the table lock, so it reflects the
    /// contactlist as of the call; peers added while the PDU is in flight
    /// are not included.
    pub async fn send_contacts(&self, n: usize) -> Result<usize> {
        let (link, payload) = {
            let contacts = self.contacts.lock().await;

            let recipient = match contacts.get(n) {
                Some(c) => c,
                None => return Err(Error::IndexOutOfBounds(n)),
            };

            let link = match recipient.link.clone() {
                Some(link) => link,
                None => return Err(Error::ChannelStopped),
            };

            let mut payload = String::new();
            for (i, contact) in contacts.iter().enumerate() {
                if i == n || !contact.is_established() {
                    continue
                }

                match contact_to_string(contact) {
                    Ok(line) => payload.push_str(&line),
                    Err(_) => {
                        warn!(
                            target: "net::protocol",
                            "Conversion of contact '{}' to string failed, skipped", contact.name,
                        );
                    }
                }
            }

            (link, payload)
        };

        let mut pdu = Pdu::new(
            ContentType::ControlDiscover,
            &self.me.onion_id,
            self.me.lport,
            &self.me.name,
        )?;
        pdu.content = payload;

        link.send(&pdu).await
    }

    /// Ingests the contact lines of a received discover PDU. Every peer
    /// we do not know yet is connected to, added to the contactlist and
    /// sent our own contactlist in turn. Each line is fully processed,
    /// including the dial, before the next one is looked at.
    ///
    /// Malformed lines and failed dials are logged and skipped; they
    /// surface in the returned counters but never abort the iteration.
    pub async fn receive_contacts(self: Arc<Self>, pdu: &Pdu) -> Discovered {
        let mut discovered = Discovered::default();
        let mut line_end = 0;

        while line_end < pdu.content_length() {
            let line_begin = line_end;

            let (end, line) = match pdu.get_content_part(line_begin, b'\n') {
                Ok(part) => part,
                Err(e) => {
                    error!(
                        target: "net::protocol",
                        "Extraction of contact line from received PDU failed: {}", e,
                    );
                    discovered.failed += 1;
                    break
                }
            };
            line_end = end + 1;

            let (onion_id, lport) = match string_to_contact(line) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(
                        target: "net::protocol",
                        "Conversion of string to contact failed, skipped: {}", e,
                    );
                    discovered.failed += 1;
                    continue
                }
            };

            let probe = Contact::with_identity(&onion_id, lport, "");
            let known = {
                let contacts = self.contacts.lock().await;
                contacts.find_contact(&self.me, &probe, 0) != ContactMatch::NotFound
            };

            if known {
                discovered.known += 1;
                continue
            }

            discovered.new += 1;

            if let Err(e) = self.clone().handle_local_conn_request(&onion_id, lport).await {
                warn!(target: "net::protocol", "Connection to new contact failed: {}", e);
                discovered.failed += 1;
            }
        }

        discovered
    }
}
