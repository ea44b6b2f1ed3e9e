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

/// Contacts are the peer records of the node. Implements the ordered
/// slotted contactlist with its grow/shrink policy, the onion address and
/// port validators, the textual contact representation, and the duplicate
/// resolution rule that collapses the two connections formed when two
/// nodes dial each other simultaneously.
pub mod contact;

/// One open connection to a peer. Holds the writing half of the transport
/// stream and the stop signalling towards the per-connection reader task.
pub mod link;

/// Defines how DChat protocol data units are framed on the wire and
/// implements the codec: header encoding and decoding, content extraction
/// and the async read/write of whole PDUs.
pub mod message;

/// The p2p node itself. Owns the contactlist, accepts inbound
/// connections, dials outbound ones and dispatches received PDUs.
pub mod p2p;

/// The contact exchange protocol: sending our contactlist to a peer and
/// ingesting a received peer list, connecting to every member we do not
/// know yet.
pub mod protocol;

/// Node configuration settings.
pub mod settings;

/// Transport seam: the boxed stream trait and the Tor SOCKS5 dialer.
pub mod transport;


pub use contact::{Contact, ContactList, ContactMatch};
pub use link::{Link, LinkPtr};
pub use message::{ContentType, Pdu};
pub use p2p::{P2p, P2pPtr};
pub use protocol::Discovered;
pub use settings::{Settings, SettingsOpt, SettingsPtr};
pub use transport::{Dialer, PtStream, TorDialer};
