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

use std::{cmp::Ordering, sync::Arc};

use log::error;

use super::link::LinkPtr;
use crate::{Error, Result};

/// Grow step and shrink threshold of the contactlist.
pub const INIT_CONTACTS: usize = 4;

/// Length of a textual onion address: 16 base32 characters plus `.onion`.
pub const ONION_ADDRLEN: usize = 22;

/// Maximum byte length of a nickname.
pub const MAX_NICKNAME: usize = 31;

/// Validate a given .onion address. Checks that the length and the
/// base32 alphabet are ok, and does not do any deeper check.
pub fn is_valid_onion(onion_id: &str) -> bool {
    if onion_id.len() != ONION_ADDRLEN {
        return false
    }

    let onion = match onion_id.strip_suffix(".onion") {
        Some(s) => s,
        None => return false,
    };

    onion.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7'))
}

/// Validate a TCP listening port. Port 0 never listens.
pub fn is_valid_port(port: u16) -> bool {
    port != 0
}

/// A single peer record in the contactlist.
///
/// A slot with no link is empty and all other fields are zeroed. A slot
/// with a link but `lport == 0` is temporary: the connection exists but no
/// discover PDU has been received yet, so the peer's listening port is
/// unknown. A slot with both is established.
#[derive(Default, Clone)]
pub struct Contact {
    /// Onion address of the remote peer
    pub onion_id: String,
    /// TCP listening port announced by the remote peer
    pub lport: u16,
    /// Display name announced by the remote peer
    pub name: String,
    /// Open connection to the remote peer, `None` marks an empty slot
    pub link: Option<LinkPtr>,
    /// Whether this slot was created from an inbound accept
    pub accepted: bool,
}

impl Contact {
    /// Create a detached contact carrying only an identity. Used for the
    /// self-descriptor and for lookup probes.
    pub fn with_identity(onion_id: &str, lport: u16, name: &str) -> Self {
        Self {
            onion_id: onion_id.to_string(),
            lport,
            name: name.to_string(),
            link: None,
            accepted: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.link.is_none()
    }

    pub fn is_temporary(&self) -> bool {
        self.link.is_some() && self.lport == 0
    }

    pub fn is_established(&self) -> bool {
        self.link.is_some() && self.lport != 0
    }

    /// Two contacts are the same peer iff their (onion_id, lport) pairs
    /// match. Equivalent to comparing the `<onion_id> <port>` renderings,
    /// without the intermediate allocation.
    pub fn same_identity(&self, other: &Contact) -> bool {
        self.onion_id == other.onion_id && self.lport == other.lport
    }
}

/// Converts a contact into its wire representation `<onion_id> <port>\n`.
pub fn contact_to_string(contact: &Contact) -> Result<String> {
    if !is_valid_onion(&contact.onion_id) {
        return Err(Error::InvalidContact)
    }

    if !is_valid_port(contact.lport) {
        return Err(Error::InvalidContact)
    }

    Ok(format!("{} {}\n", contact.onion_id, contact.lport))
}

/// Parses a `<onion_id> <port>` contact line into an identity pair.
/// The trailing newline is optional; anything after it is ignored.
pub fn string_to_contact(line: &str) -> Result<(String, u16)> {
    let line = match line.split_once('\n') {
        Some((l, _)) => l,
        None => line,
    };

    let (onion_id, port) = match line.split_once(' ') {
        Some((o, p)) => (o, p),
        None => return Err(Error::MalformedContactLine("missing listening port")),
    };

    if onion_id.is_empty() {
        return Err(Error::MalformedContactLine("missing onion address"))
    }

    if port.is_empty() {
        return Err(Error::MalformedContactLine("missing listening port"))
    }

    if !is_valid_onion(onion_id) {
        return Err(Error::MalformedContactLine("invalid onion address"))
    }

    // u16 parsing rejects out-of-range values and trailing garbage
    let lport = match port.parse::<u16>() {
        Ok(p) => p,
        Err(_) => return Err(Error::MalformedContactLine("invalid listening port")),
    };

    if !is_valid_port(lport) {
        return Err(Error::MalformedContactLine("invalid listening port"))
    }

    Ok((onion_id.to_string(), lport))
}

/// Result of a contactlist lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactMatch {
    /// The probe matches our own self-descriptor
    Own,
    /// The probe matches the slot at this index
    Index(usize),
    NotFound,
}

/// Ordered slotted array of peers with a grow/shrink policy.
///
/// The slot count grows by the grow step whenever an insertion finds the
/// table full, and shrinks by the same step once enough deletions have
/// accumulated. Slot indices are stable only until the next operation that
/// may resize the table.
pub struct ContactList {
    contacts: Vec<Contact>,
    grow_step: usize,
    used: usize,
}

impl ContactList {
    /// Create an empty contactlist with the given grow step.
    pub fn new(grow_step: usize) -> Self {
        assert!(grow_step >= 1);
        let contacts = (0..grow_step).map(|_| Contact::default()).collect();
        Self { contacts, grow_step, used: 0 }
    }

    /// Current slot count of the table.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Number of occupied slots.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn get(&self, n: usize) -> Option<&Contact> {
        self.contacts.get(n)
    }

    pub fn get_mut(&mut self, n: usize) -> Option<&mut Contact> {
        self.contacts.get_mut(n)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Contact> {
        self.contacts.iter()
    }

    /// Adds a new contact for an open connection and returns the slot
    /// index where it has been stored. The new slot is temporary until a
    /// discover PDU fills in the peer's identity.
    pub fn add_contact(&mut self, link: LinkPtr) -> usize {
        if self.used == self.contacts.len() {
            let newsize = self.contacts.len() + self.grow_step;
            // Growing never violates the resize preconditions
            self.resize(newsize).expect("grow target below live count");
        }

        let n = self
            .contacts
            .iter()
            .position(|c| c.is_empty())
            .expect("no empty slot in a grown table");

        self.contacts[n].link = Some(link);
        self.used += 1;
        n
    }

    /// Deletes the contact at slot `n`, closing its connection. Deleting
    /// an empty slot is a no-op. Once the occupied count has dropped a
    /// full grow step below the slot count, the table is shrunk and the
    /// surviving slots are compacted to the front.
    pub fn del_contact(&mut self, n: usize) -> Result<()> {
        if n >= self.contacts.len() {
            error!(target: "net::contact", "del_contact() index out of bounds '{}'", n);
            return Err(Error::IndexOutOfBounds(n))
        }

        let link = match self.contacts[n].link.take() {
            Some(link) => link,
            None => return Ok(()),
        };

        link.close();
        self.contacts[n] = Contact::default();
        self.used -= 1;

        if self.used == self.contacts.len() - self.grow_step && self.used != 0 {
            let newsize = self.contacts.len() - self.grow_step;
            self.resize(newsize)?;
        }

        Ok(())
    }

    /// Resizes the table, compacting the occupied slots to the prefix in
    /// their original relative order. Live connections are moved, never
    /// closed.
    pub fn resize(&mut self, newsize: usize) -> Result<()> {
        if newsize < 1 || newsize < self.used {
            return Err(Error::InvalidSize(newsize))
        }

        let mut new_contacts: Vec<Contact> = (0..newsize).map(|_| Contact::default()).collect();

        let mut j = 0;
        for contact in self.contacts.iter_mut() {
            if !contact.is_empty() {
                new_contacts[j] = std::mem::take(contact);
                j += 1;
            }
        }

        self.contacts = new_contacts;
        Ok(())
    }

    /// Searches for a peer with the same identity as `probe`, starting at
    /// slot `begin`. The self-descriptor `me` is checked first; temporary
    /// and empty slots are skipped. A `begin` outside the table yields
    /// `NotFound`.
    pub fn find_contact(&self, me: &Contact, probe: &Contact, begin: usize) -> ContactMatch {
        if begin >= self.contacts.len() {
            return ContactMatch::NotFound
        }

        if me.lport != 0 && me.same_identity(probe) {
            return ContactMatch::Own
        }

        for (i, contact) in self.contacts.iter().enumerate().skip(begin) {
            if contact.lport == 0 {
                continue
            }

            if contact.same_identity(probe) {
                return ContactMatch::Index(i)
            }
        }

        ContactMatch::NotFound
    }

    /// Checks the contactlist for a duplicate of the contact at slot `n`
    /// and picks which of the two slots must be deleted so that both ends
    /// of a simultaneous dial converge on the same surviving connection.
    ///
    /// The peer with the greater identity drops the connection it
    /// initiated; the peer with the lesser identity drops the one it
    /// accepted. Identities are ordered by onion address bytes, then by
    /// listening port. If the contact turns out to be ourselves, slot `n`
    /// itself is the one to delete.
    pub fn check_duplicates(&self, me: &Contact, n: usize) -> Result<Option<usize>> {
        let probe = match self.get(n) {
            Some(c) => c,
            None => return Err(Error::IndexOutOfBounds(n)),
        };

        let fst = match self.find_contact(me, probe, 0) {
            // A peer advertised our own address, drop it
            ContactMatch::Own => return Ok(Some(n)),
            ContactMatch::NotFound => return Ok(None),
            ContactMatch::Index(i) => i,
        };

        let sec = match self.find_contact(me, probe, fst + 1) {
            ContactMatch::Index(i) => i,
            _ => return Ok(None),
        };

        let (accept_slot, connect_slot) =
            if self.contacts[fst].accepted { (fst, sec) } else { (sec, fst) };

        let doomed = match me.onion_id.as_bytes().cmp(probe.onion_id.as_bytes()) {
            Ordering::Greater => connect_slot,
            Ordering::Less => accept_slot,
            Ordering::Equal => match me.lport.cmp(&probe.lport) {
                Ordering::Greater => connect_slot,
                Ordering::Less => accept_slot,
                Ordering::Equal => {
                    error!(target: "net::contact", "Contact is stored twice in contactlist");
                    accept_slot
                }
            },
        };

        Ok(Some(doomed))
    }

    /// Locates the current slot of an open connection. Reader tasks use
    /// this instead of caching indices, which a resize would invalidate.
    pub fn index_of_link(&self, link: &LinkPtr) -> Option<usize> {
        self.contacts.iter().position(|c| match &c.link {
            Some(l) => Arc::ptr_eq(l, link),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::io::Cursor;

    use super::*;
    use crate::net::link::Link;

    const ONION_A: &str = "aaaaaaaaaaaaaaaa.onion";
    const ONION_B: &str = "bbbbbbbbbbbbbbbb.onion";
    const ONION_C: &str = "cccccccccccccccc.onion";

    fn test_link() -> LinkPtr {
        let (link, _reader) = Link::new(Box::new(Cursor::new(vec![])));
        link
    }

    fn establish(cl: &mut ContactList, n: usize, onion_id: &str, lport: u16) {
        let c = cl.get_mut(n).unwrap();
        c.onion_id = onion_id.to_string();
        c.lport = lport;
    }

    #[test]
    fn test_is_valid_onion() {
        assert!(is_valid_onion("aaaaaaaaaaaaaaaa.onion"));
        assert!(is_valid_onion("duskgytldkxiuqc6.onion"));
        // Wrong length
        assert!(!is_valid_onion("aaaaaaaaaaaaaaa.onion"));
        assert!(!is_valid_onion("aaaaaaaaaaaaaaaaa.onion"));
        // Missing suffix
        assert!(!is_valid_onion("aaaaaaaaaaaaaaaaaonion"));
        assert!(!is_valid_onion("facebook.com"));
        // Alphabet violations: 0, 1, 8, 9 and uppercase are not base32
        assert!(!is_valid_onion("aaaaaaaaaaaaaaa0.onion"));
        assert!(!is_valid_onion("AAAAAAAAAAAAAAAA.onion"));
    }

    #[test]
    fn test_is_valid_port() {
        assert!(!is_valid_port(0));
        assert!(is_valid_port(1));
        assert!(is_valid_port(65535));
    }

    #[test]
    fn test_contact_string_roundtrip() {
        let contact = Contact::with_identity(ONION_A, 6000, "alice");
        let s = contact_to_string(&contact).unwrap();
        assert_eq!(s, "aaaaaaaaaaaaaaaa.onion 6000\n");

        let (onion_id, lport) = string_to_contact(&s).unwrap();
        assert_eq!(onion_id, contact.onion_id);
        assert_eq!(lport, contact.lport);
    }

    #[test]
    fn test_contact_to_string_invalid() {
        let contact = Contact::with_identity("garbage", 6000, "");
        assert!(matches!(contact_to_string(&contact), Err(Error::InvalidContact)));

        let contact = Contact::with_identity(ONION_A, 0, "");
        assert!(matches!(contact_to_string(&contact), Err(Error::InvalidContact)));
    }

    #[test]
    fn test_string_to_contact_port_bounds() {
        assert!(string_to_contact("aaaaaaaaaaaaaaaa.onion 0").is_err());
        assert!(string_to_contact("aaaaaaaaaaaaaaaa.onion 65535").is_ok());
        assert!(string_to_contact("aaaaaaaaaaaaaaaa.onion 65536").is_err());
        // Trailing garbage after the port
        assert!(string_to_contact("aaaaaaaaaaaaaaaa.onion 80abc").is_err());
    }

    #[test]
    fn test_string_to_contact_malformed() {
        assert!(matches!(
            string_to_contact("GARBAGE"),
            Err(Error::MalformedContactLine("missing listening port"))
        ));
        assert!(matches!(
            string_to_contact(" 6000"),
            Err(Error::MalformedContactLine("missing onion address"))
        ));
        assert!(matches!(
            string_to_contact("aaaaaaaaaaaaaaaa.onion "),
            Err(Error::MalformedContactLine("missing listening port"))
        ));
        assert!(matches!(
            string_to_contact("notanonion 6000"),
            Err(Error::MalformedContactLine("invalid onion address"))
        ));
    }

    #[test]
    fn test_add_del_contact() {
        let mut cl = ContactList::new(INIT_CONTACTS);
        assert_eq!(cl.len(), INIT_CONTACTS);
        assert_eq!(cl.used(), 0);

        let n = cl.add_contact(test_link());
        assert_eq!(n, 0);
        assert_eq!(cl.used(), 1);
        assert!(cl.get(n).unwrap().is_temporary());

        // Empty slot invariant: everything else is zeroed
        let link = cl.get(n).unwrap().link.clone().unwrap();
        cl.del_contact(n).unwrap();
        assert_eq!(cl.used(), 0);
        let slot = cl.get(n).unwrap();
        assert!(slot.is_empty());
        assert!(slot.onion_id.is_empty() && slot.lport == 0 && slot.name.is_empty());
        assert!(!slot.accepted);
        assert!(link.is_stopped());

        // Deleting an empty slot is a no-op
        cl.del_contact(n).unwrap();
        assert_eq!(cl.used(), 0);

        assert!(matches!(cl.del_contact(100), Err(Error::IndexOutOfBounds(100))));
    }

    #[test]
    fn test_grow_and_shrink() {
        let mut cl = ContactList::new(INIT_CONTACTS);

        // The 5th insertion grows the table from 4 to 8
        for i in 0..5 {
            let n = cl.add_contact(test_link());
            assert_eq!(n, i);
        }
        assert_eq!(cl.len(), 2 * INIT_CONTACTS);
        assert_eq!(cl.used(), 5);

        // The first deletion leaves used == cl_size - INIT_CONTACTS, which
        // shrinks the table back to 4 and compacts the survivors
        cl.del_contact(4).unwrap();
        assert_eq!(cl.len(), INIT_CONTACTS);
        assert_eq!(cl.used(), 4);

        // Deleting down to one peer leaves it compacted in slot 0
        cl.del_contact(3).unwrap();
        cl.del_contact(2).unwrap();
        cl.del_contact(1).unwrap();
        assert_eq!(cl.len(), INIT_CONTACTS);
        assert_eq!(cl.used(), 1);
        assert!(!cl.get(0).unwrap().is_empty());
    }

    #[test]
    fn test_resize_preserves_order() {
        let mut cl = ContactList::new(INIT_CONTACTS);
        for _ in 0..4 {
            cl.add_contact(test_link());
        }
        establish(&mut cl, 0, ONION_A, 6000);
        establish(&mut cl, 1, ONION_B, 6001);
        establish(&mut cl, 2, ONION_C, 6002);
        establish(&mut cl, 3, ONION_A, 6003);

        // Punch a hole, then resize: survivors keep their relative order
        let _ = cl.get_mut(1).unwrap().link.take();
        cl.used -= 1;
        cl.resize(8).unwrap();

        assert_eq!(cl.len(), 8);
        assert_eq!(cl.get(0).unwrap().lport, 6000);
        assert_eq!(cl.get(1).unwrap().lport, 6002);
        assert_eq!(cl.get(2).unwrap().lport, 6003);
        assert!(cl.get(3).unwrap().is_empty());
    }

    #[test]
    fn test_resize_invalid() {
        let mut cl = ContactList::new(INIT_CONTACTS);
        cl.add_contact(test_link());
        cl.add_contact(test_link());

        assert!(matches!(cl.resize(0), Err(Error::InvalidSize(0))));
        assert!(matches!(cl.resize(1), Err(Error::InvalidSize(1))));
        assert!(cl.resize(2).is_ok());
    }

    #[test]
    fn test_find_contact() {
        let me = Contact::with_identity(ONION_A, 5000, "me");
        let mut cl = ContactList::new(INIT_CONTACTS);

        for _ in 0..3 {
            cl.add_contact(test_link());
        }
        establish(&mut cl, 0, ONION_B, 5001);
        establish(&mut cl, 2, ONION_C, 5002);
        // Slot 1 stays temporary and must be skipped

        let probe = Contact::with_identity(ONION_B, 5001, "");
        assert_eq!(cl.find_contact(&me, &probe, 0), ContactMatch::Index(0));
        assert_eq!(cl.find_contact(&me, &probe, 1), ContactMatch::NotFound);

        let probe = Contact::with_identity(ONION_C, 5002, "");
        assert_eq!(cl.find_contact(&me, &probe, 0), ContactMatch::Index(2));

        // Same onion, different port is a different peer
        let probe = Contact::with_identity(ONION_B, 5999, "");
        assert_eq!(cl.find_contact(&me, &probe, 0), ContactMatch::NotFound);

        // Our own identity
        let probe = Contact::with_identity(ONION_A, 5000, "");
        assert_eq!(cl.find_contact(&me, &probe, 0), ContactMatch::Own);

        // Out-of-range begin
        let probe = Contact::with_identity(ONION_B, 5001, "");
        assert_eq!(cl.find_contact(&me, &probe, cl.len()), ContactMatch::NotFound);
    }

    /// Set up the duplicate scenario on one node: a slot we connected and
    /// a slot we accepted, both resolving to the same remote peer.
    fn duplicate_table(remote_onion: &str, remote_port: u16) -> ContactList {
        let mut cl = ContactList::new(INIT_CONTACTS);

        let connected = cl.add_contact(test_link());
        establish(&mut cl, connected, remote_onion, remote_port);

        let accepted = cl.add_contact(test_link());
        establish(&mut cl, accepted, remote_onion, remote_port);
        cl.get_mut(accepted).unwrap().accepted = true;

        cl
    }

    #[test]
    fn test_check_duplicates_symmetric() {
        // A has the smaller identity: it must drop the slot it accepted,
        // keeping the connection it initiated. B mirrors this, so exactly
        // one TCP pair survives.
        let me_a = Contact::with_identity(ONION_A, 6000, "a");
        let cl_a = duplicate_table(ONION_B, 6001);
        let doomed_a = cl_a.check_duplicates(&me_a, 0).unwrap().unwrap();
        assert!(cl_a.get(doomed_a).unwrap().accepted);

        let me_b = Contact::with_identity(ONION_B, 6001, "b");
        let cl_b = duplicate_table(ONION_A, 6000);
        let doomed_b = cl_b.check_duplicates(&me_b, 0).unwrap().unwrap();
        assert!(!cl_b.get(doomed_b).unwrap().accepted);
    }

    #[test]
    fn test_check_duplicates_port_tiebreak() {
        // Same onion address on both ends, ports decide
        let me = Contact::with_identity(ONION_A, 7000, "me");
        let cl = duplicate_table(ONION_A, 6999);
        let doomed = cl.check_duplicates(&me, 0).unwrap().unwrap();
        assert!(!cl.get(doomed).unwrap().accepted);

        let me = Contact::with_identity(ONION_A, 6000, "me");
        let cl = duplicate_table(ONION_A, 6999);
        let doomed = cl.check_duplicates(&me, 0).unwrap().unwrap();
        assert!(cl.get(doomed).unwrap().accepted);
    }

    #[test]
    fn test_check_duplicates_none() {
        let me = Contact::with_identity(ONION_A, 6000, "me");
        let mut cl = ContactList::new(INIT_CONTACTS);
        let n = cl.add_contact(test_link());
        establish(&mut cl, n, ONION_B, 6001);

        assert_eq!(cl.check_duplicates(&me, n).unwrap(), None);
    }

    #[test]
    fn test_check_duplicates_own_address() {
        // A peer advertised our own identity: the offending slot itself
        // must go
        let me = Contact::with_identity(ONION_A, 6000, "me");
        let mut cl = ContactList::new(INIT_CONTACTS);
        let n = cl.add_contact(test_link());
        establish(&mut cl, n, ONION_A, 6000);

        assert_eq!(cl.check_duplicates(&me, n).unwrap(), Some(n));
    }

    #[test]
    fn test_index_of_link() {
        let mut cl = ContactList::new(INIT_CONTACTS);
        let a = cl.add_contact(test_link());
        let b = cl.add_contact(test_link());
        let link_b = cl.get(b).unwrap().link.clone().unwrap();

        assert_eq!(cl.index_of_link(&link_b), Some(b));

        // Compaction moves the link, the lookup follows it
        cl.del_contact(a).unwrap();
        cl.resize(INIT_CONTACTS).unwrap();
        assert_eq!(cl.index_of_link(&link_b), Some(0));
    }
}
