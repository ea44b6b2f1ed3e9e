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

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_channel::{Receiver, Sender};
use futures::{
    io::{ReadHalf, WriteHalf},
    AsyncReadExt,
};
use log::debug;
use smol::lock::Mutex;

use super::{
    message::{write_pdu, Pdu},
    transport::PtStream,
};
use crate::{Error, Result};

/// Atomic pointer to an open peer connection.
pub type LinkPtr = Arc<Link>;

/// One open connection to a peer. The write half lives here, inside the
/// peer's contact slot; the read half is handed to the per-connection
/// reader task at creation.
pub struct Link {
    /// The writing half of the transport stream
    writer: Mutex<WriteHalf<Box<dyn PtStream>>>,
    /// Signals the reader task that the link is going down
    stop_send: Sender<()>,
    stop_recv: Receiver<()>,
    /// Marks a link that has been closed
    stopped: AtomicBool,
}

impl Link {
    /// Splits a transport stream into a new link and the read half for
    /// the reader task.
    pub fn new(stream: Box<dyn PtStream>) -> (LinkPtr, ReadHalf<Box<dyn PtStream>>) {
        let (reader, writer) = stream.split();
        let (stop_send, stop_recv) = async_channel::bounded(1);

        let link = Arc::new(Self {
            writer: Mutex::new(writer),
            stop_send,
            stop_recv,
            stopped: AtomicBool::new(false),
        });

        (link, reader)
    }

    /// Sends a PDU across the link. Returns the amount of bytes written.
    /// A write failure closes the link and surfaces as a transport error,
    /// leaving the slot cleanup to the caller.
    pub async fn send(&self, pdu: &Pdu) -> Result<usize> {
        if self.is_stopped() {
            return Err(Error::ChannelStopped)
        }

        let stream = &mut *self.writer.lock().await;

        match write_pdu(stream, pdu).await {
            Ok(written) => Ok(written),
            Err(err) => {
                self.close();
                Err(Error::TransportError(err.to_string()))
            }
        }
    }

    /// Closes the link. Idempotent: the underlying socket is torn down
    /// once, when the reader task observes the stop signal and both
    /// stream halves are released.
    pub fn close(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return
        }

        debug!(target: "net::link", "closing link");
        let _ = self.stop_send.try_send(());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `close()` has been called. Raced against the PDU
    /// read by the reader task.
    pub(crate) async fn wait_stop(&self) {
        if self.is_stopped() {
            return
        }

        let _ = self.stop_recv.recv().await;
    }
}
