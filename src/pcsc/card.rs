//! `SCARDHANDLE` wrapper: status, transmit, disconnect, attributes, and
//! transactions (spec.md §4.A; transaction/attribute surface kept per
//! SPEC_FULL.md §3 even though no higher layer currently drives them).
//!
//! Grounded on `ndusart-pcsc-rust`'s `Card`/`Transaction`.

use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::ptr::null_mut;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::{map_status, Disposition, Protocol, Protocols, ShareMode, Status};

/// A connection to a smart card (`SCARDHANDLE`).
pub struct RawCard<'ctx> {
    _context: PhantomData<&'ctx super::Context>,
    handle: pcsc_sys::SCARDHANDLE,
    active_protocol: Protocol,
}

/// An exclusive transaction opened on a `RawCard`.
pub struct Transaction<'card> {
    card: &'card RawCard<'card>,
}

impl<'ctx> RawCard<'ctx> {
    pub(super) fn new(handle: pcsc_sys::SCARDHANDLE, active_protocol: Protocol) -> RawCard<'ctx> {
        RawCard { _context: PhantomData, handle, active_protocol }
    }

    /// The protocol negotiated at connect/reconnect time.
    pub fn active_protocol(&self) -> Protocol {
        self.active_protocol
    }

    /// Start an exclusive transaction. Wraps `SCardBeginTransaction`.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        let err = unsafe { pcsc_sys::SCardBeginTransaction(self.handle) };
        trace!(status = err, "SCardBeginTransaction");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        Ok(Transaction { card: self })
    }

    /// Reconnect, possibly renegotiating protocol/share mode. Wraps
    /// `SCardReconnect`.
    pub fn reconnect(
        &mut self,
        share_mode: ShareMode,
        preferred_protocols: Protocols,
        initialization: Disposition,
    ) -> Result<()> {
        let mut raw_protocol: pcsc_sys::DWORD = 0;
        let err = unsafe {
            pcsc_sys::SCardReconnect(
                self.handle,
                share_mode.as_dword(),
                preferred_protocols.bits(),
                initialization.as_dword(),
                &mut raw_protocol,
            )
        };
        trace!(status = err, "SCardReconnect");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        self.active_protocol = Protocol::from_raw(raw_protocol).ok_or(Error::UnsupportedProtocol)?;
        Ok(())
    }

    /// Disconnect from the card. On success, consumes `self`; on error,
    /// hands ownership back so the caller can decide whether to retry.
    ///
    /// `RawCard` also disconnects (with `Disposition::ResetCard`) on
    /// `Drop`; call this directly to observe errors or use a different
    /// disposition.
    pub fn disconnect(self, disposition: Disposition) -> std::result::Result<(), (RawCard<'ctx>, Error)> {
        let err = unsafe { pcsc_sys::SCardDisconnect(self.handle, disposition.as_dword()) };
        trace!(status = err, ?disposition, "SCardDisconnect");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err((self, map_status(err)));
        }
        std::mem::forget(self);
        Ok(())
    }

    /// Query the card's current status. Wraps `SCardStatus`.
    ///
    /// Any non-success return is treated by the caller (spec.md §4.C
    /// `Card::is_valid`) as a signal to transition the card session to
    /// `REMOVED`.
    pub fn status(&self) -> Result<(Status, Protocol)> {
        let mut raw_status: pcsc_sys::DWORD = 0;
        let mut raw_protocol: pcsc_sys::DWORD = 0;
        let err = unsafe {
            pcsc_sys::SCardStatus(
                self.handle,
                null_mut(),
                null_mut(),
                &mut raw_status,
                &mut raw_protocol,
                null_mut(),
                null_mut(),
            )
        };
        trace!(status = err, "SCardStatus");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        let status = Status::from_bits_truncate(raw_status);
        let protocol = Protocol::from_raw(raw_protocol).ok_or(Error::UnsupportedProtocol)?;
        Ok((status, protocol))
    }

    /// Get a raw attribute of the card or reader. Wraps `SCardGetAttrib`.
    pub fn get_attribute(&self, attr_id: u32, buffer: &mut [u8]) -> Result<usize> {
        let mut len = buffer.len() as pcsc_sys::DWORD;
        let err = unsafe {
            pcsc_sys::SCardGetAttrib(self.handle, attr_id as pcsc_sys::DWORD, buffer.as_mut_ptr(), &mut len)
        };
        trace!(attr_id, status = err, "SCardGetAttrib");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        Ok(len as usize)
    }

    /// Set a raw attribute of the card or reader. Wraps `SCardSetAttrib`.
    pub fn set_attribute(&self, attr_id: u32, data: &[u8]) -> Result<()> {
        let err = unsafe {
            pcsc_sys::SCardSetAttrib(
                self.handle,
                attr_id as pcsc_sys::DWORD,
                data.as_ptr(),
                data.len() as pcsc_sys::DWORD,
            )
        };
        trace!(attr_id, status = err, "SCardSetAttrib");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        Ok(())
    }

    /// Transmit raw bytes to the card and return the raw response plus
    /// elapsed wall time. No APDU (re)interpretation happens here; that
    /// is `Card::send_apdu`'s job (spec.md §4.C).
    pub fn transmit(&self, send_buffer: &[u8]) -> Result<(Vec<u8>, Duration)> {
        let send_pci = self.active_protocol.pci();
        let mut receive_buffer = vec![0u8; pcsc_sys::MAX_BUFFER_SIZE_EXTENDED];
        let mut receive_len = receive_buffer.len() as pcsc_sys::DWORD;

        let start = Instant::now();
        let err = unsafe {
            pcsc_sys::SCardTransmit(
                self.handle,
                send_pci,
                send_buffer.as_ptr(),
                send_buffer.len() as pcsc_sys::DWORD,
                null_mut(),
                receive_buffer.as_mut_ptr(),
                &mut receive_len,
            )
        };
        let elapsed = start.elapsed();
        debug!(sent = ?hex_preview(send_buffer), status = err, ?elapsed, "SCardTransmit");

        if err == pcsc_sys::SCARD_W_REMOVED_CARD {
            return Err(Error::CardRemoved);
        }
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        receive_buffer.truncate(receive_len as usize);
        debug!(received = ?hex_preview(&receive_buffer), "SCardTransmit response");
        Ok((receive_buffer, elapsed))
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

impl<'ctx> Drop for RawCard<'ctx> {
    fn drop(&mut self) {
        unsafe {
            let _ = pcsc_sys::SCardDisconnect(self.handle, pcsc_sys::SCARD_RESET_CARD);
        }
    }
}

impl<'card> Transaction<'card> {
    /// End the transaction. `Transaction` also ends (with
    /// `Disposition::LeaveCard`) on `Drop`.
    pub fn end(self, disposition: Disposition) -> std::result::Result<(), (Transaction<'card>, Error)> {
        let err = unsafe { pcsc_sys::SCardEndTransaction(self.card.handle, disposition.as_dword()) };
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err((self, map_status(err)));
        }
        std::mem::forget(self);
        Ok(())
    }
}

impl<'card> Drop for Transaction<'card> {
    fn drop(&mut self) {
        unsafe {
            let _ = pcsc_sys::SCardEndTransaction(self.card.handle, pcsc_sys::SCARD_LEAVE_CARD);
        }
    }
}

impl<'card> Deref for Transaction<'card> {
    type Target = RawCard<'card>;

    fn deref(&self) -> &RawCard<'card> {
        self.card
    }
}
