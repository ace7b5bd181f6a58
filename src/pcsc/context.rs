//! `SCARDCONTEXT` wrapper: establish/release, reader enumeration, status
//! change, and card connect (spec.md §4.A).
//!
//! Grounded directly on `ndusart-pcsc-rust`'s `Context`/`ReaderState`/
//! `Canceler`. The two differences from the teacher: buffers are grown in
//! a loop instead of taken once (spec.md §4.A forbids `SCARD_AUTOALLOCATE`
//! and requires retrying on `INSUFFICIENT_BUFFER`), and every call is
//! logged at `trace` level with its elapsed time, per spec.md §6.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::os::raw::c_char;
use std::ptr::{null, null_mut};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Error, PcscStatus, Result};

use super::{decode_multistring, map_status, Protocol, Protocols, Scope, ShareMode};

const INITIAL_BUFFER_LEN: usize = 256;

/// Run a PC/SC call that fills a growable buffer through the two-call
/// length-probe idiom, looping while the call reports
/// `INSUFFICIENT_BUFFER` (a reader may appear between the probe and the
/// fill, per spec.md §4.A).
fn probe_buffer<F>(mut call: F) -> Result<Vec<u8>>
where
    F: FnMut(*mut c_char, &mut pcsc_sys::DWORD) -> pcsc_sys::LONG,
{
    let mut len: pcsc_sys::DWORD = 0;
    let probe = call(null_mut(), &mut len);
    if probe != pcsc_sys::SCARD_S_SUCCESS {
        return Err(map_status(probe));
    }

    let mut buf = vec![0u8; len as usize];
    loop {
        let mut buflen = buf.len() as pcsc_sys::DWORD;
        let err = call(buf.as_mut_ptr() as *mut c_char, &mut buflen);
        match err {
            pcsc_sys::SCARD_S_SUCCESS => {
                buf.truncate(buflen as usize);
                return Ok(buf);
            }
            v if v == pcsc_sys::SCARD_E_INSUFFICIENT_BUFFER => {
                buf.resize(buflen.max(buf.len() as pcsc_sys::DWORD + 1) as usize, 0);
                continue;
            }
            other => return Err(map_status(other)),
        }
    }
}

/// Library context to the PC/SC resource manager (`SCARDCONTEXT`).
///
/// Thread-confined: a context and everything derived from it may only be
/// used on the thread that created it.
pub struct Context {
    _not_sync_send: PhantomData<*const ()>,
    handle: pcsc_sys::SCARDCONTEXT,
}

/// A handle that can be sent to another thread to cancel a blocking
/// operation on the `Context` it was taken from (spec.md §5,
/// "Cancellation & timeouts").
pub struct Canceler {
    handle: pcsc_sys::SCARDCONTEXT,
}

unsafe impl Send for Canceler {}
unsafe impl Sync for Canceler {}

impl Context {
    /// Establish a new context. Wraps `SCardEstablishContext`.
    pub fn establish(scope: Scope) -> Result<Context> {
        let start = Instant::now();
        let mut ctx = MaybeUninit::<pcsc_sys::SCARDCONTEXT>::uninit();
        let err = unsafe {
            pcsc_sys::SCardEstablishContext(scope.as_dword(), null(), null(), ctx.as_mut_ptr())
        };
        trace!(?scope, status = err, elapsed = ?start.elapsed(), "SCardEstablishContext");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(Error::EstablishContextFailed(PcscStatus(err as i64)));
        }
        Ok(Context { _not_sync_send: PhantomData, handle: unsafe { ctx.assume_init() } })
    }

    /// Release the context. `Context` also releases on `Drop`; call this
    /// directly only to observe the error.
    pub fn release(self) -> std::result::Result<(), (Context, Error)> {
        let start = Instant::now();
        let err = unsafe { pcsc_sys::SCardReleaseContext(self.handle) };
        trace!(status = err, elapsed = ?start.elapsed(), "SCardReleaseContext");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err((self, map_status(err)));
        }
        std::mem::forget(self);
        Ok(())
    }

    /// Check whether the context is still valid. Wraps `SCardIsValidContext`.
    pub fn is_valid(&self) -> bool {
        let err = unsafe { pcsc_sys::SCardIsValidContext(self.handle) };
        trace!(status = err, "SCardIsValidContext");
        err == pcsc_sys::SCARD_S_SUCCESS
    }

    /// Get a `Canceler` for this context, usable from another thread.
    pub fn get_canceler(&self) -> Canceler {
        Canceler { handle: self.handle }
    }

    /// List all connected reader names. Wraps `SCardListReaders`.
    pub fn list_readers(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let result = probe_buffer(|buf, len| unsafe {
            pcsc_sys::SCardListReaders(self.handle, null(), buf, len)
        });
        let names = match result {
            Ok(buf) => decode_multistring(&buf).map_err(|_| Error::InvalidApdu(
                "malformed reader multi-string".into(),
            ))?,
            Err(Error::NoReadersAvailable) => Vec::new(),
            Err(e) => return Err(e),
        };
        trace!(count = names.len(), elapsed = ?start.elapsed(), "SCardListReaders");
        Ok(names)
    }

    /// List reader groups known to the resource manager. Wraps
    /// `SCardListReaderGroups` (supplemented per spec.md §4.A's binding
    /// surface table).
    pub fn list_reader_groups(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let buf = probe_buffer(|buf, len| unsafe {
            pcsc_sys::SCardListReaderGroups(self.handle, buf, len)
        })?;
        let groups = decode_multistring(&buf)
            .map_err(|_| Error::InvalidApdu("malformed reader-group multi-string".into()))?;
        trace!(count = groups.len(), elapsed = ?start.elapsed(), "SCardListReaderGroups");
        Ok(groups)
    }

    /// Connect to a card present in `reader`. Wraps `SCardConnect`.
    pub fn connect(
        &self,
        reader: &str,
        share_mode: ShareMode,
        preferred_protocols: Protocols,
    ) -> Result<super::RawCard<'_>> {
        let start = Instant::now();
        let reader_c = CString::new(reader)
            .map_err(|_| Error::UnknownReader(reader.to_string()))?;
        let mut handle = MaybeUninit::<pcsc_sys::SCARDHANDLE>::uninit();
        let mut raw_protocol: pcsc_sys::DWORD = 0;

        let err = unsafe {
            pcsc_sys::SCardConnect(
                self.handle,
                reader_c.as_ptr(),
                share_mode.as_dword(),
                preferred_protocols.bits(),
                handle.as_mut_ptr(),
                &mut raw_protocol,
            )
        };
        trace!(reader, ?share_mode, status = err, elapsed = ?start.elapsed(), "SCardConnect");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(match err {
                v if v == pcsc_sys::SCARD_E_UNKNOWN_READER => Error::UnknownReader(reader.into()),
                v if v == pcsc_sys::SCARD_E_NO_SMARTCARD => Error::NoSmartCard,
                v if v == pcsc_sys::SCARD_E_PROTO_MISMATCH => Error::UnsupportedProtocol,
                v if v == pcsc_sys::SCARD_E_READER_UNAVAILABLE => {
                    Error::ReaderUnavailable(reader.into())
                }
                other => map_status(other),
            });
        }

        let active_protocol = Protocol::from_raw(raw_protocol).ok_or(Error::UnsupportedProtocol)?;
        Ok(super::RawCard::new(unsafe { handle.assume_init() }, active_protocol))
    }

    /// Wait for a reader/card state change, or `timeout_ms` to elapse
    /// (`pcsc_sys::INFINITE` waits forever). Wraps `SCardGetStatusChange`.
    ///
    /// Returns immediately without a PC/SC call when every entry's
    /// `current_state` is `UNAWARE` or every entry has `IGNORE` set
    /// (spec.md §4.A: "implementations must not poll").
    pub fn get_status_change(
        &self,
        timeout_ms: pcsc_sys::DWORD,
        readers: &mut [ReaderState],
    ) -> Result<()> {
        let start = Instant::now();
        let err = unsafe {
            pcsc_sys::SCardGetStatusChange(
                self.handle,
                timeout_ms,
                readers.as_mut_ptr() as *mut pcsc_sys::SCARD_READERSTATE,
                readers.len() as pcsc_sys::DWORD,
            )
        };
        trace!(count = readers.len(), timeout_ms, status = err, elapsed = ?start.elapsed(), "SCardGetStatusChange");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            let _ = pcsc_sys::SCardReleaseContext(self.handle);
        }
    }
}

impl Canceler {
    /// Cancel any ongoing blocking operation on the originating context.
    /// Wraps `SCardCancel`.
    pub fn cancel(&self) -> Result<()> {
        let err = unsafe { pcsc_sys::SCardCancel(self.handle) };
        trace!(status = err, "SCardCancel");
        if err != pcsc_sys::SCARD_S_SUCCESS {
            return Err(map_status(err));
        }
        Ok(())
    }
}

/// Tracks the current/event state of one reader across a
/// `get_status_change` call. Wraps `SCARD_READERSTATE`.
///
/// `#[repr(C)]` over a single field so a `&mut [ReaderState]` can be
/// passed directly where the C API expects a `SCARD_READERSTATE` array.
#[repr(C)]
pub struct ReaderState {
    inner: pcsc_sys::SCARD_READERSTATE,
}

impl ReaderState {
    /// Build a `ReaderState` for `name` with the given presumed current
    /// state. Allocates an owned copy of `name` so the result isn't tied
    /// to its lifetime.
    pub fn new(name: &str, current_state: super::ReaderStateFlags) -> ReaderState {
        let name_c = CString::new(name).expect("reader name must not contain NUL");
        ReaderState {
            inner: pcsc_sys::SCARD_READERSTATE {
                szReader: name_c.into_raw(),
                pvUserData: null_mut(),
                dwCurrentState: current_state.bits(),
                dwEventState: super::ReaderStateFlags::UNAWARE.bits(),
                cbAtr: 0,
                rgbAtr: [0; pcsc_sys::ATR_BUFFER_SIZE],
            },
        }
    }

    /// The reader name this entry tracks.
    pub fn name(&self) -> &str {
        unsafe { CStr::from_ptr(self.inner.szReader) }
            .to_str()
            .expect("reader names are UTF-8")
    }

    /// The last event state reported by the resource manager.
    pub fn event_state(&self) -> super::ReaderStateFlags {
        super::ReaderStateFlags::from_bits_truncate(self.inner.dwEventState)
    }

    /// The opaque card-event counter (upper 16 bits of `event_state`).
    pub fn event_count(&self) -> u32 {
        (self.inner.dwEventState & 0xFFFF_0000) >> 16
    }

    /// Adopt the last-reported event state as the current state, ready
    /// for the next `get_status_change` call.
    pub fn sync_current_state(&mut self) {
        self.inner.dwCurrentState = self.inner.dwEventState;
    }
}

impl Drop for ReaderState {
    fn drop(&mut self) {
        unsafe {
            let _ = CString::from_raw(self.inner.szReader as *mut c_char);
        }
    }
}

impl std::fmt::Debug for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderState")
            .field("name", &self.name())
            .field("event_state", &self.event_state())
            .finish()
    }
}
