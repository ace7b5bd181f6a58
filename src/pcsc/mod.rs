//! Typed wrapper over the raw `pcsc-sys` C ABI (spec.md §4.A).
//!
//! Grounded on `ndusart-pcsc-rust`'s `Context`/`Card`/`ReaderState`, kept
//! safe and ergonomic the same way, but reworked around owned buffers
//! (rather than borrowed `&CStr`s) so the two-call length-probe idiom can
//! reallocate and retry without fighting borrowck, and so status/elapsed
//! time can be logged uniformly at every call site.

pub mod card;
pub mod context;
pub mod multistring;

pub use card::{RawCard, Transaction};
pub use context::{Canceler, Context, ReaderState};
pub use multistring::decode_multistring;

use std::fmt;

/// How a reader connection is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareMode {
    Exclusive,
    Shared,
    Direct,
}

impl ShareMode {
    fn as_dword(self) -> pcsc_sys::DWORD {
        match self {
            ShareMode::Exclusive => pcsc_sys::SCARD_SHARE_EXCLUSIVE,
            ShareMode::Shared => pcsc_sys::SCARD_SHARE_SHARED,
            ShareMode::Direct => pcsc_sys::SCARD_SHARE_DIRECT,
        }
    }
}

/// A smart-card communication protocol. Spec.md restricts the rest of the
/// crate to T=1, but the binding layer still has to negotiate and report
/// whatever the reader actually hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    T0,
    T1,
    Raw,
}

impl Protocol {
    fn from_raw(raw: pcsc_sys::DWORD) -> Option<Protocol> {
        match raw {
            v if v == pcsc_sys::SCARD_PROTOCOL_T0 => Some(Protocol::T0),
            v if v == pcsc_sys::SCARD_PROTOCOL_T1 => Some(Protocol::T1),
            v if v == pcsc_sys::SCARD_PROTOCOL_RAW => Some(Protocol::Raw),
            _ => None,
        }
    }

    fn pci(self) -> &'static pcsc_sys::SCARD_IO_REQUEST {
        unsafe {
            match self {
                Protocol::T0 => &pcsc_sys::g_rgSCardT0Pci,
                Protocol::T1 => &pcsc_sys::g_rgSCardT1Pci,
                Protocol::Raw => &pcsc_sys::g_rgSCardRawPci,
            }
        }
    }
}

bitflags::bitflags! {
    /// Mask of protocols offered or accepted during `connect`/`reconnect`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protocols: pcsc_sys::DWORD {
        const T0 = pcsc_sys::SCARD_PROTOCOL_T0;
        const T1 = pcsc_sys::SCARD_PROTOCOL_T1;
        const RAW = pcsc_sys::SCARD_PROTOCOL_RAW;
        const ANY = pcsc_sys::SCARD_PROTOCOL_ANY;
    }
}

/// Disposition applied to a card when disconnecting or ending a
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    LeaveCard,
    ResetCard,
    UnpowerCard,
    EjectCard,
}

impl Disposition {
    fn as_dword(self) -> pcsc_sys::DWORD {
        match self {
            Disposition::LeaveCard => pcsc_sys::SCARD_LEAVE_CARD,
            Disposition::ResetCard => pcsc_sys::SCARD_RESET_CARD,
            Disposition::UnpowerCard => pcsc_sys::SCARD_UNPOWER_CARD,
            Disposition::EjectCard => pcsc_sys::SCARD_EJECT_CARD,
        }
    }
}

/// Scope of a resource-manager context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    User,
    Terminal,
    System,
    Global,
}

impl Scope {
    fn as_dword(self) -> pcsc_sys::DWORD {
        match self {
            Scope::User => pcsc_sys::SCARD_SCOPE_USER,
            Scope::Terminal => pcsc_sys::SCARD_SCOPE_TERMINAL,
            Scope::System => pcsc_sys::SCARD_SCOPE_SYSTEM,
            Scope::Global => pcsc_sys::SCARD_SCOPE_GLOBAL,
        }
    }
}

bitflags::bitflags! {
    /// Mask of a card/reader's status (spec.md §3 status vocabulary,
    /// applied to `SCardStatus`'s own, narrower, status word).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: pcsc_sys::DWORD {
        const UNKNOWN = pcsc_sys::SCARD_UNKNOWN;
        const ABSENT = pcsc_sys::SCARD_ABSENT;
        const PRESENT = pcsc_sys::SCARD_PRESENT;
        const SWALLOWED = pcsc_sys::SCARD_SWALLOWED;
        const POWERED = pcsc_sys::SCARD_POWERED;
        const NEGOTIABLE = pcsc_sys::SCARD_NEGOTIABLE;
        const SPECIFIC = pcsc_sys::SCARD_SPECIFIC;
    }
}

bitflags::bitflags! {
    /// Mask of the reader/card state vocabulary shared by
    /// `current_state`/`event_state` (spec.md §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReaderStateFlags: pcsc_sys::DWORD {
        const UNAWARE = pcsc_sys::SCARD_STATE_UNAWARE;
        const IGNORE = pcsc_sys::SCARD_STATE_IGNORE;
        const CHANGED = pcsc_sys::SCARD_STATE_CHANGED;
        const UNKNOWN = pcsc_sys::SCARD_STATE_UNKNOWN;
        const UNAVAILABLE = pcsc_sys::SCARD_STATE_UNAVAILABLE;
        const EMPTY = pcsc_sys::SCARD_STATE_EMPTY;
        const PRESENT = pcsc_sys::SCARD_STATE_PRESENT;
        const ATRMATCH = pcsc_sys::SCARD_STATE_ATRMATCH;
        const EXCLUSIVE = pcsc_sys::SCARD_STATE_EXCLUSIVE;
        const INUSE = pcsc_sys::SCARD_STATE_INUSE;
        const MUTE = pcsc_sys::SCARD_STATE_MUTE;
        const UNPOWERED = pcsc_sys::SCARD_STATE_UNPOWERED;
    }
}

/// A special reader name that detects reader insertions/removals rather
/// than a specific reader's state.
pub fn pnp_notification() -> &'static str {
    "\\\\?PnP?\\Notification"
}

fn map_status(raw: pcsc_sys::LONG) -> crate::error::Error {
    use crate::error::{Error, PcscStatus};
    match raw {
        v if v == pcsc_sys::SCARD_E_NO_SERVICE => Error::NoService,
        v if v == pcsc_sys::SCARD_E_NO_READERS_AVAILABLE => Error::NoReadersAvailable,
        v if v == pcsc_sys::SCARD_E_READER_UNAVAILABLE => Error::ReaderUnavailable(String::new()),
        v if v == pcsc_sys::SCARD_E_UNKNOWN_READER => Error::UnknownReader(String::new()),
        v if v == pcsc_sys::SCARD_E_PROTO_MISMATCH => Error::ProtoMismatch,
        v if v == pcsc_sys::SCARD_E_NO_SMARTCARD => Error::NoSmartCard,
        v if v == pcsc_sys::SCARD_W_REMOVED_CARD => Error::CardRemoved,
        _ => Error::Pcsc(PcscStatus(raw as i64)),
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::T0 => write!(f, "T=0"),
            Protocol::T1 => write!(f, "T=1"),
            Protocol::Raw => write!(f, "RAW"),
        }
    }
}
