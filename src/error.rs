//! Crate-wide error type.
//!
//! Grounded on the teacher's `Error` enum (`ndusart-pcsc-rust`'s
//! `pcsc::Error`, a plain `#[repr(u32)]` mirror of the PC/SC status
//! codes) but widened to also cover the layers the teacher doesn't have:
//! card lifecycle, secure messaging, and the certificate-chain importer
//! (spec.md §7).

use crate::apdu::Trailer;

/// Errors surfaced by this crate.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The system smart-card resource manager is unreachable.
    #[error("smart-card resource manager is unavailable")]
    NoService,

    /// `SCardEstablishContext` returned a non-success status.
    #[error("failed to establish PC/SC context: {0}")]
    EstablishContextFailed(PcscStatus),

    /// No readers are currently known to the resource manager.
    #[error("no card readers available")]
    NoReadersAvailable,

    /// The named reader is not known to the resource manager.
    #[error("unknown reader: {0}")]
    UnknownReader(String),

    /// The named reader exists but is not currently usable.
    #[error("reader unavailable: {0}")]
    ReaderUnavailable(String),

    /// `SCardConnect` could not negotiate any of the requested protocols.
    #[error("no compatible protocol negotiated with reader")]
    UnsupportedProtocol,

    /// `SCardConnect` found no card in the reader.
    #[error("no smart card present")]
    NoSmartCard,

    /// The active protocol does not match what the caller required.
    #[error("active protocol does not match requested protocol")]
    ProtoMismatch,

    /// `SCardTransmit` reported the card was removed mid-command.
    #[error("card was removed during a transmit")]
    CardRemoved,

    /// An operation was attempted on a card/channel that is no longer
    /// usable (disconnected or removed).
    #[error("card is no longer usable (disconnected or removed)")]
    Lifecycle,

    /// The response trailer did not match any trailer accepted for this
    /// call.
    #[error("unexpected response trailer {0}")]
    TrailerMismatch(Trailer),

    /// Secure-messaging wrap/unwrap failed; see variant for the reason.
    #[error("secure messaging failure: {0}")]
    SecureMessagingFailure(#[from] SecureMessagingError),

    /// The command APDU was malformed, or a MANAGE-CHANNEL command was
    /// offered through a data path that forbids it.
    #[error("invalid APDU: {0}")]
    InvalidApdu(String),

    /// The card's MF FCP names no AID any known proxy variant recognises.
    #[error("unrecognised card type")]
    UnknownCardType,

    /// The certificate-chain importer exhausted the chain before finding
    /// an anchor the card already trusts.
    #[error("certificate chain has no anchor the card already trusts")]
    UnknownAnchor,

    /// A raw, unmapped PC/SC status code.
    #[error("PC/SC call failed: {0}")]
    Pcsc(#[from] PcscStatus),
}

/// Reasons a secure-messaging wrap or unwrap can fail (spec.md §7).
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum SecureMessagingError {
    /// The response data field does not parse as BER-TLV.
    #[error("response data field is not valid BER-TLV")]
    NotBerTlv,

    /// Odd-tagged (MAC-protected) DOs were present without a MAC-DO.
    #[error("MAC-protected data objects present without a MAC-DO")]
    MissingMacDo,

    /// A MAC-DO was present but no odd-tagged DOs were accumulated under
    /// it.
    #[error("MAC-DO present without any MAC-protected data objects")]
    UnexpectedMacDo,

    /// MAC verification of the response failed.
    #[error("MAC verification failed")]
    MacMismatch,

    /// An enciphered DO's padding indicator byte was not `01`.
    #[error("unsupported padding indicator {0:#04x}")]
    BadPaddingIndicator(u8),

    /// The deciphered plaintext was not correctly ISO/IEC 7816-4 padded.
    #[error("deciphered payload has invalid padding")]
    BadPadding,
}

/// A raw PC/SC return status, carried for display/debugging purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcscStatus(pub i64);

impl std::fmt::Display for PcscStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

impl std::error::Error for PcscStatus {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
