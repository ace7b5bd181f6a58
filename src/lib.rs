//! PC/SC transport core and secure-messaging/card-proxy core for
//! generation-2 health-telematics smart cards.
//!
//! Three layers, bottom to top:
//! - [`pcsc`]: a typed wrapper over the raw `pcsc-sys` bindings
//!   (contexts, readers, cards, attributes, transactions).
//! - [`reader`] and [`card`]: reader lifecycle and the card/logical-
//!   channel multiplexer built on top of the typed PC/SC layer.
//! - [`apdu`], [`sm`], [`proxy`], [`cert_chain`]: APDU modelling, secure
//!   messaging, the card-proxy family, and the CV-certificate chain
//!   importer, all transport-agnostic.

pub mod apdu;
pub mod card;
pub mod cert_chain;
pub mod crypto;
pub mod cvc;
pub mod error;
pub mod keys;
pub mod pcsc;
pub mod proxy;
pub mod reader;
pub mod sm;
pub mod tlv;

pub use error::{Error, Result};
