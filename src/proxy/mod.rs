//! Card proxies (spec.md §4.F/§4.G): the generic boot sequence plus the
//! five hard-coded variants built on top of it.

pub mod generic;
pub mod variants;

use crate::apdu::{Command, Response};
use crate::error::Result;

/// Anything that can send a command APDU and get a response back. Lets
/// the proxy/chain-importer logic run against `Card`, `Channel`, or a
/// fake in-memory transport in tests, without caring which.
pub trait Transmitter {
    fn send_apdu(&self, apdu: &Command) -> Result<Response>;
}

impl<'ctx> Transmitter for crate::card::Card<'ctx> {
    fn send_apdu(&self, apdu: &Command) -> Result<Response> {
        crate::card::Card::send_apdu(self, apdu)
    }
}

impl<'card, 'ctx> Transmitter for crate::card::Channel<'card, 'ctx> {
    fn send_apdu(&self, apdu: &Command) -> Result<Response> {
        crate::card::Channel::send_apdu(self, apdu)
    }
}

pub use generic::{BufferSizes, GenericProxy, ProductInfo};
pub use variants::{
    ConnectorModule, ModuleCard, ModuleCardFlavour, PatientCard, ProfessionalCard, RoleAuthentication,
    SmAuthentication, TrustedChannelAuthentication,
};
