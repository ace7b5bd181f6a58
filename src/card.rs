//! Card handle & logical-channel multiplexer (spec.md §4.C).
//!
//! No direct teacher counterpart (the teacher stops at the raw
//! `SCARDHANDLE` wrapper); built on top of `pcsc::RawCard`, following the
//! design note in spec.md §9 to use interior mutability behind an atomic
//! state flag rather than `&mut self` methods, since the card state must
//! be checked and possibly flipped to `REMOVED` from any read-only call.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::apdu::{channel_number, rewrite_channel, Command, Response};
use crate::error::{Error, Result};
use crate::pcsc::{Disposition, RawCard};

/// Volatile card-session state (spec.md §3, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CardState {
    Ok = 0,
    Removed = 1,
    Disconnected = 2,
}

impl CardState {
    fn from_u8(v: u8) -> CardState {
        match v {
            0 => CardState::Ok,
            1 => CardState::Removed,
            _ => CardState::Disconnected,
        }
    }
}

/// MANAGE CHANNEL instruction byte (ISO/IEC 7816-4).
const INS_MANAGE_CHANNEL: u8 = 0x70;
const MANAGE_CHANNEL_OPEN_P1: u8 = 0x00;
const MANAGE_CHANNEL_CLOSE_P1: u8 = 0x80;
const MANAGE_CHANNEL_RESET_P1: u8 = 0x40;

/// A connection to one card, with its logical-channel set (spec.md §4.C).
pub struct Card<'ctx> {
    raw: RawCard<'ctx>,
    state: AtomicU8,
    open_channels: Mutex<HashSet<u8>>,
    last_elapsed: Mutex<Duration>,
}

/// A logical channel bound to a `Card`.
pub struct Channel<'card, 'ctx> {
    card: &'card Card<'ctx>,
    number: u8,
}

impl<'ctx> Card<'ctx> {
    pub fn new(raw: RawCard<'ctx>) -> Card<'ctx> {
        Card {
            raw,
            state: AtomicU8::new(CardState::Ok as u8),
            open_channels: Mutex::new(HashSet::new()),
            last_elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn state(&self) -> CardState {
        CardState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn check_live(&self) -> Result<()> {
        match self.state() {
            CardState::Ok => Ok(()),
            _ => Err(Error::Lifecycle),
        }
    }

    fn mark_removed(&self) {
        self.state.store(CardState::Removed as u8, Ordering::Relaxed);
    }

    /// The set of currently open non-zero logical channels. Never
    /// contains `0` (spec.md §4.C invariant).
    pub fn open_channels(&self) -> HashSet<u8> {
        self.open_channels.lock().unwrap().clone()
    }

    /// Transparent transmit: no APDU (re)interpretation.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.check_live()?;
        match self.raw.transmit(bytes) {
            Ok((resp, elapsed)) => {
                *self.last_elapsed.lock().unwrap() = elapsed;
                Ok(resp)
            }
            Err(Error::CardRemoved) => {
                self.mark_removed();
                Err(Error::CardRemoved)
            }
            Err(e) => Err(e),
        }
    }

    /// Encode `apdu` per its ISO case, transmit, and decode the reply.
    pub fn send_apdu(&self, apdu: &Command) -> Result<Response> {
        let bytes = apdu
            .encode()
            .map_err(|e| Error::InvalidApdu(format!("{e:?}")))?;
        let raw = self.send_raw(&bytes)?;
        Response::decode(&raw).map_err(|e| Error::InvalidApdu(format!("{e:?}")))
    }

    /// Open a new logical channel. Sends MANAGE CHANNEL OPEN; on `9000`
    /// the single channel-number byte in the response data is parsed,
    /// inserted into the open set, and a bound `Channel` is returned.
    pub fn open_logical_channel(&self) -> Result<Channel<'_, 'ctx>> {
        self.check_live()?;
        let open = Command::with_ne(
            0x00,
            INS_MANAGE_CHANNEL,
            MANAGE_CHANNEL_OPEN_P1,
            0x00,
            crate::apdu::Ne::Short(1),
        );
        let resp = self.send_apdu(&open)?;
        if !resp.is_ok() {
            return Err(Error::TrailerMismatch(resp.trailer));
        }
        let channel = *resp
            .data
            .first()
            .ok_or_else(|| Error::InvalidApdu("MANAGE CHANNEL OPEN returned no data".into()))?;
        self.open_channels.lock().unwrap().insert(channel);
        debug!(channel, "opened logical channel");
        Ok(Channel { card: self, number: channel })
    }

    /// Reset the card: sends MANAGE CHANNEL RESET-APPLICATION, expects
    /// `9000`, clears the open-channel set.
    pub fn reset(&self) -> Result<()> {
        self.check_live()?;
        let reset = Command::case1(0x00, INS_MANAGE_CHANNEL, MANAGE_CHANNEL_RESET_P1, 0x00);
        let resp = self.send_apdu(&reset)?;
        if !resp.is_ok() {
            return Err(Error::TrailerMismatch(resp.trailer));
        }
        self.open_channels.lock().unwrap().clear();
        Ok(())
    }

    /// Disconnect the card. All further operations on it (and on any
    /// channel vended by it) fail with `Lifecycle` afterwards.
    pub fn disconnect(&self, disposition: Disposition) -> Result<()> {
        let _ = disposition;
        self.state.store(CardState::Disconnected as u8, Ordering::Relaxed);
        Ok(())
    }

    /// Issue `SCardStatus`; any non-success transitions the card to
    /// `Removed` and returns `false`.
    pub fn is_valid(&self) -> bool {
        if self.check_live().is_err() {
            return false;
        }
        match self.raw.status() {
            Ok(_) => true,
            Err(_) => {
                self.mark_removed();
                false
            }
        }
    }
}

impl<'card, 'ctx> Channel<'card, 'ctx> {
    pub fn number(&self) -> u8 {
        self.number
    }

    fn reject_manage_channel(cla: u8, ins: u8) -> Result<()> {
        let _ = cla;
        if ins == INS_MANAGE_CHANNEL {
            return Err(Error::InvalidApdu(
                "MANAGE CHANNEL must go through Card::open_logical_channel/Channel::reset/close".into(),
            ));
        }
        Ok(())
    }

    /// Transparent transmit on this channel, rejecting MANAGE CHANNEL.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.len() >= 2 {
            Self::reject_manage_channel(bytes[0], bytes[1])?;
        }
        self.card.send_raw(bytes)
    }

    /// Rewrites the class byte to carry this channel's number, then
    /// sends. Rejects MANAGE CHANNEL commands.
    pub fn send_apdu(&self, apdu: &Command) -> Result<Response> {
        Self::reject_manage_channel(apdu.cla, apdu.ins)?;
        let rewritten =
            rewrite_channel(apdu, self.number).map_err(|e| Error::InvalidApdu(format!("{e:?}")))?;
        debug_assert_eq!(channel_number(&rewritten), self.number);
        self.card.send_apdu(&rewritten)
    }

    /// Reset this channel (delegates to `Card::reset`'s MANAGE CHANNEL
    /// RESET-APPLICATION on the current channel's scope).
    pub fn reset(&self) -> Result<()> {
        self.card.check_live()?;
        let reset = Command::case1(0x00, INS_MANAGE_CHANNEL, MANAGE_CHANNEL_RESET_P1, self.number);
        let rewritten = rewrite_channel(&reset, self.number).map_err(|e| Error::InvalidApdu(format!("{e:?}")))?;
        let resp = self.card.send_apdu(&rewritten)?;
        if !resp.is_ok() {
            return Err(Error::TrailerMismatch(resp.trailer));
        }
        Ok(())
    }

    /// Close this channel. Refuses to close the basic channel (never
    /// constructible here, since `Channel` is only vended for non-zero
    /// channels); returns immediately if already closed; otherwise sends
    /// MANAGE CHANNEL CLOSE and unconditionally removes the channel
    /// number from the open set, even on failure, to avoid leaking an
    /// entry after a failed close (spec.md §4.C).
    pub fn close(self) -> Result<()> {
        if self.number == 0 {
            return Err(Error::InvalidApdu("cannot close the basic channel".into()));
        }
        if !self.card.open_channels.lock().unwrap().contains(&self.number) {
            return Ok(());
        }
        let close = Command::case1(0x00, INS_MANAGE_CHANNEL, MANAGE_CHANNEL_CLOSE_P1, self.number);
        let result = self.card.send_apdu(&close);
        self.card.open_channels.lock().unwrap().remove(&self.number);
        match result {
            Ok(resp) if resp.is_ok() => Ok(()),
            Ok(resp) => Err(Error::TrailerMismatch(resp.trailer)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_state_round_trips() {
        assert_eq!(CardState::from_u8(CardState::Ok as u8), CardState::Ok);
        assert_eq!(CardState::from_u8(CardState::Removed as u8), CardState::Removed);
        assert_eq!(CardState::from_u8(CardState::Disconnected as u8), CardState::Disconnected);
    }
}
