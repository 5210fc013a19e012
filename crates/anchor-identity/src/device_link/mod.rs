//! Attaching a new device from an already-authenticated one
//!
//! The new device names an anchor, creates a credential and parks it at the
//! registry as a tentative device. It shows a link carrying
//! `{anchor, public key, credential id}` together with a verification code,
//! then polls the registry until the candidate shows up among the anchor's
//! authentication devices.
//!
//! A device with a session for that anchor opens the link, asks the user to
//! approve the candidate, and submits the code. The registry only lists the
//! candidate after a correct code, so polling never sees it before the
//! confirmation. Cancelling on the new device withdraws the tentative device.

mod confirm;
pub mod flow;
pub mod link;
mod origin;

pub use confirm::LinkConfirmation;
pub use flow::{transition, LinkEffect, LinkEvent, LinkRole, LinkState};
pub use link::{clear_link, LinkPayload, LINK_FRAGMENT_KEY};
pub use origin::{IssuedLink, LinkOrigin};
