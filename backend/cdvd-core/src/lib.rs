//! Emulation of the PS2 I/O processor's CDVD controller: drive commands, sub-commands, the sector
//! read pipeline, the NVM store, the real-time clock, and title key derivation

pub mod api;
mod buffers;
mod clock;
pub mod disc;
mod keys;
mod magicgate;
mod nvm;
mod pipeline;
pub mod scheduler;

#[cfg(test)]
mod testutil;

pub use api::{CdvdController, CdvdEmulatorConfig, CdvdError, CdvdResult, DmaTarget, HostBus};
pub use clock::RealTimeClock;
pub use keys::{KeyError, TitleKey, derive_title_key};
pub use nvm::{NVM_LAYOUTS, NVM_LEN, NvmField, NvmLayout, select_layout};
pub use pipeline::{DualLayerInfo, DualLayerKind, RemappedSector};
