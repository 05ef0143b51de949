//! PrivWealth Core
//!
//! Client-side protocol for confidential wealth comparison.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  writes                                                             │
//! │  Submission / Leaderboard trigger / Reset ──▶ Ledger ──confirm──┐   │
//! │                                                                 ▼   │
//! │                                                            UpdateBus│
//! │  reads                                                          │   │
//! │  Participants / Leaderboard / Reveal ◀──── timer + bus signal ──┘   │
//! │        │                                                            │
//! │        └──▶ Ledger reads (side-effect free)                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod bus;
pub mod controllers;
pub mod error;
pub mod inflight;
pub mod ledger;
pub mod poller;

#[cfg(test)]
mod testing;

pub use app::{AppSettings, WealthApp};
pub use bus::{UpdateBus, UpdateKind, UpdateSignal};
pub use controllers::{
    LeaderboardController, ParticipantEntry, ParticipantsController, ResetConfirmation,
    ResetController, RevealController, RevealView, Standings, SubmissionController,
    SubmissionReceipt, SubmissionStatus, SubmissionView,
};
pub use error::{WealthError, classify};
pub use ledger::{
    Ledger, LedgerCall, LedgerError, LocalLedger, LocalLedgerConfig, TxHash, TxReceipt, TxStatus,
};
pub use poller::{Poll, PollTrigger, PollerHandle, spawn_poller};
