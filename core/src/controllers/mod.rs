//! Client-side controllers.
//!
//! Write controllers (submission, leaderboard trigger, reset) publish to the
//! update bus once the ledger confirms. Read controllers (participants,
//! leaderboard, reveal) implement [`Poll`](crate::poller::Poll).

pub mod leaderboard;
pub mod participants;
pub mod reset;
pub mod reveal;
pub mod submission;

pub use leaderboard::{LeaderboardController, Standings};
pub use participants::{ParticipantEntry, ParticipantsController};
pub use reset::{ResetConfirmation, ResetController};
pub use reveal::{RevealController, RevealView};
pub use submission::{
    SUBMIT_SUCCESS_MESSAGE, SubmissionController, SubmissionReceipt, SubmissionStatus,
    SubmissionView, parse_amount,
};
