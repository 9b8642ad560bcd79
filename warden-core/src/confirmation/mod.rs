//! Confirmation bus.
//!
//! Decouples "a decision is needed" from "something can supply one". Tool
//! confirmations, model-switch prompts and consent requests are published as
//! [`ConfirmationRequest`]s and suspend the publisher until the active
//! subscriber answers through its [`Responder`]. Policy updates and
//! rejections travel as [`Notification`]s.
//!
//! | Subscriber | Use |
//! |------------|-----|
//! | [`NonInteractiveHandler`] | Headless runs: fixed answer for every request |
//! | [`ChannelHandler`] | UIs answering from their own task |

mod bus;
mod handler;
mod message;

pub use bus::{ConfirmationBus, ConfirmationError, SubscriptionId};
pub use handler::{ChannelHandler, ConfirmationHandler, NonInteractiveHandler};
pub use message::{
    ConfirmationKind, ConfirmationOutcome, ConfirmationRequest, Notification, PendingConfirmation,
    PolicyTarget, Question, Responder,
};
