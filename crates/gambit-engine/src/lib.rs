//! The synchronization engine: REST collaborator client, push-message
//! dispatch, move submission, and the invitation workflow, composed behind
//! [`GambitClient`].

pub mod api;
pub mod client;
pub mod dispatch;
pub mod invitations;
pub mod moves;

#[cfg(test)]
mod testing;

pub use api::{login, logout, register, AuthSession, Credentials, GameService, HttpGameService};
pub use client::GambitClient;
pub use dispatch::EventDispatcher;
pub use invitations::InvitationWorkflow;
pub use moves::MovePipeline;
