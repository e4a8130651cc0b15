//! Use cases that orchestrate domain entities through ports

pub mod session;

pub use session::SessionUseCase;
