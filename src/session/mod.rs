pub mod store;

pub use store::{Session, SessionStore, Turn, TurnPayload, TurnRole};
