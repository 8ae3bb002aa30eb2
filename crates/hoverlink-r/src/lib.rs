pub mod server;

pub use server::{RemoteServer, ServerError, ServerHandle};
