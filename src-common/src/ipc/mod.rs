//! Control-channel protocol between clients and the recorder server.

mod protocol;
mod requests;
mod responses;
mod tokens;

pub use protocol::*;
pub use requests::*;
pub use responses::*;
pub use tokens::*;
