pub mod net;

pub use net::*;
