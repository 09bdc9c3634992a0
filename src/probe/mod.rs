pub mod icmp;
pub mod pinger;
pub mod socket;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use icmp::*;
pub use pinger::*;
pub use socket::*;
pub use transport::*;
