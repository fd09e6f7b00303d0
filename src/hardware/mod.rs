//! Radio link abstraction
//!
//! The hosting shell owns the actual Bluetooth stack. It implements
//! [`LinkAdapter`] to start operations and reports each completion back as a
//! [`LinkEvent`] tagged with the epoch the operation was issued under.

pub mod link;
pub mod mock;
pub mod error;

pub use link::{Characteristic, Epoch, LinkAdapter, LinkEvent, LinkEventKind, LinkOp};
pub use mock::{IssuedOp, MockLink};
pub use error::{LinkError, LinkErrorKind, RecoveryStrategy};
