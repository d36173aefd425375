//! Resolves access point URIs to registered vendor driver implementations.
//!
//! A URI such as `oms:rocketmq://alice@rocketmq.apache.org/us-east:default_space`
//! is parsed into an [`AccessPointDescriptor`], the driver type selects a
//! factory from the [`DriverRegistry`], and the constructed access point is
//! checked for specification compatibility.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod registry;
mod resolver;
mod uri;

pub use error::{Error, ResolutionCause, Result};
pub use registry::{DriverRegistry, conventional_implementation_id};
pub use resolver::{AccessPointHandle, AccessPointResolver, is_compatible};
pub use uri::{AccessPointDescriptor, SCHEME};
