//! Request cache router: classifies outgoing GET requests and serves them
//! through named, versioned response-cache partitions.
//!
//! - Navigations are network-first with an offline placeholder fallback
//! - Cacheable API reads and other same-origin GETs are network-first with
//!   a cached fallback
//! - Static assets are cache-first with a network fill
//!
//! Partitions are pre-populated at install, retired on version rollover, and
//! swept for expired entries at activation.

mod response;
mod router;
mod rules;
mod store;

pub use response::{FetchRequest, FetchResponse, ResponseSource, RoutedResponse};
pub use router::{ActivationReport, CacheRouter};
pub use rules::{RequestClass, RouteRules};
pub use store::{CacheStore, Partition};
