//! dht-services — the routing table and value cache a DHT node keeps in
//! memory, independent of any particular transport.

pub mod cache;
pub mod routing;

pub use cache::ValueCache;
pub use routing::{AddOutcome, PeerRecord, RoutingTable};
