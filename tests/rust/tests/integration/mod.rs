//! End-to-end gateway flows
//!
//! - Control plane driving registry, connections and the merged catalog
//! - Restart with a persisted registry and capability cache
//! - Raw socket clients and single-client preemption
//! - Bridge mode backends dialing in

mod control_plane;
mod socket_clients;
