//! API router and shared state.

use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use axum::routing::{any, get, post, put};
use axum::Router;
use tokio::sync::Mutex;
use vmgate_driver::Driver;

use crate::handlers;
use crate::middleware::{admission, track_inflight, validation_gate};

/// State shared with every handler.
#[derive(Clone)]
pub struct AppState {
    /// Active driver.
    pub driver: Arc<dyn Driver>,
    /// Bind address, pinned in the `Origin` check.
    pub address: String,
    /// Bind port, pinned in the `Origin` check.
    pub port: u16,
    /// Reported service version.
    pub version: String,
    /// Requests currently being served.
    pub inflight: Arc<AtomicI64>,
    /// Serializes every mutating request.
    pub net_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Builds state for a driver bound at `address:port`.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, address: &str, port: u16, version: &str) -> Self {
        Self {
            driver,
            address: address.to_string(),
            port,
            version: version.to_string(),
            inflight: Arc::new(AtomicI64::new(0)),
            net_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Builds the API router with admission, validation gating and
/// inflight tracking applied.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Host adapter management
        .route(
            "/vmnet/{name}/portforward",
            get(handlers::port_forwards::list_device_fwds)
                .put(handlers::port_forwards::add_device_fwds)
                .delete(handlers::port_forwards::delete_device_fwds),
        )
        .route(
            "/vmnet/{name}/dhcpreserve/{mac}/{ip}",
            put(handlers::vmnet::reserve_dhcp_address),
        )
        .route(
            "/vmnet/{name}/dhcplease/{mac}",
            get(handlers::vmnet::dhcp_lease),
        )
        .route(
            "/vmnet/{name}",
            get(handlers::vmnet::get_device)
                .put(handlers::vmnet::update_device)
                .delete(handlers::vmnet::delete_device),
        )
        .route("/vmnet/verify", post(handlers::vmnet::verify))
        .route(
            "/vmnet",
            get(handlers::vmnet::list_devices).post(handlers::vmnet::create_device),
        )
        // Guest adapter management is reserved but unimplemented.
        .route("/vms/{vm}/nic/{adapter}", any(handlers::system::not_implemented))
        .route("/vms/{vm}/nic", any(handlers::system::not_implemented))
        .route("/vms/{vm}/ip", any(handlers::system::not_implemented))
        // Service surface
        .route(
            "/portforwards",
            get(handlers::port_forwards::list_all).delete(handlers::port_forwards::prune),
        )
        .route("/vmware/paths", get(handlers::system::vmware_paths))
        .route("/vmware/info", get(handlers::system::vmware_info))
        .route("/status", get(handlers::system::status))
        .route("/version", get(handlers::system::version))
        .route("/", any(handlers::system::not_implemented))
        // The validation gate only applies to matched routes; unknown
        // paths stay 404 regardless of driver state.
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            validation_gate,
        ))
        .fallback(handlers::system::not_found)
        .method_not_allowed_fallback(handlers::system::not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), admission))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            track_inflight,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
