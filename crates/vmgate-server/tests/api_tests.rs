//! Integration tests for the API router.
//!
//! Requests are driven straight into the axum router. The driver is a
//! mock backed by a real NAT settings store so forward semantics
//! (replace-on-collision, persistence) match the production stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use vmgate_driver::{
    Driver, PortForward, PortForwardGuest, PortForwards, Vmnet, Vmnets, VmwareInfo,
};
use vmgate_server::{create_router, AppState};
use vmgate_utility::dhcp_lease::DhcpLeaseFile;
use vmgate_utility::networking_file::PortFwd;
use vmgate_utility::VmwarePaths;

const BIND_ADDRESS: &str = "127.0.0.1";
const BIND_PORT: u16 = 9922;

struct MockDriver {
    nat: vmgate_settings::NatSettings,
    lease_file: Option<String>,
    validated: AtomicBool,
    _dir: TempDir,
}

impl MockDriver {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            nat: vmgate_settings::NatSettings::load(dir.path().join("nat.json")).unwrap(),
            lease_file: None,
            validated: AtomicBool::new(true),
            _dir: dir,
        }
    }

    fn with_lease_file(content: &str) -> Self {
        let mut driver = Self::new();
        let path = driver._dir.path().join("dhcpd.leases");
        std::fs::write(&path, content).unwrap();
        driver.lease_file = Some(path.to_string_lossy().into_owned());
        driver
    }

    fn wire_fwds(&self) -> Vec<PortForward> {
        self.nat
            .port_fwds()
            .iter()
            .map(|fwd| PortForward {
                port: fwd.host_port,
                protocol: fwd.protocol.clone(),
                description: fwd.description.clone(),
                guest: PortForwardGuest {
                    ip: fwd.guest_ip.clone(),
                    port: fwd.guest_port,
                },
                slot: fwd.slot,
            })
            .collect()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn vmnets(&self) -> vmgate_driver::Result<Vmnets> {
        Ok(Vmnets::new(vec![Vmnet {
            name: "vmnet8".to_string(),
            kind: "nat".to_string(),
            dhcp: "yes".to_string(),
            subnet: "192.168.57.0".to_string(),
            mask: "255.255.255.0".to_string(),
        }]))
    }

    async fn add_vmnet(&self, vmnet: &mut Vmnet) -> vmgate_driver::Result<()> {
        vmnet.name = "vmnet9".to_string();
        Ok(())
    }

    async fn update_vmnet(&self, _vmnet: &mut Vmnet) -> vmgate_driver::Result<()> {
        Ok(())
    }

    async fn delete_vmnet(&self, _vmnet: &Vmnet) -> vmgate_driver::Result<()> {
        Ok(())
    }

    async fn port_fwds(&self, slot: Option<u32>) -> vmgate_driver::Result<PortForwards> {
        let fwds = self
            .wire_fwds()
            .into_iter()
            .filter(|fwd| slot.map_or(true, |slot| fwd.slot == slot))
            .collect();
        Ok(PortForwards::new(fwds))
    }

    async fn add_port_fwds(&self, fwds: Vec<PortForward>) -> vmgate_driver::Result<()> {
        for fwd in fwds {
            self.nat.add(PortFwd {
                enable: true,
                slot: fwd.slot,
                protocol: fwd.protocol,
                host_port: fwd.port,
                guest_ip: fwd.guest.ip,
                guest_port: fwd.guest.port,
                description: fwd.description,
            });
        }
        self.nat.save().unwrap();
        Ok(())
    }

    async fn delete_port_fwds(&self, fwds: Vec<PortForward>) -> vmgate_driver::Result<()> {
        for fwd in fwds {
            self.nat.remove(&PortFwd {
                protocol: fwd.protocol,
                host_port: fwd.port,
                ..PortFwd::default()
            });
        }
        self.nat.save().unwrap();
        Ok(())
    }

    async fn prune_port_fwds(&self) -> vmgate_driver::Result<()> {
        let stale: Vec<PortForward> = self
            .wire_fwds()
            .into_iter()
            .filter(|fwd| {
                fwd.description
                    .strip_prefix("vagrant: ")
                    .is_some_and(|path| !std::path::Path::new(path).exists())
            })
            .collect();
        self.delete_port_fwds(stale).await
    }

    async fn lookup_dhcp_address(
        &self,
        _device: &str,
        mac: &str,
    ) -> vmgate_driver::Result<String> {
        let path = self.lease_file.as_ref().ok_or_else(|| {
            vmgate_driver::DriverError::NotFound("no lease file".to_string())
        })?;
        let leases = DhcpLeaseFile::load(path).map_err(vmgate_driver::DriverError::Utility)?;
        Ok(leases.ip_for_mac(mac)?)
    }

    async fn reserve_dhcp_address(
        &self,
        _slot: u32,
        _mac: &str,
        _ip: &str,
    ) -> vmgate_driver::Result<()> {
        Ok(())
    }

    async fn vmware_info(&self) -> vmgate_driver::Result<VmwareInfo> {
        Ok(VmwareInfo {
            product: "Workstation".to_string(),
            version: "17.5.0".to_string(),
            build: "build-23298084".to_string(),
            kind: "Release".to_string(),
            license: "professional".to_string(),
        })
    }

    fn vmware_paths(&self) -> &VmwarePaths {
        static PATHS: std::sync::OnceLock<VmwarePaths> = std::sync::OnceLock::new();
        PATHS.get_or_init(VmwarePaths::default)
    }

    async fn verify_vmnet(&self) -> vmgate_driver::Result<()> {
        Ok(())
    }

    async fn validate(&self) -> bool {
        self.validated.load(Ordering::SeqCst)
    }

    fn validated(&self) -> bool {
        self.validated.load(Ordering::SeqCst)
    }

    fn validation_reason(&self) -> String {
        "Invalid ownership/permissions detected for VMware installation.".to_string()
    }

    async fn internal_port_forwarding(&self) -> bool {
        false
    }

    async fn enable_internal_port_forwarding(&self) -> vmgate_driver::Result<()> {
        Ok(())
    }
}

fn router_for(driver: Arc<MockDriver>) -> axum::Router {
    let state = AppState::new(driver, BIND_ADDRESS, BIND_PORT, "1.0.4");
    create_router(state)
}

fn request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Requested-With", "Vagrant")
        .header("Origin", format!("https://{BIND_ADDRESS}:{BIND_PORT}"));
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_origin_is_rejected() {
    let app = router_for(Arc::new(MockDriver::new()));
    let req = Request::builder()
        .uri("/status")
        .header("X-Requested-With", "Vagrant")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(
        json,
        serde_json::json!({"code": 403, "message": "invalid client requester"})
    );
}

#[tokio::test]
async fn wrong_requester_header_is_rejected() {
    let app = router_for(Arc::new(MockDriver::new()));
    let req = Request::builder()
        .uri("/status")
        .header("X-Requested-With", "curl")
        .header("Origin", format!("https://{BIND_ADDRESS}:{BIND_PORT}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn responses_carry_api_content_type() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(request(Method::GET, "/status", None))
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        vmgate_server::API_CONTENT_TYPE
    );
}

#[tokio::test]
async fn status_reports_running() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(request(Method::GET, "/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "running");
    assert!(json["inflight"].is_i64());
}

#[tokio::test]
async fn version_reports_service_version() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(request(Method::GET, "/version", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({"version": "1.0.4"}));
}

#[tokio::test]
async fn unvalidated_driver_fails_routes_with_reason() {
    let driver = Arc::new(MockDriver::new());
    driver.validated.store(false, Ordering::SeqCst);
    let app = router_for(driver);

    let response = app
        .oneshot(request(Method::GET, "/vmnet", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], 500);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .starts_with("Validation failure:"));
}

#[tokio::test]
async fn unknown_route_is_404_even_when_unvalidated() {
    let driver = Arc::new(MockDriver::new());
    driver.validated.store(false, Ordering::SeqCst);
    let app = router_for(driver);

    let response = app
        .oneshot(request(Method::GET, "/not/a/route", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({"code": 404, "message": "not found"}));
}

#[tokio::test]
async fn vmnet_listing_and_lookup() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .clone()
        .oneshot(request(Method::GET, "/vmnet", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["num"], 1);
    assert_eq!(json["vmnets"][0]["name"], "vmnet8");
    assert_eq!(json["vmnets"][0]["type"], "nat");

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/vmnet/vmnet8", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(Method::GET, "/vmnet/vmnet99", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn add_and_list_port_forward() {
    let app = router_for(Arc::new(MockDriver::new()));
    let body = serde_json::json!({
        "port": 2222,
        "protocol": "tcp",
        "description": "vagrant: /tmp/a.vmx",
        "guest": {"ip": "192.168.57.10", "port": 22},
    });
    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/vmnet/vmnet8/portforward",
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(Method::GET, "/portforwards", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(
        json,
        serde_json::json!({
            "num": 1,
            "port_forwards": [{
                "port": 2222,
                "protocol": "tcp",
                "description": "vagrant: /tmp/a.vmx",
                "guest": {"ip": "192.168.57.10", "port": 22},
            }],
        })
    );
}

#[tokio::test]
async fn colliding_port_forward_replaces_entry() {
    let app = router_for(Arc::new(MockDriver::new()));
    for guest_ip in ["192.168.57.10", "192.168.57.11"] {
        let body = serde_json::json!({
            "port": 2222,
            "protocol": "tcp",
            "description": "vagrant: /tmp/a.vmx",
            "guest": {"ip": guest_ip, "port": 22},
        });
        let response = app
            .clone()
            .oneshot(request(
                Method::PUT,
                "/vmnet/vmnet8/portforward",
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(request(Method::GET, "/portforwards", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["num"], 1);
    assert_eq!(
        json["port_forwards"][0]["guest"]["ip"],
        "192.168.57.11"
    );
}

#[tokio::test]
async fn port_forward_body_accepts_array() {
    let app = router_for(Arc::new(MockDriver::new()));
    let body = serde_json::json!([
        {"port": 2222, "protocol": "tcp", "guest": {"ip": "192.168.57.10", "port": 22}},
        {"port": 8080, "protocol": "tcp", "guest": {"ip": "192.168.57.10", "port": 80}},
    ]);
    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/vmnet/vmnet8/portforward",
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(Method::GET, "/vmnet/vmnet8/portforward", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["num"], 2);
}

#[tokio::test]
async fn malformed_port_forward_body_is_rejected() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/vmnet/vmnet8/portforward")
                .header("X-Requested-With", "Vagrant")
                .header("Origin", format!("https://{BIND_ADDRESS}:{BIND_PORT}"))
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_port_forward_responds_no_content() {
    let app = router_for(Arc::new(MockDriver::new()));
    let body = serde_json::json!({
        "port": 2222,
        "protocol": "tcp",
        "guest": {"ip": "192.168.57.10", "port": 22},
    });
    app.clone()
        .oneshot(request(
            Method::PUT,
            "/vmnet/vmnet8/portforward",
            Some(body.clone()),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request(
            Method::DELETE,
            "/vmnet/vmnet8/portforward",
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(request(Method::GET, "/portforwards", None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["num"], 0);
}

#[tokio::test]
async fn prune_discards_stale_vagrant_forwards() {
    let driver = Arc::new(MockDriver::new());
    let existing_vmx = driver._dir.path().join("exists.vmx");
    std::fs::write(&existing_vmx, "config").unwrap();

    let app = router_for(Arc::clone(&driver));
    for (port, desc) in [
        (2222, format!("vagrant: {}", existing_vmx.display())),
        (2200, "vagrant: /tmp/definitely-gone.vmx".to_string()),
    ] {
        let body = serde_json::json!({
            "port": port,
            "protocol": "tcp",
            "description": desc,
            "guest": {"ip": "192.168.57.10", "port": 22},
        });
        app.clone()
            .oneshot(request(
                Method::PUT,
                "/vmnet/vmnet8/portforward",
                Some(body),
            ))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/portforwards", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(request(Method::GET, "/portforwards", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["num"], 1);
    assert_eq!(json["port_forwards"][0]["port"], 2222);
}

#[tokio::test]
async fn dhcp_lease_lookup_normalizes_mac() {
    let lease = "\
lease 192.168.57.10 {
    hardware ethernet 0:1:2:3:4:5;
    client-hostname \"guest\";
}
";
    let app = router_for(Arc::new(MockDriver::with_lease_file(lease)));
    let response = app
        .oneshot(request(
            Method::GET,
            "/vmnet/vmnet8/dhcplease/00:01:02:03:04:05",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({"ip": "192.168.57.10"}));
}

#[tokio::test]
async fn dhcp_reserve_responds_no_content() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(request(
            Method::PUT,
            "/vmnet/vmnet8/dhcpreserve/00:0c:29:aa:bb:cc/192.168.57.20",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn vm_nic_routes_are_stubbed() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(request(Method::GET, "/vms/abc123/nic", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn wrong_method_on_known_route_is_404() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(request(Method::DELETE, "/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn vmware_info_round_trips() {
    let app = router_for(Arc::new(MockDriver::new()));
    let response = app
        .oneshot(request(Method::GET, "/vmware/info", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["product"], "Workstation");
    assert_eq!(json["license"], "professional");
    assert_eq!(json["type"], "Release");
}
