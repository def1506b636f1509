use netgate_agent::{
    agent::Service,
    api::{ApiService, NetworkApi},
    connectivity::ConnectivityProbe,
    executor::RecordingExecutor,
    network_mode::{ManagerConfig, NetworkModeManager, artifacts::ArtifactPaths},
};
use serde_json::{Value, json};
use std::{
    net::{SocketAddr, TcpListener},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

struct Online;

impl ConnectivityProbe for Online {
    async fn has_internet(&self) -> bool {
        true
    }
}

fn free_local_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
    listener.local_addr().expect("should have addr")
}

fn manager(
    executor: RecordingExecutor,
    dir: &tempfile::TempDir,
) -> NetworkModeManager<RecordingExecutor> {
    NetworkModeManager::new(
        executor,
        ManagerConfig {
            wifi_interface: "wlan0".to_string(),
            second_radio_interface: "wlan1".to_string(),
            wan_interface: "eth0".to_string(),
            paths: ArtifactPaths {
                hostapd_conf: dir.path().join("hostapd.conf"),
                dnsmasq_conf: dir.path().join("dnsmasq.d/netgate.conf"),
                wpa_supplicant_conf: dir.path().join("wpa_supplicant.conf"),
            },
            status_refresh: Duration::from_secs(30),
        },
    )
}

async fn get_json(client: &reqwest::Client, url: String) -> Value {
    client
        .get(url)
        .send()
        .await
        .expect("should be answered")
        .json()
        .await
        .expect("should be json")
}

#[tokio::test(flavor = "multi_thread")]
async fn router_config_is_applied_through_the_api() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let executor = RecordingExecutor::new();
    let manager = manager(executor.clone(), &dir);
    let listen = free_local_addr();
    let service = ApiService::new(NetworkApi::new(manager.clone(), Arc::new(Online)), listen);
    let token = CancellationToken::new();
    let server = tokio::spawn({
        let token = token.clone();
        async move { service.run(token).await }
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .expect("should build client");
    let base = format!("http://{listen}/api");

    let deadline = Instant::now() + Duration::from_secs(5);
    let health = loop {
        if let Ok(res) = client.get(format!("{base}/health")).send().await {
            break res.json::<Value>().await.expect("should be json");
        }
        assert!(Instant::now() < deadline, "api did not come up");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert_eq!(health["internet_access"], true);

    let res = client
        .post(format!("{base}/wifi/config"))
        .json(&json!({
            "mode": "router",
            "router": {
                "ssid": "Home5G",
                "password": "supersecret1",
                "band": "5GHz",
                "subnet_base": "192.168.77"
            }
        }))
        .send()
        .await
        .expect("should be answered");
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        let status = get_json(&client, format!("{base}/wifi/status")).await;
        if status["active"] == true {
            break status;
        }
        assert!(Instant::now() < deadline, "router never became active");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(status["mode"], "router");
    assert_eq!(status["ssid"], "Home5G");
    assert_eq!(status["gateway_ip"], "192.168.77.1");
    assert!(status.get("error").is_none());

    let hostapd = std::fs::read_to_string(dir.path().join("hostapd.conf"))
        .expect("hostapd config should be written");
    assert!(hostapd.contains("ssid=Home5G"));

    let config = get_json(&client, format!("{base}/wifi/config")).await;
    assert_eq!(config["router"]["subnet_base"], "192.168.77");

    let res = client
        .post(format!("{base}/wifi/stop"))
        .send()
        .await
        .expect("should be answered");
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    token.cancel();
    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("api should stop")
        .expect("api task should not panic")
        .expect("api should stop cleanly");
    assert!(executor.position("systemctl restart hostapd").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn bind_failure_is_reported() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let occupied = TcpListener::bind("127.0.0.1:0").expect("should bind");
    let listen = occupied.local_addr().expect("should have addr");
    let service = ApiService::new(
        NetworkApi::new(manager(RecordingExecutor::new(), &dir), Arc::new(Online)),
        listen,
    );

    let err = service
        .run(CancellationToken::new())
        .await
        .expect_err("should fail to bind");

    assert!(format!("{err:#}").contains("failed to bind api server"));
}
