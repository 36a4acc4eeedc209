//! 驱动注册流程测试
//!
//! 使用内存中的后端工厂记录每次调用，不需要 etcd 或 Consul。

use async_trait::async_trait;
use dtm_driver_kratos::resolver;
use dtm_driver_kratos::{
    BackendFactory, BackendKind, BackendOptions, ConsulFactory, ConsulOptions, Discovery, Driver, DriverError,
    EtcdOptions, HostProbe, KratosDriver, Registrar, Registry, Result, Scheme, ServiceInstance,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 解析器注册表是进程级的，修改它的测试串行执行
static RESOLVER_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

struct FixedProbe {
    ip: &'static str,
    hostname: &'static str,
    ip_calls: AtomicUsize,
}

impl FixedProbe {
    fn new(ip: &'static str) -> Arc<Self> {
        Arc::new(Self {
            ip,
            hostname: "node-a",
            ip_calls: AtomicUsize::new(0),
        })
    }
}

impl HostProbe for FixedProbe {
    fn local_ip(&self) -> String {
        self.ip_calls.fetch_add(1, Ordering::SeqCst);
        self.ip.to_string()
    }

    fn hostname(&self) -> String {
        self.hostname.to_string()
    }
}

#[derive(Default)]
struct MemoryRegistry {
    instances: Mutex<Vec<ServiceInstance>>,
}

#[async_trait]
impl Registrar for MemoryRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        self.instances.lock().push(instance.clone());
        Ok(())
    }
}

#[async_trait]
impl Discovery for MemoryRegistry {
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .instances
            .lock()
            .iter()
            .filter(|instance| instance.name == name)
            .cloned()
            .collect())
    }
}

/// 记录 build 调用的后端工厂
struct RecordingFactory {
    kind: BackendKind,
    options: BackendOptions,
    builds: Mutex<Vec<Vec<String>>>,
    registry: Arc<MemoryRegistry>,
    fail_build: bool,
}

impl RecordingFactory {
    fn with(kind: BackendKind, options: BackendOptions, fail_build: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            options,
            builds: Mutex::new(Vec::new()),
            registry: Arc::new(MemoryRegistry::default()),
            fail_build,
        })
    }

    fn etcd() -> Arc<Self> {
        Self::with(BackendKind::Etcd, BackendOptions::Etcd(EtcdOptions::default()), false)
    }

    fn consul() -> Arc<Self> {
        Self::with(BackendKind::Consul, BackendOptions::Consul(ConsulOptions::default()), false)
    }

    fn failing_etcd() -> Arc<Self> {
        Self::with(BackendKind::Etcd, BackendOptions::Etcd(EtcdOptions::default()), true)
    }

    fn builds(&self) -> Vec<Vec<String>> {
        self.builds.lock().clone()
    }

    fn registered(&self) -> Vec<ServiceInstance> {
        self.registry.instances.lock().clone()
    }
}

#[async_trait]
impl BackendFactory for RecordingFactory {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn options(&self) -> BackendOptions {
        self.options.clone()
    }

    async fn build(&self, hosts: &[String]) -> Result<Arc<dyn Registry>> {
        self.builds.lock().push(hosts.to_vec());
        if self.fail_build {
            return Err(DriverError::resolver("backend unreachable"));
        }
        Ok(self.registry.clone())
    }
}

fn driver_with(
    probe: Arc<FixedProbe>,
    etcd: Arc<RecordingFactory>,
    consul: Arc<RecordingFactory>,
) -> KratosDriver {
    KratosDriver::builder()
        .probe(probe)
        .factory(etcd)
        .factory(consul)
        .build()
}

#[tokio::test]
async fn test_empty_target_has_no_side_effect() {
    let probe = FixedProbe::new("10.1.2.3");
    let etcd = RecordingFactory::etcd();
    let consul = RecordingFactory::consul();
    let driver = driver_with(probe.clone(), etcd.clone(), consul.clone());

    driver.register_service("", "localhost:9000").await.unwrap();

    assert!(etcd.builds().is_empty());
    assert!(consul.builds().is_empty());
    assert_eq!(probe.ip_calls.load(Ordering::SeqCst), 0);
    assert!(driver.registrations().is_empty());
}

#[tokio::test]
async fn test_etcd_registration_rewrites_localhost() {
    let _guard = RESOLVER_LOCK.lock().await;
    resolver::reset();

    let etcd = RecordingFactory::etcd();
    let consul = RecordingFactory::consul();
    let driver = driver_with(FixedProbe::new("10.1.2.3"), etcd.clone(), consul.clone());

    driver
        .register_service("etcd://10.0.0.1:2379,10.0.0.2:2379/svc.order", "localhost:9000")
        .await
        .unwrap();

    assert_eq!(
        etcd.builds(),
        vec![vec!["10.0.0.1:2379".to_string(), "10.0.0.2:2379".to_string()]]
    );
    assert!(consul.builds().is_empty());
    assert_eq!(
        etcd.registered(),
        vec![ServiceInstance::new(
            "svc.order_node-a",
            "svc.order",
            vec!["10.1.2.3:9000".to_string()]
        )]
    );

    assert!(resolver::get("discovery").is_some());
    assert_eq!(
        resolver::resolve("discovery:///svc.order").await.unwrap(),
        vec!["10.1.2.3:9000"]
    );
}

#[tokio::test]
async fn test_discovery_scheme_uses_etcd_backend() {
    let _guard = RESOLVER_LOCK.lock().await;
    resolver::reset();

    let etcd = RecordingFactory::etcd();
    let consul = RecordingFactory::consul();
    let driver = driver_with(FixedProbe::new("10.1.2.3"), etcd.clone(), consul.clone());

    driver
        .register_service("discovery://127.0.0.1:2379/svc.order", "grpc://10.0.0.9:9000")
        .await
        .unwrap();

    assert_eq!(etcd.builds(), vec![vec!["127.0.0.1:2379".to_string()]]);
    assert!(consul.builds().is_empty());
    assert_eq!(driver.registrations()[0].scheme(), Scheme::Discovery);
    assert_eq!(
        resolver::resolve("discovery:///svc.order").await.unwrap(),
        vec!["10.0.0.9:9000"]
    );
}

#[tokio::test]
async fn test_consul_registration() {
    let _guard = RESOLVER_LOCK.lock().await;
    resolver::reset();

    let etcd = RecordingFactory::etcd();
    let consul = RecordingFactory::consul();
    let probe = FixedProbe::new("10.1.2.3");
    let driver = driver_with(probe.clone(), etcd.clone(), consul.clone());

    driver
        .register_service("consul://10.0.0.5:8500/svc.pay", "10.0.0.6:9001,10.0.0.7:9001")
        .await
        .unwrap();

    assert!(etcd.builds().is_empty());
    assert_eq!(consul.builds(), vec![vec!["10.0.0.5:8500".to_string()]]);
    assert_eq!(probe.ip_calls.load(Ordering::SeqCst), 0);

    // 未注入工厂时驱动使用的默认 Consul 参数
    let BackendOptions::Consul(options) = ConsulFactory::default().options() else {
        panic!("consul factory must report consul options");
    };
    assert!(options.health_check);
    assert_eq!(options.health_check_interval, 10);
    assert!(options.heartbeat);
    assert_eq!(options.timeout, Duration::from_secs(20));

    let registered = consul.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].id, "svc.pay_node-a");
    assert_eq!(registered[0].endpoints, vec!["10.0.0.6:9001", "10.0.0.7:9001"]);
    assert!(resolver::get("discovery").is_some());
}

#[tokio::test]
async fn test_unknown_scheme() {
    let etcd = RecordingFactory::etcd();
    let consul = RecordingFactory::consul();
    let driver = driver_with(FixedProbe::new("10.1.2.3"), etcd.clone(), consul.clone());

    let err = driver.register_service("redis://x/y", "ep").await.unwrap_err();

    assert_eq!(err.to_string(), "unknown scheme: redis");
    assert!(etcd.builds().is_empty());
    assert!(consul.builds().is_empty());
}

#[tokio::test]
async fn test_invalid_target_is_returned() {
    let driver = driver_with(
        FixedProbe::new("10.1.2.3"),
        RecordingFactory::etcd(),
        RecordingFactory::consul(),
    );

    let err = driver
        .register_service("etcd://host:port/svc", "ep")
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::InvalidUri { .. }));
}

#[tokio::test]
async fn test_backend_construction_error_is_propagated() {
    let etcd = RecordingFactory::failing_etcd();
    let driver = driver_with(FixedProbe::new("10.1.2.3"), etcd.clone(), RecordingFactory::consul());

    let err = driver
        .register_service("etcd://10.0.0.1:2379/svc.order", "10.0.0.6:9001")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "resolver: backend unreachable");
    assert_eq!(etcd.builds().len(), 1);
    assert!(etcd.registered().is_empty());
    assert!(driver.registrations().is_empty());
}

#[tokio::test]
async fn test_localhost_kept_without_local_ip() {
    let etcd = RecordingFactory::etcd();
    let driver = driver_with(FixedProbe::new(""), etcd.clone(), RecordingFactory::consul());
    let _guard = RESOLVER_LOCK.lock().await;

    driver
        .register_service("etcd://10.0.0.1:2379/svc.order", "localhost:9000")
        .await
        .unwrap();

    assert_eq!(etcd.registered()[0].endpoints, vec!["localhost:9000"]);
}

#[tokio::test]
async fn test_instance_id_uses_process_hostname_by_default() {
    let _guard = RESOLVER_LOCK.lock().await;
    let etcd = RecordingFactory::etcd();
    let driver = KratosDriver::builder().factory(etcd.clone()).build();

    driver
        .register_service("etcd://10.0.0.1:2379/svc.order", "10.0.0.6:9001")
        .await
        .unwrap();

    assert_eq!(
        etcd.registered()[0].id,
        format!("svc.order_{}", dtm_driver_kratos::hostname())
    );
}

#[test]
fn test_driver_contract() {
    let driver = dtm_driver_kratos::get_driver("dtm-driver-kratos").expect("registered at init");
    assert_eq!(driver.name(), "dtm-driver-kratos");
    driver.register_address_resolver();

    assert_eq!(
        driver.parse_server_method("discovery:///svc.order/Create").unwrap(),
        ("discovery:///svc.order".to_string(), "/Create".to_string())
    );
    assert_eq!(
        driver.parse_server_method("127.0.0.1:8080/svc.Method").unwrap(),
        ("127.0.0.1:8080".to_string(), "/svc.Method".to_string())
    );
    assert_eq!(
        driver.parse_server_method("no-slash").unwrap_err().to_string(),
        "bad url: 'no-slash'. no '/' found"
    );
}
