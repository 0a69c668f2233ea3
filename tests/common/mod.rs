use std::sync::Arc;

use chamber_store::MemCluster;
use chamber_store::Store;
use chamber_store::StoreConfig;
use chamber_store::TestNamespaceConfig;

pub const ENDPOINTS: [&str; 3] = [
    "http://10.1.0.1:2379",
    "http://10.1.0.2:2379",
    "http://10.1.0.3:2379",
];

pub fn cluster() -> MemCluster {
    MemCluster::new(ENDPOINTS.iter().map(|e| e.to_string()).collect())
}

/// Isolated test-namespace config pointing at the first member
pub fn config() -> StoreConfig {
    StoreConfig {
        endpoints: vec![ENDPOINTS[0].to_string()],
        test_namespace: TestNamespaceConfig {
            use_test_namespace: true,
            clean_on_connect: true,
            uniquify: true,
        },
        ..Default::default()
    }
}

pub async fn connect(cluster: &MemCluster) -> Arc<Store> {
    let store = Arc::new(Store::new(config(), Arc::new(cluster.clone())));
    store.connect().await.expect("connect");
    store
}
