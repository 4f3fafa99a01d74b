#![allow(dead_code)]

//! MongoDB test infrastructure module.
//!
//! Starts one MongoDB testcontainer per test binary and hands every test its own database.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Once;

use bson::oid::ObjectId;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

use crate::mongo::MongoStore;

/// Global MongoDB container port, set once the container is started
static MONGO_PORT: AtomicU16 = AtomicU16::new(0);

/// Ensures the container is started only once
static MONGO_INIT: Once = Once::new();

/// Tokio runtime for container management (kept alive for container lifecycle)
static mut TOKIO_RT: Option<tokio::runtime::Runtime> = None;

/// Initialize the shared MongoDB container.
///
/// Each `#[tokio::test]` has its own runtime; the container is driven by a dedicated runtime so
/// it outlives every individual test.
fn ensure_mongo_started() {
    MONGO_INIT.call_once(|| {
        let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");

        let port = rt.block_on(async {
            let container = Mongo::default()
                .start()
                .await
                .expect("failed to start mongo container");

            let port = container
                .get_host_port_ipv4(27017)
                .await
                .expect("failed to get mongo port");

            // Leak the container to keep it alive for the test duration
            std::mem::forget(container);

            port
        });

        MONGO_PORT.store(port, Ordering::SeqCst);

        // Safety: This is only called once via Once::call_once
        unsafe {
            TOKIO_RT = Some(rt);
        }
    });
}

fn mongo_url() -> String {
    ensure_mongo_started();
    format!("mongodb://127.0.0.1:{}", MONGO_PORT.load(Ordering::SeqCst))
}

/// A store over a fresh database with a unique name, for isolated testing.
pub async fn get_test_store() -> MongoStore {
    // Container start-up blocks; keep it off the test's runtime.
    let url = tokio::task::spawn_blocking(mongo_url)
        .await
        .expect("container start-up panicked");
    let name = format!("test_{}", ObjectId::new().to_hex());
    MongoStore::connect(&url, &name)
        .await
        .expect("failed to connect to test database")
}
