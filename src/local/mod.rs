//! In-process store provider.
//!
//! The local provider keeps tier configuration and counters inside the current
//! process using [`DashMap`](dashmap::DashMap) and atomics.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** every store is safe to share across tasks and threads
//! - **No external dependencies:** no network or database required
//! - **Process-scoped:** state is lost on restart and not shared across processes
//!
//! # When to Use
//!
//! - Single-process deployments and tests
//! - Benchmarks of the admission loop without I/O noise
//!
//! Use the Redis provider when several gateway processes must share one quota.
//!
//! # Examples
//!
//! ```
//! use tiergate::{ConfigStore, CounterStore, TierDefinition, UserAccount};
//! use tiergate::local::LocalStoreProvider;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let stores = LocalStoreProvider::new();
//!
//! stores
//!     .config()
//!     .put_tier_definition(TierDefinition::from_iter([("Gold", 300)]))
//!     .await
//!     .unwrap();
//! stores
//!     .config()
//!     .put_user_account(UserAccount::new("u1", "Gold"))
//!     .await
//!     .unwrap();
//!
//! assert!(stores.counters().insert_if_absent("u1").await.unwrap());
//! assert_eq!(stores.counters().get("u1").await.unwrap().unwrap().count, 0);
//! # });
//! ```

mod local_config_store;
pub use local_config_store::*;

mod local_counter_store;
pub use local_counter_store::*;

mod local_store_provider;
pub use local_store_provider::*;
