// Service exports
pub mod bus;
pub mod gateway;
pub mod memory;
pub mod model;
pub mod postgres;

pub use bus::{BusError, ChannelKey, EventBus, LocalBus, RedisBus};
pub use gateway::{Gateway, StoreError, UnitOfWork};
pub use memory::{FailPoint, MemoryStore, TableCounts};
pub use model::{LinearArtifact, LinearModel, RemoteModel};
pub use postgres::PostgresStore;
