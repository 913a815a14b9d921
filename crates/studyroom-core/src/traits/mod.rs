//! Trait seams between the sync engine and its collaborators

pub mod connectivity;
pub mod remote_api;
pub mod store;

pub use connectivity::{ConnectivityEvent, ConnectivitySource};
pub use remote_api::{ApiAck, AttendanceUpsert, RemoteApi, StudentFilter};
pub use store::OfflineStore;
