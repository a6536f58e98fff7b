pub mod hybrid;
pub mod local;
pub mod remote;
pub mod types;

pub use hybrid::HybridOrsProvider;
pub use local::LocalOrsProvider;
pub use remote::RemoteOrsProvider;
