pub mod storage;
pub mod telemetry;

pub use storage::ObservedRepository;
pub use telemetry::init_telemetry;
