pub mod entities;
pub mod events;
pub mod ports;
pub mod snapshot;
pub mod value_objects;

pub use claim_errors::{SchedulerError, SchedulerResult};
pub use entities::*;
pub use events::*;
pub use ports::*;
pub use snapshot::*;
pub use value_objects::*;
