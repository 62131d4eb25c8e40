/// Durable collections kept as JSON blobs in the settings table.
mod period;
mod task_type;

pub use period::PeriodRegistry;
pub use task_type::{TaskTypeError, TaskTypeRegistry};
