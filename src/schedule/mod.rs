pub mod driver;
pub mod times;

pub use driver::{DriverHandle, DriverState, DriverStats, ScheduleDriver, ScheduledJob};
pub use times::{parse_schedule, Clock, SystemClock};
