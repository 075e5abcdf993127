pub mod connection;
pub mod gateway;
pub mod reports;
pub mod schedules;
pub mod schema;

pub use connection::Database;
pub use gateway::{month_range, week_range, year_range, PersistenceGateway, ScheduleStore};
