pub mod id;
pub mod snowflake;

pub use id::{is_valid_id, PrefixedId};
pub use snowflake::SnowflakeGenerator;
