//! Storage access for point tables and plan output.

mod store;

pub use store::{create_input_store, create_plan_store, create_s3_store, is_s3_uri, parse_s3_uri};
