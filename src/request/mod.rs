//! Per-point request building: region, collection query and export descriptor.

mod builder;

pub use builder::{CollectionQuery, ExportDescriptor, RequestBuilder};
