pub mod error;
pub mod kv;
pub mod model;
pub mod normalize;
pub mod output;
pub mod prefix;
pub mod store;
pub mod trailer;
pub mod validate;

pub use error::{Result, StoreError};
pub use model::{StatusFilter, Task, TaskInput, UpdateSet};
pub use store::{RebuildSummary, Store};
