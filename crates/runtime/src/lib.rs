pub mod coordinator;
pub mod task;
pub mod work_queue;
pub mod worker_pool;

pub use coordinator::*;
pub use task::*;
pub use work_queue::*;
pub use worker_pool::*;
