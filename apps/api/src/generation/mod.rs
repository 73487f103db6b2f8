// Generation: quota-gated, retrying dispatch of assembled prompts to the model.
// All model calls go through model_client. Long-running jobs are handed to jobs::tracker.

pub mod dispatcher;
pub mod handlers;
pub mod pipeline;
pub mod quota;
pub mod store;
pub mod usage;
