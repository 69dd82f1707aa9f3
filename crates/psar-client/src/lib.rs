pub mod poller;
pub mod reconciler;
