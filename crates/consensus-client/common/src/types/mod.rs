pub(crate) mod ids;
pub(crate) mod message;
pub(crate) mod progress;
