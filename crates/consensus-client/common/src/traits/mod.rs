pub(crate) mod remote;
pub(crate) mod subsystems;
