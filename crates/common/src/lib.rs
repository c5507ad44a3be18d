pub mod bus;
pub mod logging;
pub mod model;
pub mod topic;
