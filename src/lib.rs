pub mod cli;
pub mod config;
pub mod debrief;
pub mod feedback;
pub mod history;
pub mod location;
pub mod model;
pub mod recorder;
pub mod render;
pub mod replay;
pub mod report;
pub mod rubric;
pub mod store;
pub mod util;
