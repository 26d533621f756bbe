pub mod bootstrap;
pub mod commands;
pub mod selection;
pub mod status_transition;
pub mod timeline;
