pub mod control;
pub mod feedback;
pub mod runtime;
