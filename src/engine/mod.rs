pub mod collaborators;
pub mod directory;
pub mod dispatch;
pub mod lifecycle;
pub mod state_machine;
