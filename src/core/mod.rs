pub mod audio;
pub mod events;
pub mod input;
