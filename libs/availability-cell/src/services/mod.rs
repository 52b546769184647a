pub mod slots;
pub mod windows;
