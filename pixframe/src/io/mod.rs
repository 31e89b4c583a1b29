pub mod decoder;
pub mod source_watch;
