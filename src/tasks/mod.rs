pub mod meeting_loop;
pub mod observer;
