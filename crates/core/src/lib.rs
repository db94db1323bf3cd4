pub mod conversation;
pub mod storage;
