pub mod policy;
pub mod storage;
pub mod uploader;
