pub mod chat;
pub mod gateway;
pub mod init;
pub mod session;
