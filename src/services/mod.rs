pub mod dispatch;
pub mod fcm;
pub mod formatter;
pub mod init;
pub mod notifications;
pub mod token_store;

#[cfg(test)]
pub mod testing;
