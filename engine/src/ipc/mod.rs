//! Control surface: s-expression plist messages in, plist responses out.

pub mod dispatch;

pub use dispatch::handle_message;
