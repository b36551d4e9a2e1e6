pub mod comment;
pub mod item;
pub mod item_log;
pub mod order;
pub mod order_status;
pub mod order_tag;
pub mod tag;
