pub mod dispatch;
pub mod offers;
