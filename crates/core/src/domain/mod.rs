pub mod employee;
pub mod entity;
pub mod meta;
pub mod payment;
pub mod subscriber;
pub mod ticket;
pub mod value;
