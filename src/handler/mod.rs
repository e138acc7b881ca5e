pub mod example;
pub mod live;
