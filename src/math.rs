pub mod distance;
pub mod link;
pub mod vector;
