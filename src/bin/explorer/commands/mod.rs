pub mod buckets;
pub mod get;
pub mod ls;
pub mod mkdir;
pub mod mv;
pub mod rm;
pub mod upload;
