pub mod certificates;
pub mod server;
