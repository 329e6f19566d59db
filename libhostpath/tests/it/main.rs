mod common;
mod dispatch;
mod node_lifecycle;
